//! Durable stake store backing proposal and challenge bonds.
//!
//! The verifier only talks to the [`BondLedger`] trait; [`StakeRegistry`] is the
//! JSON-persisted implementation used by the CLI and the tests.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

use crate::error::{DisputeError, Result};
use crate::party::Address;

/// One bond movement produced by settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOp {
    /// Releases locked stake back to its owner.
    Unlock {
        /// Owner of the locked stake.
        party: Address,
        /// Amount released.
        amount: u128,
    },
    /// Moves locked stake of `from` into the free stake of `to`.
    Transfer {
        /// Party forfeiting locked stake.
        from: Address,
        /// Party receiving it.
        to: Address,
        /// Amount moved.
        amount: u128,
    },
}

/// Stake operations the dispute protocol needs from its host.
pub trait BondLedger {
    /// Locks `amount` of free stake.
    fn lock(&mut self, party: &Address, amount: u128) -> Result<()>;

    /// Releases `amount` of locked stake.
    fn unlock(&mut self, party: &Address, amount: u128) -> Result<()>;

    /// Removes `amount` of `from`'s locked stake and credits it to `to`.
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()>;

    /// Stake not currently locked.
    fn free_balance(&self, party: &Address) -> u128;

    /// Applies a settlement batch in order.
    ///
    /// Implementations that can stage writes should override this so a failing
    /// operation leaves earlier ones unapplied.
    fn apply(&mut self, ops: &[LedgerOp]) -> Result<()> {
        for op in ops {
            apply_op(self, op)?;
        }
        Ok(())
    }
}

fn apply_op<L: BondLedger + ?Sized>(ledger: &mut L, op: &LedgerOp) -> Result<()> {
    match op {
        LedgerOp::Unlock { party, amount } => ledger.unlock(party, *amount),
        LedgerOp::Transfer { from, to, amount } => ledger.transfer(from, to, *amount),
    }
}

/// Stake held by one party.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StakeAccount {
    /// Total stake, locked or not.
    pub staked: u128,
    /// Portion of `staked` currently backing bonds.
    pub locked: u128,
}

impl StakeAccount {
    /// Stake available for new bonds.
    pub fn free(&self) -> u128 {
        self.staked.saturating_sub(self.locked)
    }
}

/// Registry keyed by party address.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StakeRegistry {
    accounts: BTreeMap<Address, StakeAccount>,
}

impl StakeRegistry {
    /// Load from JSON; missing file -> empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|e| DisputeError::Io(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| DisputeError::Decode(e.to_string()))
    }

    /// Persist to JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DisputeError::Io(e.to_string()))?;
            }
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| DisputeError::Decode(e.to_string()))?;
        fs::write(path, data).map_err(|e| DisputeError::Io(e.to_string()))
    }

    fn ensure_account(&mut self, party: &Address) -> &mut StakeAccount {
        self.accounts.entry(*party).or_default()
    }

    /// Account if present.
    pub fn account(&self, party: &Address) -> Option<&StakeAccount> {
        self.accounts.get(party)
    }

    /// Every account, ordered by address.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &StakeAccount)> {
        self.accounts.iter()
    }

    /// Total stake of `party`.
    pub fn staked(&self, party: &Address) -> u128 {
        self.account(party).map(|a| a.staked).unwrap_or_default()
    }

    /// Locked stake of `party`.
    pub fn locked(&self, party: &Address) -> u128 {
        self.account(party).map(|a| a.locked).unwrap_or_default()
    }

    /// Sum of all stake in the registry.
    pub fn total_staked(&self) -> u128 {
        self.accounts.values().map(|a| a.staked).sum()
    }

    /// Credit external funds to stake.
    pub fn deposit(&mut self, party: &Address, amount: u128) -> Result<()> {
        let acct = self.ensure_account(party);
        acct.staked = acct
            .staked
            .checked_add(amount)
            .ok_or(DisputeError::SumOverflow)?;
        Ok(())
    }

    /// Withdraw free stake.
    pub fn withdraw(&mut self, party: &Address, amount: u128) -> Result<()> {
        let acct = self.ensure_account(party);
        if acct.free() < amount {
            return Err(DisputeError::InsufficientStake {
                required: amount,
                available: acct.free(),
            });
        }
        acct.staked -= amount;
        Ok(())
    }
}

impl BondLedger for StakeRegistry {
    fn lock(&mut self, party: &Address, amount: u128) -> Result<()> {
        let acct = self.ensure_account(party);
        if acct.free() < amount {
            return Err(DisputeError::InsufficientStake {
                required: amount,
                available: acct.free(),
            });
        }
        acct.locked += amount;
        Ok(())
    }

    fn unlock(&mut self, party: &Address, amount: u128) -> Result<()> {
        let acct = self.ensure_account(party);
        if acct.locked < amount {
            return Err(DisputeError::InsufficientStake {
                required: amount,
                available: acct.locked,
            });
        }
        acct.locked -= amount;
        Ok(())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        let source = self.ensure_account(from);
        if source.locked < amount || source.staked < amount {
            return Err(DisputeError::InsufficientStake {
                required: amount,
                available: source.locked,
            });
        }
        source.locked -= amount;
        source.staked -= amount;
        let target = self.ensure_account(to);
        target.staked = target
            .staked
            .checked_add(amount)
            .ok_or(DisputeError::SumOverflow)?;
        Ok(())
    }

    fn free_balance(&self, party: &Address) -> u128 {
        self.account(party).map(StakeAccount::free).unwrap_or_default()
    }

    fn apply(&mut self, ops: &[LedgerOp]) -> Result<()> {
        let mut staged = self.clone();
        for op in ops {
            apply_op(&mut staged, op)?;
        }
        *self = staged;
        Ok(())
    }
}
