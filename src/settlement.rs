//! Bond payouts once a dispute is settled.
//!
//! Claims are planned against an immutable proposal first; only a fully valid
//! plan is handed to the ledger (as one batch) and then marked on the proposal.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::{DisputeError, Result};
use crate::game::ChallengeState;
use crate::gindex::{Gindex, ROOT};
use crate::ledger::LedgerOp;
use crate::party::Address;
use crate::proposal::{Proposal, ProposalState};

/// What a successful claim paid out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    /// Indices settled, in request order.
    pub indices: Vec<Gindex>,
    /// Claimant's own locked stake released.
    pub unlocked: u128,
    /// Stake moved to the claimant from other parties.
    pub rewarded: u128,
}

/// Validated claim, ready to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimPlan {
    /// Ledger batch.
    pub ops: Vec<LedgerOp>,
    /// Challenge state changes.
    pub marks: Vec<(Gindex, ChallengeState)>,
    /// Whether the proposal bond is paid out by this claim.
    pub releases_bond: bool,
    /// Claimant-facing totals.
    pub receipt: ClaimReceipt,
}

/// Existing challenges on the path from the root to the defeat index.
///
/// The chain is taken when the proposal is first defeated; challenges opened
/// afterwards are refunded but share nothing.
pub fn winning_chain(proposal: &Proposal) -> Vec<Gindex> {
    proposal.winning_chain().to_vec()
}

/// Share of the proposal bond earned by the challenge at `gindex`.
///
/// The bond is split evenly over the winning chain; the division remainder
/// goes to the challenge that defeated the proposal.
pub fn reward_share(proposal: &Proposal, gindex: Gindex) -> u128 {
    let chain = winning_chain(proposal);
    if !chain.contains(&gindex) {
        return 0;
    }
    let n = chain.len() as u128;
    let share = proposal.bond_locked / n;
    if proposal.defeat_index() == Some(gindex) {
        share + proposal.bond_locked % n
    } else {
        share
    }
}

fn ensure_unique(seen: &mut BTreeSet<Gindex>, gindex: Gindex) -> Result<()> {
    if !seen.insert(gindex) {
        return Err(DisputeError::AlreadyClaimed(gindex));
    }
    Ok(())
}

/// Plans the proposer's claim over `gindices` (index 1 = the proposal bond).
pub fn plan_proposer_claim(
    proposal: &Proposal,
    caller: &Address,
    gindices: &[Gindex],
    now: u64,
) -> Result<ClaimPlan> {
    if *caller != proposal.proposer {
        return Err(DisputeError::NotProposer);
    }
    match proposal.state_at(now) {
        ProposalState::Defeated => return Err(DisputeError::ProposalDefeated),
        ProposalState::Pending | ProposalState::Active => {
            return Err(DisputeError::ProposalNotResolved)
        }
        _ => {}
    }
    // An unanswered challenge may still defeat the proposal.
    if proposal
        .challenges()
        .any(|c| c.state == ChallengeState::Open)
    {
        return Err(DisputeError::ProposalNotResolved);
    }

    let mut plan = ClaimPlan::default();
    let mut seen = BTreeSet::new();
    for &gindex in gindices {
        ensure_unique(&mut seen, gindex)?;
        if gindex == ROOT {
            if proposal.bond_claimed() {
                return Err(DisputeError::AlreadyClaimed(ROOT));
            }
            plan.ops.push(LedgerOp::Unlock {
                party: proposal.proposer,
                amount: proposal.bond_locked,
            });
            plan.releases_bond = true;
            plan.receipt.unlocked += proposal.bond_locked;
        } else {
            let challenge = proposal
                .challenge(gindex)
                .ok_or(DisputeError::InvalidChallengeState(gindex))?;
            match challenge.state {
                ChallengeState::Responded => {}
                ChallengeState::ClaimedByProposer | ChallengeState::ClaimedByChallenger => {
                    return Err(DisputeError::AlreadyClaimed(gindex))
                }
                _ => return Err(DisputeError::InvalidChallengeState(gindex)),
            }
            let amount = proposal.terms.challenge_bond;
            plan.ops.push(LedgerOp::Transfer {
                from: challenge.challenger,
                to: proposal.proposer,
                amount,
            });
            plan.marks.push((gindex, ChallengeState::ClaimedByProposer));
            plan.receipt.rewarded += amount;
        }
        plan.receipt.indices.push(gindex);
    }
    Ok(plan)
}

/// Plans a challenger's claim over their own challenges.
pub fn plan_challenger_claim(
    proposal: &Proposal,
    caller: &Address,
    gindices: &[Gindex],
    now: u64,
) -> Result<ClaimPlan> {
    let state = proposal.state_at(now);
    let defeated = state == ProposalState::Defeated;

    let mut plan = ClaimPlan::default();
    let mut seen = BTreeSet::new();
    for &gindex in gindices {
        ensure_unique(&mut seen, gindex)?;
        if gindex == ROOT {
            return Err(DisputeError::InvalidChallenger(ROOT));
        }
        let challenge = proposal
            .challenge(gindex)
            .ok_or(DisputeError::InvalidChallengeState(gindex))?;
        if challenge.challenger != *caller {
            return Err(DisputeError::InvalidChallenger(gindex));
        }
        match challenge.state {
            ChallengeState::ClaimedByProposer | ChallengeState::ClaimedByChallenger => {
                return Err(DisputeError::AlreadyClaimed(gindex))
            }
            _ if defeated => {}
            ChallengeState::Open => return Err(DisputeError::ProposalNotResolved),
            _ if state.accepts_disputes() => return Err(DisputeError::ProposalNotResolved),
            _ => return Err(DisputeError::InvalidChallengeState(gindex)),
        }

        let bond = proposal.terms.challenge_bond;
        plan.ops.push(LedgerOp::Unlock {
            party: *caller,
            amount: bond,
        });
        plan.receipt.unlocked += bond;
        if defeated {
            let reward = reward_share(proposal, gindex);
            if reward > 0 {
                plan.ops.push(LedgerOp::Transfer {
                    from: proposal.proposer,
                    to: *caller,
                    amount: reward,
                });
                plan.receipt.rewarded += reward;
            }
        }
        plan.marks.push((gindex, ChallengeState::ClaimedByChallenger));
        plan.receipt.indices.push(gindex);
    }
    Ok(plan)
}

impl Proposal {
    pub(crate) fn settle(&mut self, plan: &ClaimPlan) {
        for (gindex, state) in &plan.marks {
            if let Some(challenge) = self.challenges.get_mut(gindex) {
                challenge.state = *state;
            }
        }
        if plan.releases_bond {
            self.bond_claimed = true;
        }
    }
}
