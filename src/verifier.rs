//! Entry point tying proposals, the bisection game and bond settlement together.
//!
//! Every public operation validates completely before it mutates anything, so
//! an `Err` leaves proposals and stake exactly as they were.

use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::error::{DisputeError, Result};
use crate::events::DisputeEvent;
use crate::gindex::{depth_for_count, Gindex, TreeShape, MAX_PHASE1_DEPTH};
use crate::ledger::BondLedger;
use crate::party::Address;
use crate::proposal::{Proposal, ProposalState};
use crate::settings::ProtocolSettings;
use crate::settlement::{plan_challenger_claim, plan_proposer_claim, ClaimPlan, ClaimReceipt};
use crate::snapshot::SnapshotSource;
use crate::sumtree::{fold_nodes, Pollard, SumNode};

/// Optimistic voting-power verifier.
pub struct ProtocolVerifier<L, S, C> {
    settings: ProtocolSettings,
    ledger: L,
    snapshots: S,
    clock: C,
    proposals: BTreeMap<u64, Proposal>,
    next_id: u64,
    journal: Vec<DisputeEvent>,
}

impl<L: BondLedger, S: SnapshotSource, C: Clock> ProtocolVerifier<L, S, C> {
    /// Builds a verifier after validating `settings`.
    pub fn new(settings: ProtocolSettings, ledger: L, snapshots: S, clock: C) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            ledger,
            snapshots,
            clock,
            proposals: BTreeMap::new(),
            next_id: 1,
            journal: Vec::new(),
        })
    }

    /// Settings applied to new proposals.
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// Replaces the settings for proposals created from now on.
    pub fn update_settings(&mut self, settings: ProtocolSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Bond ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable bond ledger (deposits, withdrawals).
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Canonical snapshot source.
    pub fn snapshots(&self) -> &S {
        &self.snapshots
    }

    /// Time source.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Proposal by id.
    pub fn proposal(&self, id: u64) -> Result<&Proposal> {
        self.proposals.get(&id).ok_or(DisputeError::UnknownProposal(id))
    }

    /// Lifecycle state of a proposal now.
    pub fn proposal_state(&self, id: u64) -> Result<ProposalState> {
        Ok(self.proposal(id)?.state_at(self.clock.now()))
    }

    /// Events recorded so far.
    pub fn events(&self) -> &[DisputeEvent] {
        &self.journal
    }

    /// Takes the recorded events, leaving the journal empty.
    pub fn drain_events(&mut self) -> Vec<DisputeEvent> {
        std::mem::take(&mut self.journal)
    }

    fn proposal_mut(&mut self, id: u64) -> Result<&mut Proposal> {
        self.proposals
            .get_mut(&id)
            .ok_or(DisputeError::UnknownProposal(id))
    }

    /// Opens a proposal committing to `root_pollard` and locks the proposal bond.
    pub fn create_proposal(
        &mut self,
        proposer: Address,
        snapshot_block: u64,
        max_depth: u32,
        root_pollard: Pollard,
    ) -> Result<u64> {
        let count = self
            .snapshots
            .party_count(snapshot_block)
            .ok_or(DisputeError::UnknownSnapshot(snapshot_block))?;
        let required = depth_for_count(count);
        if max_depth != required || max_depth > MAX_PHASE1_DEPTH {
            return Err(DisputeError::InvalidTreeDepth {
                declared: max_depth,
                required,
            });
        }
        let terms = self.settings;
        let expected = TreeShape::new(max_depth, terms.depth_per_round).root_pollard_len();
        if root_pollard.len() != expected {
            return Err(DisputeError::InvalidNodeCount {
                expected,
                actual: root_pollard.len(),
            });
        }
        let root = fold_nodes(&root_pollard)?;
        self.ledger.lock(&proposer, terms.proposal_bond)?;

        let proposal_id = self.next_id;
        let proposal = Proposal::new(
            proposal_id,
            proposer,
            snapshot_block,
            max_depth,
            root_pollard,
            root,
            self.clock.now(),
            terms,
        );
        self.proposals.insert(proposal_id, proposal);
        self.next_id += 1;
        self.journal.push(DisputeEvent::ProposalCreated {
            proposal: proposal_id,
            proposer,
            snapshot_block,
            max_depth,
            root_sum: root.sum,
        });
        Ok(proposal_id)
    }

    /// Opens a challenge at `gindex` and locks the challenge bond.
    pub fn create_challenge(&mut self, id: u64, gindex: Gindex, challenger: Address) -> Result<()> {
        let now = self.clock.now();
        let proposal = self.proposal(id)?;
        proposal.check_new_challenge(gindex, now)?;
        let bond = proposal.terms.challenge_bond;
        self.ledger.lock(&challenger, bond)?;
        self.proposal_mut(id)?.open_challenge(gindex, challenger, now);
        self.journal.push(DisputeEvent::ChallengeCreated {
            proposal: id,
            index: gindex,
            challenger,
        });
        Ok(())
    }

    /// Answers the challenge at `gindex`.
    pub fn submit_root(
        &mut self,
        id: u64,
        gindex: Gindex,
        caller: Address,
        witness: &[SumNode],
        pollard: &[SumNode],
    ) -> Result<()> {
        let now = self.clock.now();
        let node = self
            .proposal(id)?
            .verify_response(&caller, gindex, witness, pollard, &self.snapshots, now)?;
        self.proposal_mut(id)?.record_response(gindex, node);
        self.journal.push(DisputeEvent::RootSubmitted {
            proposal: id,
            index: gindex,
            sum: node.sum,
        });
        Ok(())
    }

    /// Defeats the proposal through the unanswered challenge at `gindex`.
    pub fn defeat_proposal(&mut self, id: u64, gindex: Gindex) -> Result<()> {
        let now = self.clock.now();
        self.proposal(id)?.check_defeat(gindex, now)?;
        let first = self.proposal_mut(id)?.record_defeat(gindex);
        self.journal.push(DisputeEvent::ProposalDefeated {
            proposal: id,
            index: gindex,
            first,
        });
        Ok(())
    }

    /// Proposer collects the proposal bond (index 1) and bonds of answered challenges.
    pub fn claim_proposer_bond(&mut self, id: u64, caller: Address, gindices: &[Gindex]) -> Result<ClaimReceipt> {
        let now = self.clock.now();
        let plan = plan_proposer_claim(self.proposal(id)?, &caller, gindices, now)?;
        self.execute_claim(id, caller, plan)
    }

    /// Challenger recovers bonds and any share of a defeated proposal's bond.
    pub fn claim_challenger_bond(&mut self, id: u64, caller: Address, gindices: &[Gindex]) -> Result<ClaimReceipt> {
        let now = self.clock.now();
        let plan = plan_challenger_claim(self.proposal(id)?, &caller, gindices, now)?;
        self.execute_claim(id, caller, plan)
    }

    fn execute_claim(&mut self, id: u64, claimant: Address, plan: ClaimPlan) -> Result<ClaimReceipt> {
        self.ledger.apply(&plan.ops)?;
        self.proposal_mut(id)?.settle(&plan);
        self.journal.push(DisputeEvent::BondClaimed {
            proposal: id,
            claimant,
            indices: plan.receipt.indices.clone(),
            unlocked: plan.receipt.unlocked,
            rewarded: plan.receipt.rewarded,
        });
        Ok(plan.receipt)
    }

    /// Withdraws a pending proposal that has no open challenge.
    pub fn cancel_proposal(&mut self, id: u64, caller: Address) -> Result<()> {
        let now = self.clock.now();
        self.proposal_mut(id)?.cancel(&caller, now)?;
        self.journal.push(DisputeEvent::ProposalCancelled { proposal: id });
        Ok(())
    }

    /// Records the external tally after the voting window closed.
    pub fn finalize_vote(&mut self, id: u64, passed: bool) -> Result<()> {
        let now = self.clock.now();
        self.proposal_mut(id)?.finalize_vote(passed, now)?;
        self.journal.push(DisputeEvent::VoteFinalized {
            proposal: id,
            passed,
        });
        Ok(())
    }
}
