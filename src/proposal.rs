//! Proposal records and their lifecycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{DisputeError, Result};
use crate::game::{Challenge, ChallengeState};
use crate::gindex::{Gindex, TreeShape, ROOT};
use crate::party::Address;
use crate::settings::ProtocolSettings;
use crate::sumtree::{Pollard, SumNode};

/// Lifecycle state of a proposal at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    /// Created, voting not yet started.
    Pending,
    /// Voting window open.
    Active,
    /// A challenge went unanswered.
    Defeated,
    /// Voting closed and the tally passed.
    Succeeded,
    /// Voting closed without a passing tally.
    Expired,
    /// Withdrawn by the proposer.
    Cancelled,
}

impl ProposalState {
    /// True until the voting window closes.
    pub fn accepts_disputes(self) -> bool {
        matches!(self, ProposalState::Pending | ProposalState::Active)
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProposalState::Pending => "pending",
            ProposalState::Active => "active",
            ProposalState::Defeated => "defeated",
            ProposalState::Succeeded => "succeeded",
            ProposalState::Expired => "expired",
            ProposalState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A committed voting-power tree and the dispute around it.
///
/// The lifecycle state is not stored: it is derived from the timestamps,
/// the defeat marker, the cancel flag and the recorded tally via
/// [`Proposal::state_at`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposal identifier.
    pub id: u64,
    /// Proposer address.
    pub proposer: Address,
    /// Snapshot the tree describes.
    pub snapshot_block: u64,
    /// Phase-1 depth declared by the proposer.
    pub max_depth: u32,
    /// Nodes committed at the first checkpoint.
    pub root_pollard: Pollard,
    /// Stake locked by the proposer.
    pub bond_locked: u128,
    /// Creation time in seconds.
    pub created_at: u64,
    /// Settings in force when the proposal was created.
    pub terms: ProtocolSettings,
    pub(crate) challenges: BTreeMap<Gindex, Challenge>,
    pub(crate) commitments: BTreeMap<Gindex, SumNode>,
    pub(crate) defeat_index: Option<Gindex>,
    pub(crate) winning_chain: Vec<Gindex>,
    pub(crate) bond_claimed: bool,
    pub(crate) vote_passed: Option<bool>,
    pub(crate) cancelled: bool,
}

impl Proposal {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        proposer: Address,
        snapshot_block: u64,
        max_depth: u32,
        root_pollard: Pollard,
        root: SumNode,
        created_at: u64,
        terms: ProtocolSettings,
    ) -> Self {
        let mut commitments = BTreeMap::new();
        commitments.insert(ROOT, root);
        Self {
            id,
            proposer,
            snapshot_block,
            max_depth,
            root_pollard,
            bond_locked: terms.proposal_bond,
            created_at,
            terms,
            challenges: BTreeMap::new(),
            commitments,
            defeat_index: None,
            winning_chain: Vec::new(),
            bond_claimed: false,
            vote_passed: None,
            cancelled: false,
        }
    }

    /// Game geometry for this proposal.
    pub fn shape(&self) -> TreeShape {
        TreeShape::new(self.max_depth, self.terms.depth_per_round)
    }

    /// Root commitment folded from the root pollard.
    pub fn root(&self) -> SumNode {
        self.commitments.get(&ROOT).copied().unwrap_or(SumNode::EMPTY)
    }

    /// Start of the voting window.
    pub fn vote_start(&self) -> u64 {
        self.created_at.saturating_add(self.terms.vote_delay_time)
    }

    /// End of the voting window.
    pub fn vote_end(&self) -> u64 {
        self.vote_start().saturating_add(self.terms.vote_time)
    }

    /// Lifecycle state at `now`.
    pub fn state_at(&self, now: u64) -> ProposalState {
        if self.cancelled {
            ProposalState::Cancelled
        } else if self.defeat_index.is_some() {
            ProposalState::Defeated
        } else if now < self.vote_start() {
            ProposalState::Pending
        } else if now < self.vote_end() {
            ProposalState::Active
        } else if self.vote_passed == Some(true) {
            ProposalState::Succeeded
        } else {
            ProposalState::Expired
        }
    }

    /// Challenge at `gindex`, if one was opened.
    pub fn challenge(&self, gindex: Gindex) -> Option<&Challenge> {
        self.challenges.get(&gindex)
    }

    /// All challenges, ordered by index.
    pub fn challenges(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.values()
    }

    /// Node committed at `gindex` (the root, or a responded index).
    pub fn committed(&self, gindex: Gindex) -> Option<SumNode> {
        self.commitments.get(&gindex).copied()
    }

    /// Index whose timeout first defeated the proposal.
    pub fn defeat_index(&self) -> Option<Gindex> {
        self.defeat_index
    }

    /// Challenges sharing the proposal bond, fixed by the first defeat.
    pub fn winning_chain(&self) -> &[Gindex] {
        &self.winning_chain
    }

    /// Whether the proposal bond has been paid out.
    pub fn bond_claimed(&self) -> bool {
        self.bond_claimed
    }

    /// Tally reported by the external vote, if any.
    pub fn vote_passed(&self) -> Option<bool> {
        self.vote_passed
    }

    pub(crate) fn cancel(&mut self, caller: &Address, now: u64) -> Result<()> {
        if *caller != self.proposer {
            return Err(DisputeError::NotProposer);
        }
        let state = self.state_at(now);
        if state != ProposalState::Pending {
            return Err(DisputeError::InvalidProposalState(state));
        }
        if let Some(open) = self
            .challenges
            .values()
            .find(|c| c.state == ChallengeState::Open)
        {
            return Err(DisputeError::InvalidChallengeState(open.gindex));
        }
        self.cancelled = true;
        Ok(())
    }

    pub(crate) fn finalize_vote(&mut self, passed: bool, now: u64) -> Result<()> {
        let state = self.state_at(now);
        if state != ProposalState::Expired || self.vote_passed.is_some() {
            return Err(DisputeError::InvalidProposalState(state));
        }
        self.vote_passed = Some(passed);
        Ok(())
    }
}
