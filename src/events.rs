//! Structured journal of dispute state transitions.
//!
//! Each event renders as one `QSYS|mod=DISPUTE|evt=...|k=v` line so the CLI
//! output can be grepped the same way as the rest of the runtime logs.

use serde::Serialize;
use std::fmt;

use crate::gindex::Gindex;
use crate::party::Address;

/// Successful state transition recorded by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DisputeEvent {
    /// A proposal was opened and its bond locked.
    ProposalCreated {
        /// Proposal identifier.
        proposal: u64,
        /// Proposer address.
        proposer: Address,
        /// Snapshot the tree describes.
        snapshot_block: u64,
        /// Declared phase-1 depth.
        max_depth: u32,
        /// Total claimed voting power.
        root_sum: u128,
    },
    /// A challenge was opened.
    ChallengeCreated {
        /// Proposal identifier.
        proposal: u64,
        /// Challenged index.
        index: Gindex,
        /// Challenger address.
        challenger: Address,
    },
    /// The proposer answered a challenge.
    RootSubmitted {
        /// Proposal identifier.
        proposal: u64,
        /// Answered index.
        index: Gindex,
        /// Sum now committed at the index.
        sum: u128,
    },
    /// An unanswered challenge defeated the proposal.
    ProposalDefeated {
        /// Proposal identifier.
        proposal: u64,
        /// Index whose challenge timed out.
        index: Gindex,
        /// True for the defeat that flipped the proposal state.
        first: bool,
    },
    /// The proposer withdrew the proposal.
    ProposalCancelled {
        /// Proposal identifier.
        proposal: u64,
    },
    /// The external tally was recorded.
    VoteFinalized {
        /// Proposal identifier.
        proposal: u64,
        /// Whether the vote passed.
        passed: bool,
    },
    /// Bonds were paid out.
    BondClaimed {
        /// Proposal identifier.
        proposal: u64,
        /// Claimant.
        claimant: Address,
        /// Indices settled by the claim.
        indices: Vec<Gindex>,
        /// Locked stake returned to the claimant.
        unlocked: u128,
        /// Stake moved to the claimant from other parties.
        rewarded: u128,
    },
}

impl DisputeEvent {
    /// Event tag used in the `evt=` field.
    pub fn name(&self) -> &'static str {
        match self {
            DisputeEvent::ProposalCreated { .. } => "PROPOSAL_CREATED",
            DisputeEvent::ChallengeCreated { .. } => "CHALLENGE",
            DisputeEvent::RootSubmitted { .. } => "ROOT_SUBMITTED",
            DisputeEvent::ProposalDefeated { .. } => "DEFEATED",
            DisputeEvent::ProposalCancelled { .. } => "CANCELLED",
            DisputeEvent::VoteFinalized { .. } => "VOTE_FINALIZED",
            DisputeEvent::BondClaimed { .. } => "BOND_CLAIMED",
        }
    }
}

impl fmt::Display for DisputeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QSYS|mod=DISPUTE|evt={}", self.name())?;
        match self {
            DisputeEvent::ProposalCreated {
                proposal,
                proposer,
                snapshot_block,
                max_depth,
                root_sum,
            } => write!(
                f,
                "|proposal={proposal}|proposer={proposer}|block={snapshot_block}|depth={max_depth}|sum={root_sum}"
            ),
            DisputeEvent::ChallengeCreated {
                proposal,
                index,
                challenger,
            } => write!(f, "|proposal={proposal}|index={index}|challenger={challenger}"),
            DisputeEvent::RootSubmitted {
                proposal,
                index,
                sum,
            } => write!(f, "|proposal={proposal}|index={index}|sum={sum}"),
            DisputeEvent::ProposalDefeated {
                proposal,
                index,
                first,
            } => write!(f, "|proposal={proposal}|index={index}|first={first}"),
            DisputeEvent::ProposalCancelled { proposal } => write!(f, "|proposal={proposal}"),
            DisputeEvent::VoteFinalized { proposal, passed } => {
                write!(f, "|proposal={proposal}|passed={passed}")
            }
            DisputeEvent::BondClaimed {
                proposal,
                claimant,
                indices,
                unlocked,
                rewarded,
            } => {
                let joined = indices
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(
                    f,
                    "|proposal={proposal}|claimant={claimant}|indices={joined}|unlocked={unlocked}|rewarded={rewarded}"
                )
            }
        }
    }
}
