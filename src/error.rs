//! Error conditions surfaced by the dispute protocol.
//!
//! Every rejected call aborts with exactly one of these variants and leaves the
//! verifier, its proposals and the ledger untouched.

use thiserror::Error;

use crate::proposal::ProposalState;

/// Errors raised by tree construction, the bisection game and bond settlement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisputeError {
    #[error("invalid leaf count {0}: expected a power of two of at least 2")]
    /// Leaf set handed to the tree builder is not a power of two `>= 2`.
    InvalidLeafCount(usize),
    #[error("invalid node count (expected {expected}, got {actual})")]
    /// A pollard carries the wrong number of nodes.
    InvalidNodeCount {
        /// Node count required at this index.
        expected: usize,
        /// Node count supplied by the caller.
        actual: usize,
    },
    #[error("invalid proof")]
    /// Witness length, derived sum or derived digest does not match the commitment.
    InvalidProof,
    #[error("invalid leaves")]
    /// Revealed leaves disagree with the canonical snapshot data.
    InvalidLeaves,
    #[error("invalid challenge depth for index {0}")]
    /// Index is outside the game tree or its parent round is unresolved.
    InvalidChallengeDepth(u64),
    #[error("invalid challenge state for index {0}")]
    /// Index is unchallenged, already challenged, or in the wrong state for this call.
    InvalidChallengeState(u64),
    #[error("invalid challenger for index {0}")]
    /// Caller does not own the challenge (or named the proposal-bond sentinel).
    InvalidChallenger(u64),
    #[error("insufficient stake (required {required}, free {available})")]
    /// Party lacks the free stake needed for the lock or transfer.
    InsufficientStake {
        /// Amount the operation needed.
        required: u128,
        /// Amount that was available.
        available: u128,
    },
    #[error("challenge period has not elapsed for index {0}")]
    /// Defeat was attempted before the proposer's response window closed.
    ChallengePeriodNotElapsed(u64),
    #[error("challenge period has elapsed for index {0}")]
    /// Response arrived after the window closed.
    ChallengePeriodElapsed(u64),
    #[error("proposal defeated")]
    /// Operation is forbidden on a defeated proposal.
    ProposalDefeated,
    #[error("index {0} already claimed")]
    /// Bond or reward behind this index was already paid out.
    AlreadyClaimed(u64),
    #[error("caller is not the proposer")]
    /// Operation is reserved for the proposer.
    NotProposer,
    #[error("proposal has not been resolved")]
    /// Claim attempted while the proposal is still pending or active.
    ProposalNotResolved,
    #[error("operation not permitted while proposal is {0}")]
    /// Lifecycle state forbids the operation.
    InvalidProposalState(ProposalState),
    #[error("invalid tree depth {declared} (snapshot requires {required})")]
    /// Declared phase-1 depth does not match the snapshot's party count.
    InvalidTreeDepth {
        /// Depth declared by the proposer.
        declared: u32,
        /// Minimal depth covering the snapshot.
        required: u32,
    },
    #[error("unknown proposal {0}")]
    /// No proposal exists with this identifier.
    UnknownProposal(u64),
    #[error("unknown snapshot block {0}")]
    /// The canonical data source has no snapshot at this block.
    UnknownSnapshot(u64),
    #[error("sum overflow")]
    /// Folding two nodes overflowed the sum domain.
    SumOverflow,
    #[error("invalid settings: {0}")]
    /// Configuration failed validation.
    InvalidSettings(String),
    #[error("io error: {0}")]
    /// Underlying filesystem failure.
    Io(String),
    #[error("decode error: {0}")]
    /// Input decoding/serialization failure.
    Decode(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DisputeError>;
