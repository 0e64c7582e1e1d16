#![deny(missing_docs)]

//! # power_dispute
//!
//! **power_dispute** verifies a proposer's voting-power snapshot optimistically.
//! The proposer commits to a Merkle-sum tree over every party's voting power
//! and locks a bond.  Anyone who disagrees locks a smaller bond and walks the
//! tree down round by round, each round forcing the proposer to open a few more
//! levels.  A proposer who cannot answer in time is defeated and loses the bond
//! to the challengers on the losing path; challengers who dispute honest data
//! lose theirs to the proposer.
//!
//! The tree has two phases.  Phase-1 leaves are per-party aggregates; each
//! aggregate is itself the root of a phase-2 tree of the records it is made
//! of, so an inflated aggregate can be opened with the same moves.
//!
//! ## Modules
//!
//! * [`sumtree`]: Merkle-sum nodes, pollards, witnesses.
//! * [`gindex`]: heap-index arithmetic and round checkpoints.
//! * [`game`]: challenge/response/defeat rules.
//! * [`expander`]: phase-2 trees, leaf verification and the proposer-side tree.
//! * [`settlement`]: bond payouts.
//! * [`verifier`]: the [`ProtocolVerifier`] facade.
//!
//! ## Usage
//!
//! ```rust
//! use power_dispute::{
//!     Address, ManualClock, ProposerTree, ProtocolSettings, ProtocolVerifier, SnapshotData,
//!     StakeRegistry, StaticSnapshot,
//! };
//!
//! let parties: Vec<Address> = ["a", "b", "c"].iter().map(|l| Address::from_label(l)).collect();
//! let mut snapshot = StaticSnapshot::new();
//! snapshot.insert(1, SnapshotData::self_delegated(parties, &[5, 6, 7]));
//!
//! let proposer = Address::from_label("proposer");
//! let settings = ProtocolSettings::default();
//! let mut ledger = StakeRegistry::default();
//! ledger.deposit(&proposer, settings.proposal_bond).unwrap();
//!
//! let tree = ProposerTree::from_snapshot(&snapshot, 1, settings.depth_per_round).unwrap();
//! let mut verifier = ProtocolVerifier::new(settings, ledger, snapshot, ManualClock::new(0)).unwrap();
//! let id = verifier
//!     .create_proposal(proposer, 1, tree.shape().phase1_depth, tree.root_pollard())
//!     .unwrap();
//! assert_eq!(verifier.proposal(id).unwrap().root().sum, 18);
//! ```

pub mod clock;
pub mod error;
pub mod events;
pub mod expander;
pub mod game;
pub mod gindex;
pub mod ledger;
pub mod party;
pub mod proposal;
pub mod settings;
pub mod settlement;
pub mod snapshot;
pub mod sumtree;
pub mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DisputeError, Result};
pub use events::DisputeEvent;
pub use expander::{phase2_root, ProposerTree, Response};
pub use game::{Challenge, ChallengeState};
pub use gindex::{Gindex, Phase, TreeShape, ROOT};
pub use ledger::{BondLedger, LedgerOp, StakeAccount, StakeRegistry};
pub use party::Address;
pub use proposal::{Proposal, ProposalState};
pub use settings::{ProtocolSettings, TOKEN};
pub use settlement::{reward_share, winning_chain, ClaimReceipt};
pub use snapshot::{PowerRecord, SnapshotData, SnapshotFile, SnapshotSource, StaticSnapshot};
pub use sumtree::{build_pollard, SumNode, SumTree, VotingPowerLeaf};
pub use verifier::ProtocolVerifier;
