//! Two-phase tree: party aggregates above, per-party records below.
//!
//! A phase-1 leaf is the root of its party's phase-2 tree of `2^D` record
//! leaves.  Heap addressing simply continues below depth `D`, so a disputed
//! aggregate is opened with the same challenge/response moves as the phase-1
//! tree.  [`ProposerTree`] is the proposer-side view that answers any
//! challenge; [`verify_phase2_leaves`] checks revealed records against the
//! canonical [`SnapshotSource`].  Phase-1 leaves are never compared directly:
//! an aggregate is only as good as the records beneath it.

use serde::Serialize;

use crate::error::{DisputeError, Result};
use crate::gindex::{depth, depth_for_count, Gindex, Phase, TreeShape, ROOT};
use crate::snapshot::{PowerRecord, SnapshotSource};
use crate::sumtree::{Pollard, SumNode, SumTree};

/// Padded phase-2 leaf level of a party.
pub fn phase2_leaves(records: &[PowerRecord], phase1_depth: u32) -> Result<Vec<SumNode>> {
    let width = 1usize << phase1_depth;
    if records.len() > width {
        return Err(DisputeError::InvalidLeaves);
    }
    let mut leaves: Vec<SumNode> = records.iter().map(PowerRecord::node).collect();
    leaves.resize(width, SumNode::EMPTY);
    Ok(leaves)
}

/// Root of a party's phase-2 tree, i.e. its phase-1 leaf.
pub fn phase2_root(records: &[PowerRecord], phase1_depth: u32) -> Result<SumNode> {
    let leaves = phase2_leaves(records, phase1_depth)?;
    Ok(SumTree::from_leaves(&leaves)?.root())
}

/// Canonical phase-1 leaf level for `snapshot_block`.
pub fn phase1_leaves<S: SnapshotSource + ?Sized>(source: &S, snapshot_block: u64) -> Result<Vec<SumNode>> {
    let count = source
        .party_count(snapshot_block)
        .ok_or(DisputeError::UnknownSnapshot(snapshot_block))?;
    let width = 1u64 << depth_for_count(count);
    (0..width)
        .map(|position| source.real_leaf_value(snapshot_block, position))
        .collect()
}

// First index at `at_depth` inside the subtree of `anchor`.
fn first_below(anchor: Gindex, at_depth: u32) -> Gindex {
    anchor << (at_depth - depth(anchor))
}

/// Checks revealed phase-2 leaves under `anchor` against the party's records.
///
/// The canonical records must also total the sum committed for the party's
/// phase-1 leaf.
pub fn verify_phase2_leaves<S: SnapshotSource + ?Sized>(
    source: &S,
    snapshot_block: u64,
    shape: &TreeShape,
    anchor: Gindex,
    leaves: &[SumNode],
    committed_aggregate: &SumNode,
) -> Result<()> {
    let party = shape.party_of(anchor).ok_or(DisputeError::InvalidLeaves)?;
    let records = source.real_party_records(snapshot_block, party);
    let expected = phase2_leaves(&records, shape.phase1_depth)?;
    let total = records
        .iter()
        .try_fold(0u128, |acc, r| acc.checked_add(r.power))
        .ok_or(DisputeError::InvalidLeaves)?;
    if total != committed_aggregate.sum {
        return Err(DisputeError::InvalidLeaves);
    }
    let first = first_below(anchor, shape.max_depth());
    let offset = shape.position_in_phase(first) as usize;
    let canonical = expected
        .get(offset..offset + leaves.len())
        .ok_or(DisputeError::InvalidLeaves)?;
    if canonical != leaves {
        return Err(DisputeError::InvalidLeaves);
    }
    Ok(())
}

/// Proposer's answer to a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// Siblings from the challenged index up to its parent round, bottom first.
    pub witness: Vec<SumNode>,
    /// Disclosed nodes.
    pub nodes: Pollard,
}

/// Full two-phase tree held by a proposer.
#[derive(Debug, Clone)]
pub struct ProposerTree {
    shape: TreeShape,
    phase1: SumTree,
    parties: Vec<SumTree>,
}

impl ProposerTree {
    /// Builds the tree from a phase-1 leaf row and each party's records.
    ///
    /// The phase-1 leaves are taken as given, so a proposer may commit to
    /// aggregates its records do not support; such a tree fails once a
    /// challenge reaches phase 2.
    pub fn new(shape: TreeShape, phase1_leaves: &[SumNode], records: &[Vec<PowerRecord>]) -> Result<Self> {
        let width = 1usize << shape.phase1_depth;
        if phase1_leaves.len() != width {
            return Err(DisputeError::InvalidLeafCount(phase1_leaves.len()));
        }
        let phase1 = SumTree::from_leaves(phase1_leaves)?;
        let parties = (0..width)
            .map(|p| {
                let party_records = records.get(p).map(Vec::as_slice).unwrap_or(&[]);
                SumTree::from_leaves(&phase2_leaves(party_records, shape.phase1_depth)?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            shape,
            phase1,
            parties,
        })
    }

    /// Honest tree for `snapshot_block`.
    pub fn from_snapshot<S: SnapshotSource + ?Sized>(
        source: &S,
        snapshot_block: u64,
        depth_per_round: u32,
    ) -> Result<Self> {
        let leaves = phase1_leaves(source, snapshot_block)?;
        let shape = TreeShape::new(leaves.len().trailing_zeros(), depth_per_round);
        let records = (0..leaves.len() as u64)
            .map(|p| source.real_party_records(snapshot_block, p))
            .collect::<Vec<_>>();
        Self::new(shape, &leaves, &records)
    }

    /// Tree geometry.
    pub fn shape(&self) -> TreeShape {
        self.shape
    }

    /// Root commitment.
    pub fn root(&self) -> SumNode {
        self.phase1.root()
    }

    /// Phase-1 leaf row.
    pub fn phase1_leaves(&self) -> &[SumNode] {
        self.phase1.leaves()
    }

    /// Pollard submitted with the proposal.
    pub fn root_pollard(&self) -> Pollard {
        self.phase1
            .nodes_under(ROOT, self.shape.first_checkpoint())
            .unwrap_or_default()
    }

    fn party_tree(&self, gindex: Gindex) -> Option<&SumTree> {
        let party = self.shape.party_of(gindex)?;
        self.parties.get(party as usize)
    }

    // Index inside the party tree; the phase-1 leaf itself maps to the party root.
    fn local(&self, gindex: Gindex) -> Gindex {
        if depth(gindex) == self.shape.phase1_depth {
            ROOT
        } else {
            self.shape.local_index(gindex)
        }
    }

    /// Node the proposer holds at `gindex`.
    ///
    /// Phase-2 nodes come from the party's record tree, whose root may differ
    /// from the committed phase-1 leaf when the proposer lied about it.
    pub fn node(&self, gindex: Gindex) -> Option<SumNode> {
        if depth(gindex) <= self.shape.phase1_depth {
            self.phase1.node(gindex)
        } else if depth(gindex) <= self.shape.max_depth() {
            self.party_tree(gindex)?.node(self.local(gindex))
        } else {
            None
        }
    }

    /// Witness and nodes answering a challenge at `gindex`.
    pub fn response(&self, gindex: Gindex) -> Result<Response> {
        if !self.shape.is_challengeable(gindex) {
            return Err(DisputeError::InvalidChallengeDepth(gindex));
        }
        let anchor = self.shape.response_anchor(gindex);
        let reveal = self.shape.reveal_depth(gindex);
        let nodes = if reveal <= self.shape.phase1_depth {
            self.phase1.nodes_under(anchor, reveal)
        } else {
            self.party_tree(anchor)
                .and_then(|tree| tree.nodes_under(self.local(anchor), reveal - self.shape.phase1_depth))
        };

        let witness = if self.shape.is_leaf_level(gindex) {
            Some(Vec::new())
        } else {
            let parent = self.shape.parent_round(gindex);
            match self.shape.phase(gindex) {
                Phase::One => self.phase1.witness(gindex, parent),
                Phase::Two => self
                    .party_tree(gindex)
                    .and_then(|tree| tree.witness(self.local(gindex), self.local(parent))),
            }
        };
        match (witness, nodes) {
            (Some(witness), Some(nodes)) => Ok(Response { witness, nodes }),
            _ => Err(DisputeError::InvalidChallengeDepth(gindex)),
        }
    }
}
