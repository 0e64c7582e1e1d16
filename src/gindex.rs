//! Generalized-index arithmetic for the bisection game.
//!
//! Nodes are addressed heap style: the root is `1` and the children of `i` are
//! `2i` and `2i + 1`.  A phase-1 tree of depth `D` is extended below its leaves
//! by one phase-2 tree per party, so the full game tree has depth `2D` and
//! phase-2 positions are ordinary indices of that doubled tree.
//!
//! A round resolves up to `depth_per_round` levels.  The depths at which a
//! round ends are called checkpoints: every multiple of the round size inside a
//! phase, plus the leaf depth of each phase.  Any index of the doubled tree
//! may be challenged once the checkpoint above it is committed; the answer
//! always opens down to the next checkpoint.

use serde::{Deserialize, Serialize};

/// Heap-style tree address.
pub type Gindex = u64;

/// Index of the root commitment; doubles as the proposal-bond sentinel.
pub const ROOT: Gindex = 1;

/// Deepest supported phase-1 tree (keeps the doubled tree inside `u64`).
pub const MAX_PHASE1_DEPTH: u32 = 31;

/// Depth of `gindex` below the root (`floor(log2(gindex))`).
pub fn depth(gindex: Gindex) -> u32 {
    if gindex == 0 {
        return 0;
    }
    63 - gindex.leading_zeros()
}

/// Ancestor of `gindex` sitting at `at_depth` (which must not exceed its depth).
pub fn ancestor_at(gindex: Gindex, at_depth: u32) -> Gindex {
    gindex >> (depth(gindex) - at_depth)
}

/// Returns true if `anchor` is `gindex` or one of its ancestors.
pub fn is_ancestor_or_self(anchor: Gindex, gindex: Gindex) -> bool {
    anchor != 0 && gindex != 0 && depth(anchor) <= depth(gindex) && ancestor_at(gindex, depth(anchor)) == anchor
}

/// Smallest phase-1 depth whose `2^depth` leaves cover `party_count` parties.
pub fn depth_for_count(party_count: u64) -> u32 {
    if party_count <= 2 {
        return 1;
    }
    64 - (party_count - 1).leading_zeros()
}

/// Which of the two nested trees a position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Aggregate-per-party tree (depth `1..=D`).
    One,
    /// Per-record tree of a single party (depth `D+1..=2D`).
    Two,
}

/// Geometry of one proposal's game tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeShape {
    /// Depth of the phase-1 tree (leaves are party aggregates).
    pub phase1_depth: u32,
    /// Number of levels resolved per round.
    pub depth_per_round: u32,
}

impl TreeShape {
    /// Describes a game over a phase-1 tree of `phase1_depth` levels.
    pub fn new(phase1_depth: u32, depth_per_round: u32) -> Self {
        Self {
            phase1_depth,
            depth_per_round: depth_per_round.max(1),
        }
    }

    /// Deepest challengeable level (the phase-2 leaves).
    pub fn max_depth(&self) -> u32 {
        self.phase1_depth * 2
    }

    /// True when a round ends at `at_depth`.
    pub fn is_checkpoint_depth(&self, at_depth: u32) -> bool {
        let d1 = self.phase1_depth;
        let step = self.depth_per_round;
        if at_depth == 0 {
            false
        } else if at_depth <= d1 {
            at_depth % step == 0 || at_depth == d1
        } else if at_depth <= 2 * d1 {
            (at_depth - d1) % step == 0 || at_depth == 2 * d1
        } else {
            false
        }
    }

    /// First checkpoint below the root; the root pollard lives here.
    pub fn first_checkpoint(&self) -> u32 {
        self.depth_per_round.min(self.phase1_depth)
    }

    /// Number of nodes a proposer commits with the proposal.
    pub fn root_pollard_len(&self) -> usize {
        1usize << self.first_checkpoint()
    }

    /// Checkpoint following `at_depth`, if any.
    pub fn next_checkpoint(&self, at_depth: u32) -> Option<u32> {
        (at_depth + 1..=self.max_depth()).find(|d| self.is_checkpoint_depth(*d))
    }

    /// True for indices at either phase's leaf level.
    pub fn is_leaf_level(&self, gindex: Gindex) -> bool {
        let d = depth(gindex);
        d == self.phase1_depth || d == self.max_depth()
    }

    /// True for a challengeable position: below the root and within the doubled tree.
    pub fn is_challengeable(&self, gindex: Gindex) -> bool {
        gindex > ROOT && depth(gindex) <= self.max_depth()
    }

    /// Phase an index belongs to.
    pub fn phase(&self, gindex: Gindex) -> Phase {
        if depth(gindex) <= self.phase1_depth {
            Phase::One
        } else {
            Phase::Two
        }
    }

    /// Checkpoints strictly between the root and `target`, followed by `target`.
    ///
    /// This is the walk a challenger must complete, round by round, to force
    /// disclosure down to `target`.  The target is always the last entry;
    /// checkpoints are only collected strictly above it, so a target sitting on
    /// a checkpoint is not listed twice.
    pub fn ancestor_chain(&self, target: Gindex) -> Vec<Gindex> {
        let target_depth = depth(target);
        (1..target_depth)
            .filter(|d| self.is_checkpoint_depth(*d))
            .map(|d| ancestor_at(target, d))
            .chain(std::iter::once(target))
            .collect()
    }

    /// Nearest shallower checkpoint ancestor, or [`ROOT`] when none exists.
    pub fn parent_round(&self, gindex: Gindex) -> Gindex {
        (1..depth(gindex))
            .rev()
            .find(|d| self.is_checkpoint_depth(*d))
            .map(|d| ancestor_at(gindex, d))
            .unwrap_or(ROOT)
    }

    /// Subtree root whose nodes a response to `gindex` discloses.
    ///
    /// Interior checkpoints open their own subtree; leaf-level challenges are
    /// answered with every leaf of the enclosing round.
    pub fn response_anchor(&self, gindex: Gindex) -> Gindex {
        if self.is_leaf_level(gindex) {
            self.parent_round(gindex)
        } else {
            gindex
        }
    }

    /// Depth of the nodes a response to `gindex` discloses.
    pub fn reveal_depth(&self, gindex: Gindex) -> u32 {
        let d = depth(gindex);
        if self.is_leaf_level(gindex) {
            d
        } else {
            self.next_checkpoint(d).unwrap_or(d)
        }
    }

    /// Node count of a valid response to `gindex`.
    pub fn expected_nodes(&self, gindex: Gindex) -> usize {
        let anchor = self.response_anchor(gindex);
        1usize << (self.reveal_depth(gindex) - depth(anchor))
    }

    /// Sibling-path length of a valid response to `gindex`.
    pub fn witness_len(&self, gindex: Gindex) -> usize {
        if self.is_leaf_level(gindex) {
            0
        } else {
            (depth(gindex) - depth(self.parent_round(gindex))) as usize
        }
    }

    /// Phase-1 leaf above (or at) a phase-1-leaf-or-deeper index.
    pub fn phase1_leaf_of(&self, gindex: Gindex) -> Option<Gindex> {
        if depth(gindex) < self.phase1_depth {
            return None;
        }
        Some(ancestor_at(gindex, self.phase1_depth))
    }

    /// Party position (phase-1 leaf offset) owning a phase-1-leaf-or-deeper index.
    pub fn party_of(&self, gindex: Gindex) -> Option<u64> {
        self.phase1_leaf_of(gindex)
            .map(|leaf| leaf - (1u64 << self.phase1_depth))
    }

    /// Offset of a node inside its own level of its own phase tree.
    ///
    /// For phase-1 nodes this is the offset in the level; for phase-2 nodes it
    /// is the offset within the owning party's record tree.
    pub fn position_in_phase(&self, gindex: Gindex) -> u64 {
        let d = depth(gindex);
        if d <= self.phase1_depth {
            gindex - (1u64 << d)
        } else {
            let local_depth = d - self.phase1_depth;
            gindex - (ancestor_at(gindex, self.phase1_depth) << local_depth)
        }
    }

    /// Record position of a phase-2 leaf inside its party's record list.
    pub fn record_of(&self, gindex: Gindex) -> Option<u64> {
        if depth(gindex) != self.max_depth() {
            return None;
        }
        Some(self.position_in_phase(gindex))
    }

    /// Re-roots a phase-2 index into its party's record tree (`1` = the phase-1 leaf).
    pub fn local_index(&self, gindex: Gindex) -> Gindex {
        let d = depth(gindex);
        if d <= self.phase1_depth {
            return gindex;
        }
        let local_depth = d - self.phase1_depth;
        (1u64 << local_depth) | self.position_in_phase(gindex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_follows_heap_layout() {
        assert_eq!(depth(1), 0);
        assert_eq!(depth(2), 1);
        assert_eq!(depth(3), 1);
        assert_eq!(depth(4), 2);
        assert_eq!(depth(255), 7);
        assert_eq!(depth(256), 8);
    }

    #[test]
    fn depth_for_count_is_minimal() {
        assert_eq!(depth_for_count(1), 1);
        assert_eq!(depth_for_count(2), 1);
        assert_eq!(depth_for_count(3), 2);
        assert_eq!(depth_for_count(4), 2);
        assert_eq!(depth_for_count(5), 3);
        assert_eq!(depth_for_count(12), 4);
        assert_eq!(depth_for_count(16), 4);
        assert_eq!(depth_for_count(17), 5);
    }

    #[test]
    fn single_phase_chain_matches_round_walk() {
        // Five levels, two per round: rounds end at depths 2, 4 and the leaf level 5.
        let shape = TreeShape::new(5, 2);
        assert_eq!(shape.ancestor_chain(32), vec![4, 16, 32]);
        assert_eq!(shape.ancestor_chain(63), vec![7, 31, 63]);
        assert_eq!(shape.parent_round(32), 16);
        assert_eq!(shape.parent_round(16), 4);
        assert_eq!(shape.parent_round(4), ROOT);
    }

    #[test]
    fn chain_continues_into_phase_two() {
        let shape = TreeShape::new(3, 2);
        // Checkpoints: 2, 3 (phase-1 leaves), 5, 6 (phase-2 leaves).
        assert_eq!(shape.ancestor_chain(64), vec![4, 8, 32, 64]);
        assert_eq!(shape.parent_round(32), 8);
        assert_eq!(shape.parent_round(64), 32);
        assert_eq!(shape.phase(8), Phase::One);
        assert_eq!(shape.phase(32), Phase::Two);
    }

    #[test]
    fn response_geometry() {
        let shape = TreeShape::new(3, 2);
        assert_eq!(shape.root_pollard_len(), 4);
        // Interior checkpoint: opens its own subtree down to the phase-1 leaves.
        assert_eq!(shape.response_anchor(4), 4);
        assert_eq!(shape.expected_nodes(4), 2);
        assert_eq!(shape.witness_len(4), 2);
        // Leaf level: the leaves of the enclosing round, no witness.
        assert_eq!(shape.response_anchor(8), 4);
        assert_eq!(shape.expected_nodes(8), 2);
        assert_eq!(shape.witness_len(8), 0);
        // Phase-2 interior checkpoint anchored at the phase-1 leaf.
        assert_eq!(shape.expected_nodes(32), 2);
        assert_eq!(shape.witness_len(32), 2);
    }

    #[test]
    fn root_pollard_shrinks_for_shallow_trees() {
        let shape = TreeShape::new(2, 5);
        assert_eq!(shape.first_checkpoint(), 2);
        assert_eq!(shape.root_pollard_len(), 4);
        assert_eq!(shape.ancestor_chain(16), vec![4, 16]);
    }

    #[test]
    fn any_level_of_the_doubled_tree_is_challengeable() {
        let shape = TreeShape::new(4, 2);
        assert!(shape.is_challengeable(2));
        assert!(shape.is_challengeable(4));
        assert!(shape.is_challengeable(8));
        assert!(shape.is_challengeable(16));
        assert!(shape.is_challengeable((1 << 9) - 1));
        assert!(!shape.is_challengeable(ROOT));
        assert!(!shape.is_challengeable(1 << 9));
    }

    #[test]
    fn interior_levels_open_to_the_next_checkpoint() {
        let shape = TreeShape::new(4, 2);
        // Depth 1 sits inside the first round.
        assert_eq!(shape.parent_round(2), ROOT);
        assert_eq!(shape.reveal_depth(2), 2);
        assert_eq!(shape.expected_nodes(2), 2);
        assert_eq!(shape.witness_len(2), 1);
        // Depth 3 answers with depth-4 leaves and climbs back to depth 2.
        assert_eq!(shape.parent_round(8), 4);
        assert_eq!(shape.expected_nodes(8), 2);
        assert_eq!(shape.witness_len(8), 1);
        // Off-checkpoint targets still close the chain.
        assert_eq!(shape.ancestor_chain(8), vec![4, 8]);
    }

    #[test]
    fn phase_two_positions() {
        let shape = TreeShape::new(2, 2);
        // Phase-1 leaf 6 is party 2; its records live at depth 4 under it.
        assert_eq!(shape.party_of(6), Some(2));
        assert_eq!(shape.party_of(25), Some(2));
        assert_eq!(shape.position_in_phase(25), 1);
        assert_eq!(shape.local_index(25), 5);
        assert_eq!(shape.local_index(6), 6);
        assert_eq!(shape.record_of(25), Some(1));
        assert_eq!(shape.record_of(6), None);
        assert!(is_ancestor_or_self(6, 25));
        assert!(!is_ancestor_or_self(7, 25));
    }
}
