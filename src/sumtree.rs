//! Merkle-sum tree primitives.
//!
//! Every node carries a `sum` next to its digest.  An internal node commits to
//! both children and both child sums:
//!
//! ```text
//! digest = keccak256(left.digest || u256(left.sum) || right.digest || u256(right.sum))
//! sum    = left.sum + right.sum
//! ```
//!
//! so a forged sum anywhere is caught by recomputing one level.  The empty node
//! `(0, 0x00..00)` pads unused leaves and the parent of two empty nodes is again
//! empty; absent parties and absent records therefore fold to the empty node.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{DisputeError, Result};
use crate::gindex::{ancestor_at, depth, Gindex};

/// 32-byte node commitment.
pub type NodeDigest = [u8; 32];

/// Batch of sibling nodes disclosed in one round.
pub type Pollard = Vec<SumNode>;

pub(crate) fn keccak256(bytes: &[u8]) -> NodeDigest {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn u256_from_u128(value: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Node of a Merkle-sum tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SumNode {
    /// Voting power accumulated below this node.
    pub sum: u128,
    /// Commitment to the subtree.
    #[serde(with = "digest_hex")]
    pub digest: NodeDigest,
}

impl SumNode {
    /// Padding node used for unoccupied leaves and empty subtrees.
    pub const EMPTY: SumNode = SumNode {
        sum: 0,
        digest: [0u8; 32],
    };

    /// Wraps a sum and digest.
    pub fn new(sum: u128, digest: NodeDigest) -> Self {
        Self { sum, digest }
    }

    /// True for the padding node.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Folds two siblings into their parent.
    pub fn parent(left: &SumNode, right: &SumNode) -> Result<SumNode> {
        if left.is_empty() && right.is_empty() {
            return Ok(SumNode::EMPTY);
        }
        let sum = left
            .sum
            .checked_add(right.sum)
            .ok_or(DisputeError::SumOverflow)?;
        let mut data = Vec::with_capacity(128);
        data.extend_from_slice(&left.digest);
        data.extend_from_slice(&u256_from_u128(left.sum));
        data.extend_from_slice(&right.digest);
        data.extend_from_slice(&u256_from_u128(right.sum));
        Ok(SumNode {
            sum,
            digest: keccak256(&data),
        })
    }
}

/// One unit of claimed voting power at a known leaf position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingPowerLeaf {
    /// Offset of the leaf within its level.
    pub position: u64,
    /// Claimed power.
    pub sum: u128,
    /// Commitment to the leaf's content.
    #[serde(with = "digest_hex")]
    pub digest: NodeDigest,
}

impl VotingPowerLeaf {
    /// Places an existing node at `position`.
    pub fn from_node(position: u64, node: SumNode) -> Self {
        Self {
            position,
            sum: node.sum,
            digest: node.digest,
        }
    }

    /// The node this leaf contributes to the tree.
    pub fn node(&self) -> SumNode {
        SumNode::new(self.sum, self.digest)
    }
}

/// Fully materialised Merkle-sum tree, kept only on the proposer side.
#[derive(Debug, Clone)]
pub struct SumTree {
    // levels[d] holds the 2^d nodes at depth d.
    levels: Vec<Vec<SumNode>>,
}

impl SumTree {
    /// Builds the tree above `leaves`; the count must be a power of two `>= 2`.
    pub fn from_leaves(leaves: &[SumNode]) -> Result<Self> {
        if leaves.len() < 2 || !leaves.len().is_power_of_two() {
            return Err(DisputeError::InvalidLeafCount(leaves.len()));
        }
        let mut levels = vec![leaves.to_vec()];
        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let below = levels.last().cloned().unwrap_or_default();
            let next = below
                .chunks(2)
                .map(|pair| SumNode::parent(&pair[0], &pair[1]))
                .collect::<Result<Vec<_>>>()?;
            levels.push(next);
        }
        levels.reverse();
        Ok(Self { levels })
    }

    /// Number of levels below the root.
    pub fn depth(&self) -> u32 {
        (self.levels.len() - 1) as u32
    }

    /// Root node.
    pub fn root(&self) -> SumNode {
        self.levels[0][0]
    }

    /// Leaf level.
    pub fn leaves(&self) -> &[SumNode] {
        &self.levels[self.levels.len() - 1]
    }

    /// Node at `gindex`, if it lies inside the tree.
    pub fn node(&self, gindex: Gindex) -> Option<SumNode> {
        if gindex == 0 {
            return None;
        }
        let d = depth(gindex);
        let level = self.levels.get(d as usize)?;
        level.get((gindex - (1u64 << d)) as usize).copied()
    }

    /// Nodes at `at_depth` inside the subtree rooted at `anchor`, left to right.
    pub fn nodes_under(&self, anchor: Gindex, at_depth: u32) -> Option<Vec<SumNode>> {
        let anchor_depth = depth(anchor);
        if anchor == 0 || at_depth < anchor_depth || at_depth > self.depth() {
            return None;
        }
        let width = 1usize << (at_depth - anchor_depth);
        let start = (anchor - (1u64 << anchor_depth)) as usize * width;
        let level = &self.levels[at_depth as usize];
        level.get(start..start + width).map(|s| s.to_vec())
    }

    /// Pollard `depth_per_round` levels below `at` (clamped to the leaves).
    pub fn pollard(&self, at: Gindex, depth_per_round: u32) -> Option<Pollard> {
        let target = (depth(at) + depth_per_round).min(self.depth());
        self.nodes_under(at, target)
    }

    /// Sibling path from `from` up to (excluding) its ancestor `to`, bottom first.
    pub fn witness(&self, from: Gindex, to: Gindex) -> Option<Vec<SumNode>> {
        if from == 0 || to == 0 || depth(to) > depth(from) || ancestor_at(from, depth(to)) != to {
            return None;
        }
        let mut path = Vec::with_capacity((depth(from) - depth(to)) as usize);
        let mut cursor = from;
        while cursor != to {
            path.push(self.node(cursor ^ 1)?);
            cursor >>= 1;
        }
        Some(path)
    }
}

/// Builds `leaves` into a tree and returns the pollard `depth_per_round` levels below `at_gindex`.
pub fn build_pollard(leaves: &[SumNode], depth_per_round: u32, at_gindex: Gindex) -> Result<Pollard> {
    let tree = SumTree::from_leaves(leaves)?;
    tree.pollard(at_gindex, depth_per_round)
        .ok_or(DisputeError::InvalidChallengeDepth(at_gindex))
}

/// Folds a power-of-two batch of siblings into the root of their subtree.
pub fn fold_nodes(nodes: &[SumNode]) -> Result<SumNode> {
    if nodes.is_empty() || !nodes.len().is_power_of_two() {
        return Err(DisputeError::InvalidNodeCount {
            expected: nodes.len().next_power_of_two().max(1),
            actual: nodes.len(),
        });
    }
    let mut layer = nodes.to_vec();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| SumNode::parent(&pair[0], &pair[1]))
            .collect::<Result<Vec<_>>>()?;
    }
    Ok(layer[0])
}

/// Recomputes the ancestor reached by walking `witness` upward from `node` at `gindex`.
pub fn climb(node: SumNode, gindex: Gindex, witness: &[SumNode]) -> Result<SumNode> {
    let mut current = node;
    let mut cursor = gindex;
    for sibling in witness {
        current = if cursor % 2 == 0 {
            SumNode::parent(&current, sibling)?
        } else {
            SumNode::parent(sibling, &current)?
        };
        cursor >>= 1;
    }
    Ok(current)
}

pub(crate) mod digest_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(digest)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(deserializer)?;
        let body = raw.strip_prefix("0x").unwrap_or(&raw);
        let bytes = hex::decode(body).map_err(serde::de::Error::custom)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom("digest must be 32 bytes"));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}
