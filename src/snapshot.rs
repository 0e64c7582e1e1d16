//! Canonical voting-power data consulted when leaves are disclosed.
//!
//! The dispute core never computes snapshots itself.  It asks a
//! [`SnapshotSource`] for the ground truth at a leaf once a challenge has been
//! narrowed down that far.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{DisputeError, Result};
use crate::expander::phase2_root;
use crate::gindex::depth_for_count;
use crate::party::Address;
use crate::sumtree::{keccak256, SumNode, VotingPowerLeaf};

/// Power one party contributes to another party's aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerRecord {
    /// Party the power originates from.
    pub source: Address,
    /// Amount of voting power.
    pub power: u128,
}

impl PowerRecord {
    /// Phase-2 leaf node for this record.
    pub fn node(&self) -> SumNode {
        SumNode::new(self.power, keccak256(self.source.as_bytes()))
    }

    /// Phase-2 leaf at `position` for this record.
    pub fn leaf(&self, position: u64) -> VotingPowerLeaf {
        VotingPowerLeaf::from_node(position, self.node())
    }
}

/// Ground-truth lookup for snapshot leaves.
pub trait SnapshotSource {
    /// Number of parties in the snapshot taken at `snapshot_block`.
    fn party_count(&self, snapshot_block: u64) -> Option<u64>;

    /// Records making up the aggregate of `party` (indexed by record position).
    fn real_party_records(&self, snapshot_block: u64, party: u64) -> Vec<PowerRecord>;

    /// Canonical phase-1 leaf at `position`; padding positions are empty.
    fn real_leaf_value(&self, snapshot_block: u64, position: u64) -> Result<SumNode> {
        let count = self
            .party_count(snapshot_block)
            .ok_or(DisputeError::UnknownSnapshot(snapshot_block))?;
        if position >= count {
            return Ok(SumNode::EMPTY);
        }
        let records = self.real_party_records(snapshot_block, position);
        phase2_root(&records, depth_for_count(count))
    }
}

/// One snapshot: a party list and a delegation matrix.
///
/// `delegations[p][i]` is the power party `i` contributes to party `p`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Parties in leaf order.
    pub parties: Vec<Address>,
    /// Delegation matrix, one row per receiving party.
    pub delegations: Vec<Vec<u128>>,
}

impl SnapshotData {
    /// Snapshot in which every party holds only its own power.
    pub fn self_delegated(parties: Vec<Address>, powers: &[u128]) -> Self {
        let delegations = (0..parties.len())
            .map(|p| {
                let mut row = vec![0u128; parties.len()];
                row[p] = powers.get(p).copied().unwrap_or_default();
                row
            })
            .collect();
        Self {
            parties,
            delegations,
        }
    }

    /// Phase-1 depth required to hold every party.
    pub fn tree_depth(&self) -> u32 {
        depth_for_count(self.parties.len() as u64)
    }

    /// Records for `party`, in record-position order.
    pub fn records(&self, party: u64) -> Vec<PowerRecord> {
        let Some(row) = self.delegations.get(party as usize) else {
            return Vec::new();
        };
        self.parties
            .iter()
            .zip(row.iter())
            .map(|(source, power)| PowerRecord {
                source: *source,
                power: *power,
            })
            .collect()
    }

    /// Aggregate power of `party`.
    pub fn power_of(&self, party: u64) -> u128 {
        self.records(party).iter().map(|r| r.power).sum()
    }
}

/// In-memory snapshot source keyed by block.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshot {
    snapshots: BTreeMap<u64, SnapshotData>,
}

/// On-disk snapshot description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Block the snapshot was taken at.
    pub block: u64,
    /// Snapshot contents.
    #[serde(flatten)]
    pub data: SnapshotData,
}

impl SnapshotFile {
    /// Loads a snapshot file from JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|err| DisputeError::Io(format!("failed to read {}: {err}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| DisputeError::Decode(format!("invalid snapshot {}: {err}", path.display())))
    }
}

impl StaticSnapshot {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the snapshot at `block`.
    pub fn insert(&mut self, block: u64, data: SnapshotData) {
        self.snapshots.insert(block, data);
    }

    /// Snapshot registered at `block`.
    pub fn get(&self, block: u64) -> Option<&SnapshotData> {
        self.snapshots.get(&block)
    }
}

impl From<SnapshotFile> for StaticSnapshot {
    fn from(file: SnapshotFile) -> Self {
        let mut source = Self::new();
        source.insert(file.block, file.data);
        source
    }
}

impl SnapshotSource for StaticSnapshot {
    fn party_count(&self, snapshot_block: u64) -> Option<u64> {
        self.snapshots
            .get(&snapshot_block)
            .map(|data| data.parties.len() as u64)
    }

    fn real_party_records(&self, snapshot_block: u64, party: u64) -> Vec<PowerRecord> {
        self.snapshots
            .get(&snapshot_block)
            .map(|data| data.records(party))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties(n: usize) -> Vec<Address> {
        (0..n).map(|i| Address::from_label(&format!("node-{i}"))).collect()
    }

    #[test]
    fn self_delegated_records_sum_to_power() {
        let data = SnapshotData::self_delegated(parties(3), &[5, 7, 11]);
        assert_eq!(data.tree_depth(), 2);
        assert_eq!(data.power_of(1), 7);
        assert_eq!(data.records(1).len(), 3);
        assert!(data.records(9).is_empty());
    }

    #[test]
    fn padding_positions_are_empty() {
        let mut source = StaticSnapshot::new();
        source.insert(10, SnapshotData::self_delegated(parties(3), &[5, 7, 11]));
        assert_eq!(source.real_leaf_value(10, 3).unwrap(), SumNode::EMPTY);
        let leaf = source.real_leaf_value(10, 2).unwrap();
        assert_eq!(leaf.sum, 11);
        assert!(!leaf.is_empty());
        assert_eq!(
            source.real_leaf_value(11, 0).unwrap_err(),
            DisputeError::UnknownSnapshot(11)
        );
    }

    #[test]
    fn snapshot_file_flattens_data() {
        let file: SnapshotFile = serde_json::from_str(&format!(
            "{{\"block\":4,\"parties\":[\"{}\"],\"delegations\":[[9]]}}",
            Address::from_label("solo")
        ))
        .unwrap();
        let source = StaticSnapshot::from(file);
        assert_eq!(source.party_count(4), Some(1));
        assert_eq!(source.real_party_records(4, 0)[0].power, 9);
    }
}
