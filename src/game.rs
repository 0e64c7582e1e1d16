//! Interactive bisection over a committed Merkle-sum tree.
//!
//! A challenger asks the proposer to open the subtree at an index whose
//! enclosing round is already committed.  The proposer answers with the nodes
//! at the next checkpoint plus the sibling path tying the opened node to what
//! was committed one round earlier.  Phase-1 leaves are taken as committed
//! once they fold to their anchor; only the record leaves of phase 2 are
//! checked against the canonical snapshot.  An answer that never arrives
//! defeats the proposal, whatever the voting window is doing by then.
//!
//! The functions here only validate and record; stake moves are driven by the
//! verifier.

use serde::{Deserialize, Serialize};

use crate::error::{DisputeError, Result};
use crate::expander::verify_phase2_leaves;
use crate::gindex::{depth, Gindex, Phase, ROOT};
use crate::party::Address;
use crate::proposal::{Proposal, ProposalState};
use crate::snapshot::SnapshotSource;
use crate::sumtree::{climb, fold_nodes, SumNode};

/// Progress of one challenge.  Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeState {
    /// Waiting for the proposer.
    Open,
    /// Answered; the opened node is committed.
    Responded,
    /// Timed out and defeated the proposal.
    Defeated,
    /// Bond collected by the proposer.
    ClaimedByProposer,
    /// Bond (and any reward) collected by the challenger.
    ClaimedByChallenger,
}

/// Challenge record, one per index per proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenged index.
    pub gindex: Gindex,
    /// Party that locked the challenge bond.
    pub challenger: Address,
    /// Opening time in seconds.
    pub created_at: u64,
    /// Current state.
    pub state: ChallengeState,
}

impl Challenge {
    /// Last instant (exclusive) at which the proposer may answer.
    pub fn deadline(&self, challenge_period: u64) -> u64 {
        self.created_at.saturating_add(challenge_period)
    }
}

impl Proposal {
    /// Validates opening a challenge at `gindex`.
    ///
    /// A defeated proposal still takes challenges; they can only be refunded.
    pub(crate) fn check_new_challenge(&self, gindex: Gindex, now: u64) -> Result<()> {
        let state = self.state_at(now);
        if !state.accepts_disputes() && state != ProposalState::Defeated {
            return Err(DisputeError::InvalidProposalState(state));
        }
        if self.challenges.contains_key(&gindex) {
            return Err(DisputeError::InvalidChallengeState(gindex));
        }
        let shape = self.shape();
        if !shape.is_challengeable(gindex) {
            return Err(DisputeError::InvalidChallengeDepth(gindex));
        }
        // The enclosing round must already be opened (its node committed).
        let parent = shape.parent_round(gindex);
        if parent != ROOT && !self.commitments.contains_key(&parent) {
            return Err(DisputeError::InvalidChallengeDepth(gindex));
        }
        Ok(())
    }

    pub(crate) fn open_challenge(&mut self, gindex: Gindex, challenger: Address, now: u64) {
        self.challenges.insert(
            gindex,
            Challenge {
                gindex,
                challenger,
                created_at: now,
                state: ChallengeState::Open,
            },
        );
    }

    /// Validates an answer to the challenge at `gindex` and returns the node it commits.
    pub(crate) fn verify_response<S: SnapshotSource + ?Sized>(
        &self,
        caller: &Address,
        gindex: Gindex,
        witness: &[SumNode],
        nodes: &[SumNode],
        source: &S,
        now: u64,
    ) -> Result<SumNode> {
        if *caller != self.proposer {
            return Err(DisputeError::NotProposer);
        }
        if self.defeat_index.is_some() {
            return Err(DisputeError::ProposalDefeated);
        }
        let challenge = match self.challenges.get(&gindex) {
            Some(challenge) if challenge.state == ChallengeState::Open => challenge,
            _ => return Err(DisputeError::InvalidChallengeState(gindex)),
        };
        if now >= challenge.deadline(self.terms.challenge_period) {
            return Err(DisputeError::ChallengePeriodElapsed(gindex));
        }

        let shape = self.shape();
        let expected = shape.expected_nodes(gindex);
        if nodes.len() != expected {
            return Err(DisputeError::InvalidNodeCount {
                expected,
                actual: nodes.len(),
            });
        }
        if witness.len() != shape.witness_len(gindex) {
            return Err(DisputeError::InvalidProof);
        }
        let parent = shape.parent_round(gindex);
        let anchor_commitment = self
            .commitments
            .get(&parent)
            .copied()
            .ok_or(DisputeError::InvalidChallengeDepth(gindex))?;
        let folded = fold_nodes(nodes).map_err(|_| DisputeError::InvalidProof)?;

        if !shape.is_leaf_level(gindex) {
            let climbed = climb(folded, gindex, witness).map_err(|_| DisputeError::InvalidProof)?;
            if climbed != anchor_commitment {
                return Err(DisputeError::InvalidProof);
            }
            return Ok(folded);
        }

        if folded != anchor_commitment {
            return Err(DisputeError::InvalidProof);
        }
        // Phase-1 leaves stay claims until their records are opened.
        if shape.phase(gindex) == Phase::Two {
            let aggregate = shape
                .phase1_leaf_of(gindex)
                .and_then(|leaf| self.commitments.get(&leaf))
                .ok_or(DisputeError::InvalidChallengeDepth(gindex))?;
            verify_phase2_leaves(source, self.snapshot_block, &shape, parent, nodes, aggregate)?;
        }
        let offset = gindex - (parent << (depth(gindex) - depth(parent)));
        nodes
            .get(offset as usize)
            .copied()
            .ok_or(DisputeError::InvalidProof)
    }

    pub(crate) fn record_response(&mut self, gindex: Gindex, node: SumNode) {
        if let Some(challenge) = self.challenges.get_mut(&gindex) {
            challenge.state = ChallengeState::Responded;
        }
        self.commitments.insert(gindex, node);
    }

    /// Validates defeating the proposal through the unanswered challenge at `gindex`.
    ///
    /// Only the challenge's own period matters; a closed voting window does not
    /// shield the proposer.
    pub(crate) fn check_defeat(&self, gindex: Gindex, now: u64) -> Result<()> {
        let challenge = match self.challenges.get(&gindex) {
            Some(challenge) if challenge.state == ChallengeState::Open => challenge,
            _ => return Err(DisputeError::InvalidChallengeState(gindex)),
        };
        if now < challenge.deadline(self.terms.challenge_period) {
            return Err(DisputeError::ChallengePeriodNotElapsed(gindex));
        }
        Ok(())
    }

    /// Marks the challenge defeated; returns true if this defeat flipped the proposal.
    pub(crate) fn record_defeat(&mut self, gindex: Gindex) -> bool {
        if let Some(challenge) = self.challenges.get_mut(&gindex) {
            challenge.state = ChallengeState::Defeated;
        }
        if self.defeat_index.is_none() {
            self.defeat_index = Some(gindex);
            // Fixed here so later challenges cannot dilute the reward.
            self.winning_chain = self
                .shape()
                .ancestor_chain(gindex)
                .into_iter()
                .filter(|g| self.challenges.contains_key(g))
                .collect();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::ProposerTree;
    use crate::settings::ProtocolSettings;
    use crate::snapshot::{SnapshotData, StaticSnapshot};

    const BLOCK: u64 = 3;

    fn fixture() -> (StaticSnapshot, ProposerTree, Proposal) {
        let parties: Vec<Address> = (0..4).map(|i| Address::from_label(&format!("p{i}"))).collect();
        let mut snapshot = StaticSnapshot::new();
        snapshot.insert(BLOCK, SnapshotData::self_delegated(parties, &[10, 20, 30, 40]));
        let tree = ProposerTree::from_snapshot(&snapshot, BLOCK, 1).unwrap();
        let settings = ProtocolSettings {
            depth_per_round: 1,
            challenge_period: 100,
            ..ProtocolSettings::default()
        };
        let pollard = tree.root_pollard();
        let root = fold_nodes(&pollard).unwrap();
        let proposal = Proposal::new(1, Address::from_label("proposer"), BLOCK, 2, pollard, root, 0, settings);
        (snapshot, tree, proposal)
    }

    #[test]
    fn depth_gating_requires_responded_parent() {
        let (snapshot, tree, mut proposal) = fixture();
        let challenger = Address::from_label("c");
        assert_eq!(
            proposal.check_new_challenge(4, 0).unwrap_err(),
            DisputeError::InvalidChallengeDepth(4)
        );
        proposal.check_new_challenge(2, 0).unwrap();
        proposal.open_challenge(2, challenger, 0);
        assert_eq!(
            proposal.check_new_challenge(2, 0).unwrap_err(),
            DisputeError::InvalidChallengeState(2)
        );

        let response = tree.response(2).unwrap();
        let proposer = proposal.proposer;
        let node = proposal
            .verify_response(&proposer, 2, &response.witness, &response.nodes, &snapshot, 1)
            .unwrap();
        proposal.record_response(2, node);
        proposal.check_new_challenge(4, 1).unwrap();
        assert_eq!(proposal.challenge(2).unwrap().state, ChallengeState::Responded);
    }

    #[test]
    fn response_checks_caller_and_deadline() {
        let (snapshot, tree, mut proposal) = fixture();
        proposal.open_challenge(2, Address::from_label("c"), 0);
        let response = tree.response(2).unwrap();
        let proposer = proposal.proposer;
        assert_eq!(
            proposal
                .verify_response(&Address::from_label("c"), 2, &response.witness, &response.nodes, &snapshot, 1)
                .unwrap_err(),
            DisputeError::NotProposer
        );
        assert_eq!(
            proposal
                .verify_response(&proposer, 2, &response.witness, &response.nodes, &snapshot, 100)
                .unwrap_err(),
            DisputeError::ChallengePeriodElapsed(2)
        );
    }

    #[test]
    fn defeat_waits_for_the_period() {
        let (snapshot, tree, mut proposal) = fixture();
        proposal.open_challenge(3, Address::from_label("c"), 0);
        assert_eq!(
            proposal.check_defeat(3, 99).unwrap_err(),
            DisputeError::ChallengePeriodNotElapsed(3)
        );
        proposal.check_defeat(3, 100).unwrap();
        assert!(proposal.record_defeat(3));
        assert_eq!(proposal.state_at(100), ProposalState::Defeated);
        assert_eq!(proposal.defeat_index, Some(3));

        // Defeated proposals still take challenges but can no longer answer them.
        proposal.check_new_challenge(2, 100).unwrap();
        proposal.open_challenge(2, Address::from_label("d"), 100);
        let response = tree.response(2).unwrap();
        let proposer = proposal.proposer;
        assert_eq!(
            proposal
                .verify_response(&proposer, 2, &response.witness, &response.nodes, &snapshot, 101)
                .unwrap_err(),
            DisputeError::ProposalDefeated
        );
        proposal.check_defeat(2, 200).unwrap();
        assert!(!proposal.record_defeat(2));
        assert_eq!(proposal.defeat_index, Some(3));
        assert_eq!(proposal.winning_chain, vec![3]);
    }

    #[test]
    fn late_challenges_outlive_the_vote() {
        let (snapshot, tree, mut proposal) = fixture();
        let end = proposal.vote_end();
        proposal.check_new_challenge(2, end - 1).unwrap();
        proposal.open_challenge(2, Address::from_label("c"), end - 1);
        proposal.open_challenge(3, Address::from_label("c"), end - 1);
        assert_eq!(proposal.state_at(end + 50), ProposalState::Expired);
        assert_eq!(
            proposal.check_new_challenge(3, end).unwrap_err(),
            DisputeError::InvalidProposalState(ProposalState::Expired)
        );

        let response = tree.response(2).unwrap();
        let proposer = proposal.proposer;
        let node = proposal
            .verify_response(&proposer, 2, &response.witness, &response.nodes, &snapshot, end + 50)
            .unwrap();
        proposal.record_response(2, node);

        assert_eq!(
            proposal.check_defeat(3, end + 98).unwrap_err(),
            DisputeError::ChallengePeriodNotElapsed(3)
        );
        proposal.check_defeat(3, end + 99).unwrap();
        assert!(proposal.record_defeat(3));
        assert_eq!(proposal.state_at(end + 99), ProposalState::Defeated);
    }

    #[test]
    fn phase1_leaves_commit_without_a_snapshot_lookup() {
        let (snapshot, honest, mut proposal) = fixture();
        let shape = honest.shape();
        // Consistent tree whose party 3 holds one extra unit on its own record.
        let mut inflated: Vec<_> = (0..4).map(|p| snapshot.real_party_records(BLOCK, p)).collect();
        inflated[3][3].power += 1;
        let mut leaves = honest.phase1_leaves().to_vec();
        leaves[3] = crate::expander::phase2_root(&inflated[3], 2).unwrap();
        let tree = ProposerTree::new(shape, &leaves, &inflated).unwrap();
        let pollard = tree.root_pollard();
        let root = fold_nodes(&pollard).unwrap();
        proposal = Proposal::new(1, proposal.proposer, BLOCK, 2, pollard, root, 0, proposal.terms);
        let proposer = proposal.proposer;

        for gindex in [3, 7, 15] {
            proposal.open_challenge(gindex, Address::from_label("c"), 0);
            let response = tree.response(gindex).unwrap();
            let node = proposal
                .verify_response(&proposer, gindex, &response.witness, &response.nodes, &snapshot, 1)
                .unwrap();
            proposal.record_response(gindex, node);
        }
        assert_eq!(proposal.committed(7).unwrap().sum, 41);

        // The record opened under the inflated leaf is where the lie surfaces.
        let target = (7 << 2) | 3;
        proposal.open_challenge(target, Address::from_label("c"), 1);
        let response = tree.response(target).unwrap();
        assert_eq!(
            proposal
                .verify_response(&proposer, target, &response.witness, &response.nodes, &snapshot, 2)
                .unwrap_err(),
            DisputeError::InvalidLeaves
        );
    }
}
