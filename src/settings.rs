//! Protocol parameters, loaded from JSON.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{DisputeError, Result};
use crate::gindex::MAX_PHASE1_DEPTH;

/// One token in base units.
pub const TOKEN: u128 = 1_000_000_000_000_000_000;

const DAY: u64 = 24 * 60 * 60;

/// Parameters a proposal captures at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Levels disclosed per round.
    pub depth_per_round: u32,
    /// Stake locked by the proposer.
    pub proposal_bond: u128,
    /// Stake locked by each challenge.
    pub challenge_bond: u128,
    /// Seconds the proposer has to answer a challenge, counted from its creation.
    pub challenge_period: u64,
    /// Seconds between creation and the start of voting.
    pub vote_delay_time: u64,
    /// Length of the voting window in seconds.
    pub vote_time: u64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            depth_per_round: 5,
            proposal_bond: 100 * TOKEN,
            challenge_bond: 10 * TOKEN,
            challenge_period: 30 * 60,
            vote_delay_time: 7 * DAY,
            vote_time: 14 * DAY,
        }
    }
}

impl ProtocolSettings {
    /// Load from JSON; missing file -> defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|e| DisputeError::Io(e.to_string()))?;
        let settings: Self =
            serde_json::from_slice(&bytes).map_err(|e| DisputeError::Decode(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Persist to JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DisputeError::Io(e.to_string()))?;
            }
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| DisputeError::Decode(e.to_string()))?;
        fs::write(path, data).map_err(|e| DisputeError::Io(e.to_string()))
    }

    /// Rejects parameters the game cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.depth_per_round == 0 || self.depth_per_round > MAX_PHASE1_DEPTH {
            return Err(DisputeError::InvalidSettings(format!(
                "depth_per_round must be within 1..={MAX_PHASE1_DEPTH}"
            )));
        }
        if self.proposal_bond == 0 || self.challenge_bond == 0 {
            return Err(DisputeError::InvalidSettings(
                "bonds must be non-zero".into(),
            ));
        }
        if self.challenge_period == 0 {
            return Err(DisputeError::InvalidSettings(
                "challenge_period must be non-zero".into(),
            ));
        }
        if self.vote_time == 0 {
            return Err(DisputeError::InvalidSettings(
                "vote_time must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Seconds from creation until the voting window closes.
    pub fn lifetime(&self) -> u64 {
        self.vote_delay_time.saturating_add(self.vote_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = ProtocolSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.challenge_bond * 10, settings.proposal_bond);
        assert_eq!(settings.lifetime(), 21 * DAY);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: ProtocolSettings =
            serde_json::from_str("{\"depth_per_round\":2,\"challenge_period\":60}").unwrap();
        assert_eq!(settings.depth_per_round, 2);
        assert_eq!(settings.challenge_period, 60);
        assert_eq!(settings.vote_time, ProtocolSettings::default().vote_time);
    }

    #[test]
    fn rejects_zero_round_depth() {
        let settings = ProtocolSettings {
            depth_per_round: 0,
            ..ProtocolSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(DisputeError::InvalidSettings(_))
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("power_dispute_settings_absent.json");
        let _ = fs::remove_file(&path);
        assert_eq!(
            ProtocolSettings::load(&path).unwrap(),
            ProtocolSettings::default()
        );
    }
}
