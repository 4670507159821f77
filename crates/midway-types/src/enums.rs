//! Closed enumeration types for the Midway event service.
//!
//! Both enums here are deliberately closed: the scheduler owns exactly two
//! tracks, and reward statistics accept only known sources. Adding a
//! variant is a code change, never a runtime registration.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event tracks
// ---------------------------------------------------------------------------

/// One of the two independent event tracks the scheduler runs.
///
/// Each track has at most one active event per day and its own announce
/// channel, persisted state unit, and buffered next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// Ambient events that modify background reward behavior.
    Passive,
    /// Participation events users actively play.
    Challenge,
}

impl Track {
    /// Both tracks, in promotion order.
    pub const ALL: [Self; 2] = [Self::Passive, Self::Challenge];

    /// Stable lowercase name, used in logs and config.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::Challenge => "challenge",
        }
    }

    /// Store key of this track's persisted state unit.
    pub const fn store_key(self) -> &'static str {
        match self {
            Self::Passive => "event_passive",
            Self::Challenge => "event_challenge",
        }
    }
}

impl core::fmt::Display for Track {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reward sources
// ---------------------------------------------------------------------------

/// Where a currency grant came from, for per-source statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    /// Background drop cycle payout.
    Drop,
    /// Payout from an active event's own action (boost bonus, special).
    EventAction,
    /// Challenge-track completion payout.
    Challenge,
    /// Raffle pot payout.
    Raffle,
    /// Scavenger hunt step or completion payout.
    Hunt,
    /// Manual adjustment by an operator.
    Admin,
}

impl RewardSource {
    /// Every source, in stat-listing order.
    pub const ALL: [Self; 6] = [
        Self::Drop,
        Self::EventAction,
        Self::Challenge,
        Self::Raffle,
        Self::Hunt,
        Self::Admin,
    ];

    /// Stable snake-case name, used as the stat key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::EventAction => "event_action",
            Self::Challenge => "challenge",
            Self::Raffle => "raffle",
            Self::Hunt => "hunt",
            Self::Admin => "admin",
        }
    }
}

impl core::fmt::Display for RewardSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn track_store_keys_are_distinct() {
        assert_ne!(Track::Passive.store_key(), Track::Challenge.store_key());
        assert_eq!(Track::ALL.len(), 2);
    }

    #[test]
    fn serde_names_match_as_str() {
        for source in RewardSource::ALL {
            let text = serde_json::to_string(&source).unwrap();
            assert_eq!(text, format!("\"{}\"", source.as_str()));
        }
        let track: Track = serde_json::from_str("\"challenge\"").unwrap();
        assert_eq!(track, Track::Challenge);
    }
}
