//! Reward modifiers contributed by active events.
//!
//! Modifiers scale the background reward economy: `probability`
//! multiplies each drop slot's hit chance, `payout` multiplies the
//! currency amount of whatever drops. The identity modifier changes
//! nothing, and modifiers from several concurrent events combine
//! multiplicatively.

use serde::{Deserialize, Serialize};

/// Multipliers an event applies to the reward economy while active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardModifiers {
    /// Multiplier on each drop slot's hit probability.
    pub probability: f64,
    /// Multiplier on granted drop amounts.
    pub payout: f64,
}

impl RewardModifiers {
    /// The modifier that changes nothing.
    pub const IDENTITY: Self = Self {
        probability: 1.0,
        payout: 1.0,
    };

    /// Combine with another modifier; both effects apply.
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        Self {
            probability: self.probability * other.probability,
            payout: self.payout * other.payout,
        }
    }
}

impl Default for RewardModifiers {
    fn default() -> Self {
        Self::IDENTITY
    }
}
