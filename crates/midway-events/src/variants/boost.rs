//! Drop boost: a passive day where the economy runs hot.
//!
//! The boost does nothing active. Its whole effect is the pair of
//! multipliers it reports through the variant registry and the
//! optional festive overlay merged into the base pool table. The drop
//! cycle picks both up on its next pass; no code here touches the
//! wallet.

use midway_pools::PoolTable;
use midway_types::{RewardModifiers, Value, ValueMap};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::BoostConfig;
use crate::context::EventCx;
use crate::messenger::Messenger;
use crate::variant::EventError;

/// Payload of a boost day.
///
/// The multipliers are snapshotted from config when the event is
/// selected, so retuning the config mid-day does not change a boost
/// already running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostEvent {
    /// Factor applied to drop probabilities.
    #[serde(default = "default_multiplier")]
    pub probability: f64,

    /// Factor applied to drop payouts.
    #[serde(default = "default_multiplier")]
    pub payout: f64,

    /// Festive entries merged into the base table for the day.
    #[serde(default)]
    pub overlay: Option<PoolTable>,
}

impl BoostEvent {
    /// Registry tag.
    pub const TAG: &'static str = "boost";

    const HEADLINES: [&'static str; 4] = [
        "Lucky streak on the midway!",
        "The barkers are feeling generous today.",
        "Double luck day: the wheels run loose.",
        "Prizes are practically falling off the shelves.",
    ];

    /// Snapshot the configured tuning into a fresh event.
    #[must_use]
    pub fn from_config(config: &BoostConfig) -> Self {
        Self {
            probability: config.probability_multiplier,
            payout: config.payout_multiplier,
            overlay: config.overlay.clone(),
        }
    }

    /// The multipliers this boost applies while it runs.
    #[must_use]
    pub const fn modifiers(&self) -> RewardModifiers {
        RewardModifiers {
            probability: self.probability,
            payout: self.payout,
        }
    }

    /// Pick the day's announcement copy.
    pub fn prepare(&self, rng: &mut impl Rng) -> ValueMap {
        let headline = Self::HEADLINES
            .get(rng.random_range(0..Self::HEADLINES.len()))
            .copied()
            .unwrap_or("Boost day on the midway!");
        ValueMap::from([
            ("headline".to_owned(), Value::from(headline)),
            ("probability".to_owned(), Value::from(self.probability)),
            ("payout".to_owned(), Value::from(self.payout)),
        ])
    }

    /// Announce the boost with the prepared headline.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the announcement cannot be sent
    /// or persisted.
    pub async fn on_begin<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        let state = cx.state()?;
        let headline = state
            .data
            .get("headline")
            .and_then(Value::as_str)
            .unwrap_or("Boost day on the midway!");
        let content = format!(
            "{headline} Drop odds x{:.2} and payouts x{:.2} until the next reset.",
            self.probability, self.payout
        );
        cx.announce_once(&content).await?;
        Ok(())
    }

    /// Close out the announcement.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the edit fails.
    pub async fn on_end<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        cx.edit_announcement("The boost has ended. Regular odds are back.")
            .await
    }
}

const fn default_multiplier() -> f64 {
    1.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn config_tuning_is_snapshotted() {
        let config = BoostConfig {
            probability_multiplier: 3.0,
            payout_multiplier: 0.5,
            overlay: None,
        };
        let event = BoostEvent::from_config(&config);
        let modifiers = event.modifiers();
        assert!((modifiers.probability - 3.0).abs() < f64::EPSILON);
        assert!((modifiers.payout - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn prepared_payload_carries_a_headline() {
        let event = BoostEvent::from_config(&BoostConfig::default());
        let mut rng = SmallRng::seed_from_u64(3);
        let payload = event.prepare(&mut rng);

        let headline = payload.get("headline").and_then(Value::as_str).unwrap();
        assert!(BoostEvent::HEADLINES.contains(&headline));
        assert!(payload.get("probability").and_then(Value::as_float).is_some());
    }
}
