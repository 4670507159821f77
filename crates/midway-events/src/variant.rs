//! Event variant registry and dispatch.
//!
//! Every event the scheduler can run is one arm of [`EventVariant`].
//! The persisted form is a [`VariantSpec`]: a tag naming the arm plus
//! the arm's parameters. [`EventVariant::from_spec`] is the only way a
//! spec becomes runnable code, and it is a closed match: a tag the
//! registry does not know is an error, never a lookup in anything
//! dynamic. Adding an event means adding an arm here and nowhere else.
//!
//! Dispatch is a plain `match` per operation. The lifecycle operations
//! are async (they talk to the messenger and the store), so trait
//! objects are out; the enum keeps them statically dispatched.

use midway_pools::{PoolError, PoolTable};
use midway_rewards::RewardError;
use midway_store::StoreError;
use midway_types::{RewardModifiers, Value, ValueMap};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::EventsConfig;
use crate::context::{EventCx, PrepareCx};
use crate::messenger::{Messenger, MessengerError};
use crate::variants::{BoostEvent, HuntEvent, RaffleEvent, SpecialEvent};

/// The persisted description of an event.
///
/// A spec survives restarts inside the track state unit; the registry
/// turns it back into a runnable variant on demand.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariantSpec {
    /// Registry tag naming the variant.
    pub tag: String,

    /// Variant parameters, shaped per tag.
    #[serde(default)]
    pub params: ValueMap,
}

/// Errors raised by the variant registry.
#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    /// A [`VariantSpec`] named a tag the registry does not know.
    #[error("unknown event tag: {tag}")]
    UnknownTag {
        /// The offending tag.
        tag: String,
    },

    /// The tag is known but the parameters do not fit it.
    #[error("invalid parameters for {tag}: {reason}")]
    Params {
        /// The tag whose parameters were rejected.
        tag: String,
        /// Explanation of the mismatch.
        reason: String,
    },

    /// The parameters failed to decode into the variant's payload type.
    #[error("event parameters failed to decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors raised while running an event operation.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A store read or write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A messenger operation failed.
    #[error("messenger error: {0}")]
    Messenger(#[from] MessengerError),

    /// A pool table failed to decode or validate.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// A currency grant failed.
    #[error("reward error: {0}")]
    Reward(#[from] RewardError),

    /// The event's own spec or payload is malformed.
    #[error("variant error: {0}")]
    Variant(#[from] VariantError),
}

/// One runnable event. The registry of everything the scheduler knows.
#[derive(Debug, Clone, PartialEq)]
pub enum EventVariant {
    /// Passive-day drop boost.
    Boost(BoostEvent),
    /// Challenge-day raffle over a shared pot.
    Raffle(RaffleEvent),
    /// Challenge-day multi-step scavenger hunt.
    Hunt(HuntEvent),
    /// Date-gated festival announcement.
    Special(SpecialEvent),
}

impl EventVariant {
    /// Reconstruct a variant from its persisted spec.
    ///
    /// This is the registry: a closed match over known tags. Unknown
    /// tags are rejected outright.
    ///
    /// # Errors
    ///
    /// Returns [`VariantError::UnknownTag`] for a tag outside the
    /// registry, or [`VariantError::Decode`] when the parameters do not
    /// fit the tagged payload shape.
    pub fn from_spec(spec: &VariantSpec) -> Result<Self, VariantError> {
        match spec.tag.as_str() {
            BoostEvent::TAG => Ok(Self::Boost(decode_params(spec)?)),
            RaffleEvent::TAG => Ok(Self::Raffle(decode_params(spec)?)),
            HuntEvent::TAG => Ok(Self::Hunt(decode_params(spec)?)),
            SpecialEvent::TAG => Ok(Self::Special(decode_params(spec)?)),
            _ => Err(VariantError::UnknownTag {
                tag: spec.tag.clone(),
            }),
        }
    }

    /// Build a fresh variant for the daily rotation, tuned from config.
    ///
    /// # Errors
    ///
    /// Returns [`VariantError::UnknownTag`] for a tag outside the
    /// registry, or [`VariantError::Params`] for a tag that cannot be
    /// scheduled by rotation (special dates are date-gated).
    pub fn for_tag(tag: &str, config: &EventsConfig) -> Result<Self, VariantError> {
        match tag {
            BoostEvent::TAG => Ok(Self::Boost(BoostEvent::from_config(&config.boost))),
            RaffleEvent::TAG => Ok(Self::Raffle(RaffleEvent::from_config(config.raffle))),
            HuntEvent::TAG => Ok(Self::Hunt(HuntEvent::from_config(&config.hunt))),
            SpecialEvent::TAG => Err(VariantError::Params {
                tag: SpecialEvent::TAG.to_owned(),
                reason: "special_date events are scheduled by date, not rotation".to_owned(),
            }),
            _ => Err(VariantError::UnknownTag {
                tag: tag.to_owned(),
            }),
        }
    }

    /// The persisted form of this variant.
    ///
    /// Round-trips: `from_spec(&v.spec())` reconstructs `v`.
    pub fn spec(&self) -> VariantSpec {
        let (tag, params) = match self {
            Self::Boost(event) => (BoostEvent::TAG, encode_params(event)),
            Self::Raffle(event) => (RaffleEvent::TAG, encode_params(event)),
            Self::Hunt(event) => (HuntEvent::TAG, encode_params(event)),
            Self::Special(event) => (SpecialEvent::TAG, encode_params(event)),
        };
        VariantSpec {
            tag: tag.to_owned(),
            params,
        }
    }

    /// Registry tag for logging and persistence.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Boost(_) => BoostEvent::TAG,
            Self::Raffle(_) => RaffleEvent::TAG,
            Self::Hunt(_) => HuntEvent::TAG,
            Self::Special(_) => SpecialEvent::TAG,
        }
    }

    /// True when the variant wants `on_tick` calls.
    pub const fn acts_on_tick(&self) -> bool {
        matches!(self, Self::Hunt(_))
    }

    /// True when the variant runs a discussion thread.
    pub const fn uses_thread(&self) -> bool {
        matches!(self, Self::Raffle(_) | Self::Hunt(_))
    }

    /// Drop probability and payout multipliers while this event runs.
    pub const fn reward_modifiers(&self) -> RewardModifiers {
        match self {
            Self::Boost(event) => event.modifiers(),
            Self::Special(event) => event.modifiers(),
            Self::Raffle(_) | Self::Hunt(_) => RewardModifiers::IDENTITY,
        }
    }

    /// Extra pool table merged into the base economy for the day.
    pub fn pool_overlay(&self) -> Option<PoolTable> {
        match self {
            Self::Boost(event) => event.overlay.clone(),
            Self::Special(event) => event.overlay.clone(),
            Self::Raffle(_) | Self::Hunt(_) => None,
        }
    }

    /// Pre-generate the day's payload (announcement copy, hunt steps,
    /// raffle seed). Pure apart from the RNG; nothing is sent or
    /// persisted here.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the payload cannot be built, for
    /// example a hunt with no riddles configured.
    pub fn prepare(&self, cx: &PrepareCx<'_>, rng: &mut impl Rng) -> Result<ValueMap, EventError> {
        match self {
            Self::Boost(event) => Ok(event.prepare(rng)),
            Self::Raffle(event) => Ok(event.prepare()),
            Self::Hunt(event) => event.prepare(cx, rng),
            Self::Special(event) => Ok(event.prepare()),
        }
    }

    /// Bring the event live: announce, open a thread when the variant
    /// uses one, and let the prepared payload become visible.
    ///
    /// Idempotent: announcement and thread handles are persisted the
    /// moment the send succeeds and re-checked first, so a re-run after
    /// a crash does not double-announce.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when messaging or persistence fails.
    pub async fn on_begin<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        match self {
            Self::Boost(event) => event.on_begin(cx).await,
            Self::Raffle(event) => event.on_begin(cx).await,
            Self::Hunt(event) => event.on_begin(cx).await,
            Self::Special(event) => event.on_begin(cx).await,
        }
    }

    /// Settle and retire the event: draw the raffle, pay hunt
    /// completions, archive the thread.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when settlement fails; the caller
    /// retires the event regardless.
    pub async fn on_end<M: Messenger>(
        &self,
        cx: &EventCx<'_, M>,
        rng: &mut impl Rng,
    ) -> Result<(), EventError> {
        match self {
            Self::Boost(event) => event.on_end(cx).await,
            Self::Raffle(event) => event.on_end(cx, rng).await,
            Self::Hunt(event) => event.on_end(cx).await,
            Self::Special(event) => event.on_end(cx).await,
        }
    }

    /// Periodic action for variants that report `acts_on_tick`.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the tick action fails.
    pub async fn on_tick<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        match self {
            Self::Hunt(event) => event.on_tick(cx).await,
            Self::Boost(_) | Self::Raffle(_) | Self::Special(_) => Ok(()),
        }
    }
}

/// Decode a spec's parameters into a concrete payload type.
fn decode_params<T: DeserializeOwned>(spec: &VariantSpec) -> Result<T, VariantError> {
    let json = serde_json::Value::from(Value::Map(spec.params.clone()));
    Ok(serde_json::from_value(json)?)
}

/// Encode a payload back into spec parameters.
fn encode_params<T: Serialize>(event: &T) -> ValueMap {
    match serde_json::to_value(event).map(Value::from) {
        Ok(Value::Map(params)) => params,
        _ => ValueMap::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_are_rejected() {
        let spec = VariantSpec {
            tag: "fireworks".to_owned(),
            params: ValueMap::new(),
        };
        assert!(matches!(
            EventVariant::from_spec(&spec),
            Err(VariantError::UnknownTag { tag }) if tag == "fireworks"
        ));

        let config = EventsConfig::default();
        assert!(matches!(
            EventVariant::for_tag("fireworks", &config),
            Err(VariantError::UnknownTag { .. })
        ));
    }

    #[test]
    fn special_dates_cannot_join_the_rotation() {
        let config = EventsConfig::default();
        assert!(matches!(
            EventVariant::for_tag("special_date", &config),
            Err(VariantError::Params { .. })
        ));
    }

    #[test]
    fn every_arm_round_trips_through_its_spec() {
        let config = EventsConfig::default();
        let mut variants = vec![
            EventVariant::for_tag("boost", &config).unwrap(),
            EventVariant::for_tag("raffle", &config).unwrap(),
            EventVariant::for_tag("hunt", &config).unwrap(),
        ];
        let special = VariantSpec {
            tag: "special_date".to_owned(),
            params: ValueMap::from([
                ("title".to_owned(), Value::from("Opening Day")),
                ("greeting".to_owned(), Value::from("Gates are open!")),
            ]),
        };
        variants.push(EventVariant::from_spec(&special).unwrap());

        for variant in variants {
            let round = EventVariant::from_spec(&variant.spec()).unwrap();
            assert_eq!(round, variant, "round trip changed {}", variant.tag());
        }
    }

    #[test]
    fn misshapen_params_fail_to_decode() {
        let spec = VariantSpec {
            tag: "boost".to_owned(),
            params: ValueMap::from([("probability".to_owned(), Value::from("high"))]),
        };
        assert!(matches!(
            EventVariant::from_spec(&spec),
            Err(VariantError::Decode(_))
        ));
    }

    #[test]
    fn tick_interest_is_per_variant() {
        let config = EventsConfig::default();
        assert!(EventVariant::for_tag("hunt", &config).unwrap().acts_on_tick());
        assert!(!EventVariant::for_tag("boost", &config).unwrap().acts_on_tick());
        assert!(!EventVariant::for_tag("raffle", &config).unwrap().acts_on_tick());
    }

    #[test]
    fn thread_use_is_per_variant() {
        let config = EventsConfig::default();
        assert!(EventVariant::for_tag("raffle", &config).unwrap().uses_thread());
        assert!(EventVariant::for_tag("hunt", &config).unwrap().uses_thread());
        assert!(!EventVariant::for_tag("boost", &config).unwrap().uses_thread());
    }
}
