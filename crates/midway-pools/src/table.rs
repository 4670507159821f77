//! Drop tables: independent Bernoulli trials over a set of pools.
//!
//! A table is a list of slots, each pairing a [`Pool`] with a hit
//! probability. A drop cycle runs every slot as an independent trial
//! (scaled by the caller's probability multiplier); each hit draws one
//! item from the slot's pool. Tables merge the same way pools do, so an
//! active event can overlay extra slots or extra weight without touching
//! the configured base.

use midway_types::Value;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::pool::Pool;

/// Errors from decoding or validating a table.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A value did not decode into a table.
    #[error("Pool table decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A slot carries a probability outside `[0, 1]`.
    #[error("Pool {pool:?} has invalid probability {probability}")]
    InvalidProbability {
        /// The offending slot's pool name.
        pool: String,
        /// The rejected probability.
        probability: f64,
    },
}

/// One slot of a drop table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSlot {
    /// The pool drawn from when the slot hits.
    pub pool: Pool,
    /// Chance of a hit per cycle, in `[0, 1]`. In an overlay, zero
    /// means "keep the base chance, only adjust weights".
    #[serde(default)]
    pub probability: f64,
}

/// A full drop table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolTable {
    /// The slots tried independently each cycle.
    #[serde(default)]
    pub slots: Vec<PoolSlot>,
}

/// One successful drop out of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropResult {
    /// Name of the pool the item came from.
    pub pool: String,
    /// The selected item identifier.
    pub item: String,
}

impl PoolTable {
    /// A table with no slots.
    pub const fn empty() -> Self {
        Self { slots: Vec::new() }
    }

    /// Run every slot as an independent trial.
    ///
    /// Each slot hits with `probability * multiplier`, clamped into
    /// `[0, 1]`; a non-finite product counts as zero. A hit draws one
    /// item from the slot's pool; an empty pool hit yields nothing.
    pub fn select_all(&self, rng: &mut impl Rng, multiplier: f64) -> Vec<DropResult> {
        let mut hits = Vec::new();
        for slot in &self.slots {
            let scaled = slot.probability * multiplier;
            let chance = if scaled.is_finite() {
                scaled.clamp(0.0, 1.0)
            } else {
                0.0
            };
            if chance > 0.0 && rng.random_bool(chance) {
                if let Some(item) = slot.pool.select_one(rng) {
                    hits.push(DropResult {
                        pool: slot.pool.name.clone(),
                        item: item.to_owned(),
                    });
                }
            }
        }
        hits
    }

    /// Combine this table with an overlay, producing a third table.
    ///
    /// Slots are matched by pool name. Matched pools merge additively
    /// (see [`Pool::merge`]); a positive overlay probability replaces
    /// the base chance, a zero one keeps it. Slots unique to either
    /// side are kept. Neither input is mutated.
    #[must_use]
    pub fn merge(&self, overlay: &Self) -> Self {
        let mut slots = self.slots.clone();
        for extra in &overlay.slots {
            let slot = slots
                .iter_mut()
                .find(|existing| existing.pool.name == extra.pool.name);
            match slot {
                Some(existing) => {
                    existing.pool = existing.pool.merge(&extra.pool);
                    if extra.probability > 0.0 {
                        existing.probability = extra.probability;
                    }
                }
                None => slots.push(extra.clone()),
            }
        }
        Self { slots }
    }

    /// Reject slots whose probability is outside `[0, 1]` or not finite.
    pub fn validate(&self) -> Result<(), PoolError> {
        for slot in &self.slots {
            let p = slot.probability;
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(PoolError::InvalidProbability {
                    pool: slot.pool.name.clone(),
                    probability: p,
                });
            }
        }
        Ok(())
    }

    /// Decode a table out of a stored [`Value`] tree.
    pub fn from_value(value: &Value) -> Result<Self, PoolError> {
        Ok(serde_json::from_value(serde_json::Value::from(
            value.clone(),
        ))?)
    }

    /// Encode this table into a storable [`Value`] tree.
    pub fn to_value(&self) -> Result<Value, PoolError> {
        Ok(Value::from(serde_json::to_value(self)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::float_cmp)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use crate::pool::{PoolEntry, WeightedEntry};

    use super::*;

    fn single_item_pool(name: &str, item: &str) -> Pool {
        Pool {
            name: name.to_owned(),
            entries: vec![WeightedEntry {
                entry: PoolEntry::Item(item.to_owned()),
                weight: 1,
            }],
        }
    }

    fn table(slots: Vec<(Pool, f64)>) -> PoolTable {
        PoolTable {
            slots: slots
                .into_iter()
                .map(|(pool, probability)| PoolSlot { pool, probability })
                .collect(),
        }
    }

    #[test]
    fn certain_slot_always_hits_and_impossible_never_does() {
        let mut rng = SmallRng::seed_from_u64(42);
        let t = table(vec![
            (single_item_pool("always", "gold"), 1.0),
            (single_item_pool("never", "dust"), 0.0),
        ]);

        for _ in 0..100 {
            let drops = t.select_all(&mut rng, 1.0);
            assert_eq!(drops.len(), 1);
            assert_eq!(drops.first().unwrap().item, "gold");
        }
    }

    #[test]
    fn multiplier_scales_hit_rate() {
        let mut rng = SmallRng::seed_from_u64(42);
        let t = table(vec![(single_item_pool("slot", "coin"), 0.25)]);

        let mut hits: u32 = 0;
        let trials: u32 = 10_000;
        for _ in 0..trials {
            hits += u32::try_from(t.select_all(&mut rng, 2.0).len()).unwrap_or(0);
        }
        // Effective chance 0.5; allow a generous window.
        assert!((4500..5500).contains(&hits), "hit {hits}/{trials} times");
    }

    #[test]
    fn multiplier_clamps_at_certainty() {
        let mut rng = SmallRng::seed_from_u64(42);
        let t = table(vec![(single_item_pool("slot", "coin"), 0.5)]);
        for _ in 0..100 {
            assert_eq!(t.select_all(&mut rng, 100.0).len(), 1);
        }
    }

    #[test]
    fn non_finite_multiplier_product_yields_nothing() {
        let mut rng = SmallRng::seed_from_u64(42);
        let t = table(vec![(single_item_pool("slot", "coin"), 0.5)]);
        assert!(t.select_all(&mut rng, f64::NAN).is_empty());
    }

    #[test]
    fn merge_overlays_weights_and_keeps_base_probability_on_zero() {
        let base = table(vec![(single_item_pool("prizes", "plush"), 0.2)]);
        let overlay = table(vec![(single_item_pool("prizes", "hat"), 0.0)]);

        let merged = base.merge(&overlay);
        let slot = merged.slots.first().unwrap();
        assert_eq!(slot.probability, 0.2);
        assert_eq!(slot.pool.entries.len(), 2);
        assert_eq!(base.slots.first().unwrap().pool.entries.len(), 1);
    }

    #[test]
    fn merge_replaces_probability_when_overlay_sets_one() {
        let base = table(vec![(single_item_pool("prizes", "plush"), 0.2)]);
        let overlay = table(vec![(Pool::empty("prizes"), 0.9)]);

        let merged = base.merge(&overlay);
        assert_eq!(merged.slots.first().unwrap().probability, 0.9);
    }

    #[test]
    fn merge_appends_slots_unique_to_the_overlay() {
        let base = table(vec![(single_item_pool("prizes", "plush"), 0.2)]);
        let overlay = table(vec![(single_item_pool("festive", "lantern"), 0.4)]);

        let merged = base.merge(&overlay);
        assert_eq!(merged.slots.len(), 2);
    }

    #[test]
    fn validation_rejects_out_of_range_probability() {
        let bad = table(vec![(single_item_pool("prizes", "plush"), 1.5)]);
        assert!(matches!(
            bad.validate(),
            Err(PoolError::InvalidProbability { .. })
        ));
        let good = table(vec![(single_item_pool("prizes", "plush"), 0.5)]);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn tables_round_trip_through_store_values() {
        let t = table(vec![(single_item_pool("prizes", "plush"), 0.2)]);
        let value = t.to_value().unwrap();
        let back = PoolTable::from_value(&value).unwrap();
        assert_eq!(back, t);
    }
}
