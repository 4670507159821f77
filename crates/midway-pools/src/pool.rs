//! Weighted prize pools with recursive sub-pools.
//!
//! A pool is a named list of weighted entries. Weights are summed and a
//! random value in `[0, total_weight)` selects the entry; an entry may be
//! a concrete item or a nested pool, in which case selection recurses.
//!
//! # Merging
//!
//! Pools merge additively: entries present in both sides (matched by kind
//! and name) have their weights summed, entries unique to either side are
//! kept, and matched sub-pools merge recursively. Merging never mutates
//! its inputs -- an event overlay applied to the base economy produces a
//! third table and the base survives the event unchanged.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// What a pool entry yields when selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolEntry {
    /// A concrete item identifier.
    Item(String),
    /// A nested pool drawn from recursively.
    Sub(Pool),
}

impl PoolEntry {
    /// Merge identity: entries match when both kind and name agree.
    fn identity(&self) -> (&'static str, &str) {
        match self {
            Self::Item(name) => ("item", name),
            Self::Sub(pool) => ("sub", &pool.name),
        }
    }
}

/// A weighted entry inside a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedEntry {
    /// What this entry yields.
    pub entry: PoolEntry,
    /// Relative selection weight; zero disables the entry.
    pub weight: u32,
}

/// A named collection of weighted entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Name used for merge matching and drop reporting.
    pub name: String,
    /// Weighted entries; order does not affect the distribution.
    pub entries: Vec<WeightedEntry>,
}

impl Pool {
    /// A pool with no entries, as a merge and test convenience.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Sum of all entry weights.
    pub fn total_weight(&self) -> u32 {
        let mut total: u32 = 0;
        for weighted in &self.entries {
            total = total.saturating_add(weighted.weight);
        }
        total
    }

    /// True when no entry can be selected.
    pub fn is_empty(&self) -> bool {
        self.total_weight() == 0
    }

    /// Draw one item, recursing through sub-pools.
    ///
    /// Returns `None` when the pool is empty, every weight is zero, or
    /// the selected sub-pool is itself empty.
    pub fn select_one(&self, rng: &mut impl Rng) -> Option<&str> {
        let total = self.total_weight();
        if total == 0 {
            return None;
        }
        let roll = rng.random_range(0..total);
        let mut cumulative: u32 = 0;
        for weighted in &self.entries {
            cumulative = cumulative.saturating_add(weighted.weight);
            if roll < cumulative {
                return match &weighted.entry {
                    PoolEntry::Item(item) => Some(item.as_str()),
                    PoolEntry::Sub(pool) => pool.select_one(rng),
                };
            }
        }
        None
    }

    /// Combine this pool with an overlay, additively.
    ///
    /// Matched entries (same kind and name) sum their weights; matched
    /// sub-pools also merge their contents. Entries unique to either
    /// side are kept as-is. Neither input is mutated.
    #[must_use]
    pub fn merge(&self, overlay: &Self) -> Self {
        let mut entries = self.entries.clone();
        for extra in &overlay.entries {
            let slot = entries
                .iter_mut()
                .find(|existing| existing.entry.identity() == extra.entry.identity());
            match slot {
                Some(existing) => {
                    existing.weight = existing.weight.saturating_add(extra.weight);
                    if let (PoolEntry::Sub(base_sub), PoolEntry::Sub(extra_sub)) =
                        (&mut existing.entry, &extra.entry)
                    {
                        *base_sub = base_sub.merge(extra_sub);
                    }
                }
                None => entries.push(extra.clone()),
            }
        }
        Self {
            name: self.name.clone(),
            entries,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::panic)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn item(name: &str, weight: u32) -> WeightedEntry {
        WeightedEntry {
            entry: PoolEntry::Item(name.to_owned()),
            weight,
        }
    }

    fn sub(pool: Pool, weight: u32) -> WeightedEntry {
        WeightedEntry {
            entry: PoolEntry::Sub(pool),
            weight,
        }
    }

    fn pool(name: &str, entries: Vec<WeightedEntry>) -> Pool {
        Pool {
            name: name.to_owned(),
            entries,
        }
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let mut rng = SmallRng::seed_from_u64(42);
        assert!(Pool::empty("prizes").select_one(&mut rng).is_none());
        let zeroed = pool("prizes", vec![item("plush", 0)]);
        assert!(zeroed.select_one(&mut rng).is_none());
        assert!(zeroed.is_empty());
    }

    #[test]
    fn single_entry_is_always_selected() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = pool("prizes", vec![item("plush", 5)]);
        for _ in 0..50 {
            assert_eq!(p.select_one(&mut rng), Some("plush"));
        }
    }

    #[test]
    fn distribution_follows_weights() {
        let mut rng = SmallRng::seed_from_u64(42);
        let p = pool("prizes", vec![item("common", 3), item("rare", 1)]);

        let mut common: u32 = 0;
        let total: u32 = 10_000;
        for _ in 0..total {
            if p.select_one(&mut rng) == Some("common") {
                common += 1;
            }
        }
        // Expect roughly 75%; allow a generous window.
        assert!(
            (7000..8000).contains(&common),
            "common selected {common}/{total} times"
        );
    }

    #[test]
    fn sub_pools_are_drawn_recursively() {
        let mut rng = SmallRng::seed_from_u64(42);
        let inner = pool("inner", vec![item("ticket", 1)]);
        let outer = pool("outer", vec![sub(inner, 1)]);
        assert_eq!(outer.select_one(&mut rng), Some("ticket"));
    }

    #[test]
    fn empty_sub_pool_yields_none() {
        let mut rng = SmallRng::seed_from_u64(42);
        let outer = pool("outer", vec![sub(Pool::empty("inner"), 1)]);
        assert!(outer.select_one(&mut rng).is_none());
    }

    #[test]
    fn merge_sums_matched_weights_and_keeps_the_rest() {
        let base = pool("prizes", vec![item("plush", 1), item("pin", 2)]);
        let overlay = pool("prizes", vec![item("plush", 2), item("hat", 4)]);

        let merged = base.merge(&overlay);
        let weight_of = |name: &str| {
            merged
                .entries
                .iter()
                .find(|w| w.entry.identity() == ("item", name))
                .map(|w| w.weight)
        };
        assert_eq!(weight_of("plush"), Some(3));
        assert_eq!(weight_of("pin"), Some(2));
        assert_eq!(weight_of("hat"), Some(4));
    }

    #[test]
    fn merge_does_not_mutate_its_inputs() {
        let base = pool("prizes", vec![item("plush", 1)]);
        let overlay = pool("prizes", vec![item("plush", 2)]);
        let base_before = base.clone();
        let overlay_before = overlay.clone();

        let _ = base.merge(&overlay);
        assert_eq!(base, base_before);
        assert_eq!(overlay, overlay_before);
    }

    #[test]
    fn merge_recurses_into_matched_sub_pools() {
        let base = pool("outer", vec![sub(pool("inner", vec![item("a", 1)]), 1)]);
        let overlay = pool("outer", vec![sub(pool("inner", vec![item("b", 5)]), 1)]);

        let merged = base.merge(&overlay);
        let PoolEntry::Sub(inner) = &merged.entries.first().unwrap().entry else {
            panic!("expected sub-pool");
        };
        assert_eq!(inner.entries.len(), 2);
        assert_eq!(merged.entries.first().unwrap().weight, 2);
    }

    #[test]
    fn serde_form_is_stable() {
        let p = pool("prizes", vec![item("plush", 3)]);
        let text = serde_json::to_string(&p).unwrap();
        assert!(text.contains("\"item\":\"plush\""), "serialized: {text}");
        let back: Pool = serde_json::from_str(&text).unwrap();
        assert_eq!(back, p);
    }
}
