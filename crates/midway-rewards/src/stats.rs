//! Per-source grant statistics.
//!
//! A small rollup kept next to the balances: for each [`RewardSource`]
//! we track how many grants it produced and their signed total. The
//! rollup answers "how much currency does each feature inject" without
//! replaying the audit log.

use midway_store::Store;
use midway_types::{RewardSource, Value, ValueMap};

use crate::wallet::RewardError;

/// Durable unit holding the per-source rollup.
pub const SOURCE_STATS_KEY: &str = "source_stats";

/// Accumulated totals for one reward source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceTotals {
    /// Number of grants recorded.
    pub count: i64,
    /// Signed sum of the recorded amounts.
    pub total: i64,
}

/// Record one grant of `amount` against `source`.
///
/// # Errors
///
/// Returns [`RewardError::Store`] when the stats unit cannot be
/// persisted.
pub fn record_source_stat(
    store: &Store,
    source: RewardSource,
    amount: i64,
) -> Result<(), RewardError> {
    store.update(SOURCE_STATS_KEY, move |value| {
        let mut stats = match std::mem::take(value) {
            Value::Map(map) => map,
            _ => ValueMap::new(),
        };
        let mut entry = match stats.remove(source.as_str()) {
            Some(Value::Map(map)) => map,
            _ => ValueMap::new(),
        };
        let count = entry.get("count").and_then(Value::as_int).unwrap_or(0);
        let total = entry.get("total").and_then(Value::as_int).unwrap_or(0);
        entry.insert("count".to_owned(), Value::Int(count.saturating_add(1)));
        entry.insert(
            "total".to_owned(),
            Value::Int(total.saturating_add(amount)),
        );
        stats.insert(source.as_str().to_owned(), Value::Map(entry));
        *value = Value::Map(stats);
    })?;
    Ok(())
}

/// Read the rollup for `source`; zeroes when nothing was recorded.
pub fn source_totals(store: &Store, source: RewardSource) -> SourceTotals {
    store
        .get(SOURCE_STATS_KEY)
        .as_ref()
        .and_then(Value::as_map)
        .and_then(|stats| stats.get(source.as_str()))
        .and_then(Value::as_map)
        .map_or_else(SourceTotals::default, |entry| SourceTotals {
            count: entry.get("count").and_then(Value::as_int).unwrap_or(0),
            total: entry.get("total").and_then(Value::as_int).unwrap_or(0),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("duration")
            .as_nanos();
        std::env::temp_dir().join(format!("midway-stats-tests-{prefix}-{unique}"))
    }

    #[test]
    fn totals_accumulate_per_source() {
        let dir = temp_dir("accumulate");
        let store = Store::open(&dir).unwrap();

        record_source_stat(&store, RewardSource::Drop, 10).unwrap();
        record_source_stat(&store, RewardSource::Drop, 25).unwrap();
        record_source_stat(&store, RewardSource::Raffle, -5).unwrap();

        assert_eq!(
            source_totals(&store, RewardSource::Drop),
            SourceTotals { count: 2, total: 35 }
        );
        assert_eq!(
            source_totals(&store, RewardSource::Raffle),
            SourceTotals { count: 1, total: -5 }
        );
        assert_eq!(
            source_totals(&store, RewardSource::Hunt),
            SourceTotals::default()
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
