//! Periodic drop cycle.
//!
//! One cycle rolls every slot of a drop table, pays the winning items
//! through the wallet, and records the totals. The caller supplies the
//! table and the active modifiers (normally the live event's merged
//! table) so this module stays free of lifecycle knowledge.

use midway_pools::PoolTable;
use midway_types::{RewardModifiers, RewardSource, UserId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::stats::record_source_stat;
use crate::wallet::{GrantPolicy, RewardError, Wallet};

/// Currency amounts per dropped item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSchedule {
    /// Per-item overrides.
    #[serde(default)]
    pub amounts: BTreeMap<String, i64>,
    /// Amount paid for items without an override.
    #[serde(default = "default_payout")]
    pub default: i64,
}

impl PayoutSchedule {
    /// The amount paid for `item`.
    pub fn amount_for(&self, item: &str) -> i64 {
        self.amounts.get(item).copied().unwrap_or(self.default)
    }
}

impl Default for PayoutSchedule {
    fn default() -> Self {
        Self {
            amounts: BTreeMap::new(),
            default: default_payout(),
        }
    }
}

// -------------------------------------------------------------------------
// Defaults
// -------------------------------------------------------------------------

const fn default_payout() -> i64 {
    10
}

/// One paid drop from a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardedDrop {
    /// The slot the drop came from.
    pub pool: String,
    /// The item that was selected.
    pub item: String,
    /// The amount paid, after payout scaling.
    pub amount: i64,
}

/// Roll `table` once for `user` and pay every hit.
///
/// `modifiers.probability` scales each slot's drop chance and
/// `modifiers.payout` scales each paid amount. Payouts always apply
/// regardless of the current balance. Returns the paid drops for the
/// caller to announce.
///
/// # Errors
///
/// Returns [`RewardError::Store`] when a balance or stats write fails.
pub fn run_drop_cycle(
    wallet: &Wallet,
    table: &PoolTable,
    modifiers: RewardModifiers,
    payouts: &PayoutSchedule,
    user: &UserId,
    rng: &mut impl Rng,
) -> Result<Vec<AwardedDrop>, RewardError> {
    let hits = table.select_all(rng, modifiers.probability);
    let mut awarded = Vec::with_capacity(hits.len());
    for hit in hits {
        let amount = scale_amount(payouts.amount_for(&hit.item), modifiers.payout);
        wallet.grant(user, amount, RewardSource::Drop, GrantPolicy::AllowNegative)?;
        record_source_stat(wallet.store(), RewardSource::Drop, amount)?;
        debug!(user = %user, pool = %hit.pool, item = %hit.item, amount, "Drop awarded");
        awarded.push(AwardedDrop {
            pool: hit.pool,
            item: hit.item,
            amount,
        });
    }
    Ok(awarded)
}

/// Scale a base amount by a payout multiplier, rounding to the nearest
/// whole unit.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn scale_amount(amount: i64, multiplier: f64) -> i64 {
    (amount as f64 * multiplier).round() as i64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use midway_pools::{Pool, PoolEntry, PoolSlot, WeightedEntry};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use crate::stats::source_totals;

    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("duration")
            .as_nanos();
        std::env::temp_dir().join(format!("midway-drops-tests-{prefix}-{unique}"))
    }

    fn certain_table(item: &str) -> PoolTable {
        PoolTable {
            slots: vec![PoolSlot {
                pool: Pool {
                    name: "commons".to_owned(),
                    entries: vec![WeightedEntry {
                        entry: PoolEntry::Item(item.to_owned()),
                        weight: 1,
                    }],
                },
                probability: 1.0,
            }],
        }
    }

    #[test]
    fn certain_drop_pays_and_records() {
        let dir = temp_dir("certain");
        let wallet = Wallet::new(midway_store::Store::open(&dir).unwrap());
        let user = UserId::from("u1");
        let mut rng = SmallRng::seed_from_u64(7);

        let awarded = run_drop_cycle(
            &wallet,
            &certain_table("plush"),
            RewardModifiers::IDENTITY,
            &PayoutSchedule::default(),
            &user,
            &mut rng,
        )
        .unwrap();

        assert_eq!(
            awarded,
            vec![AwardedDrop {
                pool: "commons".to_owned(),
                item: "plush".to_owned(),
                amount: 10,
            }]
        );
        assert_eq!(wallet.balance(&user), 10);
        let totals = source_totals(wallet.store(), RewardSource::Drop);
        assert_eq!(totals.count, 1);
        assert_eq!(totals.total, 10);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn payout_multiplier_scales_the_amount() {
        let dir = temp_dir("scaled");
        let wallet = Wallet::new(midway_store::Store::open(&dir).unwrap());
        let user = UserId::from("u1");
        let mut rng = SmallRng::seed_from_u64(7);

        let modifiers = RewardModifiers {
            probability: 1.0,
            payout: 1.5,
        };
        let awarded = run_drop_cycle(
            &wallet,
            &certain_table("plush"),
            modifiers,
            &PayoutSchedule::default(),
            &user,
            &mut rng,
        )
        .unwrap();

        assert_eq!(awarded.first().unwrap().amount, 15);
        assert_eq!(wallet.balance(&user), 15);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn zero_probability_multiplier_silences_the_table() {
        let dir = temp_dir("silent");
        let wallet = Wallet::new(midway_store::Store::open(&dir).unwrap());
        let user = UserId::from("u1");
        let mut rng = SmallRng::seed_from_u64(7);

        let modifiers = RewardModifiers {
            probability: 0.0,
            payout: 1.0,
        };
        let awarded = run_drop_cycle(
            &wallet,
            &certain_table("plush"),
            modifiers,
            &PayoutSchedule::default(),
            &user,
            &mut rng,
        )
        .unwrap();

        assert!(awarded.is_empty());
        assert_eq!(wallet.balance(&user), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn per_item_payout_overrides_the_default() {
        let schedule = PayoutSchedule {
            amounts: BTreeMap::from([("gem".to_owned(), 25)]),
            default: 10,
        };
        assert_eq!(schedule.amount_for("gem"), 25);
        assert_eq!(schedule.amount_for("plush"), 10);
    }
}
