//! Currency balances and grants.
//!
//! Balances live in one durable unit (a map of user id to integer
//! amount) and every grant goes through a single atomic read-modify-
//! write of that unit, so concurrent grants never lose updates. A
//! checked grant that would push a balance negative is refused as an
//! outcome, not an error -- callers decide what a refusal means.
//!
//! Applied grants append to a capped audit log in a second unit, so an
//! operator can always answer "where did this balance come from".

use chrono::{DateTime, Utc};
use midway_store::{Store, StoreError};
use midway_types::{GrantId, RewardSource, UserId, Value, ValueMap};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Durable unit holding the user id to balance map.
pub const BALANCES_KEY: &str = "balances";

/// Durable unit holding the rolling grant audit log.
pub const GRANT_LOG_KEY: &str = "grant_log";

/// Maximum audit records kept; older entries roll off.
const GRANT_LOG_CAP: usize = 500;

/// Errors that can occur in the reward layer.
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    /// The underlying store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Whether a grant may push the balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantPolicy {
    /// Refuse the grant when the resulting balance would be negative.
    Checked,
    /// Apply the grant regardless of the resulting balance.
    AllowNegative,
}

/// Result of a grant attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The balance changed.
    Applied {
        /// The balance after the grant.
        new_balance: i64,
    },
    /// A checked grant was refused; nothing changed.
    InsufficientFunds {
        /// The balance at the time of refusal.
        balance: i64,
    },
}

impl GrantOutcome {
    /// True when the grant changed the balance.
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// One entry of the grant audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    /// Time-ordered record identifier.
    pub id: GrantId,
    /// Recipient of the grant.
    pub user: UserId,
    /// Signed amount applied to the balance.
    pub amount: i64,
    /// Where the grant came from.
    pub source: RewardSource,
    /// When the grant was applied.
    pub at: DateTime<Utc>,
}

/// Handle over the store for balance operations. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Wallet {
    store: Store,
}

impl Wallet {
    /// Wrap a store handle.
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// The store this wallet writes through.
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Current balance of `user`; absent users read as zero.
    pub fn balance(&self, user: &UserId) -> i64 {
        self.store
            .get(BALANCES_KEY)
            .as_ref()
            .and_then(Value::as_map)
            .and_then(|map| map.get(user.as_str()))
            .and_then(Value::as_int)
            .unwrap_or(0)
    }

    /// Apply a signed grant to `user`.
    ///
    /// The read, the policy check, and the write happen inside one
    /// atomic store update, so a refused grant observes a consistent
    /// balance and concurrent grants serialize without lost updates.
    /// Applied grants are appended to the audit log.
    ///
    /// # Errors
    ///
    /// Returns [`RewardError::Store`] when the balance unit cannot be
    /// persisted. A refusal is a [`GrantOutcome::InsufficientFunds`]
    /// outcome, never an error.
    pub fn grant(
        &self,
        user: &UserId,
        amount: i64,
        source: RewardSource,
        policy: GrantPolicy,
    ) -> Result<GrantOutcome, RewardError> {
        let key = user.as_str().to_owned();
        let outcome = self.store.update(BALANCES_KEY, move |value| {
            let mut balances = match std::mem::take(value) {
                Value::Map(map) => map,
                _ => ValueMap::new(),
            };
            let current = balances.get(&key).and_then(Value::as_int).unwrap_or(0);
            let next = current.saturating_add(amount);

            let outcome = if policy == GrantPolicy::Checked && next < 0 {
                GrantOutcome::InsufficientFunds { balance: current }
            } else {
                balances.insert(key, Value::Int(next));
                GrantOutcome::Applied { new_balance: next }
            };
            *value = Value::Map(balances);
            outcome
        })?;

        if let GrantOutcome::Applied { new_balance } = outcome {
            self.append_audit(&GrantRecord {
                id: GrantId::new(),
                user: user.clone(),
                amount,
                source,
                at: Utc::now(),
            })?;
            debug!(user = %user, amount, source = %source, new_balance, "Currency granted");
        } else {
            debug!(user = %user, amount, source = %source, "Checked grant refused");
        }
        Ok(outcome)
    }

    /// The audit log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RewardError::Store`] when the log unit does not decode.
    pub fn audit_log(&self) -> Result<Vec<GrantRecord>, RewardError> {
        Ok(self.store.load(GRANT_LOG_KEY)?.unwrap_or_default())
    }

    fn append_audit(&self, record: &GrantRecord) -> Result<(), RewardError> {
        let encoded = Value::from(serde_json::to_value(record).map_err(StoreError::from)?);
        self.store.update(GRANT_LOG_KEY, move |value| {
            let mut log = match std::mem::take(value) {
                Value::List(items) => items,
                _ => Vec::new(),
            };
            log.push(encoded);
            let overflow = log.len().saturating_sub(GRANT_LOG_CAP);
            if overflow > 0 {
                log.drain(..overflow);
            }
            *value = Value::List(log);
        })?;
        Ok(())
    }
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
        std::env::temp_dir().join(format!("midway-wallet-tests-{prefix}-{unique}"))
    }

    fn open_wallet(prefix: &str) -> (Wallet, PathBuf) {
        let dir = temp_dir(prefix);
        (Wallet::new(Store::open(&dir).unwrap()), dir)
    }

    #[test]
    fn grants_accumulate_and_persist() {
        let (wallet, dir) = open_wallet("accumulate");
        let user = UserId::from("u1");

        let outcome = wallet
            .grant(&user, 100, RewardSource::Drop, GrantPolicy::Checked)
            .unwrap();
        assert_eq!(outcome, GrantOutcome::Applied { new_balance: 100 });
        let outcome = wallet
            .grant(&user, -30, RewardSource::Raffle, GrantPolicy::Checked)
            .unwrap();
        assert_eq!(outcome, GrantOutcome::Applied { new_balance: 70 });
        assert_eq!(wallet.balance(&user), 70);

        // Visible after reopen: the balance unit is durable.
        let reopened = Wallet::new(Store::open(&dir).unwrap());
        assert_eq!(reopened.balance(&user), 70);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn checked_grant_never_goes_negative() {
        let (wallet, dir) = open_wallet("checked");
        let user = UserId::from("u1");
        wallet
            .grant(&user, 20, RewardSource::Drop, GrantPolicy::Checked)
            .unwrap();

        let outcome = wallet
            .grant(&user, -50, RewardSource::Raffle, GrantPolicy::Checked)
            .unwrap();
        assert_eq!(outcome, GrantOutcome::InsufficientFunds { balance: 20 });
        assert_eq!(wallet.balance(&user), 20);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn explicit_opt_out_allows_negative_balances() {
        let (wallet, dir) = open_wallet("optout");
        let user = UserId::from("u1");

        let outcome = wallet
            .grant(&user, -50, RewardSource::Admin, GrantPolicy::AllowNegative)
            .unwrap();
        assert_eq!(outcome, GrantOutcome::Applied { new_balance: -50 });

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn concurrent_grants_lose_no_updates() {
        let (wallet, dir) = open_wallet("concurrent");
        let user = UserId::from("u1");

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let wallet = wallet.clone();
                let user = user.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        wallet
                            .grant(&user, 1, RewardSource::Drop, GrantPolicy::AllowNegative)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        assert_eq!(wallet.balance(&user), 400);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn applied_grants_are_audited_and_refusals_are_not() {
        let (wallet, dir) = open_wallet("audit");
        let user = UserId::from("u1");

        wallet
            .grant(&user, 10, RewardSource::Hunt, GrantPolicy::Checked)
            .unwrap();
        wallet
            .grant(&user, -99, RewardSource::Raffle, GrantPolicy::Checked)
            .unwrap();

        let log = wallet.audit_log().unwrap();
        assert_eq!(log.len(), 1);
        let record = log.first().unwrap();
        assert_eq!(record.amount, 10);
        assert_eq!(record.source, RewardSource::Hunt);
        assert_eq!(record.user, user);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
