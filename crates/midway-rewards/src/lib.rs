//! Currency wallet and reward dispatch for the Midway service.
//!
//! Everything a feature needs to pay a user funnels through this crate.
//! Balances are plain signed integers in one durable store unit; every
//! change goes through an atomic read-modify-write, so two features
//! paying the same user at the same time never lose an update.
//!
//! # Architecture
//!
//! - [`wallet`] -- The [`Wallet`]: balance reads, policy-checked grants,
//!   and the capped audit log.
//! - [`stats`] -- Per-[`RewardSource`](midway_types::RewardSource)
//!   totals, for answering "how much does each feature inject".
//! - [`drops`] -- The periodic drop cycle: roll a table, pay the hits.
//!
//! # Grant policy
//!
//! Balances may legitimately go negative (an operator correction), but
//! a purchase must not overdraw. [`GrantPolicy`] makes the caller
//! choose: `Checked` refuses any grant whose resulting balance would be
//! negative and reports the refusal as a [`GrantOutcome`], not an
//! error; `AllowNegative` is the explicit opt-out used by payouts.

pub mod drops;
pub mod stats;
pub mod wallet;

pub use drops::{AwardedDrop, PayoutSchedule, run_drop_cycle, scale_amount};
pub use stats::{SOURCE_STATS_KEY, SourceTotals, record_source_stat, source_totals};
pub use wallet::{
    BALANCES_KEY, GRANT_LOG_KEY, GrantOutcome, GrantPolicy, GrantRecord, RewardError, Wallet,
};
