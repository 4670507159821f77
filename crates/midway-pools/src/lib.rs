//! Weighted prize pools and drop tables for the Midway event service.
//!
//! Two layers:
//!
//! - [`pool::Pool`] -- named weighted entries, possibly nested, drawn
//!   with cumulative weight selection
//! - [`table::PoolTable`] -- per-pool Bernoulli hit chances, run as
//!   independent trials each drop cycle
//!
//! Both layers merge additively and purely, which is how an active
//! event's overlay becomes the effective economy for a day without the
//! configured base ever changing.
//!
//! # Modules
//!
//! - [`pool`] -- Pools, entries, weighted selection, merging
//! - [`table`] -- Drop tables, trials, overlays, value bridging

pub mod pool;
pub mod table;

// Re-export primary types for convenience.
pub use pool::{Pool, PoolEntry, WeightedEntry};
pub use table::{DropResult, PoolError, PoolSlot, PoolTable};
