//! Persistent key-value store for the Midway event service.
//!
//! The store maps top-level string keys to JSON-like [`midway_types::Value`]
//! trees. Each top-level key is one durable unit: one JSON file in the data
//! directory, rewritten atomically before any mutating call returns. The
//! in-memory image is authoritative between writes, so reads never touch
//! disk.
//!
//! # Write paths
//!
//! ```text
//! Store::set / Store::update      whole-unit writes, atomic RMW
//!     |
//! Proxy::set_key / push / ...     path-addressed writes inside a unit
//!     |
//!     +-- clone unit -> mutate -> validate -> tmp file -> rename -> commit
//! ```
//!
//! Failed writes (invalid value, bad path, I/O error) leave both memory
//! and disk untouched.
//!
//! # Modules
//!
//! - [`store`] -- The durable store and its unit files
//! - [`proxy`] -- Write-through handles into nested data
//! - [`error`] -- Shared error type

pub mod error;
pub mod proxy;
pub mod store;

// Re-export primary types for convenience.
pub use error::StoreError;
pub use proxy::{Proxy, Segment};
pub use store::Store;
