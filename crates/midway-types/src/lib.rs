//! Shared type definitions for the Midway event service.
//!
//! This crate is the single source of truth for the vocabulary used across
//! the Midway workspace: the JSON-like [`Value`] tree stored durably by
//! `midway-store`, the opaque platform handles minted by the messaging
//! layer, and the closed enumerations the scheduler and reward paths
//! dispatch on.
//!
//! # Modules
//!
//! - [`value`] -- The recursive [`Value`] tree and its JSON bridge
//! - [`ids`] -- Opaque platform handles and internally minted identifiers
//! - [`enums`] -- Closed enumerations (tracks, reward sources)
//! - [`modifiers`] -- Reward multipliers contributed by active events

pub mod enums;
pub mod ids;
pub mod modifiers;
pub mod value;

// Re-export all public types at crate root for convenience.
pub use enums::{RewardSource, Track};
pub use ids::{ChannelId, GrantId, MessageHandle, ThreadHandle, UserId};
pub use modifiers::RewardModifiers;
pub use value::{Value, ValueMap};
