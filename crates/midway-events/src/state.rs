//! Per-track persisted event state.
//!
//! Each track owns exactly one durable unit (`event_passive` or
//! `event_challenge`) holding the live event, its payload, the buffered
//! next event, and the day's messaging handles. Everything the
//! scheduler must remember across a restart lives here.

use midway_store::{Store, StoreError};
use midway_types::{MessageHandle, ThreadHandle, Track, ValueMap};
use serde::{Deserialize, Serialize};

use crate::variant::VariantSpec;

/// Everything one track persists about its events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    /// The event currently live on the track.
    #[serde(default)]
    pub current: Option<VariantSpec>,

    /// Live payload of the current event.
    #[serde(default)]
    pub data: ValueMap,

    /// The event prepared ahead of the next boundary.
    #[serde(default)]
    pub buffered: Option<VariantSpec>,

    /// Prepared payload for the buffered event.
    #[serde(default)]
    pub buffered_data: ValueMap,

    /// Handle of the day's announcement message, once sent.
    #[serde(default)]
    pub announcement: Option<MessageHandle>,

    /// Handle of the day's discussion thread, once opened.
    #[serde(default)]
    pub thread: Option<ThreadHandle>,
}

impl TrackState {
    /// Load a track's state; an absent unit reads as the default state.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the unit exists but does not
    /// decode; callers decide whether that is fatal.
    pub fn load(store: &Store, track: Track) -> Result<Self, StoreError> {
        Ok(store.load(track.store_key())?.unwrap_or_default())
    }

    /// Persist this state as the track's unit.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the write fails.
    pub fn save(&self, store: &Store, track: Track) -> Result<(), StoreError> {
        store.save(track.store_key(), self)
    }
}
