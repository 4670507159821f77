//! Shared operation context handed to event variants.
//!
//! Variants never touch the store, wallet, or messenger directly; they
//! go through an [`EventCx`] scoped to one track. The context enforces
//! the messaging protocol that keeps restarts clean:
//!
//! - [`EventCx::announce_once`] and [`EventCx::thread_once`] persist
//!   the platform handle immediately after the send, and re-check the
//!   persisted state first, so a crash between send and save costs at
//!   most one duplicate and a re-run costs none.
//! - [`EventCx::update_data`] rewrites the live payload under the
//!   store's unit lock, so concurrent ticket sales and clue openings
//!   serialize instead of clobbering each other.

use midway_rewards::Wallet;
use midway_store::{Proxy, Store};
use midway_types::{ChannelId, MessageHandle, ThreadHandle, Track, Value, ValueMap};
use tracing::debug;

use crate::config::EventsConfig;
use crate::messenger::{Messenger, MessengerError};
use crate::state::TrackState;
use crate::variant::EventError;

/// Context for payload preparation: configuration only, no live
/// surfaces. Preparation happens ahead of time (buffering) and must
/// not send messages or move currency.
pub struct PrepareCx<'a> {
    /// Track the payload is being prepared for.
    pub track: Track,
    /// Service configuration.
    pub config: &'a EventsConfig,
}

/// Context for live event operations on one track.
pub struct EventCx<'a, M: Messenger> {
    track: Track,
    store: &'a Store,
    messenger: &'a M,
    config: &'a EventsConfig,
    wallet: &'a Wallet,
}

impl<'a, M: Messenger> EventCx<'a, M> {
    pub(crate) const fn new(
        track: Track,
        store: &'a Store,
        messenger: &'a M,
        config: &'a EventsConfig,
        wallet: &'a Wallet,
    ) -> Self {
        Self {
            track,
            store,
            messenger,
            config,
            wallet,
        }
    }

    /// The track this context operates on.
    #[must_use]
    pub const fn track(&self) -> Track {
        self.track
    }

    /// The persistent store.
    #[must_use]
    pub const fn store(&self) -> &Store {
        self.store
    }

    /// The wallet for grants and charges.
    #[must_use]
    pub const fn wallet(&self) -> &Wallet {
        self.wallet
    }

    /// Service configuration.
    #[must_use]
    pub const fn config(&self) -> &EventsConfig {
        self.config
    }

    /// The announcement channel configured for this track.
    #[must_use]
    pub fn channel(&self) -> ChannelId {
        self.config.channels.for_track(self.track)
    }

    /// Load the track's persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error when the state unit does not decode.
    pub fn state(&self) -> Result<TrackState, EventError> {
        Ok(TrackState::load(self.store, self.track)?)
    }

    /// Proxy over the live payload subtree of the track unit.
    #[must_use]
    pub fn live_data(&self) -> Proxy {
        self.store.proxy(self.track.store_key()).child("data")
    }

    /// Atomically rewrite the live payload under the unit lock.
    ///
    /// The closure sees the current payload map (empty when absent or
    /// misshapen) and its return value passes through.
    ///
    /// # Errors
    ///
    /// Returns an error when the rewritten unit cannot be persisted.
    pub fn update_data<T>(&self, op: impl FnOnce(&mut ValueMap) -> T) -> Result<T, EventError> {
        let result = self.store.update(self.track.store_key(), move |value| {
            let mut state = match std::mem::take(value) {
                Value::Map(map) => map,
                _ => ValueMap::new(),
            };
            let mut data = match state.remove("data") {
                Some(Value::Map(map)) => map,
                _ => ValueMap::new(),
            };
            let result = op(&mut data);
            state.insert("data".to_owned(), Value::Map(data));
            *value = Value::Map(state);
            result
        })?;
        Ok(result)
    }

    /// Send the day's announcement, at most once.
    ///
    /// Returns the already-persisted handle when the announcement was
    /// sent earlier (including by a previous process). Otherwise sends
    /// and persists the handle before returning.
    ///
    /// # Errors
    ///
    /// Returns an error when the send or the handle write fails.
    pub async fn announce_once(&self, content: &str) -> Result<MessageHandle, EventError> {
        if let Some(handle) = self.state()?.announcement {
            debug!(track = %self.track, handle = %handle, "Announcement already sent");
            return Ok(handle);
        }
        let handle = self.messenger.send(&self.channel(), content).await?;
        self.persist_handle("announcement", handle.as_str())?;
        Ok(handle)
    }

    /// Open the day's discussion thread, at most once.
    ///
    /// Requires the announcement to exist already; the thread hangs
    /// off it.
    ///
    /// # Errors
    ///
    /// Returns an error when no announcement exists yet, or when the
    /// open or the handle write fails.
    pub async fn thread_once(&self, title: &str) -> Result<ThreadHandle, EventError> {
        let state = self.state()?;
        if let Some(handle) = state.thread {
            debug!(track = %self.track, handle = %handle, "Thread already open");
            return Ok(handle);
        }
        let Some(announcement) = state.announcement else {
            return Err(EventError::Messenger(MessengerError::Thread {
                reason: "no announcement to attach the thread to".to_owned(),
            }));
        };
        let handle = self.messenger.open_thread(&announcement, title).await?;
        self.persist_handle("thread", handle.as_str())?;
        Ok(handle)
    }

    /// Rewrite the day's announcement, if one was sent.
    ///
    /// A missing announcement is not an error; there is nothing to
    /// edit on a day that never announced.
    ///
    /// # Errors
    ///
    /// Returns an error when the state read or the edit fails.
    pub async fn edit_announcement(&self, content: &str) -> Result<(), EventError> {
        match self.state()?.announcement {
            Some(message) => Ok(self.messenger.edit(&message, content).await?),
            None => {
                debug!(track = %self.track, "No announcement to edit");
                Ok(())
            }
        }
    }

    /// Post into the day's thread, if one is open.
    ///
    /// # Errors
    ///
    /// Returns an error when the state read or the send fails.
    pub async fn post_in_thread(&self, content: &str) -> Result<(), EventError> {
        match self.state()?.thread {
            Some(thread) => Ok(self.messenger.send_in_thread(&thread, content).await?),
            None => {
                debug!(track = %self.track, "No thread; dropping post");
                Ok(())
            }
        }
    }

    /// Archive the day's thread, if one is open.
    ///
    /// # Errors
    ///
    /// Returns an error when the state read or the archive call fails.
    pub async fn archive_thread(&self) -> Result<(), EventError> {
        match self.state()?.thread {
            Some(thread) => Ok(self.messenger.archive_thread(&thread).await?),
            None => Ok(()),
        }
    }

    // Writes a single handle field without touching the rest of the
    // unit; a whole-state save here could clobber a concurrent
    // payload update.
    fn persist_handle(&self, field: &str, raw: &str) -> Result<(), EventError> {
        let field = field.to_owned();
        let raw = raw.to_owned();
        self.store.update(self.track.store_key(), move |value| {
            let mut state = match std::mem::take(value) {
                Value::Map(map) => map,
                _ => ValueMap::new(),
            };
            state.insert(field, Value::Str(raw));
            *value = Value::Map(state);
        })?;
        Ok(())
    }
}
