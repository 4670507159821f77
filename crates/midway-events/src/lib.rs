//! Daily event lifecycle scheduler for the Midway event service.
//!
//! Two tracks of daily events run side by side: a passive track whose
//! events quietly reshape the drop economy, and a challenge track
//! whose events users actively play. Every day at a configured
//! boundary both tracks settle, promote their next event, and
//! announce it; between boundaries, interested events act on a tick
//! cadence and the next day's events are prepared ahead of time.
//!
//! # Architecture
//!
//! - [`clock`] -- the daily boundary: next/previous boundary instants,
//!   calendar stamps, and the preparation margin window.
//! - [`config`] -- YAML configuration with validation; a config that
//!   loads is a config the scheduler can run.
//! - [`variant`] -- the closed event registry: persisted specs in,
//!   runnable variants out, unknown tags rejected.
//! - [`variants`] -- the concrete events: boost, raffle, hunt, and
//!   date-gated specials.
//! - [`context`] -- the per-track operation context variants run
//!   against, carrying the idempotent announce/thread protocol.
//! - [`state`] -- the per-track persisted unit.
//! - [`latch`] -- the buffer-readiness latch coordinating preparation
//!   with the reset.
//! - [`lifecycle`] -- the scheduler itself, driven by a single `tick`
//!   entry point.
//! - [`messenger`] -- the platform messaging contract and the offline
//!   null implementation.
//!
//! # Restart stance
//!
//! All scheduler state is derived from the store on demand; nothing
//! meaningful lives only in memory. A process restarted mid-day picks
//! up the same current events, the same buffers, and the same
//! announcement handles, and a reset owed from downtime runs exactly
//! once on the first tick after.

pub mod clock;
pub mod config;
pub mod context;
pub mod latch;
pub mod lifecycle;
pub mod messenger;
pub mod state;
pub mod variant;
pub mod variants;

pub use clock::{ClockError, ResetClock};
pub use config::{ConfigError, EventsConfig};
pub use context::{EventCx, PrepareCx};
pub use latch::BufferLatch;
pub use lifecycle::{EventLifecycle, LAST_RESET_KEY, LifecycleError, TickReport};
pub use messenger::{Messenger, MessengerError, NullMessenger};
pub use state::TrackState;
pub use variant::{EventError, EventVariant, VariantError, VariantSpec};
pub use variants::{
    BoostEvent, HuntEvent, RaffleEvent, SolveOutcome, SpecialEvent, TicketPurchase,
};
