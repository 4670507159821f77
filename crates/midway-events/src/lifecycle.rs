//! The daily event lifecycle scheduler.
//!
//! One [`EventLifecycle`] instance owns both tracks. Callers drive it
//! by calling [`EventLifecycle::tick`] on a cadence; everything else
//! (step openings, buffer preparation, the daily reset, announcement
//! repair) hangs off that single entry point, in that order.
//!
//! # Reset protocol
//!
//! The reset is keyed by the calendar stamp of the most recent
//! boundary, persisted under [`LAST_RESET_KEY`]. A reset is owed when
//! the persisted stamp is older than the current boundary's stamp --
//! which makes the check restart-proof: a process that was down over
//! the boundary runs exactly one catch-up reset, and a process
//! restarted after a completed reset runs none.
//!
//! In-process, the reset runs under a mutex with the owed-check
//! repeated inside, so concurrent ticks cannot double-settle. The
//! buffer latch is awaited before settling: a preparation pass that is
//! mid-flight finishes (and its event is promoted) rather than being
//! torn.
//!
//! # Failure stance
//!
//! Per-event failures (a tick action, a settlement, an announcement)
//! are logged and contained; they never abort the tick or take down
//! the other track. Store failures on the reset bookkeeping itself
//! propagate, since continuing without them would re-settle the same
//! day forever.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use midway_pools::{Pool, PoolEntry, PoolTable, WeightedEntry};
use midway_rewards::Wallet;
use midway_store::{Store, StoreError};
use midway_types::{RewardModifiers, Track, UserId, Value, ValueMap};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::clock::{ClockError, ResetClock};
use crate::config::{EventsConfig, SpecialDateConfig};
use crate::context::{EventCx, PrepareCx};
use crate::latch::BufferLatch;
use crate::messenger::Messenger;
use crate::state::TrackState;
use crate::variant::{EventError, EventVariant, VariantError, VariantSpec};
use crate::variants::{SolveOutcome, TicketPurchase};

/// Durable unit holding the stamp of the last completed reset.
pub const LAST_RESET_KEY: &str = "last_reset";

/// Errors raised by the lifecycle scheduler.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A store read or write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An event operation failed.
    #[error("event error: {0}")]
    Event(#[from] EventError),

    /// A persisted spec or rotation tag failed to resolve.
    #[error("variant error: {0}")]
    Variant(#[from] VariantError),

    /// The schedule could not produce a boundary.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),
}

/// What one tick pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick actions that ran successfully.
    pub ticked: u32,
    /// Tick actions that failed (logged, not fatal).
    pub tick_errors: u32,
    /// True when this pass won the preparation latch and filled buffers.
    pub buffers_filled: bool,
    /// True when this pass ran the daily reset.
    pub reset_ran: bool,
}

/// The scheduler owning both event tracks.
///
/// Cheap to share behind an [`std::sync::Arc`]; every method takes
/// `&self` and internal coordination (reset mutex, buffer latch) is
/// carried by the instance.
pub struct EventLifecycle<M: Messenger> {
    store: Store,
    messenger: M,
    config: EventsConfig,
    clock: ResetClock,
    wallet: Wallet,
    reset_lock: Mutex<()>,
    buffer_latch: BufferLatch,
}

impl<M: Messenger> EventLifecycle<M> {
    /// Build a lifecycle over a store, a messenger, and a validated
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Clock`] when the configured reset
    /// time is not a valid hour and minute.
    pub fn new(store: Store, messenger: M, config: EventsConfig) -> Result<Self, LifecycleError> {
        let clock = ResetClock::new(config.schedule.reset_hour, config.schedule.reset_minute)?;
        let wallet = Wallet::new(store.clone());
        Ok(Self {
            store,
            messenger,
            config,
            clock,
            wallet,
            reset_lock: Mutex::new(()),
            buffer_latch: BufferLatch::new(),
        })
    }

    /// Run one scheduler pass at `now`.
    ///
    /// In order: tick actions for interested events, buffer
    /// preparation when inside the margin window, the daily reset when
    /// one is owed, and opening repair. Safe to call from concurrent
    /// tasks; the reset runs at most once per day regardless.
    ///
    /// # Errors
    ///
    /// Returns an error when the clock cannot place `now` or when the
    /// reset bookkeeping cannot be persisted. Per-event failures are
    /// logged and counted in the report instead.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<TickReport, LifecycleError> {
        let mut report = TickReport::default();

        self.run_tick_actions(&mut report).await;

        let margin = Duration::seconds(
            i64::try_from(self.config.schedule.preparation_margin_secs).unwrap_or(i64::MAX),
        );
        if self.clock.within_margin(now, margin)? {
            report.buffers_filled = self.fill_empty_buffers(rng)?;
        }

        let stamp = ResetClock::stamp(self.clock.previous_boundary(now)?);
        if self.reset_owed(stamp)? {
            let _guard = self.reset_lock.lock().await;
            // Re-check under the lock: another tick may have run the
            // reset while this one waited.
            if self.reset_owed(stamp)? {
                self.buffer_latch.wait_ready().await;
                self.run_reset(stamp, rng).await?;
                report.reset_ran = true;
            }
        }

        self.repair_openings().await;

        Ok(report)
    }

    // --- Read surface ---

    /// The current event on `track`, if one is live and readable.
    ///
    /// An unreadable unit or an unknown tag is logged and reported as
    /// no event; the next reset overwrites the bad state.
    pub fn current_event(&self, track: Track) -> Option<EventVariant> {
        self.decode_current(track).unwrap_or_else(|err| {
            error!(track = %track, error = %err, "Current event unreadable; treating as none");
            None
        })
    }

    /// The live payload of `track`, empty when absent or unreadable.
    pub fn event_data(&self, track: Track) -> ValueMap {
        TrackState::load(&self.store, track)
            .map(|state| state.data)
            .unwrap_or_else(|err| {
                error!(track = %track, error = %err, "Track state unreadable; payload empty");
                ValueMap::new()
            })
    }

    /// The base drop table with every active event's overlay merged in.
    pub fn merged_table(&self) -> PoolTable {
        let mut table = self.config.drops.base.clone();
        for track in Track::ALL {
            if let Some(overlay) = self
                .current_event(track)
                .and_then(|event| event.pool_overlay())
            {
                table = table.merge(&overlay);
            }
        }
        table
    }

    /// The combined reward modifiers of every active event.
    pub fn modifiers(&self) -> RewardModifiers {
        let mut combined = RewardModifiers::IDENTITY;
        for track in Track::ALL {
            if let Some(event) = self.current_event(track) {
                combined = combined.combine(event.reward_modifiers());
            }
        }
        combined
    }

    // --- Interaction surface ---

    /// Sell `user` a raffle ticket.
    ///
    /// Returns `Ok(None)` when no raffle is running on the challenge
    /// track.
    ///
    /// # Errors
    ///
    /// Returns an error when the purchase itself fails.
    pub async fn buy_raffle_ticket(
        &self,
        user: &UserId,
    ) -> Result<Option<TicketPurchase>, LifecycleError> {
        let Some(EventVariant::Raffle(raffle)) = self.current_event(Track::Challenge) else {
            return Ok(None);
        };
        let cx = self.context(Track::Challenge);
        Ok(Some(raffle.buy_ticket(&cx, user).await?))
    }

    /// Try `answer` against the running hunt for `user`.
    ///
    /// Returns `Ok(None)` when no hunt is running on the challenge
    /// track.
    ///
    /// # Errors
    ///
    /// Returns an error when the solve attempt itself fails.
    pub async fn solve_hunt_step(
        &self,
        user: &UserId,
        answer: &str,
    ) -> Result<Option<SolveOutcome>, LifecycleError> {
        let Some(EventVariant::Hunt(hunt)) = self.current_event(Track::Challenge) else {
            return Ok(None);
        };
        let cx = self.context(Track::Challenge);
        Ok(Some(hunt.solve_step(&cx, user, answer).await?))
    }

    // --- Accessors ---

    /// The persistent store underneath the scheduler.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// The wallet sharing the scheduler's store.
    #[must_use]
    pub const fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// The configuration the scheduler runs with.
    #[must_use]
    pub const fn config(&self) -> &EventsConfig {
        &self.config
    }

    /// The messenger events announce through.
    #[must_use]
    pub const fn messenger(&self) -> &M {
        &self.messenger
    }

    /// The configured daily boundary.
    #[must_use]
    pub const fn clock(&self) -> ResetClock {
        self.clock
    }

    // --- Tick actions ---

    async fn run_tick_actions(&self, report: &mut TickReport) {
        for track in Track::ALL {
            let variant = match self.decode_current(track) {
                Ok(Some(variant)) => variant,
                Ok(None) => continue,
                Err(err) => {
                    error!(track = %track, error = %err, "Skipping tick action; current event unreadable");
                    report.tick_errors = report.tick_errors.saturating_add(1);
                    continue;
                }
            };
            if !variant.acts_on_tick() {
                continue;
            }
            let cx = self.context(track);
            match variant.on_tick(&cx).await {
                Ok(()) => report.ticked = report.ticked.saturating_add(1),
                Err(err) => {
                    error!(track = %track, tag = variant.tag(), error = %err, "Tick action failed");
                    report.tick_errors = report.tick_errors.saturating_add(1);
                }
            }
        }
    }

    // --- Buffer preparation ---

    /// Fill any empty buffers, guarded by the latch so only one caller
    /// prepares at a time. Returns true when this caller did the fill.
    fn fill_empty_buffers(&self, rng: &mut impl Rng) -> Result<bool, LifecycleError> {
        let needs_fill = Track::ALL.iter().any(|&track| {
            TrackState::load(&self.store, track).is_ok_and(|state| state.buffered.is_none())
        });
        if !needs_fill {
            return Ok(false);
        }
        if !self.buffer_latch.try_begin_fill() {
            return Ok(false);
        }
        let result = self.fill_buffers(rng);
        // Always release: a stuck latch would block the reset forever.
        self.buffer_latch.complete_fill();
        result.map(|()| true)
    }

    fn fill_buffers(&self, rng: &mut impl Rng) -> Result<(), LifecycleError> {
        for track in Track::ALL {
            let state = match TrackState::load(&self.store, track) {
                Ok(state) => state,
                Err(err) => {
                    error!(track = %track, error = %err, "Cannot buffer into unreadable state");
                    continue;
                }
            };
            if state.buffered.is_some() {
                continue;
            }
            match self.select_variant(track, rng) {
                Ok(Some(variant)) => {
                    let cx = PrepareCx {
                        track,
                        config: &self.config,
                    };
                    match variant.prepare(&cx, rng) {
                        Ok(data) => {
                            self.write_buffer(track, &variant.spec(), data)?;
                            info!(track = %track, tag = variant.tag(), "Buffered next event");
                        }
                        Err(err) => {
                            error!(track = %track, tag = variant.tag(), error = %err, "Buffer preparation failed");
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!(track = %track, error = %err, "Buffer selection failed");
                }
            }
        }
        Ok(())
    }

    // Writes only the buffer fields, so a concurrent payload update on
    // the live event is never clobbered.
    fn write_buffer(
        &self,
        track: Track,
        spec: &VariantSpec,
        data: ValueMap,
    ) -> Result<(), LifecycleError> {
        let encoded = Value::from(serde_json::to_value(spec).map_err(StoreError::from)?);
        self.store.update(track.store_key(), move |value| {
            let mut state = match std::mem::take(value) {
                Value::Map(map) => map,
                _ => ValueMap::new(),
            };
            state.insert("buffered".to_owned(), encoded);
            state.insert("buffered_data".to_owned(), Value::Map(data));
            *value = Value::Map(state);
        })?;
        Ok(())
    }

    // --- Daily reset ---

    fn reset_owed(&self, stamp: NaiveDate) -> Result<bool, LifecycleError> {
        let last: Option<NaiveDate> = self.store.load(LAST_RESET_KEY)?;
        Ok(last.is_none_or(|last| last < stamp))
    }

    /// The reset sequence: settle both tracks, mark the day done,
    /// promote, open, refill buffers.
    ///
    /// The stamp is persisted right after settlement, before
    /// promotion: settlement moves money and must never re-run, while
    /// a promotion lost to a crash costs at most a stale day that the
    /// next boundary replaces.
    async fn run_reset(&self, stamp: NaiveDate, rng: &mut impl Rng) -> Result<(), LifecycleError> {
        info!(stamp = %stamp, "Daily reset starting");

        for track in Track::ALL {
            self.settle_track(track, rng).await;
        }

        self.store.save(LAST_RESET_KEY, &stamp)?;

        for track in Track::ALL {
            if let Err(err) = self.promote(track, stamp, rng) {
                error!(track = %track, error = %err, "Promotion failed; track stays dark");
            }
        }

        for track in Track::ALL {
            self.begin_track(track).await;
        }

        self.refill_buffers(rng);

        info!(stamp = %stamp, "Daily reset finished");
        Ok(())
    }

    async fn settle_track(&self, track: Track, rng: &mut impl Rng) {
        let variant = match self.decode_current(track) {
            Ok(Some(variant)) => variant,
            Ok(None) => return,
            Err(err) => {
                error!(track = %track, error = %err, "Retiring unreadable current event without settlement");
                return;
            }
        };
        let cx = self.context(track);
        if let Err(err) = variant.on_end(&cx, rng).await {
            error!(track = %track, tag = variant.tag(), error = %err, "Settlement failed; retiring anyway");
        }
    }

    /// Install the day's event on `track`: a date override when the
    /// calendar says so, else the buffered event, else an inline
    /// selection, else dark. Always clears the day's message handles.
    fn promote(
        &self,
        track: Track,
        stamp: NaiveDate,
        rng: &mut impl Rng,
    ) -> Result<(), LifecycleError> {
        let mut state = TrackState::load(&self.store, track).unwrap_or_else(|err| {
            warn!(track = %track, error = %err, "Track state unreadable at promotion; starting clean");
            TrackState::default()
        });

        let (next, data) = self.next_event(track, stamp, &mut state, rng);
        state.current = next;
        state.data = data;
        state.announcement = None;
        state.thread = None;
        state.save(&self.store, track)?;

        match &state.current {
            Some(spec) => info!(track = %track, tag = %spec.tag, "Promoted new event"),
            None => info!(track = %track, "Track is dark today"),
        }
        Ok(())
    }

    fn next_event(
        &self,
        track: Track,
        stamp: NaiveDate,
        state: &mut TrackState,
        rng: &mut impl Rng,
    ) -> (Option<VariantSpec>, ValueMap) {
        // A date override wins and leaves the buffer for tomorrow.
        if let Some(spec) = self.date_override(track, stamp) {
            match self.prepare_spec(track, &spec, rng) {
                Ok(data) => {
                    info!(track = %track, tag = %spec.tag, "Date override scheduled");
                    return (Some(spec), data);
                }
                Err(err) => {
                    error!(track = %track, tag = %spec.tag, error = %err, "Date override unusable; falling back");
                }
            }
        }

        if let Some(spec) = state.buffered.take() {
            let data = std::mem::take(&mut state.buffered_data);
            return (Some(spec), data);
        }

        match self.select_variant(track, rng) {
            Ok(Some(variant)) => {
                let cx = PrepareCx {
                    track,
                    config: &self.config,
                };
                match variant.prepare(&cx, rng) {
                    Ok(data) => return (Some(variant.spec()), data),
                    Err(err) => {
                        error!(track = %track, tag = variant.tag(), error = %err, "Inline preparation failed");
                    }
                }
            }
            Ok(None) => info!(track = %track, "Rotation is empty"),
            Err(err) => {
                error!(track = %track, error = %err, "Rotation selection failed");
            }
        }
        (None, ValueMap::new())
    }

    fn date_override(&self, track: Track, stamp: NaiveDate) -> Option<VariantSpec> {
        self.config
            .special_dates
            .iter()
            .find(|date| {
                date.track == track && date.month == stamp.month() && date.day == stamp.day()
            })
            .map(SpecialDateConfig::spec)
    }

    fn prepare_spec(
        &self,
        track: Track,
        spec: &VariantSpec,
        rng: &mut impl Rng,
    ) -> Result<ValueMap, LifecycleError> {
        let variant = EventVariant::from_spec(spec)?;
        let cx = PrepareCx {
            track,
            config: &self.config,
        };
        Ok(variant.prepare(&cx, rng)?)
    }

    fn select_variant(
        &self,
        track: Track,
        rng: &mut impl Rng,
    ) -> Result<Option<EventVariant>, VariantError> {
        let entries = self
            .config
            .selection
            .for_track(track)
            .iter()
            .map(|weighted| WeightedEntry {
                entry: PoolEntry::Item(weighted.tag.clone()),
                weight: weighted.weight,
            })
            .collect();
        let rotation = Pool {
            name: format!("rotation-{track}"),
            entries,
        };
        let Some(tag) = rotation.select_one(rng).map(ToOwned::to_owned) else {
            return Ok(None);
        };
        Ok(Some(EventVariant::for_tag(&tag, &self.config)?))
    }

    async fn begin_track(&self, track: Track) {
        let variant = match self.decode_current(track) {
            Ok(Some(variant)) => variant,
            Ok(None) => return,
            Err(err) => {
                error!(track = %track, error = %err, "Cannot open unreadable current event");
                return;
            }
        };
        let cx = self.context(track);
        if let Err(err) = variant.on_begin(&cx).await {
            error!(track = %track, tag = variant.tag(), error = %err, "Event opening failed; repair retries next tick");
        }
    }

    fn refill_buffers(&self, rng: &mut impl Rng) {
        if !self.buffer_latch.try_begin_fill() {
            return;
        }
        if let Err(err) = self.fill_buffers(rng) {
            error!(error = %err, "Post-reset buffer refill failed");
        }
        self.buffer_latch.complete_fill();
    }

    // --- Repair ---

    /// Re-run `on_begin` for any live event missing its announcement
    /// or, on a thread-running variant, its thread. Because handles
    /// persist immediately after each send, this only fires after a
    /// crash or messenger outage, and retries each tick until the
    /// opening is whole; `on_begin` skips the parts whose handles
    /// already persist.
    async fn repair_openings(&self) {
        for track in Track::ALL {
            let Ok(state) = TrackState::load(&self.store, track) else {
                continue;
            };
            if !Self::opening_incomplete(&state) {
                continue;
            }
            let _guard = self.reset_lock.lock().await;
            // Re-check under the lock: a concurrent reset or repair may
            // have finished the opening while this one waited.
            let Ok(state) = TrackState::load(&self.store, track) else {
                continue;
            };
            if !Self::opening_incomplete(&state) {
                continue;
            }
            let Some(spec) = state.current else { continue };
            let Ok(variant) = EventVariant::from_spec(&spec) else {
                continue;
            };
            let cx = self.context(track);
            match variant.on_begin(&cx).await {
                Ok(()) => info!(track = %track, tag = variant.tag(), "Event opening repaired"),
                Err(err) => {
                    warn!(track = %track, tag = variant.tag(), error = %err, "Event opening repair failed");
                }
            }
        }
    }

    /// True when `state` carries a live event whose announcement is
    /// missing, or whose thread is missing on a variant that runs one.
    fn opening_incomplete(state: &TrackState) -> bool {
        let Some(spec) = &state.current else {
            return false;
        };
        if state.announcement.is_none() {
            return true;
        }
        EventVariant::from_spec(spec)
            .is_ok_and(|variant| variant.uses_thread() && state.thread.is_none())
    }

    // --- Shared helpers ---

    fn decode_current(&self, track: Track) -> Result<Option<EventVariant>, LifecycleError> {
        let state = TrackState::load(&self.store, track)?;
        let Some(spec) = state.current else {
            return Ok(None);
        };
        Ok(Some(EventVariant::from_spec(&spec)?))
    }

    fn context(&self, track: Track) -> EventCx<'_, M> {
        EventCx::new(track, &self.store, &self.messenger, &self.config, &self.wallet)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use crate::messenger::NullMessenger;

    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("duration")
            .as_nanos();
        std::env::temp_dir().join(format!("midway-lifecycle-tests-{prefix}-{unique}"))
    }

    fn lifecycle(dir: &Path, config: EventsConfig) -> EventLifecycle<NullMessenger> {
        let store = Store::open(dir).unwrap();
        EventLifecycle::new(store, NullMessenger::new(), config).unwrap()
    }

    #[test]
    fn a_reset_is_owed_until_the_stamp_is_recorded() {
        let dir = temp_dir("owed");
        let scheduler = lifecycle(&dir, EventsConfig::default());
        let stamp = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

        assert!(scheduler.reset_owed(stamp).unwrap());
        scheduler.store().save(LAST_RESET_KEY, &stamp).unwrap();
        assert!(!scheduler.reset_owed(stamp).unwrap());

        let next_day = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        assert!(scheduler.reset_owed(next_day).unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn date_overrides_match_on_month_and_day() {
        let dir = temp_dir("override");
        let mut config = EventsConfig::default();
        config.special_dates.push(SpecialDateConfig {
            month: 7,
            day: 4,
            track: Track::Passive,
            tag: "special_date".to_owned(),
            params: ValueMap::from([("title".to_owned(), Value::from("Founding Day"))]),
        });
        let scheduler = lifecycle(&dir, config);

        let holiday = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        let spec = scheduler.date_override(Track::Passive, holiday).unwrap();
        assert_eq!(spec.tag, "special_date");

        // Wrong day and wrong track both miss.
        let weekday = NaiveDate::from_ymd_opt(2024, 7, 5).unwrap();
        assert!(scheduler.date_override(Track::Passive, weekday).is_none());
        assert!(scheduler.date_override(Track::Challenge, holiday).is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn an_empty_rotation_selects_nothing() {
        let dir = temp_dir("empty-rotation");
        let mut config = EventsConfig::default();
        config.selection.passive.clear();
        let scheduler = lifecycle(&dir, config);

        let mut rng = SmallRng::seed_from_u64(5);
        let selected = scheduler.select_variant(Track::Passive, &mut rng).unwrap();
        assert!(selected.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rotation_selection_respects_the_registry() {
        let dir = temp_dir("rotation");
        let config = EventsConfig {
            selection: crate::config::SelectionConfig {
                passive: Vec::new(),
                challenge: vec![crate::config::WeightedTag {
                    tag: "raffle".to_owned(),
                    weight: 3,
                }],
            },
            ..EventsConfig::default()
        };
        let scheduler = lifecycle(&dir, config);

        let mut rng = SmallRng::seed_from_u64(5);
        let selected = scheduler
            .select_variant(Track::Challenge, &mut rng)
            .unwrap()
            .unwrap();
        assert!(matches!(selected, EventVariant::Raffle(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
