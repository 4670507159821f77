//! Service entry point for the Midway event scheduler.
//!
//! The runner loads the YAML configuration, opens the persistent store,
//! and drives the event lifecycle on two timers:
//!
//! ```text
//! tick timer --> EventLifecycle::tick (steps, buffers, daily reset)
//! drop timer --> run_drop_cycle      (demonstration drops for one user)
//! ```
//!
//! Announcements go through the [`NullMessenger`], which logs instead of
//! talking to a chat platform, so a run is fully offline. All state
//! lives in the store; stopping the process and starting it again
//! resumes the same day without repeating the reset.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use midway_events::{EventLifecycle, EventsConfig, NullMessenger};
use midway_rewards::run_drop_cycle;
use midway_store::Store;
use midway_types::UserId;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Initializes logging, loads configuration from the path given as the
/// first argument (default `midway-config.yaml`), then runs the
/// scheduler loop until interrupted.
///
/// # Errors
///
/// Returns an error if the configuration does not load or the store
/// cannot be opened.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("midway-runner starting");

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("midway-config.yaml"), PathBuf::from);
    let config = EventsConfig::from_file(&config_path)?;
    info!(
        config = %config_path.display(),
        data_dir = %config.data_dir.display(),
        reset_hour = config.schedule.reset_hour,
        reset_minute = config.schedule.reset_minute,
        tick_interval_secs = config.schedule.tick_interval_secs,
        "configuration loaded"
    );

    let store = Store::open(&config.data_dir)?;
    info!(units = store.len(), "store opened");

    let demo_user = UserId::from(config.drops.demo_user.as_str());
    let tick_secs = config.schedule.tick_interval_secs;
    let drop_secs = config.drops.drop_interval_secs;

    let lifecycle = EventLifecycle::new(store, NullMessenger::new(), config)?;
    info!(
        passive_rotation = lifecycle.config().selection.passive.len(),
        challenge_rotation = lifecycle.config().selection.challenge.len(),
        "scheduler initialized, entering tick loop"
    );

    let mut rng = rand::rng();
    let mut tick_timer = tokio::time::interval(Duration::from_secs(tick_secs));
    tick_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut drop_timer = tokio::time::interval(Duration::from_secs(drop_secs));
    drop_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick_timer.tick() => {
                match lifecycle.tick(Utc::now(), &mut rng).await {
                    Ok(report) => {
                        if report.reset_ran || report.buffers_filled || report.tick_errors > 0 {
                            info!(
                                ticked = report.ticked,
                                tick_errors = report.tick_errors,
                                buffers_filled = report.buffers_filled,
                                reset_ran = report.reset_ran,
                                "scheduler tick"
                            );
                        }
                    }
                    Err(err) => error!(error = %err, "scheduler tick failed"),
                }
            }
            _ = drop_timer.tick() => {
                let table = lifecycle.merged_table();
                let modifiers = lifecycle.modifiers();
                let outcome = run_drop_cycle(
                    lifecycle.wallet(),
                    &table,
                    modifiers,
                    &lifecycle.config().drops.payouts,
                    &demo_user,
                    &mut rng,
                );
                match outcome {
                    Ok(awarded) if !awarded.is_empty() => {
                        info!(
                            user = %demo_user,
                            drops = awarded.len(),
                            balance = lifecycle.wallet().balance(&demo_user),
                            "demonstration drops awarded"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "drop cycle failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping");
                break;
            }
        }
    }

    info!("midway-runner stopped");
    Ok(())
}
