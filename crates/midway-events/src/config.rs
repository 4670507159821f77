//! Configuration loading and typed config structures for the Midway service.
//!
//! The canonical configuration lives in `midway-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads, applies environment
//! overrides, and validates the file. A config that loads is a config the
//! scheduler can run: every rotation tag and special date is checked
//! against the variant registry up front.

use std::path::{Path, PathBuf};

use midway_pools::PoolTable;
use midway_rewards::PayoutSchedule;
use midway_types::{ChannelId, Track, ValueMap};
use serde::Deserialize;

use crate::variant::{EventVariant, VariantSpec};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an unrunnable service.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration.
///
/// Mirrors the structure of `midway-config.yaml`. All fields default to a
/// runnable offline setup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventsConfig {
    /// Directory the persistent store writes its units under.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Daily boundary and tick cadence.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Announcement channel per track.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Weighted daily rotation per track.
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Boost event tuning.
    #[serde(default)]
    pub boost: BoostConfig,

    /// Raffle event tuning.
    #[serde(default)]
    pub raffle: RaffleConfig,

    /// Scavenger hunt tuning.
    #[serde(default)]
    pub hunt: HuntConfig,

    /// Base drop economy and payouts.
    #[serde(default)]
    pub drops: DropsConfig,

    /// Date-gated overrides, checked at each daily reset.
    #[serde(default)]
    pub special_dates: Vec<SpecialDateConfig>,
}

impl EventsConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `MIDWAY_DATA_DIR` overrides `data_dir`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MIDWAY_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
    }

    /// Check the configuration describes a runnable service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_schedule()?;
        self.validate_tables()?;
        self.validate_variants()?;
        self.validate_rotation()?;
        self.validate_special_dates()?;
        Ok(())
    }

    fn validate_schedule(&self) -> Result<(), ConfigError> {
        crate::clock::ResetClock::new(self.schedule.reset_hour, self.schedule.reset_minute)
            .map_err(|err| ConfigError::Invalid {
                reason: err.to_string(),
            })?;
        if self.schedule.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "schedule.tick_interval_secs must be at least 1".to_owned(),
            });
        }
        if self.drops.drop_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "drops.drop_interval_secs must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    fn validate_tables(&self) -> Result<(), ConfigError> {
        self.drops.base.validate().map_err(|err| ConfigError::Invalid {
            reason: format!("drops.base: {err}"),
        })?;
        if let Some(overlay) = &self.boost.overlay {
            overlay.validate().map_err(|err| ConfigError::Invalid {
                reason: format!("boost.overlay: {err}"),
            })?;
        }
        Ok(())
    }

    fn validate_variants(&self) -> Result<(), ConfigError> {
        let finite_scale = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    reason: format!("{name} must be a finite non-negative number, got {value}"),
                })
            }
        };
        finite_scale(
            "boost.probability_multiplier",
            self.boost.probability_multiplier,
        )?;
        finite_scale("boost.payout_multiplier", self.boost.payout_multiplier)?;

        if self.raffle.ticket_price < 1 {
            return Err(ConfigError::Invalid {
                reason: "raffle.ticket_price must be at least 1".to_owned(),
            });
        }
        if self.raffle.pot_seed < 0 {
            return Err(ConfigError::Invalid {
                reason: "raffle.pot_seed must not be negative".to_owned(),
            });
        }

        if self.hunt.steps == 0 {
            return Err(ConfigError::Invalid {
                reason: "hunt.steps must be at least 1".to_owned(),
            });
        }
        if self.hunt.open_every_ticks == 0 {
            return Err(ConfigError::Invalid {
                reason: "hunt.open_every_ticks must be at least 1".to_owned(),
            });
        }
        let riddle_count = u64::try_from(self.hunt.riddles.len()).unwrap_or(u64::MAX);
        if riddle_count < u64::from(self.hunt.steps) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "hunt needs at least {} riddles, got {}",
                    self.hunt.steps,
                    self.hunt.riddles.len()
                ),
            });
        }
        Ok(())
    }

    fn validate_rotation(&self) -> Result<(), ConfigError> {
        for track in Track::ALL {
            for weighted in self.selection.for_track(track) {
                EventVariant::for_tag(&weighted.tag, self).map_err(|err| {
                    ConfigError::Invalid {
                        reason: format!("selection.{track}: {err}"),
                    }
                })?;
            }
        }
        Ok(())
    }

    fn validate_special_dates(&self) -> Result<(), ConfigError> {
        for date in &self.special_dates {
            if date.month == 0 || date.month > 12 {
                return Err(ConfigError::Invalid {
                    reason: format!("special date month {} out of range 1-12", date.month),
                });
            }
            if date.day == 0 || date.day > 31 {
                return Err(ConfigError::Invalid {
                    reason: format!("special date day {} out of range 1-31", date.day),
                });
            }
            let variant =
                EventVariant::from_spec(&date.spec()).map_err(|err| ConfigError::Invalid {
                    reason: format!("special date {}-{}: {err}", date.month, date.day),
                })?;
            if let Some(overlay) = variant.pool_overlay() {
                overlay.validate().map_err(|err| ConfigError::Invalid {
                    reason: format!(
                        "special date {}-{} overlay: {err}",
                        date.month, date.day
                    ),
                })?;
            }
        }
        Ok(())
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            schedule: ScheduleConfig::default(),
            channels: ChannelsConfig::default(),
            selection: SelectionConfig::default(),
            boost: BoostConfig::default(),
            raffle: RaffleConfig::default(),
            hunt: HuntConfig::default(),
            drops: DropsConfig::default(),
            special_dates: Vec::new(),
        }
    }
}

/// Daily boundary and tick cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    /// Hour (UTC) of the daily reset boundary.
    #[serde(default = "default_reset_hour")]
    pub reset_hour: u32,

    /// Minute of the daily reset boundary.
    #[serde(default)]
    pub reset_minute: u32,

    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Seconds before the boundary at which buffer preparation starts.
    #[serde(default = "default_preparation_margin_secs")]
    pub preparation_margin_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reset_hour: default_reset_hour(),
            reset_minute: 0,
            tick_interval_secs: default_tick_interval_secs(),
            preparation_margin_secs: default_preparation_margin_secs(),
        }
    }
}

/// Announcement channel per track.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelsConfig {
    /// Channel the passive track announces in.
    #[serde(default = "default_passive_channel")]
    pub passive: String,

    /// Channel the challenge track announces in.
    #[serde(default = "default_challenge_channel")]
    pub challenge: String,
}

impl ChannelsConfig {
    /// The announcement channel for a track.
    pub fn for_track(&self, track: Track) -> ChannelId {
        match track {
            Track::Passive => ChannelId::from(self.passive.as_str()),
            Track::Challenge => ChannelId::from(self.challenge.as_str()),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            passive: default_passive_channel(),
            challenge: default_challenge_channel(),
        }
    }
}

/// One entry of a track's daily rotation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeightedTag {
    /// Variant tag to schedule.
    pub tag: String,

    /// Relative selection weight; zero disables the entry.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Weighted daily rotation per track.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectionConfig {
    /// Rotation for the passive track.
    #[serde(default = "default_passive_rotation")]
    pub passive: Vec<WeightedTag>,

    /// Rotation for the challenge track.
    #[serde(default = "default_challenge_rotation")]
    pub challenge: Vec<WeightedTag>,
}

impl SelectionConfig {
    /// The rotation entries for a track.
    pub fn for_track(&self, track: Track) -> &[WeightedTag] {
        match track {
            Track::Passive => &self.passive,
            Track::Challenge => &self.challenge,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            passive: default_passive_rotation(),
            challenge: default_challenge_rotation(),
        }
    }
}

/// Boost event tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoostConfig {
    /// Factor applied to every drop probability while the boost runs.
    #[serde(default = "default_probability_multiplier")]
    pub probability_multiplier: f64,

    /// Factor applied to every drop payout while the boost runs.
    #[serde(default = "default_payout_multiplier")]
    pub payout_multiplier: f64,

    /// Extra festive entries merged into the base table for the day.
    #[serde(default)]
    pub overlay: Option<PoolTable>,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            probability_multiplier: default_probability_multiplier(),
            payout_multiplier: default_payout_multiplier(),
            overlay: None,
        }
    }
}

/// Raffle event tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RaffleConfig {
    /// Price of one ticket, deducted at purchase.
    #[serde(default = "default_ticket_price")]
    pub ticket_price: i64,

    /// Amount the pot starts the day with.
    #[serde(default = "default_pot_seed")]
    pub pot_seed: i64,
}

impl Default for RaffleConfig {
    fn default() -> Self {
        Self {
            ticket_price: default_ticket_price(),
            pot_seed: default_pot_seed(),
        }
    }
}

/// One riddle available to the scavenger hunt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HuntRiddle {
    /// The clue posted in the hunt thread.
    pub prompt: String,

    /// The accepted answer (matched case-insensitively).
    pub answer: String,
}

/// Scavenger hunt tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HuntConfig {
    /// Number of steps drawn for one hunt day.
    #[serde(default = "default_hunt_steps")]
    pub steps: u32,

    /// A new step opens every this many scheduler ticks.
    #[serde(default = "default_open_every_ticks")]
    pub open_every_ticks: u64,

    /// Amount paid for solving a single step.
    #[serde(default = "default_step_reward")]
    pub step_reward: i64,

    /// Amount split between users who solved every opened step.
    #[serde(default = "default_completion_reward")]
    pub completion_reward: i64,

    /// Riddle pool the day's steps are drawn from.
    #[serde(default = "default_riddles")]
    pub riddles: Vec<HuntRiddle>,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            steps: default_hunt_steps(),
            open_every_ticks: default_open_every_ticks(),
            step_reward: default_step_reward(),
            completion_reward: default_completion_reward(),
            riddles: default_riddles(),
        }
    }
}

/// Base drop economy and payouts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DropsConfig {
    /// The configured everyday drop table.
    #[serde(default = "default_base_table")]
    pub base: PoolTable,

    /// Currency amounts per dropped item.
    #[serde(default)]
    pub payouts: PayoutSchedule,

    /// User the offline runner rolls demonstration drops for.
    #[serde(default = "default_demo_user")]
    pub demo_user: String,

    /// Seconds between demonstration drop cycles.
    #[serde(default = "default_drop_interval_secs")]
    pub drop_interval_secs: u64,
}

impl Default for DropsConfig {
    fn default() -> Self {
        Self {
            base: default_base_table(),
            payouts: PayoutSchedule::default(),
            demo_user: default_demo_user(),
            drop_interval_secs: default_drop_interval_secs(),
        }
    }
}

/// A date-gated override for one track.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpecialDateConfig {
    /// Calendar month, `1..=12`.
    pub month: u32,

    /// Calendar day, `1..=31`.
    pub day: u32,

    /// Track the override takes for the day.
    pub track: Track,

    /// Variant tag the override schedules.
    pub tag: String,

    /// Variant parameters, persisted verbatim into the day's spec.
    #[serde(default)]
    pub params: ValueMap,
}

impl SpecialDateConfig {
    /// The variant spec this override schedules.
    pub fn spec(&self) -> VariantSpec {
        VariantSpec {
            tag: self.tag.clone(),
            params: self.params.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

const fn default_reset_hour() -> u32 {
    9
}

const fn default_tick_interval_secs() -> u64 {
    60
}

const fn default_preparation_margin_secs() -> u64 {
    900
}

fn default_passive_channel() -> String {
    "events-passive".to_owned()
}

fn default_challenge_channel() -> String {
    "events-challenge".to_owned()
}

const fn default_weight() -> u32 {
    1
}

fn default_passive_rotation() -> Vec<WeightedTag> {
    vec![WeightedTag {
        tag: "boost".to_owned(),
        weight: 1,
    }]
}

fn default_challenge_rotation() -> Vec<WeightedTag> {
    vec![
        WeightedTag {
            tag: "raffle".to_owned(),
            weight: 1,
        },
        WeightedTag {
            tag: "hunt".to_owned(),
            weight: 1,
        },
    ]
}

const fn default_probability_multiplier() -> f64 {
    2.0
}

const fn default_payout_multiplier() -> f64 {
    1.5
}

const fn default_ticket_price() -> i64 {
    25
}

const fn default_pot_seed() -> i64 {
    200
}

const fn default_hunt_steps() -> u32 {
    3
}

const fn default_open_every_ticks() -> u64 {
    5
}

const fn default_step_reward() -> i64 {
    50
}

const fn default_completion_reward() -> i64 {
    150
}

fn default_riddles() -> Vec<HuntRiddle> {
    let pairs = [
        ("I spin all day but never walk. Find me.", "carousel"),
        ("I am won, not bought, and sit on a shelf of my kin.", "plush"),
        ("Knock me down three times and claim your prize.", "cans"),
        ("I rise and fall and show you the whole fair.", "wheel"),
        ("Feed me a coin and I sing a tune.", "organ"),
    ];
    pairs
        .into_iter()
        .map(|(prompt, answer)| HuntRiddle {
            prompt: prompt.to_owned(),
            answer: answer.to_owned(),
        })
        .collect()
}

fn default_base_table() -> PoolTable {
    use midway_pools::{Pool, PoolEntry, PoolSlot, WeightedEntry};

    let item = |name: &str, weight: u32| WeightedEntry {
        entry: PoolEntry::Item(name.to_owned()),
        weight,
    };
    PoolTable {
        slots: vec![
            PoolSlot {
                pool: Pool {
                    name: "commons".to_owned(),
                    entries: vec![item("plush", 3), item("balloon", 2), item("token", 1)],
                },
                probability: 0.25,
            },
            PoolSlot {
                pool: Pool {
                    name: "rares".to_owned(),
                    entries: vec![item("golden_ticket", 1)],
                },
                probability: 0.05,
            },
        ],
    }
}

fn default_demo_user() -> String {
    "demo".to_owned()
}

const fn default_drop_interval_secs() -> u64 {
    30
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EventsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.schedule.reset_hour, 9);
        assert_eq!(config.schedule.tick_interval_secs, 60);
        assert_eq!(config.raffle.ticket_price, 25);
        assert_eq!(config.hunt.steps, 3);
        assert!(!config.drops.base.slots.is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
data_dir: "/var/lib/midway"

schedule:
  reset_hour: 10
  reset_minute: 30
  tick_interval_secs: 15
  preparation_margin_secs: 600

channels:
  passive: "fairgrounds"
  challenge: "games"

selection:
  passive:
    - tag: boost
      weight: 3
  challenge:
    - tag: raffle
      weight: 2
    - tag: hunt
      weight: 1

boost:
  probability_multiplier: 3.0
  payout_multiplier: 2.0

raffle:
  ticket_price: 10
  pot_seed: 100

hunt:
  steps: 2
  open_every_ticks: 4
  step_reward: 20
  completion_reward: 60
  riddles:
    - prompt: "First clue"
      answer: "one"
    - prompt: "Second clue"
      answer: "two"

drops:
  demo_user: "visitor"
  drop_interval_secs: 45

special_dates:
  - month: 10
    day: 31
    track: passive
    tag: special_date
    params:
      title: "Haunted Midway"
      greeting: "The fair goes dark tonight."
"#;

        let config = EventsConfig::parse(yaml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/midway"));
        assert_eq!(config.schedule.reset_hour, 10);
        assert_eq!(config.schedule.reset_minute, 30);
        assert_eq!(config.channels.passive, "fairgrounds");
        assert_eq!(config.selection.passive.first().unwrap().weight, 3);
        assert_eq!(config.raffle.ticket_price, 10);
        assert_eq!(config.hunt.riddles.len(), 2);
        assert_eq!(config.drops.demo_user, "visitor");
        assert_eq!(config.special_dates.len(), 1);
        let date = config.special_dates.first().unwrap();
        assert_eq!(date.track, Track::Passive);
        assert_eq!(date.tag, "special_date");
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "schedule:\n  reset_hour: 6\n";
        let config = EventsConfig::parse(yaml).unwrap();

        // Hour is overridden, everything else uses defaults.
        assert_eq!(config.schedule.reset_hour, 6);
        assert_eq!(config.schedule.tick_interval_secs, 60);
        assert_eq!(config.raffle.pot_seed, 200);
    }

    #[test]
    fn out_of_range_reset_hour_is_rejected() {
        let yaml = "schedule:\n  reset_hour: 24\n";
        assert!(matches!(
            EventsConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn unknown_rotation_tag_is_rejected() {
        let yaml = "selection:\n  passive:\n    - tag: fireworks\n";
        assert!(matches!(
            EventsConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn special_date_with_unknown_tag_is_rejected() {
        let yaml = r"
special_dates:
  - month: 1
    day: 1
    track: passive
    tag: fireworks
";
        assert!(matches!(
            EventsConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn hunt_with_too_few_riddles_is_rejected() {
        let yaml = r#"
hunt:
  steps: 3
  riddles:
    - prompt: "Only clue"
      answer: "one"
"#;
        assert!(matches!(
            EventsConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn month_and_day_ranges_are_enforced() {
        let yaml = r"
special_dates:
  - month: 13
    day: 1
    track: passive
    tag: special_date
";
        assert!(matches!(
            EventsConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
