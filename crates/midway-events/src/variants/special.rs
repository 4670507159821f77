//! Date-gated festival special.
//!
//! Specials never enter the daily rotation; the scheduler places one
//! when the calendar date matches a configured override. The params in
//! the override flow verbatim into this payload, so each configured
//! date can carry its own title, greeting, multipliers, and overlay.

use midway_pools::PoolTable;
use midway_types::{RewardModifiers, Value, ValueMap};
use serde::{Deserialize, Serialize};

use crate::context::EventCx;
use crate::messenger::Messenger;
use crate::variant::EventError;

/// Payload of a special day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialEvent {
    /// Display title of the occasion.
    #[serde(default)]
    pub title: String,

    /// Greeting posted with the announcement.
    #[serde(default)]
    pub greeting: String,

    /// Factor applied to drop probabilities for the day.
    #[serde(default = "default_multiplier")]
    pub probability: f64,

    /// Factor applied to drop payouts for the day.
    #[serde(default = "default_multiplier")]
    pub payout: f64,

    /// Festive entries merged into the base table for the day.
    #[serde(default)]
    pub overlay: Option<PoolTable>,
}

impl SpecialEvent {
    /// Registry tag.
    pub const TAG: &'static str = "special_date";

    /// The multipliers this special applies while it runs.
    #[must_use]
    pub const fn modifiers(&self) -> RewardModifiers {
        RewardModifiers {
            probability: self.probability,
            payout: self.payout,
        }
    }

    /// Carry the title and greeting into the live payload.
    #[must_use]
    pub fn prepare(&self) -> ValueMap {
        ValueMap::from([
            ("title".to_owned(), Value::from(self.title.as_str())),
            ("greeting".to_owned(), Value::from(self.greeting.as_str())),
        ])
    }

    /// Announce the occasion.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the announcement cannot be sent
    /// or persisted.
    pub async fn on_begin<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        let title = self.display_title();
        let content = if self.greeting.is_empty() {
            format!("Today is {title}!")
        } else {
            format!("Today is {title}! {}", self.greeting)
        };
        cx.announce_once(&content).await?;
        Ok(())
    }

    /// Close out the announcement.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the edit fails.
    pub async fn on_end<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        let title = self.display_title();
        cx.edit_announcement(&format!("{title} has wrapped up. See you next year."))
            .await
    }

    fn display_title(&self) -> &str {
        let trimmed = self.title.trim();
        if trimmed.is_empty() {
            "a special day on the midway"
        } else {
            trimmed
        }
    }
}

const fn default_multiplier() -> f64 {
    1.0
}
