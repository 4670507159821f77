//! Scavenger hunt: riddle steps open through the day, solvers earn.
//!
//! Preparation draws a distinct sample of riddles from the configured
//! pool and seals them (with answers) into the payload, so the day's
//! hunt is fixed even if the config changes underneath it. Steps open
//! one at a time on a tick cadence; each user can solve each open step
//! once for the step reward, and users who solved every opened step
//! split the completion reward at settlement.

use std::collections::BTreeSet;

use midway_rewards::{GrantPolicy, record_source_stat};
use midway_types::{RewardSource, UserId, Value, ValueMap};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::HuntConfig;
use crate::context::{EventCx, PrepareCx};
use crate::messenger::Messenger;
use crate::variant::{EventError, VariantError};

/// Payload of a hunt day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntEvent {
    /// Number of steps drawn for the day.
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// A new step opens every this many scheduler ticks.
    #[serde(default = "default_open_every")]
    pub open_every_ticks: u64,

    /// Amount paid for solving a single step.
    #[serde(default = "default_step_reward")]
    pub step_reward: i64,

    /// Amount split between users who solved every opened step.
    #[serde(default = "default_completion_reward")]
    pub completion_reward: i64,
}

/// Result of a solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// Correct first solve; the step's position in the day's sequence.
    Solved {
        /// Zero-based index of the solved step.
        step: usize,
    },
    /// The answer matches a step this user already solved.
    AlreadySolved,
    /// No open step accepts the answer.
    NoMatch,
}

impl HuntEvent {
    /// Registry tag.
    pub const TAG: &'static str = "hunt";

    /// Snapshot the configured tuning into a fresh event.
    #[must_use]
    pub const fn from_config(config: &HuntConfig) -> Self {
        Self {
            steps: config.steps,
            open_every_ticks: config.open_every_ticks,
            step_reward: config.step_reward,
            completion_reward: config.completion_reward,
        }
    }

    /// Draw the day's riddles and seal them into the payload.
    ///
    /// Steps start closed; [`Self::on_tick`] opens them one at a time.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when no riddles are configured.
    pub fn prepare(&self, cx: &PrepareCx<'_>, rng: &mut impl Rng) -> Result<ValueMap, EventError> {
        let riddles = &cx.config.hunt.riddles;
        if riddles.is_empty() {
            return Err(EventError::Variant(VariantError::Params {
                tag: Self::TAG.to_owned(),
                reason: "no riddles configured".to_owned(),
            }));
        }

        let count = usize::try_from(self.steps)
            .unwrap_or(usize::MAX)
            .min(riddles.len());
        let mut steps = Vec::with_capacity(count);
        for index in sample_distinct(rng, riddles.len(), count) {
            if let Some(riddle) = riddles.get(index) {
                steps.push(Value::Map(ValueMap::from([
                    ("prompt".to_owned(), Value::from(riddle.prompt.as_str())),
                    ("answer".to_owned(), Value::from(riddle.answer.as_str())),
                    ("opened".to_owned(), Value::Bool(false)),
                    ("solvers".to_owned(), Value::List(Vec::new())),
                ])));
            }
        }

        Ok(ValueMap::from([
            ("steps".to_owned(), Value::List(steps)),
            ("ticks".to_owned(), Value::Int(0)),
        ]))
    }

    /// Announce the hunt and open the clue thread.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when messaging or persistence fails.
    pub async fn on_begin<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        let content = format!(
            "Scavenger hunt! {} clues will appear in the thread through the day. \
             Each first solve earns {}.",
            self.steps, self.step_reward
        );
        cx.announce_once(&content).await?;
        cx.thread_once("Hunt clues").await?;
        Ok(())
    }

    /// Advance the tick counter and open the next step when due.
    ///
    /// The counter and the step flip happen in one atomic payload
    /// update; the clue post happens after, outside the lock.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the store or messaging fails.
    pub async fn on_tick<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        let interval = i64::try_from(self.open_every_ticks)
            .unwrap_or(i64::MAX)
            .max(1);
        let opened = cx.update_data(move |data| {
            let ticks = data
                .get("ticks")
                .and_then(Value::as_int)
                .unwrap_or(0)
                .saturating_add(1);
            data.insert("ticks".to_owned(), Value::Int(ticks));
            if ticks.checked_rem(interval) != Some(0) {
                return None;
            }
            let Some(Value::List(steps)) = data.get_mut("steps") else {
                return None;
            };
            for step in steps {
                let Some(map) = step.as_map_mut() else { continue };
                if map.get("opened").and_then(Value::as_bool) == Some(false) {
                    map.insert("opened".to_owned(), Value::Bool(true));
                    return map.get("prompt").and_then(Value::as_str).map(ToOwned::to_owned);
                }
            }
            None
        })?;

        if let Some(prompt) = opened {
            info!(track = %cx.track(), "Hunt step opened");
            cx.post_in_thread(&format!("New clue: {prompt}")).await?;
        }
        Ok(())
    }

    /// Try `answer` against the open steps for `user`.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// A first solve records the user and pays the step reward; a
    /// repeat on the same step reports [`SolveOutcome::AlreadySolved`].
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the store or wallet fails.
    pub async fn solve_step<M: Messenger>(
        &self,
        cx: &EventCx<'_, M>,
        user: &UserId,
        answer: &str,
    ) -> Result<SolveOutcome, EventError> {
        let key = user.as_str().to_owned();
        let guess = answer.trim().to_owned();
        let outcome = cx.update_data(move |data| {
            let Some(Value::List(steps)) = data.get_mut("steps") else {
                return SolveOutcome::NoMatch;
            };
            let mut already = false;
            for (index, step) in steps.iter_mut().enumerate() {
                let Some(map) = step.as_map_mut() else { continue };
                if map.get("opened").and_then(Value::as_bool) != Some(true) {
                    continue;
                }
                let matches = map
                    .get("answer")
                    .and_then(Value::as_str)
                    .is_some_and(|accepted| accepted.trim().eq_ignore_ascii_case(&guess));
                if !matches {
                    continue;
                }
                let Some(Value::List(solvers)) = map.get_mut("solvers") else {
                    continue;
                };
                if solvers.iter().any(|v| v.as_str() == Some(key.as_str())) {
                    already = true;
                    continue;
                }
                solvers.push(Value::Str(key.clone()));
                return SolveOutcome::Solved { step: index };
            }
            if already {
                SolveOutcome::AlreadySolved
            } else {
                SolveOutcome::NoMatch
            }
        })?;

        if let SolveOutcome::Solved { step } = outcome {
            cx.wallet()
                .grant(user, self.step_reward, RewardSource::Hunt, GrantPolicy::AllowNegative)?;
            record_source_stat(cx.store(), RewardSource::Hunt, self.step_reward)?;
            info!(user = %user, step, "Hunt step solved");
            cx.post_in_thread(&format!(
                "{user} cracked clue #{number}!",
                number = step.saturating_add(1)
            ))
            .await?;
        }
        Ok(outcome)
    }

    /// Pay out completions and retire the hunt.
    ///
    /// Completion means solving every step that actually opened; steps
    /// still sealed at the boundary do not count against anyone. The
    /// completion reward splits evenly between completers.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the payout or messaging fails.
    pub async fn on_end<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        let state = cx.state()?;
        let winners = completion_winners(&state.data);

        if winners.is_empty() {
            cx.post_in_thread(
                "The hunt is over. Nobody cracked every clue; the grand prize stays in the vault.",
            )
            .await?;
        } else {
            let count = i64::try_from(winners.len()).unwrap_or(i64::MAX);
            let share = self.completion_reward.checked_div(count).unwrap_or(0);
            for raw in &winners {
                let winner = UserId::from(raw.as_str());
                cx.wallet()
                    .grant(&winner, share, RewardSource::Hunt, GrantPolicy::AllowNegative)?;
                record_source_stat(cx.store(), RewardSource::Hunt, share)?;
            }
            info!(winners = winners.len(), share, "Hunt completed");
            cx.post_in_thread(&format!(
                "The hunt is over! {} cracked every clue and split {} ({share} each).",
                winners.join(", "),
                self.completion_reward
            ))
            .await?;
        }
        cx.archive_thread().await?;
        Ok(())
    }
}

/// Users present in the solver list of every opened step.
fn completion_winners(data: &ValueMap) -> Vec<String> {
    let Some(steps) = data.get("steps").and_then(Value::as_list) else {
        return Vec::new();
    };
    let mut winners: Option<BTreeSet<String>> = None;
    for step in steps {
        let Some(map) = step.as_map() else { continue };
        if map.get("opened").and_then(Value::as_bool) != Some(true) {
            continue;
        }
        let solvers: BTreeSet<String> = map
            .get("solvers")
            .and_then(Value::as_list)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                    .collect()
            })
            .unwrap_or_default();
        winners = Some(match winners {
            Some(current) => current.intersection(&solvers).cloned().collect(),
            None => solvers,
        });
    }
    winners.map_or_else(Vec::new, |set| set.into_iter().collect())
}

/// Draw `count` distinct indices below `len`.
fn sample_distinct(rng: &mut impl Rng, len: usize, count: usize) -> Vec<usize> {
    let target = count.min(len);
    let mut picked = Vec::with_capacity(target);
    while picked.len() < target {
        let index = rng.random_range(0..len);
        if !picked.contains(&index) {
            picked.push(index);
        }
    }
    picked
}

const fn default_steps() -> u32 {
    3
}

const fn default_open_every() -> u64 {
    5
}

const fn default_step_reward() -> i64 {
    50
}

const fn default_completion_reward() -> i64 {
    150
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn step(opened: bool, solvers: &[&str]) -> Value {
        Value::Map(ValueMap::from([
            ("prompt".to_owned(), Value::from("riddle")),
            ("answer".to_owned(), Value::from("answer")),
            ("opened".to_owned(), Value::Bool(opened)),
            (
                "solvers".to_owned(),
                Value::List(solvers.iter().map(|s| Value::from(*s)).collect()),
            ),
        ]))
    }

    #[test]
    fn sampled_indices_are_distinct_and_in_range() {
        let mut rng = SmallRng::seed_from_u64(11);
        let picked = sample_distinct(&mut rng, 5, 3);
        assert_eq!(picked.len(), 3);
        let unique: BTreeSet<_> = picked.iter().copied().collect();
        assert_eq!(unique.len(), 3);
        assert!(picked.iter().all(|&index| index < 5));
    }

    #[test]
    fn sampling_caps_at_the_population() {
        let mut rng = SmallRng::seed_from_u64(11);
        let picked = sample_distinct(&mut rng, 2, 10);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn completion_requires_every_opened_step() {
        let data = ValueMap::from([(
            "steps".to_owned(),
            Value::List(vec![
                step(true, &["ada", "bo"]),
                step(true, &["ada"]),
                // Never opened; does not count against anyone.
                step(false, &[]),
            ]),
        )]);
        assert_eq!(completion_winners(&data), vec!["ada".to_owned()]);
    }

    #[test]
    fn a_hunt_with_no_opened_steps_has_no_winners() {
        let data = ValueMap::from([(
            "steps".to_owned(),
            Value::List(vec![step(false, &[]), step(false, &[])]),
        )]);
        assert!(completion_winners(&data).is_empty());
    }

    #[test]
    fn sparse_params_decode_with_defaults() {
        let event: HuntEvent = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(event.steps, 3);
        assert_eq!(event.open_every_ticks, 5);
    }
}
