//! Raffle: tickets sell all day, one weighted draw takes the pot.
//!
//! Ticket money flows into the pot, so the prize grows with interest
//! in it. The purchase path is two steps: a checked wallet charge,
//! then one atomic payload update that bumps the buyer's ticket count
//! and the pot together. Settlement at the day boundary draws a winner
//! weighted by tickets held and pays the whole pot out.

use midway_pools::{Pool, PoolEntry, WeightedEntry};
use midway_rewards::{GrantOutcome, GrantPolicy, record_source_stat};
use midway_types::{RewardSource, UserId, Value, ValueMap};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RaffleConfig;
use crate::context::EventCx;
use crate::messenger::Messenger;
use crate::variant::EventError;

/// Payload of a raffle day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleEvent {
    /// Price of one ticket, deducted at purchase.
    #[serde(default = "default_ticket_price")]
    pub ticket_price: i64,

    /// Amount the pot starts the day with.
    #[serde(default = "default_pot_seed")]
    pub pot_seed: i64,
}

/// Result of a ticket purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketPurchase {
    /// The ticket sold; totals after the purchase.
    Bought {
        /// Tickets the buyer now holds.
        tickets: i64,
        /// The pot after this sale.
        pot: i64,
    },
    /// The buyer could not afford a ticket; nothing changed.
    InsufficientFunds {
        /// The buyer's balance at refusal.
        balance: i64,
    },
}

impl RaffleEvent {
    /// Registry tag.
    pub const TAG: &'static str = "raffle";

    /// Snapshot the configured tuning into a fresh event.
    #[must_use]
    pub const fn from_config(config: RaffleConfig) -> Self {
        Self {
            ticket_price: config.ticket_price,
            pot_seed: config.pot_seed,
        }
    }

    /// Seed the day's pot and an empty ticket book.
    #[must_use]
    pub fn prepare(&self) -> ValueMap {
        ValueMap::from([
            ("pot".to_owned(), Value::Int(self.pot_seed)),
            ("tickets".to_owned(), Value::Map(ValueMap::new())),
        ])
    }

    /// Announce the raffle and open the ticket booth thread.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when messaging or persistence fails.
    pub async fn on_begin<M: Messenger>(&self, cx: &EventCx<'_, M>) -> Result<(), EventError> {
        let content = format!(
            "Raffle day! Tickets cost {} each and the pot opens at {}. \
             The winner is drawn at the next reset.",
            self.ticket_price, self.pot_seed
        );
        cx.announce_once(&content).await?;
        cx.thread_once("Raffle ticket booth").await?;
        Ok(())
    }

    /// Sell one ticket to `user`.
    ///
    /// The charge is checked: a buyer who cannot cover the price gets
    /// an [`TicketPurchase::InsufficientFunds`] refusal and neither the
    /// pot nor the ticket book changes. An applied charge is followed
    /// by one atomic payload update covering both counters.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the wallet or the store fails.
    pub async fn buy_ticket<M: Messenger>(
        &self,
        cx: &EventCx<'_, M>,
        user: &UserId,
    ) -> Result<TicketPurchase, EventError> {
        let charge = cx.wallet().grant(
            user,
            self.ticket_price.saturating_neg(),
            RewardSource::Raffle,
            GrantPolicy::Checked,
        )?;
        if let GrantOutcome::InsufficientFunds { balance } = charge {
            return Ok(TicketPurchase::InsufficientFunds { balance });
        }

        let price = self.ticket_price;
        let key = user.as_str().to_owned();
        let (tickets, pot) = cx.update_data(move |data| {
            let mut book = match data.remove("tickets") {
                Some(Value::Map(map)) => map,
                _ => ValueMap::new(),
            };
            let count = book
                .get(&key)
                .and_then(Value::as_int)
                .unwrap_or(0)
                .saturating_add(1);
            book.insert(key, Value::Int(count));
            data.insert("tickets".to_owned(), Value::Map(book));

            let pot = data
                .get("pot")
                .and_then(Value::as_int)
                .unwrap_or(0)
                .saturating_add(price);
            data.insert("pot".to_owned(), Value::Int(pot));
            (count, pot)
        })?;

        cx.post_in_thread(&format!("{user} bought a ticket. The pot is now {pot}."))
            .await?;
        Ok(TicketPurchase::Bought { tickets, pot })
    }

    /// Draw the winner, weighted by tickets held, and pay the pot.
    ///
    /// A day with no tickets sold settles quietly; the pot is not paid
    /// to anyone.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] when the payout or messaging fails.
    pub async fn on_end<M: Messenger>(
        &self,
        cx: &EventCx<'_, M>,
        rng: &mut impl Rng,
    ) -> Result<(), EventError> {
        let state = cx.state()?;
        let pot = state
            .data
            .get("pot")
            .and_then(Value::as_int)
            .unwrap_or(self.pot_seed);

        let mut entries = Vec::new();
        if let Some(book) = state.data.get("tickets").and_then(Value::as_map) {
            for (holder, count) in book {
                let weight =
                    u32::try_from(count.as_int().unwrap_or(0).max(0)).unwrap_or(u32::MAX);
                entries.push(WeightedEntry {
                    entry: PoolEntry::Item(holder.clone()),
                    weight,
                });
            }
        }
        let draw = Pool {
            name: "raffle-draw".to_owned(),
            entries,
        };

        match draw.select_one(rng).map(ToOwned::to_owned) {
            Some(raw) => {
                let winner = UserId::from(raw);
                cx.wallet()
                    .grant(&winner, pot, RewardSource::Raffle, GrantPolicy::AllowNegative)?;
                record_source_stat(cx.store(), RewardSource::Raffle, pot)?;
                let noted = winner.as_str().to_owned();
                cx.update_data(move |data| {
                    data.insert("winner".to_owned(), Value::Str(noted));
                })?;
                info!(winner = %winner, pot, "Raffle settled");
                cx.post_in_thread(&format!("The draw is in: {winner} takes the pot of {pot}!"))
                    .await?;
            }
            None => {
                info!("Raffle closed with no tickets sold");
                cx.post_in_thread("The raffle closed with no tickets sold. The pot keeps its dust.")
                    .await?;
            }
        }
        cx.archive_thread().await?;
        Ok(())
    }
}

const fn default_ticket_price() -> i64 {
    25
}

const fn default_pot_seed() -> i64 {
    200
}
