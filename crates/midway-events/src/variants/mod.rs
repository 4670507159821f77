//! Concrete event implementations, one module per registry tag.

pub mod boost;
pub mod hunt;
pub mod raffle;
pub mod special;

pub use boost::BoostEvent;
pub use hunt::{HuntEvent, SolveOutcome};
pub use raffle::{RaffleEvent, TicketPurchase};
pub use special::SpecialEvent;
