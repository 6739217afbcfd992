//! Sorteo — numbers-lottery venue lifecycle engine.
//!
//! Customers bet on a two-digit number (00–99) against scheduled draw
//! events; the venue publishes a winning number, computes prizes (with a
//! birthday bonus rule), and pays winners within a claim window. This crate
//! is the lifecycle core: the event and bet state machines, winner
//! determination and exact prize computation, and the background sweep that
//! advances events on schedule and forfeits unclaimed prizes.
//!
//! Interactive callers and the [`scheduler::Scheduler`] invoke the same
//! [`lifecycle::LifecycleEngine`] operations against the same store; the
//! engine is the only place that enforces legal transitions and computes
//! money.

pub mod audit;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod scheduler;
pub mod settings;
pub mod storage;
pub mod store;

pub use audit::{AuditRecord, AuditSink, LogAuditSink};
pub use config::{ConfigLoader, SorteoConfig};
pub use errors::{EngineError, EngineResult, StorageError};
pub use lifecycle::{BetTicket, LifecycleEngine, NewEvent, PlaceBet, SweepCounts};
pub use models::{
    Bet, BetState, Customer, EventState, LotteryEvent, LotteryType, Payout, PrizeBreakdown,
    PublishOutcome,
};
pub use scheduler::Scheduler;
pub use settings::Settings;
pub use storage::VenueStorage;
