//! Error taxonomy for the lifecycle engine.
//!
//! Every variant is a recoverable-by-caller condition: the interactive
//! handler or the scheduler decides whether to surface, log, or retry. A
//! failed operation leaves all entities exactly as they were before the call.

use crate::models::EventState;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Storage layer failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database open failed: {0}")]
    OpenFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

/// Failures of lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The entity is not in the source state the requested move requires.
    #[error("{entity} is {current}, operation requires {required}")]
    InvalidTransition {
        entity: &'static str,
        current: String,
        required: &'static str,
    },

    #[error("{field} must be between 00 and 99, got {value}")]
    OutOfRange { field: &'static str, value: u32 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("bet {bet_id} was already paid")]
    AlreadyPaid {
        bet_id: u64,
        /// When the existing payout was made, if its record was found.
        paid_at: Option<DateTime<Utc>>,
    },

    #[error("bet played {played:02}, winning number is {winning:02}")]
    NotAWinner { played: u8, winning: u8 },

    #[error("prize claim window closed at {deadline}")]
    ClaimExpired { deadline: DateTime<Utc> },

    #[error("stake {amount} is below the minimum bet of {minimum}")]
    BelowMinimumStake { amount: Decimal, minimum: Decimal },

    #[error("event is {state}, not open for betting")]
    EventNotOpen { state: EventState },

    #[error("lottery type {id} is not active")]
    InactiveLotteryType { id: u64 },

    #[error("results not published, event is {state}")]
    ResultsNotPublished { state: EventState },

    #[error("an event already exists for lottery type {lottery_type_id} on {date}, draw #{sequence}")]
    DuplicateEvent {
        lottery_type_id: u64,
        date: NaiveDate,
        sequence: u32,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub(crate) fn invalid_transition(
        entity: &'static str,
        current: impl ToString,
        required: &'static str,
    ) -> Self {
        EngineError::InvalidTransition {
            entity,
            current: current.to_string(),
            required,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Convenience type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
