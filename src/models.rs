//! Canonical entity types for the lottery venue.
//!
//! Every struct here is a persisted row. State enums serialize as stable
//! strings (never ordinals) so historical rows remain interpretable if the
//! variant set grows.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a lottery event. Linear, terminal at
/// `ResultsPublished`; no state is ever revisited.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventState {
    Programmed,
    Open,
    Closed,
    ResultsPublished,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Programmed => "PROGRAMMED",
            EventState::Open => "OPEN",
            EventState::Closed => "CLOSED",
            EventState::ResultsPublished => "RESULTS_PUBLISHED",
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states of a bet. `Paid` and `Expired` are terminal; `Void` is
/// reachable only through the administrative correction path.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetState {
    Issued,
    WinPending,
    Paid,
    Expired,
    Void,
}

impl BetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetState::Issued => "ISSUED",
            BetState::WinPending => "WIN_PENDING",
            BetState::Paid => "PAID",
            BetState::Expired => "EXPIRED",
            BetState::Void => "VOID",
        }
    }
}

impl fmt::Display for BetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kind of lottery offered by the venue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LotteryType {
    pub id: u64,
    pub name: String,
    /// Multiplier applied to a winning stake to get the base prize.
    pub payout_factor: Decimal,
    /// Number of draws scheduled per day by the daily-generation batch.
    pub events_per_day: u32,
    /// Inactive types cannot receive new events.
    pub is_active: bool,
}

/// One scheduled lottery drawing for a given type, date, and sequence number.
///
/// The tuple (lottery_type_id, event_date, event_number_of_day) is unique.
/// Events are never deleted; they are the venue's historical record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LotteryEvent {
    pub id: u64,
    pub lottery_type_id: u64,
    pub event_date: NaiveDate,
    /// 1-based Nth draw of this type on this date.
    pub event_number_of_day: u32,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub state: EventState,
    /// Set exactly once, when results are published. 0..=99.
    pub winning_number: Option<u8>,
    pub results_published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A single wager on a two-digit number against one event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub id: u64,
    pub event_id: u64,
    pub customer_id: u64,
    /// Operator who registered the bet.
    pub user_id: u64,
    /// 0..=99.
    pub number_played: u8,
    pub amount: Decimal,
    pub placed_at: DateTime<Utc>,
    /// Opaque unique token printed on the voucher; allows unauthenticated
    /// status lookup.
    pub claim_token: String,
    pub state: BetState,
}

/// Record of a prize payment. Created exactly once per paid bet and never
/// mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Payout {
    pub id: u64,
    pub bet_id: u64,
    pub calculated_prize: Decimal,
    pub birthday_bonus_applied: bool,
    pub paid_at: DateTime<Utc>,
    pub paid_by_user_id: u64,
    pub receipt_number: String,
}

/// A venue customer. Only the month and day of `birth_date` carry meaning in
/// the core (the birthday bonus rule).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: u64,
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Whether the customer's birth month/day match the given calendar date.
    /// The bonus rule compares against the event's draw date, not "today".
    pub fn has_birthday_on(&self, date: NaiveDate) -> bool {
        self.birth_date
            .map_or(false, |b| b.month() == date.month() && b.day() == date.day())
    }
}

/// Full prize breakdown. All four components are surfaced so callers can
/// always explain the number on the receipt, never just the total.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrizeBreakdown {
    pub base_prize: Decimal,
    pub is_birthday: bool,
    pub birthday_bonus: Decimal,
    pub total_prize: Decimal,
}

/// Result of publishing an event's winning number.
#[derive(Clone, Debug)]
pub struct PublishOutcome {
    pub event: LotteryEvent,
    /// Bets flagged `WIN_PENDING` in the same commit as the event update.
    pub winners_flagged: usize,
}

impl PublishOutcome {
    /// Human-readable outcome: "N winner(s)", or "deserted draw" when no bet
    /// matched the winning number.
    pub fn summary(&self) -> String {
        if self.winners_flagged == 0 {
            "deserted draw".to_string()
        } else {
            format!("{} winner(s)", self.winners_flagged)
        }
    }
}
