//! Persistent venue rows and their secondary indexes.
//!
//! Key layout, one prefix per concern, numeric components zero-padded so
//! lexicographic order equals id order:
//!
//! ```text
//! event:row:{id}                        LotteryEvent (JSON)
//! event:date:{date}:{id}               index, empty value
//! event:slot:{type}:{date}:{seq}       uniqueness guard, value = event id
//! bet:row:{id}                          Bet (JSON)
//! bet:event:{event_id}:{bet_id}        index, empty value
//! bet:token:{claim_token}              value = bet id
//! bet:win_pending:{bet_id}             index, empty value
//! payout:row:{id}                       Payout (JSON)
//! payout:bet:{bet_id}                  value = payout id
//! customer:row:{id}                     Customer (JSON)
//! lottery_type:row:{id}                 LotteryType (JSON)
//! ```
//!
//! The win-pending index is maintained in the same batch as the bet row it
//! mirrors: entries are added when a bet turns `WIN_PENDING` and removed when
//! it leaves that state, so the expiration sweep never rescans settled bets.

use crate::{
    errors::StorageError,
    models::{Bet, Customer, LotteryEvent, LotteryType, Payout},
    storage::{Batch, VenueStorage},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};

const EVENT_ROW_PREFIX: &str = "event:row:";
const EVENT_DATE_PREFIX: &str = "event:date:";
const EVENT_SLOT_PREFIX: &str = "event:slot:";
const BET_ROW_PREFIX: &str = "bet:row:";
const BET_EVENT_PREFIX: &str = "bet:event:";
const BET_TOKEN_PREFIX: &str = "bet:token:";
const BET_WIN_PENDING_PREFIX: &str = "bet:win_pending:";
const PAYOUT_ROW_PREFIX: &str = "payout:row:";
const PAYOUT_BET_PREFIX: &str = "payout:bet:";
const CUSTOMER_ROW_PREFIX: &str = "customer:row:";
const LOTTERY_TYPE_ROW_PREFIX: &str = "lottery_type:row:";

fn pad(id: u64) -> String {
    format!("{id:020}")
}

fn event_row_key(id: u64) -> Vec<u8> {
    format!("{EVENT_ROW_PREFIX}{}", pad(id)).into_bytes()
}

fn event_date_key(date: NaiveDate, id: u64) -> Vec<u8> {
    format!("{EVENT_DATE_PREFIX}{date}:{}", pad(id)).into_bytes()
}

fn event_slot_key(lottery_type_id: u64, date: NaiveDate, sequence: u32) -> Vec<u8> {
    format!("{EVENT_SLOT_PREFIX}{}:{date}:{sequence:04}", pad(lottery_type_id)).into_bytes()
}

fn bet_row_key(id: u64) -> Vec<u8> {
    format!("{BET_ROW_PREFIX}{}", pad(id)).into_bytes()
}

fn bet_event_key(event_id: u64, bet_id: u64) -> Vec<u8> {
    format!("{BET_EVENT_PREFIX}{}:{}", pad(event_id), pad(bet_id)).into_bytes()
}

fn bet_token_key(token: &str) -> Vec<u8> {
    format!("{BET_TOKEN_PREFIX}{token}").into_bytes()
}

fn bet_win_pending_key(bet_id: u64) -> Vec<u8> {
    format!("{BET_WIN_PENDING_PREFIX}{}", pad(bet_id)).into_bytes()
}

fn payout_row_key(id: u64) -> Vec<u8> {
    format!("{PAYOUT_ROW_PREFIX}{}", pad(id)).into_bytes()
}

fn payout_bet_key(bet_id: u64) -> Vec<u8> {
    format!("{PAYOUT_BET_PREFIX}{}", pad(bet_id)).into_bytes()
}

fn customer_row_key(id: u64) -> Vec<u8> {
    format!("{CUSTOMER_ROW_PREFIX}{}", pad(id)).into_bytes()
}

fn lottery_type_row_key(id: u64) -> Vec<u8> {
    format!("{LOTTERY_TYPE_ROW_PREFIX}{}", pad(id)).into_bytes()
}

fn encode<T: Serialize>(what: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::WriteFailed(format!("failed to encode {what}: {e}")))
}

fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("failed to decode {what}: {e}")))
}

fn decode_id(what: &str, bytes: &[u8]) -> Result<u64, StorageError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::CorruptedData(format!("invalid id value in {what}")))?;
    Ok(u64::from_be_bytes(raw))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub fn load_event(storage: &VenueStorage, id: u64) -> Result<Option<LotteryEvent>, StorageError> {
    match storage.get(&event_row_key(id)) {
        Some(bytes) => Ok(Some(decode(&format!("event {id}"), &bytes)?)),
        None => Ok(None),
    }
}

/// Stage an event row update. State transitions touch only the row; the
/// date and slot indexes are immutable after creation.
pub fn stage_event(batch: &mut Batch, event: &LotteryEvent) -> Result<(), StorageError> {
    batch.put(
        event_row_key(event.id),
        encode(&format!("event {}", event.id), event)?,
    );
    Ok(())
}

/// Stage a newly created event: row plus date index plus slot guard.
pub fn stage_new_event(batch: &mut Batch, event: &LotteryEvent) -> Result<(), StorageError> {
    stage_event(batch, event)?;
    batch.put(event_date_key(event.event_date, event.id), Vec::new());
    batch.put(
        event_slot_key(event.lottery_type_id, event.event_date, event.event_number_of_day),
        event.id.to_be_bytes(),
    );
    Ok(())
}

pub fn slot_taken(
    storage: &VenueStorage,
    lottery_type_id: u64,
    date: NaiveDate,
    sequence: u32,
) -> bool {
    storage
        .get(&event_slot_key(lottery_type_id, date, sequence))
        .is_some()
}

/// All events dated `date`, in id order.
pub fn load_events_by_date(
    storage: &VenueStorage,
    date: NaiveDate,
) -> Result<Vec<LotteryEvent>, StorageError> {
    let prefix = format!("{EVENT_DATE_PREFIX}{date}:").into_bytes();
    let mut events = Vec::new();
    for (key, _) in storage.scan_prefix(&prefix) {
        let id_part = &key[prefix.len()..];
        let id: u64 = std::str::from_utf8(id_part)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                StorageError::CorruptedData("invalid event date index key".to_string())
            })?;
        match load_event(storage, id)? {
            Some(event) => events.push(event),
            None => {
                tracing::warn!(event_id = id, "date index points at missing event row");
            }
        }
    }
    Ok(events)
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

pub fn load_bet(storage: &VenueStorage, id: u64) -> Result<Option<Bet>, StorageError> {
    match storage.get(&bet_row_key(id)) {
        Some(bytes) => Ok(Some(decode(&format!("bet {id}"), &bytes)?)),
        None => Ok(None),
    }
}

/// Stage a bet row update (state transitions).
pub fn stage_bet(batch: &mut Batch, bet: &Bet) -> Result<(), StorageError> {
    batch.put(bet_row_key(bet.id), encode(&format!("bet {}", bet.id), bet)?);
    Ok(())
}

/// Stage a newly placed bet: row plus event index plus claim-token lookup.
pub fn stage_new_bet(batch: &mut Batch, bet: &Bet) -> Result<(), StorageError> {
    stage_bet(batch, bet)?;
    batch.put(bet_event_key(bet.event_id, bet.id), Vec::new());
    batch.put(bet_token_key(&bet.claim_token), bet.id.to_be_bytes());
    Ok(())
}

pub fn bet_id_by_token(
    storage: &VenueStorage,
    token: &str,
) -> Result<Option<u64>, StorageError> {
    match storage.get(&bet_token_key(token)) {
        Some(bytes) => Ok(Some(decode_id("claim token index", &bytes)?)),
        None => Ok(None),
    }
}

/// All bets placed against an event, in id order.
pub fn load_bets_for_event(
    storage: &VenueStorage,
    event_id: u64,
) -> Result<Vec<Bet>, StorageError> {
    let prefix = format!("{BET_EVENT_PREFIX}{}:", pad(event_id)).into_bytes();
    let mut bets = Vec::new();
    for (key, _) in storage.scan_prefix(&prefix) {
        let id_part = &key[prefix.len()..];
        let id: u64 = std::str::from_utf8(id_part)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StorageError::CorruptedData("invalid bet event index key".to_string()))?;
        match load_bet(storage, id)? {
            Some(bet) => bets.push(bet),
            None => {
                tracing::warn!(bet_id = id, "event index points at missing bet row");
            }
        }
    }
    Ok(bets)
}

pub fn stage_win_pending_mark(batch: &mut Batch, bet_id: u64) {
    batch.put(bet_win_pending_key(bet_id), Vec::new());
}

pub fn stage_win_pending_clear(batch: &mut Batch, bet_id: u64) {
    batch.delete(bet_win_pending_key(bet_id));
}

/// Ids of every bet currently flagged `WIN_PENDING`.
pub fn load_win_pending_bet_ids(storage: &VenueStorage) -> Result<Vec<u64>, StorageError> {
    let prefix = BET_WIN_PENDING_PREFIX.as_bytes();
    let mut ids = Vec::new();
    for (key, _) in storage.scan_prefix(prefix) {
        let id_part = &key[prefix.len()..];
        let id: u64 = std::str::from_utf8(id_part)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                StorageError::CorruptedData("invalid win-pending index key".to_string())
            })?;
        ids.push(id);
    }
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Payouts
// ---------------------------------------------------------------------------

pub fn load_payout_by_bet(
    storage: &VenueStorage,
    bet_id: u64,
) -> Result<Option<Payout>, StorageError> {
    let Some(bytes) = storage.get(&payout_bet_key(bet_id)) else {
        return Ok(None);
    };
    let payout_id = decode_id("payout bet index", &bytes)?;
    match storage.get(&payout_row_key(payout_id)) {
        Some(bytes) => Ok(Some(decode(&format!("payout {payout_id}"), &bytes)?)),
        None => Err(StorageError::CorruptedData(format!(
            "payout index for bet {bet_id} points at missing payout {payout_id}"
        ))),
    }
}

/// Stage a payout: row plus the one-payout-per-bet index. Always committed in
/// the same batch as the bet's `PAID` update.
pub fn stage_new_payout(batch: &mut Batch, payout: &Payout) -> Result<(), StorageError> {
    batch.put(
        payout_row_key(payout.id),
        encode(&format!("payout {}", payout.id), payout)?,
    );
    batch.put(payout_bet_key(payout.bet_id), payout.id.to_be_bytes());
    Ok(())
}

// ---------------------------------------------------------------------------
// Customers and lottery types (boilerplate rows the core reads)
// ---------------------------------------------------------------------------

pub struct NewCustomer {
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
}

pub fn create_customer(
    storage: &VenueStorage,
    new: NewCustomer,
) -> Result<Customer, StorageError> {
    let _guard = storage.lock_commits();
    let customer = Customer {
        id: storage.next_id("customer")?,
        full_name: new.full_name,
        phone: new.phone,
        email: new.email,
        birth_date: new.birth_date,
        address: new.address,
        is_active: true,
        created_at: Utc::now(),
    };
    storage.put(
        &customer_row_key(customer.id),
        &encode(&format!("customer {}", customer.id), &customer)?,
    )?;
    Ok(customer)
}

pub fn load_customer(storage: &VenueStorage, id: u64) -> Result<Option<Customer>, StorageError> {
    match storage.get(&customer_row_key(id)) {
        Some(bytes) => Ok(Some(decode(&format!("customer {id}"), &bytes)?)),
        None => Ok(None),
    }
}

pub struct NewLotteryType {
    pub name: String,
    pub payout_factor: Decimal,
    pub events_per_day: u32,
}

pub fn create_lottery_type(
    storage: &VenueStorage,
    new: NewLotteryType,
) -> Result<LotteryType, StorageError> {
    let _guard = storage.lock_commits();
    let lottery_type = LotteryType {
        id: storage.next_id("lottery_type")?,
        name: new.name,
        payout_factor: new.payout_factor,
        events_per_day: new.events_per_day,
        is_active: true,
    };
    storage.put(
        &lottery_type_row_key(lottery_type.id),
        &encode(&format!("lottery type {}", lottery_type.id), &lottery_type)?,
    )?;
    Ok(lottery_type)
}

pub fn save_lottery_type(
    storage: &VenueStorage,
    lottery_type: &LotteryType,
) -> Result<(), StorageError> {
    storage.put(
        &lottery_type_row_key(lottery_type.id),
        &encode(&format!("lottery type {}", lottery_type.id), lottery_type)?,
    )
}

pub fn load_lottery_type(
    storage: &VenueStorage,
    id: u64,
) -> Result<Option<LotteryType>, StorageError> {
    match storage.get(&lottery_type_row_key(id)) {
        Some(bytes) => Ok(Some(decode(&format!("lottery type {id}"), &bytes)?)),
        None => Ok(None),
    }
}

/// All lottery types, optionally only active ones, in id order.
pub fn load_lottery_types(
    storage: &VenueStorage,
    only_active: bool,
) -> Result<Vec<LotteryType>, StorageError> {
    let mut types = Vec::new();
    for (key, bytes) in storage.scan_prefix(LOTTERY_TYPE_ROW_PREFIX.as_bytes()) {
        let lottery_type: LotteryType =
            decode(&format!("lottery type row {}", String::from_utf8_lossy(&key)), &bytes)?;
        if !only_active || lottery_type.is_active {
            types.push(lottery_type);
        }
    }
    Ok(types)
}
