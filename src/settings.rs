//! Named configuration values resolved from the store, with defaults.
//!
//! The settings table is a plain key→string lookup owned by operator tooling;
//! the core only reads the three keys below. Unset or unparseable values fall
//! back to the documented defaults.

use crate::{errors::StorageError, storage::VenueStorage};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Minimum stake accepted at placement. Decimal, default 1.
pub const MIN_BET_AMOUNT: &str = "MIN_BET_AMOUNT";

/// Days a winner has to claim after results are published. Integer, default 5.
/// Applied as plain calendar days despite the name; whether it should skip
/// weekends is an open policy decision for the system owner.
pub const PRIZE_CLAIM_BUSINESS_DAYS: &str = "PRIZE_CLAIM_BUSINESS_DAYS";

/// Extra prize percent when the customer's birthday matches the draw date.
/// Decimal, default 10.
pub const BIRTHDAY_BONUS_PERCENT: &str = "BIRTHDAY_BONUS_PERCENT";

const SETTING_PREFIX: &str = "setting:";

#[derive(Clone)]
pub struct Settings {
    storage: Arc<VenueStorage>,
}

impl Settings {
    pub fn new(storage: Arc<VenueStorage>) -> Self {
        Self { storage }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let raw = self.storage.get(format!("{SETTING_PREFIX}{key}").as_bytes())?;
        String::from_utf8(raw).ok()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage
            .put(format!("{SETTING_PREFIX}{key}").as_bytes(), value.as_bytes())
    }

    /// Every stored setting, in key order.
    pub fn all(&self) -> Vec<(String, String)> {
        self.storage
            .scan_prefix(SETTING_PREFIX.as_bytes())
            .into_iter()
            .filter_map(|(key, value)| {
                let key = String::from_utf8(key).ok()?;
                let value = String::from_utf8(value).ok()?;
                Some((key[SETTING_PREFIX.len()..].to_string(), value))
            })
            .collect()
    }

    fn get_decimal(&self, key: &str) -> Option<Decimal> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn min_bet_amount(&self) -> Decimal {
        self.get_decimal(MIN_BET_AMOUNT).unwrap_or(Decimal::ONE)
    }

    pub fn prize_claim_days(&self) -> i64 {
        self.get_i64(PRIZE_CLAIM_BUSINESS_DAYS).unwrap_or(5)
    }

    pub fn birthday_bonus_percent(&self) -> Decimal {
        self.get_decimal(BIRTHDAY_BONUS_PERCENT)
            .unwrap_or_else(|| Decimal::from(10))
    }
}
