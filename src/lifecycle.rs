//! The event/bet lifecycle engine.
//!
//! This is the single place that enforces legal state transitions and
//! computes money. Interactive operator actions and the background sweep both
//! go through the operations here, against the same store. Every mutating
//! operation is one read-modify-write cycle: it takes the storage commit
//! lock, re-reads the rows it is about to change, checks the transition
//! guards, and commits the row together with its index updates in a single
//! write batch. A concurrent caller that loses the race re-reads the
//! post-transition state and fails its guard cleanly instead of overwriting.

use crate::{
    audit::{AuditRecord, AuditSink},
    errors::{EngineError, EngineResult, StorageError},
    models::{
        Bet, BetState, Customer, EventState, LotteryEvent, LotteryType, Payout, PrizeBreakdown,
        PublishOutcome,
    },
    settings::Settings,
    store,
    storage::{Batch, VenueStorage},
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Venue hours used by the daily-generation batch.
fn default_open_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).expect("valid literal time")
}

fn default_close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(20, 0, 0).expect("valid literal time")
}

/// Request to place a bet against an open event.
#[derive(Clone, Debug)]
pub struct PlaceBet {
    pub event_id: u64,
    pub customer_id: u64,
    /// Operator registering the bet.
    pub user_id: u64,
    pub number_played: u8,
    pub amount: Decimal,
}

/// Request to create a single programmed event.
#[derive(Clone, Debug)]
pub struct NewEvent {
    pub lottery_type_id: u64,
    pub event_date: NaiveDate,
    pub event_number_of_day: u32,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

/// What one auto-advance pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepCounts {
    pub opened: usize,
    pub closed: usize,
    /// Events whose transition failed; the rest of the pass still ran.
    pub failed: usize,
}

/// A bet joined with its event, as returned by the public claim-token lookup.
#[derive(Clone, Debug)]
pub struct BetTicket {
    pub bet: Bet,
    pub event: LotteryEvent,
}

pub struct LifecycleEngine {
    storage: Arc<VenueStorage>,
    settings: Settings,
    audit: Arc<dyn AuditSink>,
}

impl LifecycleEngine {
    pub fn new(storage: Arc<VenueStorage>, audit: Arc<dyn AuditSink>) -> Self {
        let settings = Settings::new(storage.clone());
        Self {
            storage,
            settings,
            audit,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Create a single `PROGRAMMED` event. The (type, date, sequence) slot
    /// must be free and the lottery type active.
    pub fn create_event(&self, spec: NewEvent, actor: u64) -> EngineResult<LotteryEvent> {
        let _guard = self.storage.lock_commits();

        let lottery_type = store::load_lottery_type(&self.storage, spec.lottery_type_id)?
            .ok_or_else(|| EngineError::not_found("lottery type", spec.lottery_type_id))?;
        if !lottery_type.is_active {
            return Err(EngineError::InactiveLotteryType {
                id: lottery_type.id,
            });
        }

        if store::slot_taken(
            &self.storage,
            spec.lottery_type_id,
            spec.event_date,
            spec.event_number_of_day,
        ) {
            return Err(EngineError::DuplicateEvent {
                lottery_type_id: spec.lottery_type_id,
                date: spec.event_date,
                sequence: spec.event_number_of_day,
            });
        }

        let event = LotteryEvent {
            id: self.storage.next_id("event")?,
            lottery_type_id: spec.lottery_type_id,
            event_date: spec.event_date,
            event_number_of_day: spec.event_number_of_day,
            open_time: spec.open_time,
            close_time: spec.close_time,
            state: EventState::Programmed,
            winning_number: None,
            results_published_at: None,
            created_at: Utc::now(),
        };

        let mut batch = Batch::new();
        store::stage_new_event(&mut batch, &event)?;
        self.storage.batch_write(batch)?;

        tracing::info!(
            event_id = event.id,
            lottery_type_id = event.lottery_type_id,
            date = %event.event_date,
            sequence = event.event_number_of_day,
            "event created"
        );
        self.audit.record(AuditRecord {
            actor: Some(actor),
            action: "event.created",
            entity: "event",
            entity_id: event.id,
            payload: serde_json::json!({
                "lotteryTypeId": event.lottery_type_id,
                "date": event.event_date,
                "sequence": event.event_number_of_day,
            }),
        });
        Ok(event)
    }

    /// Create one `PROGRAMMED` event per draw sequence for every active
    /// lottery type on `date`, with default venue hours. Slots that already
    /// exist are skipped, so re-running the batch for a date is harmless.
    pub fn generate_daily_events(
        &self,
        date: NaiveDate,
        actor: u64,
    ) -> EngineResult<Vec<LotteryEvent>> {
        let types = store::load_lottery_types(&self.storage, true)?;
        let mut created = Vec::new();
        for lottery_type in types {
            for sequence in 1..=lottery_type.events_per_day {
                let spec = NewEvent {
                    lottery_type_id: lottery_type.id,
                    event_date: date,
                    event_number_of_day: sequence,
                    open_time: default_open_time(),
                    close_time: default_close_time(),
                };
                match self.create_event(spec, actor) {
                    Ok(event) => created.push(event),
                    Err(EngineError::DuplicateEvent { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        tracing::info!(%date, created = created.len(), "daily events generated");
        Ok(created)
    }

    pub fn get_event(&self, event_id: u64) -> EngineResult<LotteryEvent> {
        self.load_event_required(event_id)
    }

    /// `PROGRAMMED → OPEN`.
    pub fn open_event(&self, event_id: u64, actor: Option<u64>) -> EngineResult<LotteryEvent> {
        let event = self.transition_event(event_id, EventState::Programmed, EventState::Open)?;
        tracing::info!(event_id, "event opened for betting");
        self.audit.record(AuditRecord {
            actor,
            action: "event.opened",
            entity: "event",
            entity_id: event_id,
            payload: serde_json::json!({ "state": event.state }),
        });
        Ok(event)
    }

    /// `OPEN → CLOSED`.
    pub fn close_event(&self, event_id: u64, actor: Option<u64>) -> EngineResult<LotteryEvent> {
        let event = self.transition_event(event_id, EventState::Open, EventState::Closed)?;
        tracing::info!(event_id, "event closed");
        self.audit.record(AuditRecord {
            actor,
            action: "event.closed",
            entity: "event",
            entity_id: event_id,
            payload: serde_json::json!({ "state": event.state }),
        });
        Ok(event)
    }

    /// `CLOSED → RESULTS_PUBLISHED`, and — in the same commit — every
    /// `ISSUED` bet on the event whose number matches turns `WIN_PENDING`.
    ///
    /// Zero winners is a valid outcome (a deserted draw), never an error.
    pub fn publish_results(
        &self,
        event_id: u64,
        winning_number: u8,
        actor: u64,
    ) -> EngineResult<PublishOutcome> {
        if winning_number > 99 {
            return Err(EngineError::OutOfRange {
                field: "winning_number",
                value: winning_number as u32,
            });
        }

        let _guard = self.storage.lock_commits();

        let mut event = self.load_event_required(event_id)?;
        if event.state != EventState::Closed {
            return Err(EngineError::invalid_transition(
                "event",
                event.state,
                EventState::Closed.as_str(),
            ));
        }

        event.winning_number = Some(winning_number);
        event.state = EventState::ResultsPublished;
        event.results_published_at = Some(Utc::now());

        let mut batch = Batch::new();
        store::stage_event(&mut batch, &event)?;

        let mut winners_flagged = 0usize;
        for mut bet in store::load_bets_for_event(&self.storage, event_id)? {
            if bet.state == BetState::Issued && bet.number_played == winning_number {
                bet.state = BetState::WinPending;
                store::stage_bet(&mut batch, &bet)?;
                store::stage_win_pending_mark(&mut batch, bet.id);
                winners_flagged += 1;
            }
        }

        self.storage.batch_write(batch)?;

        let outcome = PublishOutcome {
            event,
            winners_flagged,
        };
        tracing::info!(
            event_id,
            winning_number,
            winners = winners_flagged,
            outcome = %outcome.summary(),
            "results published"
        );
        self.audit.record(AuditRecord {
            actor: Some(actor),
            action: "event.results_published",
            entity: "event",
            entity_id: event_id,
            payload: serde_json::json!({
                "winningNumber": winning_number,
                "winners": winners_flagged,
            }),
        });
        Ok(outcome)
    }

    /// Open every `PROGRAMMED` event dated today whose open time has passed,
    /// then close every `OPEN` event whose close time has passed. Events are
    /// processed independently; one failure never blocks the rest.
    ///
    /// `now` is the sweep's single clock snapshot for the whole pass.
    pub fn auto_advance_events(&self, now: DateTime<Utc>) -> EngineResult<SweepCounts> {
        let today = now.date_naive();
        let time_of_day = now.time();
        let mut counts = SweepCounts::default();

        for event in store::load_events_by_date(&self.storage, today)? {
            if event.state == EventState::Programmed && event.open_time <= time_of_day {
                match self.open_event(event.id, None) {
                    Ok(_) => counts.opened += 1,
                    // An operator advanced it between our read and the
                    // transition's re-read; nothing to do.
                    Err(EngineError::InvalidTransition { .. }) => {}
                    Err(e) => {
                        counts.failed += 1;
                        tracing::error!(event_id = event.id, error = %e, "auto-open failed");
                    }
                }
            } else if event.state == EventState::Open && event.close_time <= time_of_day {
                match self.close_event(event.id, None) {
                    Ok(_) => counts.closed += 1,
                    Err(EngineError::InvalidTransition { .. }) => {}
                    Err(e) => {
                        counts.failed += 1;
                        tracing::error!(event_id = event.id, error = %e, "auto-close failed");
                    }
                }
            }
        }
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Bets
    // -----------------------------------------------------------------------

    /// Register a bet against an open event. Any failing precondition rejects
    /// the whole operation; nothing is persisted.
    pub fn place_bet(&self, request: PlaceBet) -> EngineResult<Bet> {
        if request.number_played > 99 {
            return Err(EngineError::OutOfRange {
                field: "number_played",
                value: request.number_played as u32,
            });
        }

        let minimum = self.settings.min_bet_amount();
        if request.amount < minimum {
            return Err(EngineError::BelowMinimumStake {
                amount: request.amount,
                minimum,
            });
        }

        let _guard = self.storage.lock_commits();

        let event = store::load_event(&self.storage, request.event_id)?
            .ok_or_else(|| EngineError::not_found("event", request.event_id))?;
        if event.state != EventState::Open {
            return Err(EngineError::EventNotOpen { state: event.state });
        }

        store::load_customer(&self.storage, request.customer_id)?
            .ok_or_else(|| EngineError::not_found("customer", request.customer_id))?;

        let bet = Bet {
            id: self.storage.next_id("bet")?,
            event_id: request.event_id,
            customer_id: request.customer_id,
            user_id: request.user_id,
            number_played: request.number_played,
            amount: request.amount,
            placed_at: Utc::now(),
            claim_token: Uuid::new_v4().to_string(),
            state: BetState::Issued,
        };

        let mut batch = Batch::new();
        store::stage_new_bet(&mut batch, &bet)?;
        self.storage.batch_write(batch)?;

        tracing::info!(
            bet_id = bet.id,
            event_id = bet.event_id,
            number = bet.number_played,
            amount = %bet.amount,
            "bet placed"
        );
        self.audit.record(AuditRecord {
            actor: Some(request.user_id),
            action: "bet.placed",
            entity: "bet",
            entity_id: bet.id,
            payload: serde_json::json!({
                "eventId": bet.event_id,
                "customerId": bet.customer_id,
                "number": bet.number_played,
                "amount": bet.amount,
            }),
        });
        Ok(bet)
    }

    /// Administrative correction: void a bet that has not yet settled. Legal
    /// from `ISSUED` and `WIN_PENDING` only; `PAID` and `EXPIRED` are
    /// terminal.
    pub fn void_bet(&self, bet_id: u64, actor: u64) -> EngineResult<Bet> {
        let _guard = self.storage.lock_commits();

        let mut bet = store::load_bet(&self.storage, bet_id)?
            .ok_or_else(|| EngineError::not_found("bet", bet_id))?;
        match bet.state {
            BetState::Issued | BetState::WinPending => {}
            other => {
                return Err(EngineError::invalid_transition(
                    "bet",
                    other,
                    "ISSUED or WIN_PENDING",
                ))
            }
        }

        let was_win_pending = bet.state == BetState::WinPending;
        bet.state = BetState::Void;

        let mut batch = Batch::new();
        store::stage_bet(&mut batch, &bet)?;
        if was_win_pending {
            store::stage_win_pending_clear(&mut batch, bet.id);
        }
        self.storage.batch_write(batch)?;

        tracing::info!(bet_id, "bet voided");
        self.audit.record(AuditRecord {
            actor: Some(actor),
            action: "bet.voided",
            entity: "bet",
            entity_id: bet_id,
            payload: serde_json::json!({}),
        });
        Ok(bet)
    }

    /// Public, unauthenticated status lookup by the voucher's claim token.
    pub fn bet_by_claim_token(&self, token: &str) -> EngineResult<BetTicket> {
        let bet_id = store::bet_id_by_token(&self.storage, token)?
            .ok_or_else(|| EngineError::not_found("bet", token))?;
        let bet = store::load_bet(&self.storage, bet_id)?
            .ok_or_else(|| EngineError::not_found("bet", bet_id))?;
        let event = self.load_event_required(bet.event_id)?;
        Ok(BetTicket { bet, event })
    }

    /// Expire every `WIN_PENDING` bet whose claim window has elapsed. Bets
    /// are processed independently; re-checking an already settled bet is a
    /// no-op.
    ///
    /// Returns the number of bets expired in this pass.
    pub fn expire_overdue_bets(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let claim_days = self.settings.prize_claim_days();
        let mut expired = 0usize;
        for bet_id in store::load_win_pending_bet_ids(&self.storage)? {
            match self.expire_bet_if_overdue(bet_id, now, claim_days) {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(bet_id, error = %e, "expiration check failed");
                }
            }
        }
        if expired > 0 {
            tracing::info!(expired, "unclaimed winning bets expired");
        }
        Ok(expired)
    }

    fn expire_bet_if_overdue(
        &self,
        bet_id: u64,
        now: DateTime<Utc>,
        claim_days: i64,
    ) -> EngineResult<bool> {
        let _guard = self.storage.lock_commits();

        let Some(mut bet) = store::load_bet(&self.storage, bet_id)? else {
            // Stale index entry; drop it.
            let mut batch = Batch::new();
            store::stage_win_pending_clear(&mut batch, bet_id);
            self.storage.batch_write(batch)?;
            return Ok(false);
        };
        if bet.state != BetState::WinPending {
            // Settled between the index scan and this check (paid, voided, or
            // already expired by a payout attempt).
            let mut batch = Batch::new();
            store::stage_win_pending_clear(&mut batch, bet_id);
            self.storage.batch_write(batch)?;
            return Ok(false);
        }

        let Some(event) = store::load_event(&self.storage, bet.event_id)? else {
            return Ok(false);
        };
        if event.state != EventState::ResultsPublished {
            return Ok(false);
        }
        let Some(published_at) = event.results_published_at else {
            return Ok(false);
        };

        if now <= published_at + Duration::days(claim_days) {
            return Ok(false);
        }

        bet.state = BetState::Expired;
        let mut batch = Batch::new();
        store::stage_bet(&mut batch, &bet)?;
        store::stage_win_pending_clear(&mut batch, bet.id);
        self.storage.batch_write(batch)?;

        tracing::info!(bet_id, event_id = bet.event_id, "winning bet expired unclaimed");
        self.audit.record(AuditRecord {
            actor: None,
            action: "bet.expired",
            entity: "bet",
            entity_id: bet_id,
            payload: serde_json::json!({ "eventId": bet.event_id }),
        });
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Winner determination and payout
    // -----------------------------------------------------------------------

    /// True iff the event has a published winning number equal to the bet's.
    pub fn is_winner(bet: &Bet, event: &LotteryEvent) -> bool {
        event
            .winning_number
            .map_or(false, |n| n == bet.number_played)
    }

    /// Pure prize computation. Exact decimal arithmetic throughout; the
    /// birthday bonus is tied to the event's draw date, not the payout date.
    pub fn calculate_prize(
        bet: &Bet,
        lottery_type: &LotteryType,
        customer: &Customer,
        event: &LotteryEvent,
        bonus_percent: Decimal,
    ) -> PrizeBreakdown {
        let base_prize = bet.amount * lottery_type.payout_factor;
        let is_birthday = customer.has_birthday_on(event.event_date);
        let birthday_bonus = if is_birthday {
            base_prize * bonus_percent / Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        PrizeBreakdown {
            base_prize,
            is_birthday,
            birthday_bonus,
            total_prize: base_prize + birthday_bonus,
        }
    }

    /// Read-only prize preview for a winning bet: same preconditions as
    /// payment, no side effects, full breakdown so the teller can explain
    /// the amount.
    pub fn quote_payout(&self, bet_id: u64) -> EngineResult<PrizeBreakdown> {
        let bet = store::load_bet(&self.storage, bet_id)?
            .ok_or_else(|| EngineError::not_found("bet", bet_id))?;
        let event = self.load_event_required(bet.event_id)?;
        if event.state != EventState::ResultsPublished {
            return Err(EngineError::ResultsNotPublished { state: event.state });
        }
        let winning = event
            .winning_number
            .ok_or(EngineError::ResultsNotPublished { state: event.state })?;
        if bet.number_played != winning {
            return Err(EngineError::NotAWinner {
                played: bet.number_played,
                winning,
            });
        }

        let lottery_type = store::load_lottery_type(&self.storage, event.lottery_type_id)?
            .ok_or_else(|| EngineError::not_found("lottery type", event.lottery_type_id))?;
        let customer = store::load_customer(&self.storage, bet.customer_id)?
            .ok_or_else(|| EngineError::not_found("customer", bet.customer_id))?;
        Ok(Self::calculate_prize(
            &bet,
            &lottery_type,
            &customer,
            &event,
            self.settings.birthday_bonus_percent(),
        ))
    }

    /// Pay a winning bet: create the payout record and mark the bet `PAID`
    /// in one commit. When the claim window has already elapsed, the bet is
    /// expired — durably — and the call fails with `ClaimExpired`; a retry
    /// observes the `EXPIRED` state.
    pub fn process_payout(&self, bet_id: u64, payer_user_id: u64) -> EngineResult<(Payout, Bet)> {
        self.process_payout_at(bet_id, payer_user_id, Utc::now())
    }

    pub fn process_payout_at(
        &self,
        bet_id: u64,
        payer_user_id: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<(Payout, Bet)> {
        let _guard = self.storage.lock_commits();

        if let Some(existing) = store::load_payout_by_bet(&self.storage, bet_id)? {
            return Err(EngineError::AlreadyPaid {
                bet_id,
                paid_at: Some(existing.paid_at),
            });
        }

        let mut bet = store::load_bet(&self.storage, bet_id)?
            .ok_or_else(|| EngineError::not_found("bet", bet_id))?;
        let event = store::load_event(&self.storage, bet.event_id)?
            .ok_or_else(|| EngineError::not_found("event", bet.event_id))?;
        if event.state != EventState::ResultsPublished {
            return Err(EngineError::ResultsNotPublished { state: event.state });
        }
        let winning = event
            .winning_number
            .ok_or(EngineError::ResultsNotPublished { state: event.state })?;
        if bet.number_played != winning {
            return Err(EngineError::NotAWinner {
                played: bet.number_played,
                winning,
            });
        }

        let published_at = event.results_published_at.ok_or_else(|| {
            StorageError::CorruptedData(format!(
                "event {} is RESULTS_PUBLISHED without a publication timestamp",
                event.id
            ))
        })?;
        let deadline = published_at + Duration::days(self.settings.prize_claim_days());

        // The failure must name the state the bet is actually in, so a
        // payout retried after a sweep-driven expiration never reads as
        // "already paid".
        match bet.state {
            BetState::WinPending => {}
            BetState::Expired => return Err(EngineError::ClaimExpired { deadline }),
            BetState::Paid => {
                return Err(EngineError::AlreadyPaid {
                    bet_id,
                    paid_at: None,
                })
            }
            other => {
                return Err(EngineError::invalid_transition(
                    "bet",
                    other,
                    BetState::WinPending.as_str(),
                ))
            }
        }

        if now > deadline {
            bet.state = BetState::Expired;
            let mut batch = Batch::new();
            store::stage_bet(&mut batch, &bet)?;
            store::stage_win_pending_clear(&mut batch, bet.id);
            self.storage.batch_write(batch)?;

            tracing::info!(bet_id, %deadline, "claim window elapsed, bet expired on payout attempt");
            self.audit.record(AuditRecord {
                actor: Some(payer_user_id),
                action: "bet.expired",
                entity: "bet",
                entity_id: bet_id,
                payload: serde_json::json!({ "deadline": deadline }),
            });
            return Err(EngineError::ClaimExpired { deadline });
        }

        let lottery_type = store::load_lottery_type(&self.storage, event.lottery_type_id)?
            .ok_or_else(|| EngineError::not_found("lottery type", event.lottery_type_id))?;
        let customer = store::load_customer(&self.storage, bet.customer_id)?
            .ok_or_else(|| EngineError::not_found("customer", bet.customer_id))?;
        let prize = Self::calculate_prize(
            &bet,
            &lottery_type,
            &customer,
            &event,
            self.settings.birthday_bonus_percent(),
        );

        let payout = Payout {
            id: self.storage.next_id("payout")?,
            bet_id,
            calculated_prize: prize.total_prize,
            birthday_bonus_applied: prize.is_birthday,
            paid_at: now,
            paid_by_user_id: payer_user_id,
            receipt_number: format!("REC-{}-{}", now.format("%Y%m%d"), bet.id),
        };
        bet.state = BetState::Paid;

        let mut batch = Batch::new();
        store::stage_new_payout(&mut batch, &payout)?;
        store::stage_bet(&mut batch, &bet)?;
        store::stage_win_pending_clear(&mut batch, bet.id);
        self.storage.batch_write(batch)?;

        tracing::info!(
            bet_id,
            payout_id = payout.id,
            prize = %payout.calculated_prize,
            birthday_bonus = payout.birthday_bonus_applied,
            receipt = %payout.receipt_number,
            "payout processed"
        );
        self.audit.record(AuditRecord {
            actor: Some(payer_user_id),
            action: "payout.processed",
            entity: "payout",
            entity_id: payout.id,
            payload: serde_json::json!({
                "betId": bet_id,
                "prize": payout.calculated_prize,
                "birthdayBonus": payout.birthday_bonus_applied,
                "receipt": payout.receipt_number,
            }),
        });
        Ok((payout, bet))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn load_event_required(&self, event_id: u64) -> EngineResult<LotteryEvent> {
        store::load_event(&self.storage, event_id)?
            .ok_or_else(|| EngineError::not_found("event", event_id))
    }

    /// Guarded single-row event transition under the commit lock.
    fn transition_event(
        &self,
        event_id: u64,
        required: EventState,
        next: EventState,
    ) -> EngineResult<LotteryEvent> {
        let _guard = self.storage.lock_commits();

        let mut event = self.load_event_required(event_id)?;
        if event.state != required {
            return Err(EngineError::invalid_transition(
                "event",
                event.state,
                required.as_str(),
            ));
        }
        event.state = next;

        let mut batch = Batch::new();
        store::stage_event(&mut batch, &event)?;
        self.storage.batch_write(batch)?;
        Ok(event)
    }
}
