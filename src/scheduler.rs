//! Time-driven lifecycle sweep.
//!
//! A fixed-period loop that asks the engine to auto-advance today's events
//! and to forfeit unclaimed winning bets. Each cycle takes one clock snapshot
//! and uses it for every comparison in the pass; a failing sub-task is logged
//! and ends the cycle early, never the loop. Shutdown is observed only
//! between cycles, so an in-flight cycle always completes.

use crate::lifecycle::LifecycleEngine;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct Scheduler {
    engine: Arc<LifecycleEngine>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<LifecycleEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn the sweep loop. The first cycle runs immediately; the loop exits
    /// when `shutdown` flips, after finishing whatever cycle is in flight.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                "lifecycle scheduler started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_cycle_at(Utc::now());
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("lifecycle scheduler stopping");
                        break;
                    }
                }
            }
        })
    }

    /// One sweep cycle against a single clock snapshot. Never panics and
    /// never returns an error: failures are logged and the next tick gets a
    /// fresh start.
    pub fn run_cycle_at(&self, now: DateTime<Utc>) {
        let counts = match self.engine.auto_advance_events(now) {
            Ok(counts) => counts,
            Err(e) => {
                tracing::error!(error = %e, "event auto-advance failed, ending cycle early");
                return;
            }
        };
        if counts.opened > 0 || counts.closed > 0 || counts.failed > 0 {
            tracing::info!(
                opened = counts.opened,
                closed = counts.closed,
                failed = counts.failed,
                "event auto-advance pass"
            );
        }

        if let Err(e) = self.engine.expire_overdue_bets(now) {
            tracing::error!(error = %e, "bet expiration sweep failed, ending cycle early");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audit::LogAuditSink,
        lifecycle::{NewEvent, PlaceBet},
        models::{BetState, EventState},
        store,
        storage::{Batch, VenueStorage},
    };
    use chrono::{Duration as TimeDelta, NaiveDate, NaiveTime};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        storage: Arc<VenueStorage>,
        engine: Arc<LifecycleEngine>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(VenueStorage::open(dir.path()).unwrap());
        let engine = Arc::new(LifecycleEngine::new(storage.clone(), Arc::new(LogAuditSink)));
        Fixture {
            _dir: dir,
            storage,
            engine,
        }
    }

    fn seed_event(f: &Fixture, date: NaiveDate) -> u64 {
        let lottery_type = store::create_lottery_type(
            &f.storage,
            store::NewLotteryType {
                name: "La Chica".to_string(),
                payout_factor: dec!(70),
                events_per_day: 1,
            },
        )
        .unwrap();
        f.engine
            .create_event(
                NewEvent {
                    lottery_type_id: lottery_type.id,
                    event_date: date,
                    event_number_of_day: 1,
                    open_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                    close_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                },
                1,
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_cycle_advances_events_and_is_idempotent() {
        let f = fixture();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let event_id = seed_event(&f, date);
        let scheduler = Scheduler::new(f.engine.clone(), DEFAULT_SWEEP_INTERVAL);

        let noon = date.and_hms_opt(12, 0, 0).unwrap().and_utc();
        scheduler.run_cycle_at(noon);
        assert_eq!(
            f.engine.get_event(event_id).unwrap().state,
            EventState::Open
        );

        // Running the same cycle again produces no double transitions.
        scheduler.run_cycle_at(noon);
        assert_eq!(
            f.engine.get_event(event_id).unwrap().state,
            EventState::Open
        );

        let evening = date.and_hms_opt(20, 30, 0).unwrap().and_utc();
        scheduler.run_cycle_at(evening);
        scheduler.run_cycle_at(evening);
        assert_eq!(
            f.engine.get_event(event_id).unwrap().state,
            EventState::Closed
        );
    }

    #[test]
    fn test_cycle_expires_overdue_winning_bets() {
        let f = fixture();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let event_id = seed_event(&f, date);
        f.engine.open_event(event_id, Some(1)).unwrap();
        let customer = store::create_customer(
            &f.storage,
            store::NewCustomer {
                full_name: "Ana López".to_string(),
                phone: None,
                email: None,
                birth_date: None,
                address: None,
            },
        )
        .unwrap();
        let bet = f
            .engine
            .place_bet(PlaceBet {
                event_id,
                customer_id: customer.id,
                user_id: 1,
                number_played: 23,
                amount: dec!(10.00),
            })
            .unwrap();
        f.engine.close_event(event_id, Some(1)).unwrap();
        f.engine.publish_results(event_id, 23, 1).unwrap();

        // Pretend results went out six days ago; the window is five.
        let mut event = store::load_event(&f.storage, event_id).unwrap().unwrap();
        event.results_published_at = Some(Utc::now() - TimeDelta::days(6));
        let mut batch = Batch::new();
        store::stage_event(&mut batch, &event).unwrap();
        f.storage.batch_write(batch).unwrap();

        let scheduler = Scheduler::new(f.engine.clone(), DEFAULT_SWEEP_INTERVAL);
        scheduler.run_cycle_at(Utc::now());

        let stored = store::load_bet(&f.storage, bet.id).unwrap().unwrap();
        assert_eq!(stored.state, BetState::Expired);

        // Second sweep: nothing left to expire.
        scheduler.run_cycle_at(Utc::now());
        let stored = store::load_bet(&f.storage, bet.id).unwrap().unwrap();
        assert_eq!(stored.state, BetState::Expired);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown_signal() {
        let f = fixture();
        let scheduler = Scheduler::new(f.engine.clone(), Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);

        let handle = scheduler.spawn(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
