use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::{
    config::ElectionConfig, error::LedgerError, ledger::ElectionLedger,
    scheduled_task::ScheduledTask,
};

/// A scheduled close, tagged so a running closer can tell whether the slot
/// still holds it.
struct Pending {
    ticket: u64,
    task: ScheduledTask<()>,
}

/// The slot holding the pending closer task, if any.
type TaskSlot = Arc<Mutex<Option<Pending>>>;

/// Tickets start at 1; they are unique for the life of the process.
fn next_ticket() -> u64 {
    static TICKET_COUNTER: AtomicU64 = AtomicU64::new(1);
    TICKET_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Ends the election once its window runs out.
///
/// The ledger itself never acts on its own; this schedules a call to
/// `check_and_end_election` for the moment the window closes, exactly as any
/// outside caller could.
pub struct ElectionCloser {
    ledger: Arc<ElectionLedger>,
    retry: Duration,
    task: TaskSlot,
}

impl ElectionCloser {
    /// Create a closer with nothing scheduled. If the check ever runs early
    /// (e.g. the clock lags the timer), it is retried after `retry`.
    pub fn new(ledger: Arc<ElectionLedger>, retry: Duration) -> Self {
        Self {
            ledger,
            retry,
            task: Default::default(),
        }
    }

    /// Is a close currently pending?
    pub async fn is_scheduled(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Schedule the close for `end_time`, replacing any earlier schedule.
    pub async fn schedule(&self, end_time: DateTime<Utc>) {
        let ticket = next_ticket();
        let closer = Self::closer(self.ledger.clone(), self.retry, self.task.clone(), ticket);
        let mut slot = self.task.lock().await;
        if let Some(pending) = slot.take() {
            if pending.task.cancel().await {
                debug!("Replaced a closer that had already run");
            }
        }
        // A hair past the deadline, since the window is inclusive of it.
        let run_at = end_time
            .checked_add_signed(Duration::milliseconds(1))
            .unwrap_or(end_time);
        *slot = Some(Pending {
            ticket,
            task: ScheduledTask::new(closer, run_at, self.ledger.now()),
        });
        info!("Election close scheduled for {end_time}");
    }

    /// Drop any pending close, e.g. because the election was ended by hand.
    pub async fn cancel(&self) {
        if let Some(pending) = self.task.lock().await.take() {
            pending.task.cancel().await;
            debug!("Cancelled pending election close");
        }
    }

    /// Run the pending close immediately and wait for it.
    /// Returns false if nothing was scheduled.
    pub async fn close_now(&self) -> bool {
        let pending = self.task.lock().await.take();
        match pending {
            Some(Pending { task, .. }) => {
                task.trigger_now();
                if task.await.is_err() {
                    error!("Election closer task failed to run");
                }
                true
            }
            None => false,
        }
    }

    /// Try to end the election; reschedule if it turns out to be too early.
    /// Recursive, so the future has to be boxed.
    ///
    /// The slot is only touched while it is empty or still holds `ticket`, so a
    /// close scheduled while this one runs is left alone.
    fn closer(
        ledger: Arc<ElectionLedger>,
        retry: Duration,
        task: TaskSlot,
        ticket: u64,
    ) -> BoxFuture<'static, ()> {
        async move {
            let now = ledger.now();
            match ledger.check_and_end_election(now) {
                Ok(()) => {
                    info!("Election window expired; election ended at {now}");
                }
                Err(LedgerError::DurationNotExpired) => {
                    let retry_at = now + retry;
                    let mut slot = task.lock().await;
                    if slot.as_ref().map_or(true, |pending| pending.ticket == ticket) {
                        warn!("Election closer ran before the deadline, retrying at {retry_at}");
                        let ticket = next_ticket();
                        let again = Self::closer(ledger.clone(), retry, task.clone(), ticket);
                        *slot = Some(Pending {
                            ticket,
                            task: ScheduledTask::new(again, retry_at, now),
                        });
                    } else {
                        debug!("Election closer ran early but was rescheduled meanwhile");
                    }
                    return;
                }
                Err(e) => {
                    debug!("Election closer had nothing to do: {e}");
                }
            }
            let mut slot = task.lock().await;
            if slot.as_ref().map_or(false, |pending| pending.ticket == ticket) {
                slot.take();
                trace!("Election closer completed; removed self from slot");
            }
        }
        .boxed()
    }
}

/// A fairing that places an `ElectionCloser` into managed state and
/// schedules it if the election already has an end time. Must be attached
/// after the ledger is in managed state.
pub struct ElectionCloserFairing;

#[rocket::async_trait]
impl Fairing for ElectionCloserFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Closer",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let ledger = match rocket.state::<Arc<ElectionLedger>>() {
            Some(ledger) => ledger.clone(),
            None => {
                error!("Ledger was not available when scheduling the election closer");
                return Err(rocket);
            }
        };
        let retry = rocket
            .state::<ElectionConfig>()
            .map(ElectionConfig::closer_retry)
            .unwrap_or_else(|| Duration::seconds(300));

        let closer = ElectionCloser::new(ledger.clone(), retry);
        if let Some(end_time) = ledger.end_time() {
            closer.schedule(end_time).await;
        }
        Ok(rocket.manage(closer))
    }
}
