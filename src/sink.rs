use std::sync::{Arc, Mutex, PoisonError};

use rocket::tokio::sync::broadcast::{self, Receiver, Sender};

use crate::model::LedgerEvent;

/// Receiver of committed ledger events.
///
/// The ledger calls `deliver` after the state lock has been released, one
/// event at a time and in commit order. Implementations may read from the
/// ledger, but must not block for long: later events queue up behind them.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &LedgerEvent);
}

/// Writes every event to the log.
#[derive(Debug, Copy, Clone, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn deliver(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::CandidateAdded { candidate_id, name } => {
                info!("Candidate {candidate_id} added: {name}")
            }
            LedgerEvent::VoteCast {
                voter,
                candidate_id,
                timestamp,
            } => info!("{voter} voted for candidate {candidate_id} at {timestamp}"),
            LedgerEvent::ElectionEnded {
                timestamp,
                total_votes,
            } => info!("Election ended at {timestamp} with {total_votes} votes"),
            LedgerEvent::VoterAuthorized { voter } => info!("{voter} authorized to vote"),
            LedgerEvent::CandidateDeactivated { candidate_id } => {
                info!("Candidate {candidate_id} deactivated")
            }
            LedgerEvent::VoteRemoved {
                voter,
                candidate_id,
            } => warn!("Vote by {voter} for candidate {candidate_id} was removed"),
            LedgerEvent::AdminTransferred { previous, current } => {
                warn!("Administration transferred from {previous} to {current}")
            }
        }
    }
}

/// Keeps every delivered event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, oldest first.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything delivered so far.
    pub fn take(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for RecordingSink {
    fn deliver(&self, event: &LedgerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Fans events out to any number of async subscribers.
/// Subscribers that fall too far behind miss events rather than stall the ledger.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: Sender<LedgerEvent>,
}

impl BroadcastSink {
    /// Create a sink that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for BroadcastSink {
    fn deliver(&self, event: &LedgerEvent) {
        // Sending only fails when nobody is listening.
        if self.sender.send(event.clone()).is_err() {
            trace!("No subscribers for {} event", event.kind());
        }
    }
}

/// Delivers each event to several sinks, in the order they were given.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn deliver(&self, event: &LedgerEvent) {
        for sink in &self.sinks {
            sink.deliver(event);
        }
    }
}
