//! The shared, thread-safe election ledger.
//!
//! All mutations run under one exclusive lock, so each operation's checks and
//! effects are applied as a single step and operations appear in one total
//! order. Queries share a read lock and only ever see whole mutations.
//! The clock is read before the lock is taken, and events reach the sink only
//! after the lock has been released, still in commit order.

use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::error::Result;
use crate::journal::Journal;
use crate::model::{
    Candidate, CandidateId, ElectionSpec, ElectionStats, LedgerEvent, LedgerSnapshot, Principal,
    Voter, Winners,
};
use crate::sink::EventSink;

mod state;
pub mod tally;

pub use state::{Commit, LedgerState};

/// Everything guarded by the ledger lock.
struct Books {
    state: LedgerState,
    journal: Journal,
}

pub struct ElectionLedger {
    books: RwLock<Books>,
    /// Committed events awaiting delivery, in commit order.
    outbox: Mutex<VecDeque<LedgerEvent>>,
    /// Held by whichever thread is currently draining the outbox.
    delivering: Mutex<()>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl ElectionLedger {
    /// Create a new election administered by `administrator`, starting now.
    pub fn new(
        administrator: Principal,
        spec: ElectionSpec,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let start_time = clock.now();
        info!(
            "Opening election \"{}\" administered by {administrator} at {start_time}",
            spec.title
        );
        Self {
            books: RwLock::new(Books {
                state: LedgerState::new(administrator, spec, start_time),
                journal: Journal::new(),
            }),
            outbox: Mutex::new(VecDeque::new()),
            delivering: Mutex::new(()),
            clock,
            sink,
        }
    }

    /// The current time according to the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // A panic while a lock is held can only come from a sink or a bug in a
    // query, never from a half-applied mutation, so poisoned locks are safe
    // to keep using.
    fn read_books(&self) -> RwLockReadGuard<'_, Books> {
        self.books.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_books(&self) -> RwLockWriteGuard<'_, Books> {
        self.books.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbox(&self) -> MutexGuard<'_, VecDeque<LedgerEvent>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a mutation atomically, journal its events, then deliver them.
    fn commit<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut LedgerState) -> Result<Commit<T>>,
    ) -> Result<T> {
        let (value, event_count) = {
            let mut books = self.write_books();
            let Commit { value, events } = apply(&mut books.state).map_err(|e| {
                debug!("{operation} refused: {e}");
                e
            })?;
            for event in &events {
                let entry = books.journal.append(event.clone());
                trace!("Journalled {} as entry {}", event.kind(), entry.sequence);
            }
            let event_count = events.len();
            // Queue while still holding the ledger lock, so the outbox stays in commit order.
            self.lock_outbox().extend(events);
            (value, event_count)
        };
        debug!("{operation} committed with {event_count} event(s)");
        self.flush();
        Ok(value)
    }

    /// Deliver queued events unless another thread is already doing so,
    /// in which case that thread will pick ours up too.
    fn flush(&self) {
        loop {
            let delivering = match self.delivering.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            loop {
                let next = self.lock_outbox().pop_front();
                match next {
                    Some(event) => self.sink.deliver(&event),
                    None => break,
                }
            }
            drop(delivering);
            // Something may have been queued between our last pop and the release.
            if self.lock_outbox().is_empty() {
                return;
            }
        }
    }

    /// Close voting `hours` from now. Returns the new end time.
    pub fn set_election_duration(&self, caller: &Principal, hours: u32) -> Result<DateTime<Utc>> {
        let now = self.now();
        self.commit("setElectionDuration", |state| {
            state.set_election_duration(caller, hours, now)
        })
    }

    pub fn authorize_voter(&self, caller: &Principal, voter: &Principal) -> Result<()> {
        self.authorize_voters(caller, std::slice::from_ref(voter))
    }

    pub fn authorize_voters(&self, caller: &Principal, voters: &[Principal]) -> Result<()> {
        self.commit("authorizeVoters", |state| {
            state.authorize_voters(caller, voters)
        })
    }

    pub fn add_candidate(
        &self,
        caller: &Principal,
        name: String,
        description: String,
    ) -> Result<CandidateId> {
        let now = self.now();
        self.commit("addCandidate", |state| {
            state.add_candidate(caller, name, description, now)
        })
    }

    pub fn deactivate_candidate(
        &self,
        caller: &Principal,
        candidate_id: CandidateId,
    ) -> Result<()> {
        let now = self.now();
        self.commit("deactivateCandidate", |state| {
            state.deactivate_candidate(caller, candidate_id, now)
        })
    }

    pub fn transfer_admin(&self, caller: &Principal, new_admin: Principal) -> Result<()> {
        self.commit("transferAdmin", |state| {
            state.transfer_admin(caller, new_admin)
        })
    }

    pub fn end_election(&self, caller: &Principal) -> Result<()> {
        let now = self.now();
        self.commit("endElection", |state| state.end_election(caller, now))
    }

    pub fn check_and_end_election(&self, now: DateTime<Utc>) -> Result<()> {
        self.commit("checkAndEndElection", |state| {
            state.check_and_end_election(now)
        })
    }

    pub fn vote(
        &self,
        caller: &Principal,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.commit("vote", |state| state.vote(caller, candidate_id, now))
    }

    /// Reverse `voter`'s vote. Returns the candidate it had been cast for.
    pub fn remove_vote(&self, caller: &Principal, voter: &Principal) -> Result<CandidateId> {
        let now = self.now();
        self.commit("removeVote", |state| state.remove_vote(caller, voter, now))
    }

    pub fn all_candidates(&self) -> Vec<Candidate> {
        self.read_books().state.all_candidates()
    }

    pub fn candidate(&self, candidate_id: CandidateId) -> Result<Candidate> {
        self.read_books().state.candidate(candidate_id)
    }

    pub fn candidates_count(&self) -> CandidateId {
        self.read_books().state.candidates_count()
    }

    pub fn winners(&self) -> Result<Winners> {
        self.read_books().state.winners()
    }

    pub fn voter_info(&self, voter: &Principal) -> Voter {
        self.read_books().state.voter_info(voter)
    }

    pub fn has_user_voted(&self, voter: &Principal) -> bool {
        self.read_books().state.has_voted(voter)
    }

    pub fn is_authorized(&self, voter: &Principal) -> bool {
        self.read_books().state.is_authorized(voter)
    }

    pub fn administrator(&self) -> Principal {
        self.read_books().state.election().administrator.clone()
    }

    pub fn election_stats(&self, now: DateTime<Utc>) -> ElectionStats {
        self.read_books().state.stats(now)
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.read_books().state.time_remaining(now)
    }

    /// The scheduled end of voting, if any.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.read_books().state.election().end_time
    }

    /// Hash of the latest journal entry.
    pub fn journal_head(&self) -> String {
        self.read_books().journal.head().to_string()
    }

    /// Copy out the whole ledger as of one instant.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let books = self.read_books();
        LedgerSnapshot {
            election: books.state.election().clone(),
            candidates: books.state.candidates().cloned().collect(),
            voters: books.state.voters().clone(),
            authorized_voters: books.state.authorized_voters().clone(),
            journal: books.journal.entries().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{OnceLock, Weak};
    use std::thread;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::LedgerError;
    use crate::model::Election;
    use crate::sink::RecordingSink;

    fn admin() -> Principal {
        Principal::new("coordinator")
    }

    fn ledger_with(spec: ElectionSpec) -> (Arc<ElectionLedger>, ManualClock, Arc<RecordingSink>) {
        let clock = ManualClock::starting_at(Election::example_start());
        let sink = Arc::new(RecordingSink::new());
        let ledger = ElectionLedger::new(admin(), spec, Arc::new(clock.clone()), sink.clone());
        (Arc::new(ledger), clock, sink)
    }

    fn ledger() -> (Arc<ElectionLedger>, ManualClock, Arc<RecordingSink>) {
        ledger_with(ElectionSpec::example())
    }

    #[test]
    fn concurrent_double_vote() {
        let (ledger, clock, _) = ledger();
        ledger
            .add_candidate(&admin(), "Chris Riches".into(), String::new())
            .unwrap();
        let alice = Principal::new("alice");

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| ledger.vote(&alice, 1, clock.now())))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| *r == Err(LedgerError::AlreadyVoted)));
        assert_eq!(ledger.candidate(1).unwrap().vote_count, 1);
        assert_eq!(ledger.election_stats(clock.now()).total_votes, 1);
    }

    #[test]
    fn concurrent_voters_keep_tallies_consistent() {
        let (ledger, clock, sink) = ledger();
        for name in ["Chris Riches", "Parry Hotter", "Jane Doe"] {
            ledger.add_candidate(&admin(), name.into(), String::new()).unwrap();
        }

        thread::scope(|scope| {
            for t in 0..8u32 {
                let ledger = &ledger;
                let clock = &clock;
                scope.spawn(move || {
                    for n in 0..50u32 {
                        let voter = Principal::new(format!("voter-{t}-{n}"));
                        ledger.vote(&voter, (n % 3) + 1, clock.now()).unwrap();
                        // Every voter tries twice.
                        assert_eq!(
                            ledger.vote(&voter, 1, clock.now()),
                            Err(LedgerError::AlreadyVoted)
                        );
                    }
                });
            }
        });

        let snapshot = ledger.snapshot();
        let candidate_sum: u64 = snapshot.candidates.iter().map(|c| c.vote_count).sum();
        let voted = snapshot.voters.values().filter(|v| v.has_voted).count() as u64;
        assert_eq!(snapshot.election.total_votes, 400);
        assert_eq!(candidate_sum, 400);
        assert_eq!(voted, 400);

        // Sink and journal saw the same events in the same order.
        let journalled: Vec<_> = snapshot.journal.into_iter().map(|e| e.event).collect();
        assert_eq!(sink.events(), journalled);
        assert_eq!(journalled.len(), 3 + 400);
    }

    #[test]
    fn clock_drives_admin_operations() {
        let (ledger, clock, sink) = ledger();
        let end_time = ledger.set_election_duration(&admin(), 1).unwrap();
        assert_eq!(end_time, Election::example_start() + Duration::hours(1));
        assert_eq!(ledger.end_time(), Some(end_time));

        clock.advance(Duration::minutes(10));
        ledger.end_election(&admin()).unwrap();
        assert_eq!(
            sink.take(),
            vec![LedgerEvent::ElectionEnded {
                timestamp: Election::example_start() + Duration::minutes(10),
                total_votes: 0,
            }]
        );
    }

    #[test]
    fn expired_window_needs_explicit_end() {
        let (ledger, clock, sink) = ledger();
        ledger.add_candidate(&admin(), "Chris Riches".into(), String::new()).unwrap();
        ledger.set_election_duration(&admin(), 1).unwrap();
        sink.take();

        clock.advance(Duration::hours(2));
        assert_eq!(
            ledger.vote(&Principal::new("alice"), 1, clock.now()),
            Err(LedgerError::ElectionClosed)
        );
        assert_eq!(ledger.winners(), Err(LedgerError::ElectionNotEnded));
        assert_eq!(ledger.time_remaining(clock.now()), Duration::zero());

        ledger.check_and_end_election(clock.now()).unwrap();
        assert!(ledger.election_stats(clock.now()).ended);
        assert_eq!(ledger.winners().unwrap().candidate_ids, vec![1]);
        assert_eq!(sink.take().len(), 1);
    }

    #[test]
    fn refused_operations_emit_nothing() {
        let (ledger, clock, sink) = ledger_with(ElectionSpec::gated_example());
        ledger.add_candidate(&admin(), "Chris Riches".into(), String::new()).unwrap();
        let head = ledger.journal_head();
        sink.take();

        let bob = Principal::new("bob");
        assert_eq!(ledger.vote(&bob, 1, clock.now()), Err(LedgerError::NotAuthorized));
        assert_eq!(
            ledger.authorize_voter(&bob, &bob),
            Err(LedgerError::Unauthorized)
        );
        assert!(sink.events().is_empty());
        assert_eq!(ledger.journal_head(), head);

        ledger.authorize_voter(&admin(), &bob).unwrap();
        assert!(ledger.is_authorized(&bob));
        ledger.vote(&bob, 1, clock.now()).unwrap();
        assert!(ledger.has_user_voted(&bob));
        assert_eq!(sink.events().len(), 2);
        assert_ne!(ledger.journal_head(), head);
    }

    /// A sink that reads the ledger back while handling each event.
    #[derive(Default)]
    struct ReadingSink {
        ledger: OnceLock<Weak<ElectionLedger>>,
        totals: Mutex<Vec<u64>>,
    }

    impl EventSink for ReadingSink {
        fn deliver(&self, event: &LedgerEvent) {
            if let LedgerEvent::VoteCast { timestamp, .. } = event {
                if let Some(ledger) = self.ledger.get().and_then(Weak::upgrade) {
                    let total = ledger.election_stats(*timestamp).total_votes;
                    self.totals.lock().unwrap().push(total);
                }
            }
        }
    }

    #[test]
    fn sink_runs_outside_the_lock() {
        let clock = ManualClock::starting_at(Election::example_start());
        let sink = Arc::new(ReadingSink::default());
        let ledger = Arc::new(ElectionLedger::new(
            admin(),
            ElectionSpec::example(),
            Arc::new(clock.clone()),
            sink.clone(),
        ));
        sink.ledger.set(Arc::downgrade(&ledger)).unwrap();

        ledger.add_candidate(&admin(), "Chris Riches".into(), String::new()).unwrap();
        ledger.vote(&Principal::new("alice"), 1, clock.now()).unwrap();
        ledger.vote(&Principal::new("bob"), 1, clock.now()).unwrap();

        assert_eq!(*sink.totals.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn snapshot_is_complete() {
        let (ledger, clock, _) = ledger_with(ElectionSpec::gated_example());
        ledger.add_candidate(&admin(), "Chris Riches".into(), String::new()).unwrap();
        ledger.add_candidate(&admin(), "Parry Hotter".into(), String::new()).unwrap();
        let alice = Principal::new("alice");
        ledger.authorize_voters(&admin(), &[alice.clone()]).unwrap();
        ledger.vote(&alice, 2, clock.now()).unwrap();
        ledger.deactivate_candidate(&admin(), 1).unwrap();

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.candidates.len(), 2);
        assert!(!snapshot.candidates[0].is_active);
        assert_eq!(snapshot.voters[&alice].voted_for, 2);
        assert!(snapshot.authorized_voters.contains(&alice));
        assert_eq!(snapshot.journal.len(), 5);
        assert_eq!(Journal::verify(&snapshot.journal), Ok(()));
        assert_eq!(ledger.all_candidates().len(), 1);
        assert_eq!(ledger.candidates_count(), 2);
    }
}
