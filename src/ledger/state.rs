use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use crate::error::{LedgerError, Result};
use crate::ledger::tally;
use crate::model::{
    Candidate, CandidateId, Election, ElectionSpec, ElectionStats, LedgerEvent, Principal, Voter,
    Winners,
};

/// The result of a successful mutation: its return value and the events it emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit<T> {
    pub value: T,
    pub events: Vec<LedgerEvent>,
}

impl<T> Commit<T> {
    fn new(value: T, events: Vec<LedgerEvent>) -> Self {
        Self { value, events }
    }

    /// A commit that emits nothing.
    fn quiet(value: T) -> Self {
        Self::new(value, Vec::new())
    }
}

/// The election state machine.
///
/// Every mutation validates all of its preconditions before touching any
/// state, so a returned error always means nothing changed. Time is always
/// passed in; this type never looks at a clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    election: Election,
    candidates: BTreeMap<CandidateId, Candidate>,
    voters: BTreeMap<Principal, Voter>,
    authorized_voters: BTreeSet<Principal>,
}

impl LedgerState {
    /// Create an election administered by its creator.
    pub fn new(administrator: Principal, spec: ElectionSpec, start_time: DateTime<Utc>) -> Self {
        Self {
            election: Election::new(administrator, spec, start_time),
            candidates: BTreeMap::new(),
            voters: BTreeMap::new(),
            authorized_voters: BTreeSet::new(),
        }
    }

    fn ensure_admin(&self, caller: &Principal) -> Result<()> {
        if *caller == self.election.administrator {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    fn ensure_open(&self, now: DateTime<Utc>) -> Result<()> {
        if self.election.is_active(now) {
            Ok(())
        } else {
            Err(LedgerError::ElectionClosed)
        }
    }

    /// Close voting `hours` from `now`. May be called again to move the deadline
    /// for as long as voting is still open.
    /// Deadlines past the end of representable time are clamped to it.
    pub fn set_election_duration(
        &mut self,
        caller: &Principal,
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Commit<DateTime<Utc>>> {
        self.ensure_admin(caller)?;
        self.ensure_open(now)?;

        let end_time = now
            .checked_add_signed(Duration::hours(i64::from(hours)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.election.end_time = Some(end_time);
        Ok(Commit::quiet(end_time))
    }

    /// Authorize a batch of voters, emitting one event per voter in input order.
    /// Authorizing someone twice is harmless.
    pub fn authorize_voters(
        &mut self,
        caller: &Principal,
        voters: &[Principal],
    ) -> Result<Commit<()>> {
        self.ensure_admin(caller)?;
        if voters.iter().any(Principal::is_null) {
            return Err(LedgerError::InvalidAddress);
        }

        let mut events = Vec::with_capacity(voters.len());
        for voter in voters {
            // The authorized set only means something for gated elections.
            if self.election.require_authorization {
                self.authorized_voters.insert(voter.clone());
            }
            self.voters.entry(voter.clone()).or_default().is_registered = true;
            events.push(LedgerEvent::VoterAuthorized {
                voter: voter.clone(),
            });
        }
        Ok(Commit::new((), events))
    }

    pub fn add_candidate(
        &mut self,
        caller: &Principal,
        name: String,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<Commit<CandidateId>> {
        self.ensure_admin(caller)?;
        self.ensure_open(now)?;

        let id = self.candidates_count() + 1;
        let event = LedgerEvent::CandidateAdded {
            candidate_id: id,
            name: name.clone(),
        };
        self.candidates
            .insert(id, Candidate::new(id, name, description));
        Ok(Commit::new(id, vec![event]))
    }

    /// Stop a candidate from receiving votes or winning. Votes already cast for
    /// them stay counted. Deactivating an inactive candidate succeeds silently.
    pub fn deactivate_candidate(
        &mut self,
        caller: &Principal,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Result<Commit<()>> {
        self.ensure_admin(caller)?;
        self.ensure_open(now)?;
        let candidate = self
            .candidates
            .get_mut(&candidate_id)
            .ok_or(LedgerError::InvalidCandidate(candidate_id))?;

        if !candidate.is_active {
            return Ok(Commit::quiet(()));
        }
        candidate.is_active = false;
        Ok(Commit::new(
            (),
            vec![LedgerEvent::CandidateDeactivated { candidate_id }],
        ))
    }

    pub fn transfer_admin(
        &mut self,
        caller: &Principal,
        new_admin: Principal,
    ) -> Result<Commit<()>> {
        self.ensure_admin(caller)?;
        if new_admin.is_null() {
            return Err(LedgerError::InvalidAddress);
        }

        let previous = std::mem::replace(&mut self.election.administrator, new_admin.clone());
        Ok(Commit::new(
            (),
            vec![LedgerEvent::AdminTransferred {
                previous,
                current: new_admin,
            }],
        ))
    }

    /// End the election now, whatever the window says.
    /// Ending an already-ended election succeeds without emitting anything.
    pub fn end_election(&mut self, caller: &Principal, now: DateTime<Utc>) -> Result<Commit<()>> {
        self.ensure_admin(caller)?;
        if self.election.ended {
            return Ok(Commit::quiet(()));
        }
        Ok(Commit::new((), vec![self.finish(now)]))
    }

    /// Persist the end of an election whose window has run out. Anyone may call this.
    pub fn check_and_end_election(&mut self, now: DateTime<Utc>) -> Result<Commit<()>> {
        let end_time = self.election.end_time.ok_or(LedgerError::DurationNotSet)?;
        if now <= end_time {
            return Err(LedgerError::DurationNotExpired);
        }
        if !self.election.is_expired(now) {
            return Err(LedgerError::AlreadyEnded);
        }
        Ok(Commit::new((), vec![self.finish(now)]))
    }

    fn finish(&mut self, now: DateTime<Utc>) -> LedgerEvent {
        self.election.ended = true;
        LedgerEvent::ElectionEnded {
            timestamp: now,
            total_votes: self.election.total_votes,
        }
    }

    /// Cast `caller`'s vote. Preconditions are checked in a fixed order and the
    /// first failure is reported.
    pub fn vote(
        &mut self,
        caller: &Principal,
        candidate_id: CandidateId,
        now: DateTime<Utc>,
    ) -> Result<Commit<()>> {
        self.ensure_open(now)?;
        if self.election.require_authorization && !self.authorized_voters.contains(caller) {
            return Err(LedgerError::NotAuthorized);
        }
        if self.has_voted(caller) {
            return Err(LedgerError::AlreadyVoted);
        }
        let candidate = self
            .candidates
            .get_mut(&candidate_id)
            .ok_or(LedgerError::InvalidCandidate(candidate_id))?;
        if !candidate.is_active {
            return Err(LedgerError::CandidateInactive(candidate_id));
        }

        candidate.vote_count += 1;
        let record = self.voters.entry(caller.clone()).or_default();
        record.is_registered = true;
        record.has_voted = true;
        record.voted_for = candidate_id;
        record.vote_timestamp = Some(now);
        self.election.total_votes += 1;

        Ok(Commit::new(
            (),
            vec![LedgerEvent::VoteCast {
                voter: caller.clone(),
                candidate_id,
                timestamp: now,
            }],
        ))
    }

    /// Reverse `voter`'s vote so they may vote again. Only possible while voting
    /// is open. The vote timestamp is kept as a trace of the removed vote.
    /// Returns the candidate the removed vote was for.
    pub fn remove_vote(
        &mut self,
        caller: &Principal,
        voter: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Commit<CandidateId>> {
        self.ensure_admin(caller)?;
        self.ensure_open(now)?;
        let candidate_id = match self.voters.get(voter) {
            Some(record) if record.has_voted => record.voted_for,
            _ => return Err(LedgerError::VoterHasNotVoted),
        };
        let candidate = self
            .candidates
            .get_mut(&candidate_id)
            .ok_or(LedgerError::InvalidCandidate(candidate_id))?;

        candidate.vote_count = candidate.vote_count.saturating_sub(1);
        if let Some(record) = self.voters.get_mut(voter) {
            record.has_voted = false;
            record.voted_for = 0;
        }
        self.election.total_votes = self.election.total_votes.saturating_sub(1);

        Ok(Commit::new(
            candidate_id,
            vec![LedgerEvent::VoteRemoved {
                voter: voter.clone(),
                candidate_id,
            }],
        ))
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    pub fn candidates_count(&self) -> CandidateId {
        self.candidates.len() as CandidateId
    }

    /// Every candidate, active or not, in ID order.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> + Clone {
        self.candidates.values()
    }

    /// Active candidates in ID order.
    pub fn all_candidates(&self) -> Vec<Candidate> {
        self.candidates
            .values()
            .filter(|candidate| candidate.is_active)
            .cloned()
            .collect()
    }

    pub fn candidate(&self, candidate_id: CandidateId) -> Result<Candidate> {
        self.candidates
            .get(&candidate_id)
            .cloned()
            .ok_or(LedgerError::InvalidCandidate(candidate_id))
    }

    pub fn winners(&self) -> Result<Winners> {
        if !self.election.ended {
            return Err(LedgerError::ElectionNotEnded);
        }
        Ok(tally::winners(self.candidates.values()))
    }

    pub fn voters(&self) -> &BTreeMap<Principal, Voter> {
        &self.voters
    }

    pub fn authorized_voters(&self) -> &BTreeSet<Principal> {
        &self.authorized_voters
    }

    pub fn voter_info(&self, voter: &Principal) -> Voter {
        self.voters.get(voter).cloned().unwrap_or_default()
    }

    pub fn has_voted(&self, voter: &Principal) -> bool {
        self.voters.get(voter).map_or(false, |record| record.has_voted)
    }

    pub fn is_authorized(&self, voter: &Principal) -> bool {
        self.authorized_voters.contains(voter)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> ElectionStats {
        let election = &self.election;
        ElectionStats {
            title: election.title.clone(),
            description: election.description.clone(),
            administrator: election.administrator.clone(),
            require_authorization: election.require_authorization,
            total_candidates: self.candidates_count(),
            active_candidates: self
                .candidates
                .values()
                .filter(|candidate| candidate.is_active)
                .count() as u32,
            total_votes: election.total_votes,
            start_time: election.start_time,
            end_time: election.end_time,
            duration_secs: election.duration().num_seconds(),
            is_active: election.is_active(now),
            ended: election.ended,
        }
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.election.time_remaining(now)
    }
}
