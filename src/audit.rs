//! Independent verification of a ledger snapshot.
//!
//! The audit trusts nothing in the snapshot except the journal's hash chain:
//! tallies are recomputed by replaying the journal and by counting the voter
//! records, and both must agree with the recorded counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::journal::{Journal, JournalError};
use crate::ledger::tally;
use crate::model::{CandidateId, LedgerEvent, LedgerSnapshot, Principal, Winners};

/// Reasons a snapshot can fail its audit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("Journal is broken: {0}")]
    Journal(#[from] JournalError),
    #[error("Candidate at position {position} has ID {found}")]
    CandidateIds { position: usize, found: CandidateId },
    #[error("Journal records {journalled} candidates but the ledger holds {held}")]
    CandidateCount { journalled: usize, held: usize },
    #[error("Candidate {candidate_id} records {recorded} votes but the journal replays to {replayed}")]
    ReplayMismatch {
        candidate_id: CandidateId,
        recorded: u64,
        replayed: i64,
    },
    #[error("Candidate {candidate_id} records {recorded} votes but {counted} voters voted for them")]
    VoterMismatch {
        candidate_id: CandidateId,
        recorded: u64,
        counted: u64,
    },
    #[error("Election records {recorded} total votes but candidates sum to {computed}")]
    TotalMismatch { recorded: u64, computed: u64 },
    #[error("Voter {voter} has a vote for unknown candidate {candidate_id}")]
    DanglingVote {
        voter: Principal,
        candidate_id: CandidateId,
    },
}

/// One candidate's verified tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: CandidateId,
    pub name: String,
    pub votes: u64,
    pub is_active: bool,
}

/// The outcome of a successful audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub tallies: Vec<CandidateTally>,
    pub total_votes: u64,
    pub journal_entries: usize,
    /// Only present once the election has ended.
    pub winners: Option<Winners>,
}

/// Audit a snapshot, reporting the first inconsistency found.
pub fn audit(snapshot: &LedgerSnapshot) -> Result<AuditReport, AuditError> {
    Journal::verify(&snapshot.journal)?;

    for (position, candidate) in snapshot.candidates.iter().enumerate() {
        if candidate.id as usize != position + 1 {
            return Err(AuditError::CandidateIds {
                position,
                found: candidate.id,
            });
        }
    }

    // Replay the journal.
    let mut replayed: BTreeMap<CandidateId, i64> = BTreeMap::new();
    let mut journalled_candidates = 0;
    for entry in &snapshot.journal {
        match &entry.event {
            LedgerEvent::CandidateAdded { .. } => journalled_candidates += 1,
            LedgerEvent::VoteCast { candidate_id, .. } => {
                *replayed.entry(*candidate_id).or_default() += 1
            }
            LedgerEvent::VoteRemoved { candidate_id, .. } => {
                *replayed.entry(*candidate_id).or_default() -= 1
            }
            _ => {}
        }
    }
    if journalled_candidates != snapshot.candidates.len() {
        return Err(AuditError::CandidateCount {
            journalled: journalled_candidates,
            held: snapshot.candidates.len(),
        });
    }

    // Count the voter records.
    let mut counted: BTreeMap<CandidateId, u64> = BTreeMap::new();
    for (voter, record) in snapshot.voters.iter().filter(|(_, r)| r.has_voted) {
        if record.voted_for == 0 || record.voted_for as usize > snapshot.candidates.len() {
            return Err(AuditError::DanglingVote {
                voter: voter.clone(),
                candidate_id: record.voted_for,
            });
        }
        *counted.entry(record.voted_for).or_default() += 1;
    }

    let mut tallies = Vec::with_capacity(snapshot.candidates.len());
    for candidate in &snapshot.candidates {
        let replay = replayed.get(&candidate.id).copied().unwrap_or(0);
        if replay != candidate.vote_count as i64 {
            return Err(AuditError::ReplayMismatch {
                candidate_id: candidate.id,
                recorded: candidate.vote_count,
                replayed: replay,
            });
        }
        let count = counted.get(&candidate.id).copied().unwrap_or(0);
        if count != candidate.vote_count {
            return Err(AuditError::VoterMismatch {
                candidate_id: candidate.id,
                recorded: candidate.vote_count,
                counted: count,
            });
        }
        tallies.push(CandidateTally {
            candidate_id: candidate.id,
            name: candidate.name.clone(),
            votes: candidate.vote_count,
            is_active: candidate.is_active,
        });
    }

    let computed: u64 = tallies.iter().map(|tally| tally.votes).sum();
    if computed != snapshot.election.total_votes {
        return Err(AuditError::TotalMismatch {
            recorded: snapshot.election.total_votes,
            computed,
        });
    }

    let winners = snapshot
        .election
        .ended
        .then(|| tally::winners(snapshot.candidates.iter()));

    Ok(AuditReport {
        tallies,
        total_votes: computed,
        journal_entries: snapshot.journal.len(),
        winners,
    })
}
