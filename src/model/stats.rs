use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{candidate::CandidateId, principal::Principal};

/// A summary of the election at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStats {
    pub title: String,
    pub description: String,
    pub administrator: Principal,
    pub require_authorization: bool,
    /// Candidates ever added, active or not.
    pub total_candidates: u32,
    pub active_candidates: u32,
    pub total_votes: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Window length in seconds; zero when unbounded.
    pub duration_secs: i64,
    /// Whether votes would be accepted right now.
    pub is_active: bool,
    pub ended: bool,
}

/// The winner set of an ended election.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winners {
    /// Tied winners, in ascending ID order.
    pub candidate_ids: Vec<CandidateId>,
    /// The vote count every winner achieved.
    pub winning_votes: u64,
    pub winner_count: usize,
}

/// Seconds left before voting closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRemaining {
    pub seconds: i64,
}
