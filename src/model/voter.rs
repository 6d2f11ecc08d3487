use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::candidate::CandidateId;

/// A voter record. Unknown voters read as the default (all-zero) record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    /// True once any record exists for this principal.
    pub is_registered: bool,
    /// Whether a vote is currently counted for this voter.
    pub has_voted: bool,
    /// The candidate voted for, or 0.
    pub voted_for: CandidateId,
    /// When the most recent vote was cast. Survives vote removal.
    pub vote_timestamp: Option<DateTime<Utc>>,
}
