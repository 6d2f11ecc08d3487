use serde::{Deserialize, Serialize};

/// Candidate IDs are dense, starting at 1. Zero means "no candidate".
pub type CandidateId = u32;

/// A single candidate and their running tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Sequentially assigned ID.
    pub id: CandidateId,
    /// Candidate name.
    pub name: String,
    /// Free-form candidate description.
    pub description: String,
    /// Number of votes currently counted for this candidate.
    pub vote_count: u64,
    /// Inactive candidates keep their votes but cannot receive new ones or win.
    pub is_active: bool,
}

impl Candidate {
    /// Create a new active candidate with no votes.
    pub fn new(id: CandidateId, name: String, description: String) -> Self {
        Self {
            id,
            name,
            description,
            vote_count: 0,
            is_active: true,
        }
    }
}

/// A request to add a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}
