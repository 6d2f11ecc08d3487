use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{candidate::CandidateId, principal::Principal};

/// Notifications emitted by the ledger after a mutation commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LedgerEvent {
    CandidateAdded {
        candidate_id: CandidateId,
        name: String,
    },
    VoteCast {
        voter: Principal,
        candidate_id: CandidateId,
        timestamp: DateTime<Utc>,
    },
    ElectionEnded {
        timestamp: DateTime<Utc>,
        total_votes: u64,
    },
    VoterAuthorized {
        voter: Principal,
    },
    CandidateDeactivated {
        candidate_id: CandidateId,
    },
    /// An administrator reversed a previously cast vote.
    VoteRemoved {
        voter: Principal,
        candidate_id: CandidateId,
    },
    AdminTransferred {
        previous: Principal,
        current: Principal,
    },
}

impl LedgerEvent {
    /// Short name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CandidateAdded { .. } => "CandidateAdded",
            Self::VoteCast { .. } => "VoteCast",
            Self::ElectionEnded { .. } => "ElectionEnded",
            Self::VoterAuthorized { .. } => "VoterAuthorized",
            Self::CandidateDeactivated { .. } => "CandidateDeactivated",
            Self::VoteRemoved { .. } => "VoteRemoved",
            Self::AdminTransferred { .. } => "AdminTransferred",
        }
    }
}
