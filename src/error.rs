use rocket::{http::Status, response::Responder, serde::json::Json, Request};
use serde::Serialize;
use thiserror::Error;

use crate::model::CandidateId;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Every way a ledger operation can be refused.
/// None of these are fatal: the ledger is untouched whenever one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Caller is not the election administrator")]
    Unauthorized,
    #[error("Caller is not authorized to vote in this election")]
    NotAuthorized,
    #[error("Election is closed")]
    ElectionClosed,
    #[error("Election has not ended yet")]
    ElectionNotEnded,
    #[error("Caller has already voted")]
    AlreadyVoted,
    #[error("No candidate with ID {0}")]
    InvalidCandidate(CandidateId),
    #[error("Candidate {0} is no longer active")]
    CandidateInactive(CandidateId),
    #[error("Voter has no vote to remove")]
    VoterHasNotVoted,
    #[error("Null principal is not a valid address")]
    InvalidAddress,
    #[error("Election has no end time")]
    DurationNotSet,
    #[error("Election window has not expired yet")]
    DurationNotExpired,
    #[error("Election has already ended")]
    AlreadyEnded,
}

impl LedgerError {
    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::NotAuthorized => "NotAuthorized",
            Self::ElectionClosed => "ElectionClosed",
            Self::ElectionNotEnded => "ElectionNotEnded",
            Self::AlreadyVoted => "AlreadyVoted",
            Self::InvalidCandidate(_) => "InvalidCandidate",
            Self::CandidateInactive(_) => "CandidateInactive",
            Self::VoterHasNotVoted => "VoterHasNotVoted",
            Self::InvalidAddress => "InvalidAddress",
            Self::DurationNotSet => "DurationNotSet",
            Self::DurationNotExpired => "DurationNotExpired",
            Self::AlreadyEnded => "AlreadyEnded",
        }
    }

    /// The HTTP status this failure is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Unauthorized | Self::NotAuthorized => Status::Forbidden,
            Self::InvalidCandidate(_) => Status::NotFound,
            Self::InvalidAddress => Status::BadRequest,
            _ => Status::Conflict,
        }
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for LedgerError {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        debug!("Refusing {} {}: {self}", req.method(), req.uri());
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).respond_to(req)
    }
}
