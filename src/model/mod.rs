pub mod api;
pub mod candidate;
pub mod election;
pub mod event;
pub mod principal;
pub mod snapshot;
pub mod stats;
pub mod voter;

pub use candidate::{Candidate, CandidateId, CandidateSpec};
pub use election::{Election, ElectionSpec};
pub use event::LedgerEvent;
pub use principal::Principal;
pub use snapshot::LedgerSnapshot;
pub use stats::{ElectionStats, TimeRemaining, Winners};
pub use voter::Voter;
