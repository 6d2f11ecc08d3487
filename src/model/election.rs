use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::principal::Principal;

/// The parameters an election is created with. These never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    /// Election title.
    pub title: String,
    /// Election description.
    pub description: String,
    /// If set, only explicitly authorized principals may vote.
    pub require_authorization: bool,
}

/// Top-level election metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// The only principal allowed to perform administrative operations.
    pub administrator: Principal,
    /// Election title.
    pub title: String,
    /// Election description.
    pub description: String,
    /// Voting policy flag.
    pub require_authorization: bool,
    /// When the election was created.
    pub start_time: DateTime<Utc>,
    /// When voting closes. `None` means the window is unbounded.
    pub end_time: Option<DateTime<Utc>>,
    /// Set once the election has been explicitly closed. Never unset.
    pub ended: bool,
    /// Number of votes currently counted.
    pub total_votes: u64,
}

impl Election {
    /// Create a fresh election administered by `administrator`.
    pub fn new(administrator: Principal, spec: ElectionSpec, start_time: DateTime<Utc>) -> Self {
        Self {
            administrator,
            title: spec.title,
            description: spec.description,
            require_authorization: spec.require_authorization,
            start_time,
            end_time: None,
            ended: false,
            total_votes: 0,
        }
    }

    /// Is voting open at `now`?
    /// An election whose window has passed is closed even before `ended` is persisted.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.ended && self.end_time.map_or(true, |end| now <= end)
    }

    /// Has the window expired at `now` without the election being ended?
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.ended && self.end_time.map_or(false, |end| now > end)
    }

    /// Length of the voting window, or zero if it is unbounded.
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) if end > self.start_time => end - self.start_time,
            _ => Duration::zero(),
        }
    }

    /// Time left until the window closes, or zero if there is no deadline to count down to.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.end_time {
            Some(end) if !self.ended && now < end => end - now,
            _ => Duration::zero(),
        }
    }
}
