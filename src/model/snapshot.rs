use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::journal::JournalEntry;
use crate::model::{candidate::Candidate, election::Election, principal::Principal, voter::Voter};

/// A consistent, serialisable copy of the whole ledger, including its journal.
/// This is what gets handed to auditors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub election: Election,
    /// Every candidate ever added, in ID order.
    pub candidates: Vec<Candidate>,
    pub voters: BTreeMap<Principal, Voter>,
    pub authorized_voters: BTreeSet<Principal>,
    pub journal: Vec<JournalEntry>,
}
