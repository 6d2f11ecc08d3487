//! An append-only, hash-chained record of every committed ledger event.
//!
//! Each entry commits to its predecessor's hash, so altering, dropping, or
//! reordering any entry breaks every hash after it.

use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::LedgerEvent;

/// The `previous` hash of the very first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A single journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, starting at 0.
    pub sequence: u64,
    pub event: LedgerEvent,
    /// Hex SHA-256 of the previous entry.
    pub previous: String,
    /// Hex SHA-256 of this entry.
    pub hash: String,
}

/// Ways in which a journal can fail verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    #[error("Entry {position} has sequence number {found}")]
    Sequence { position: u64, found: u64 },
    #[error("Entry {sequence} does not link to its predecessor")]
    Link { sequence: u64 },
    #[error("Entry {sequence} has been altered")]
    Hash { sequence: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, chaining it onto the current head.
    pub fn append(&mut self, event: LedgerEvent) -> &JournalEntry {
        let sequence = self.entries.len() as u64;
        let previous = self.head().to_string();
        let hash = entry_hash(sequence, &previous, &event);
        self.entries.push(JournalEntry {
            sequence,
            event,
            previous,
            hash,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Hash of the latest entry, or the genesis hash if empty.
    pub fn head(&self) -> &str {
        self.entries
            .last()
            .map(|entry| entry.hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that `entries` forms an unbroken chain from genesis.
    /// Reports the first problem found.
    pub fn verify(entries: &[JournalEntry]) -> Result<(), JournalError> {
        let mut previous = GENESIS_HASH;
        for (position, entry) in entries.iter().enumerate() {
            let position = position as u64;
            if entry.sequence != position {
                return Err(JournalError::Sequence {
                    position,
                    found: entry.sequence,
                });
            }
            if entry.previous != previous {
                return Err(JournalError::Link {
                    sequence: entry.sequence,
                });
            }
            if entry_hash(entry.sequence, &entry.previous, &entry.event) != entry.hash {
                return Err(JournalError::Hash {
                    sequence: entry.sequence,
                });
            }
            previous = &entry.hash;
        }
        Ok(())
    }
}

fn entry_hash(sequence: u64, previous: &str, event: &LedgerEvent) -> String {
    let encoded = serde_json::to_vec(event).expect("Serialisation is infallible");
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    hasher.update(previous.as_bytes());
    hasher.update(&encoded);
    HEXLOWER.encode(&hasher.finalize())
}
