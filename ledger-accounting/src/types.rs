//! Core types for the accounting engine

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier, generated by the store on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single ledger entry ("transaction" row), immutable once built.
///
/// Amounts are minor currency units (cents) and are subtracted from the
/// owning account when the batch commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    amount_cents: i64,
    description: String,
}

impl LedgerEntry {
    /// Create a new entry
    pub fn new(amount_cents: i64, description: impl Into<String>) -> Self {
        Self {
            amount_cents,
            description: description.into(),
        }
    }

    /// Amount in cents
    pub fn amount_cents(&self) -> i64 {
        self.amount_cents
    }

    /// Free-text label
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Write path requested for the statements of a unit of work.
///
/// `ReturningNothing` tells the store that no statement needs per-row
/// results, which lets CockroachDB pipeline the writes. It never changes
/// the outcome of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WritePath {
    /// Plain statements
    #[default]
    Standard,
    /// Statements suffixed with `RETURNING NOTHING`
    ReturningNothing,
}

impl WritePath {
    /// SQL suffix appended to write statements
    pub fn sql_suffix(&self) -> &'static str {
        match self {
            WritePath::Standard => "",
            WritePath::ReturningNothing => " RETURNING NOTHING",
        }
    }
}
