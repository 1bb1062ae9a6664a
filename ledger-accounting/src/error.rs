//! Error types for the accounting engine

use crate::types::AccountId;
use std::fmt;
use thiserror::Error;

/// Result type for accounting operations
pub type Result<T> = std::result::Result<T, AccountingError>;

/// Errors raised by a ledger store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// The statement returned no row
    #[error("no rows in result set")]
    NotFound,

    /// Database driver error (connection, SQL, decode)
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Concurrent unit of work conflicted with this one; the store refused it
    #[error("restart transaction: {0}")]
    Conflict(String),

    /// Fault raised on purpose by a test store
    #[error("injected fault: {0}")]
    Injected(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Database(other),
        }
    }
}

/// Accounting errors, one variant per failure kind
#[derive(Error, Debug)]
pub enum AccountingError {
    /// The unit of work could not be started
    #[error("could not start transaction: {source}")]
    BeginTx {
        /// Store failure
        source: StoreError,
    },

    /// A ledger entry could not be inserted
    #[error("could not insert transaction for account {account}: {source}")]
    InsertEntry {
        /// Account the entry belonged to
        account: AccountId,
        /// Store failure
        source: StoreError,
    },

    /// The balance decrement failed
    #[error("could not update balance of account {account}: {source}")]
    UpdateBalance {
        /// Account being debited
        account: AccountId,
        /// Store failure
        source: StoreError,
    },

    /// The balance row could not be read or decoded (including "not found")
    #[error("could not scan the balance of account {account}: {source}")]
    ScanBalance {
        /// Account being read
        account: AccountId,
        /// Store failure
        source: StoreError,
    },

    /// No account row could be selected or decoded (including an empty table)
    #[error("could not scan an account: {source}")]
    ScanAccount {
        /// Store failure
        source: StoreError,
    },

    /// The account insert failed
    #[error("could not create an account: {source}")]
    CreateAccount {
        /// Store failure
        source: StoreError,
    },

    /// The batch would have driven the balance negative and was rolled back
    #[error("insufficient funds on account {account}: balance would be {balance_cents} cents")]
    InsufficientFunds {
        /// Account the batch targeted
        account: AccountId,
        /// Balance observed inside the unit of work after the debit
        balance_cents: i64,
    },

    /// Commit failed; the final state of the unit of work is store-dependent
    #[error("could not commit transaction on account {account}: {source}")]
    CommitTx {
        /// Account the batch targeted
        account: AccountId,
        /// Store failure
        source: StoreError,
    },

    /// Rollback after a primary failure failed too.
    ///
    /// The primary error is the `source()` of this one so callers can walk
    /// down to it.
    #[error("could not rollback transaction ({cause}): {primary}")]
    RollbackTx {
        /// Rollback failure
        cause: StoreError,
        /// Failure that triggered the rollback
        #[source]
        primary: Box<AccountingError>,
    },

    /// The delete statement failed
    #[error("could not delete account {account}: {source}")]
    DeleteAccount {
        /// Account being deleted
        account: AccountId,
        /// Store failure
        source: StoreError,
    },

    /// The store could not report how many rows the delete removed
    #[error("could not detect the affected rows deleting account {account}")]
    RowsAffected {
        /// Account being deleted
        account: AccountId,
    },

    /// The delete did not remove exactly one row
    #[error("could not find account {account} to delete ({rows_affected} rows affected)")]
    DeleteNotFound {
        /// Account being deleted
        account: AccountId,
        /// Rows the delete reported
        rows_affected: u64,
    },
}

impl AccountingError {
    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountingError::BeginTx { .. } => ErrorKind::BeginTxFailed,
            AccountingError::InsertEntry { .. } => ErrorKind::InsertEntryFailed,
            AccountingError::UpdateBalance { .. } => ErrorKind::UpdateBalanceFailed,
            AccountingError::ScanBalance { .. } => ErrorKind::ScanBalanceFailed,
            AccountingError::ScanAccount { .. } => ErrorKind::ScanAccountFailed,
            AccountingError::CreateAccount { .. } => ErrorKind::CreateAccountFailed,
            AccountingError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AccountingError::CommitTx { .. } => ErrorKind::CommitFailed,
            AccountingError::RollbackTx { .. } => ErrorKind::RollbackFailed,
            AccountingError::DeleteAccount { .. } => ErrorKind::DeleteAccountFailed,
            AccountingError::RowsAffected { .. } => ErrorKind::RowsAffectedUnknown,
            AccountingError::DeleteNotFound { .. } => ErrorKind::DeleteTargetNotFound,
        }
    }

    /// Error that triggered a failed rollback, if this is one
    pub fn primary(&self) -> Option<&AccountingError> {
        match self {
            AccountingError::RollbackTx { primary, .. } => Some(primary),
            _ => None,
        }
    }

    /// Wrap `primary` with a rollback failure
    pub fn rollback_failed(cause: StoreError, primary: AccountingError) -> Self {
        AccountingError::RollbackTx {
            cause,
            primary: Box::new(primary),
        }
    }
}

/// Closed taxonomy of accounting failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unit of work could not start
    BeginTxFailed,
    /// Entry insert failed
    InsertEntryFailed,
    /// Balance decrement failed
    UpdateBalanceFailed,
    /// Balance read/decode failed
    ScanBalanceFailed,
    /// Random account read/decode failed
    ScanAccountFailed,
    /// Account insert failed
    CreateAccountFailed,
    /// Batch exceeded the balance
    InsufficientFunds,
    /// Commit failed
    CommitFailed,
    /// Rollback failed
    RollbackFailed,
    /// Delete statement failed
    DeleteAccountFailed,
    /// Affected row count unavailable
    RowsAffectedUnknown,
    /// Delete removed no row
    DeleteTargetNotFound,
}

impl ErrorKind {
    /// Every kind, in taxonomy order
    pub const ALL: [ErrorKind; 12] = [
        ErrorKind::BeginTxFailed,
        ErrorKind::InsertEntryFailed,
        ErrorKind::UpdateBalanceFailed,
        ErrorKind::ScanBalanceFailed,
        ErrorKind::ScanAccountFailed,
        ErrorKind::CreateAccountFailed,
        ErrorKind::InsufficientFunds,
        ErrorKind::CommitFailed,
        ErrorKind::RollbackFailed,
        ErrorKind::DeleteAccountFailed,
        ErrorKind::RowsAffectedUnknown,
        ErrorKind::DeleteTargetNotFound,
    ];

    /// Whether this is an expected business outcome rather than a fault
    pub fn is_expected(&self) -> bool {
        matches!(self, ErrorKind::InsufficientFunds)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::BeginTxFailed => "BeginTxFailed",
            ErrorKind::InsertEntryFailed => "InsertEntryFailed",
            ErrorKind::UpdateBalanceFailed => "UpdateBalanceFailed",
            ErrorKind::ScanBalanceFailed => "ScanBalanceFailed",
            ErrorKind::ScanAccountFailed => "ScanAccountFailed",
            ErrorKind::CreateAccountFailed => "CreateAccountFailed",
            ErrorKind::InsufficientFunds => "InsufficientFunds",
            ErrorKind::CommitFailed => "CommitFailed",
            ErrorKind::RollbackFailed => "RollbackFailed",
            ErrorKind::DeleteAccountFailed => "DeleteAccountFailed",
            ErrorKind::RowsAffectedUnknown => "RowsAffectedUnknown",
            ErrorKind::DeleteTargetNotFound => "DeleteTargetNotFound",
        };
        f.write_str(name)
    }
}
