//! Accounting engine
//!
//! Every operation runs against the one store handle the engine owns. Batch
//! processing is the only path that changes a balance:
//!
//! ```text
//! begin ─► insert entry × N ─► debit Σ amount ─► re-read balance ─► commit
//!               │                   │                  │
//!               └───────────────────┴──── failure ─────┴─► rollback
//!                                         balance < 0 ───► rollback
//! ```
//!
//! A failed commit is reported as-is with no rollback attempt; whether the
//! unit of work landed is up to the store.

use crate::error::{AccountingError, Result};
use crate::store::{LedgerStore, UnitOfWork};
use crate::types::{AccountId, LedgerEntry, WritePath};
use tracing::{debug, info};

/// Accounting operations over a ledger store
#[derive(Debug)]
pub struct Accounting<S> {
    store: S,
}

impl<S: LedgerStore> Accounting<S> {
    /// Create an engine owning `store`
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current balance of `account`; a missing account is a scan failure
    pub async fn read_balance(&self, account: &AccountId) -> Result<i64> {
        self.store
            .read_balance(account)
            .await
            .map_err(|source| AccountingError::ScanBalance {
                account: *account,
                source,
            })
    }

    /// Create an account holding `balance_cents`
    pub async fn create_account(&self, balance_cents: i64) -> Result<AccountId> {
        self.store
            .insert_account(balance_cents)
            .await
            .map_err(|source| AccountingError::CreateAccount { source })
    }

    /// Delete `account`, which must exist
    pub async fn delete_account(&self, account: &AccountId) -> Result<()> {
        let result = self
            .store
            .delete_account(account)
            .await
            .map_err(|source| AccountingError::DeleteAccount {
                account: *account,
                source,
            })?;

        let rows_affected = result
            .rows_affected()
            .ok_or(AccountingError::RowsAffected { account: *account })?;

        if rows_affected != 1 {
            return Err(AccountingError::DeleteNotFound {
                account: *account,
                rows_affected,
            });
        }

        Ok(())
    }

    /// One existing account picked uniformly at random, with its balance
    pub async fn random_account(&self) -> Result<(AccountId, i64)> {
        self.store
            .random_account()
            .await
            .map_err(|source| AccountingError::ScanAccount { source })
    }

    /// Apply `entries` to `account` atomically.
    ///
    /// Returns the post-batch balance. A batch whose sum exceeds the balance
    /// is rolled back whole and reported as [`AccountingError::InsufficientFunds`].
    pub async fn process_batch(
        &self,
        account: &AccountId,
        entries: &[LedgerEntry],
        path: WritePath,
    ) -> Result<i64> {
        let mut uow = self
            .store
            .begin(path)
            .await
            .map_err(|source| AccountingError::BeginTx { source })?;

        let mut total: i64 = 0;
        for entry in entries {
            if let Err(source) = uow.insert_entry(account, entry).await {
                let primary = AccountingError::InsertEntry {
                    account: *account,
                    source,
                };
                return Err(rollback(uow, primary).await);
            }
            total = match total.checked_add(entry.amount_cents()) {
                Some(total) => total,
                None => {
                    // no balance covers a debit past i64::MAX
                    let primary = AccountingError::InsufficientFunds {
                        account: *account,
                        balance_cents: i64::MIN,
                    };
                    return Err(rollback(uow, primary).await);
                }
            };
        }

        if let Err(source) = uow.debit_balance(account, total).await {
            let primary = AccountingError::UpdateBalance {
                account: *account,
                source,
            };
            return Err(rollback(uow, primary).await);
        }

        let balance = match uow.read_balance(account).await {
            Ok(balance) => balance,
            Err(source) => {
                let primary = AccountingError::ScanBalance {
                    account: *account,
                    source,
                };
                return Err(rollback(uow, primary).await);
            }
        };

        if balance < 0 {
            let primary = AccountingError::InsufficientFunds {
                account: *account,
                balance_cents: balance,
            };
            return Err(rollback(uow, primary).await);
        }

        uow.commit()
            .await
            .map_err(|source| AccountingError::CommitTx {
                account: *account,
                source,
            })?;

        debug!(
            account = %account,
            entries = entries.len(),
            total_cents = total,
            balance_cents = balance,
            "Batch committed"
        );

        Ok(balance)
    }

    /// Top the account population up to `target` accounts.
    ///
    /// Returns how many accounts were created.
    pub async fn ensure_population(&self, target: u64, balance_cents: i64) -> Result<u64> {
        let existing = self
            .store
            .count_accounts()
            .await
            .map_err(|source| AccountingError::ScanAccount { source })?;

        let missing = target.saturating_sub(existing);
        for _ in 0..missing {
            self.create_account(balance_cents).await?;
        }

        if missing > 0 {
            info!(existing, created = missing, "Seeded account population");
        }

        Ok(missing)
    }
}

/// Roll `uow` back after `primary`; a failed rollback wraps `primary`.
async fn rollback(uow: Box<dyn UnitOfWork>, primary: AccountingError) -> AccountingError {
    match uow.rollback().await {
        Ok(()) => primary,
        Err(cause) => {
            debug!(error = %cause, primary = %primary, "Rollback failed");
            AccountingError::rollback_failed(cause, primary)
        }
    }
}
