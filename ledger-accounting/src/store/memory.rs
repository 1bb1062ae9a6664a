//! In-process ledger store for the engine and worker tests
//!
//! Every account row carries a version bumped by each committed debit. A unit
//! of work reads from the row it first touched and stages its writes; commit
//! applies them under a single lock only if every touched row still has the
//! version it saw, otherwise it is refused with [`StoreError::Conflict`].
//! Random selection draws from the store's own seeded RNG.
//!
//! Every statement yields to the runtime first, standing in for the network
//! round trip, and can be made to fail once through [`MemoryStore::fail_next`].

use crate::error::StoreError;
use crate::store::{LedgerStore, UnitOfWork, WriteResult};
use crate::types::{AccountId, LedgerEntry, WritePath};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Statement kinds that can carry an injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    /// Start of a unit of work
    Begin,
    /// Entry insert inside a unit of work
    InsertEntry,
    /// Balance decrement inside a unit of work
    DebitBalance,
    /// Balance read, inside or outside a unit of work
    ReadBalance,
    /// Commit
    Commit,
    /// Rollback
    Rollback,
    /// Account insert
    InsertAccount,
    /// Account delete
    DeleteAccount,
    /// Random account selection
    RandomAccount,
    /// Account count
    CountAccounts,
}

#[derive(Debug, Clone, Copy)]
struct AccountRow {
    balance_cents: i64,
    version: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, AccountRow>,
    entries: Vec<(AccountId, LedgerEntry)>,
}

#[derive(Debug, Default)]
struct Faults {
    armed: HashMap<Statement, usize>,
    unknown_rows_affected: usize,
}

impl Faults {
    fn take(&mut self, statement: Statement) -> Result<(), StoreError> {
        match self.armed.get_mut(&statement) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Injected(format!("{:?} failed", statement)))
            }
            _ => Ok(()),
        }
    }
}

/// Shared in-memory ledger; clones see the same data
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Mutex<Faults>>,
    rng: Arc<Mutex<StdRng>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store whose random selection is reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Arc::default(),
            faults: Arc::default(),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Make the next `statement` fail once
    pub fn fail_next(&self, statement: Statement) {
        *self.faults.lock().armed.entry(statement).or_insert(0) += 1;
    }

    /// Make the next delete report an unknown affected row count
    pub fn unknown_rows_affected_next(&self) {
        self.faults.lock().unknown_rows_affected += 1;
    }

    /// Committed balance of `account`
    pub fn balance(&self, account: &AccountId) -> Option<i64> {
        self.row(account).map(|row| row.balance_cents)
    }

    fn row(&self, account: &AccountId) -> Option<AccountRow> {
        self.state.lock().accounts.get(account).copied()
    }

    /// Committed entries owned by `account`, in insertion order
    pub fn entries(&self, account: &AccountId) -> Vec<LedgerEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(owner, _)| owner == account)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Total committed entries across all accounts
    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Existing account ids
    pub fn account_ids(&self) -> Vec<AccountId> {
        self.state.lock().accounts.keys().copied().collect()
    }

    async fn round_trip(&self, statement: Statement) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.faults.lock().take(statement)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn read_balance(&self, account: &AccountId) -> Result<i64, StoreError> {
        self.round_trip(Statement::ReadBalance).await?;
        self.balance(account).ok_or(StoreError::NotFound)
    }

    async fn insert_account(&self, balance_cents: i64) -> Result<AccountId, StoreError> {
        self.round_trip(Statement::InsertAccount).await?;
        let id = AccountId::from(Uuid::new_v4());
        self.state.lock().accounts.insert(
            id,
            AccountRow {
                balance_cents,
                version: 0,
            },
        );
        Ok(id)
    }

    async fn delete_account(&self, account: &AccountId) -> Result<WriteResult, StoreError> {
        self.round_trip(Statement::DeleteAccount).await?;
        let removed = u64::from(self.state.lock().accounts.remove(account).is_some());

        let mut faults = self.faults.lock();
        if faults.unknown_rows_affected > 0 {
            faults.unknown_rows_affected -= 1;
            return Ok(WriteResult::unknown());
        }
        Ok(WriteResult::with_rows(removed))
    }

    async fn random_account(&self) -> Result<(AccountId, i64), StoreError> {
        self.round_trip(Statement::RandomAccount).await?;
        let state = self.state.lock();
        let mut rng = self.rng.lock();
        state
            .accounts
            .iter()
            .choose(&mut *rng)
            .map(|(id, row)| (*id, row.balance_cents))
            .ok_or(StoreError::NotFound)
    }

    async fn count_accounts(&self) -> Result<u64, StoreError> {
        self.round_trip(Statement::CountAccounts).await?;
        Ok(self.state.lock().accounts.len() as u64)
    }

    async fn begin(&self, _path: WritePath) -> Result<Box<dyn UnitOfWork>, StoreError> {
        self.round_trip(Statement::Begin).await?;
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            entries: Vec::new(),
            debits: HashMap::new(),
            snapshots: HashMap::new(),
        }))
    }
}

struct MemoryUnitOfWork {
    store: MemoryStore,
    entries: Vec<(AccountId, LedgerEntry)>,
    debits: HashMap<AccountId, i64>,
    snapshots: HashMap<AccountId, AccountRow>,
}

impl MemoryUnitOfWork {
    /// Row as first seen by this unit of work
    fn snapshot(&mut self, account: &AccountId) -> Option<AccountRow> {
        if let Some(row) = self.snapshots.get(account) {
            return Some(*row);
        }
        let row = self.store.row(account)?;
        self.snapshots.insert(*account, row);
        Some(row)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_entry(
        &mut self,
        account: &AccountId,
        entry: &LedgerEntry,
    ) -> Result<(), StoreError> {
        self.store.round_trip(Statement::InsertEntry).await?;
        self.entries.push((*account, entry.clone()));
        Ok(())
    }

    async fn debit_balance(
        &mut self,
        account: &AccountId,
        total_cents: i64,
    ) -> Result<WriteResult, StoreError> {
        self.store.round_trip(Statement::DebitBalance).await?;
        if self.snapshot(account).is_none() {
            return Ok(WriteResult::with_rows(0));
        }
        *self.debits.entry(*account).or_insert(0) += total_cents;
        Ok(WriteResult::with_rows(1))
    }

    async fn read_balance(&mut self, account: &AccountId) -> Result<i64, StoreError> {
        self.store.round_trip(Statement::ReadBalance).await?;
        let row = self.snapshot(account).ok_or(StoreError::NotFound)?;
        Ok(row.balance_cents - self.debits.get(account).copied().unwrap_or(0))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.store.round_trip(Statement::Commit).await?;
        let MemoryUnitOfWork {
            store,
            entries,
            debits,
            snapshots,
        } = *self;
        let mut state = store.state.lock();

        for (account, _) in &entries {
            if !state.accounts.contains_key(account) {
                return Err(StoreError::Conflict(format!(
                    "account {} deleted by a concurrent transaction",
                    account
                )));
            }
        }
        for (account, seen) in &snapshots {
            match state.accounts.get(account) {
                Some(row) if row.version == seen.version => {}
                Some(_) => {
                    return Err(StoreError::Conflict(format!(
                        "account {} changed by a concurrent transaction",
                        account
                    )))
                }
                None => {
                    return Err(StoreError::Conflict(format!(
                        "account {} deleted by a concurrent transaction",
                        account
                    )))
                }
            }
        }

        for (account, debit) in &debits {
            if let Some(row) = state.accounts.get_mut(account) {
                row.balance_cents -= debit;
                row.version += 1;
            }
        }
        state.entries.extend(entries);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.store.round_trip(Statement::Rollback).await
    }
}
