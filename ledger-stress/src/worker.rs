//! Worker loops
//!
//! A worker checks the cancellation token once per iteration, before it
//! touches the engine. An operation that has started always runs to its
//! commit or rollback and is classified before the worker looks again.

use crate::classifier::{Operation, OutcomeClassifier};
use crate::workload::EntryGenerator;
use ledger_accounting::{AccountId, Accounting, LedgerStore, WritePath};
use rand::rngs::StdRng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What a worker does on every iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    /// Reads the balance of a random account
    Reader,
    /// Debits a random batch from a random account
    Transactor,
    /// Deletes a random account and creates a replacement
    Churner,
}

impl WorkerRole {
    /// Role name used in spans
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Reader => "reader",
            WorkerRole::Transactor => "transactor",
            WorkerRole::Churner => "churner",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Churner pacing and replacement balance
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChurnSettings {
    pub(crate) interval: Duration,
    pub(crate) replacement_balance_cents: i64,
}

/// One self-driving loop bound to a role
pub(crate) struct Worker<S> {
    role: WorkerRole,
    accounting: Arc<Accounting<S>>,
    classifier: OutcomeClassifier,
    generator: EntryGenerator,
    churn: ChurnSettings,
    rng: StdRng,
}

impl<S: LedgerStore> Worker<S> {
    pub(crate) fn new(
        role: WorkerRole,
        accounting: Arc<Accounting<S>>,
        classifier: OutcomeClassifier,
        churn: ChurnSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            role,
            accounting,
            classifier,
            generator: EntryGenerator::new(),
            churn,
            rng,
        }
    }

    /// Loop until `token` is cancelled
    pub(crate) async fn run(mut self, token: CancellationToken) {
        while !token.is_cancelled() {
            match self.role {
                WorkerRole::Reader => self.read_step().await,
                WorkerRole::Transactor => self.transact_step().await,
                WorkerRole::Churner => self.churn_step(&token).await,
            }
        }
        info!("quitting routine");
    }

    async fn pick_account(&self) -> Option<(AccountId, i64)> {
        let picked = self.accounting.random_account().await;
        self.classifier
            .observe(Operation::GetRandomAccount, &picked, "");
        picked.ok()
    }

    async fn read_step(&mut self) {
        let Some((account, _)) = self.pick_account().await else {
            return;
        };

        let result = self.accounting.read_balance(&account).await;
        self.classifier
            .observe(Operation::ReadBalance, &result, account);
    }

    async fn transact_step(&mut self) {
        let Some((account, balance)) = self.pick_account().await else {
            return;
        };

        let entries = self.generator.generate(&mut self.rng, balance);
        let result = self
            .accounting
            .process_batch(&account, &entries, WritePath::ReturningNothing)
            .await;

        let balance = result.as_ref().copied().unwrap_or_default();
        self.classifier.observe(
            Operation::ProcessTransactions,
            &result,
            format_args!("current balance: {}", balance),
        );
    }

    async fn churn_step(&mut self, token: &CancellationToken) {
        let Some((account, _)) = self.pick_account().await else {
            return;
        };

        let deleted = self.accounting.delete_account(&account).await;
        self.classifier
            .observe(Operation::DeleteAccount, &deleted, account);
        if deleted.is_err() {
            return;
        }

        let created = self
            .accounting
            .create_account(self.churn.replacement_balance_cents)
            .await;
        let replacement = created
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        self.classifier
            .observe(Operation::CreateAccount, &created, replacement);

        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(self.churn.interval) => {}
        }
    }
}
