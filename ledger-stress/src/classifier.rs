//! Outcome classification
//!
//! Turns the result of every engine call into exactly one metric increment
//! and one log line. Successes and insufficient funds log at `INFO`, other
//! taxonomy failures at `WARN`. Errors that are not accounting errors fall
//! into [`Classification::Unknown`], are counted as `error.unknown` and log at
//! `ERROR`: they point at a gap in the taxonomy.

use crate::telemetry::TelemetrySink;
use ledger_accounting::{AccountingError, ErrorKind};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Metric for every successful operation
pub const SUCCESS_METRIC: &str = "success_op";

/// Metric for errors outside the taxonomy
pub const UNKNOWN_METRIC: &str = "error.unknown";

/// Engine operations performed by the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Random account selection
    GetRandomAccount,
    /// Balance read
    ReadBalance,
    /// Batch processing
    ProcessTransactions,
    /// Account delete
    DeleteAccount,
    /// Account create
    CreateAccount,
}

impl Operation {
    /// Name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetRandomAccount => "get_random_account",
            Operation::ReadBalance => "read_balance",
            Operation::ProcessTransactions => "process_transactions",
            Operation::DeleteAccount => "delete_account",
            Operation::CreateAccount => "create_account",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an outcome lands in the taxonomy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Operation succeeded
    Success,
    /// Known failure kind
    Failure(ErrorKind),
    /// Error outside the taxonomy, with its description
    Unknown(String),
}

impl Classification {
    /// Classify an error by downcasting it to [`AccountingError`]
    pub fn of_error(err: &(dyn std::error::Error + 'static)) -> Self {
        match err.downcast_ref::<AccountingError>() {
            Some(accounting) => Classification::Failure(accounting.kind()),
            None => Classification::Unknown(err.to_string()),
        }
    }

    /// Metric name emitted for this classification
    pub fn metric_name(&self) -> &'static str {
        match self {
            Classification::Success => SUCCESS_METRIC,
            Classification::Failure(kind) => metric_for_kind(*kind),
            Classification::Unknown(_) => UNKNOWN_METRIC,
        }
    }
}

/// Metric name of a taxonomy kind
pub fn metric_for_kind(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::BeginTxFailed => "error.begin_tx",
        ErrorKind::InsertEntryFailed => "error.insert_tx",
        ErrorKind::UpdateBalanceFailed => "error.update_tx",
        ErrorKind::ScanBalanceFailed => "error.scan_balance",
        ErrorKind::ScanAccountFailed => "error.scan_account",
        ErrorKind::CreateAccountFailed => "error.create_account",
        ErrorKind::InsufficientFunds => "error.insufficient_funds",
        ErrorKind::CommitFailed => "error.commit_tx",
        ErrorKind::RollbackFailed => "error.rollback_tx",
        ErrorKind::DeleteAccountFailed => "error.delete_account",
        ErrorKind::RowsAffectedUnknown => "error.rows_affected",
        ErrorKind::DeleteTargetNotFound => "error.delete_not_found",
    }
}

/// Maps outcomes to metrics and log lines
#[derive(Clone)]
pub struct OutcomeClassifier {
    sink: Arc<dyn TelemetrySink>,
}

impl fmt::Debug for OutcomeClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutcomeClassifier").finish_non_exhaustive()
    }
}

impl OutcomeClassifier {
    /// Classifier reporting to `sink`
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    /// Classify `result` of `operation`, emit its metric and log it with `context`
    pub fn observe<T, E>(
        &self,
        operation: Operation,
        result: &Result<T, E>,
        context: impl fmt::Display,
    ) -> Classification
    where
        E: std::error::Error + 'static,
    {
        match result {
            Ok(_) => {
                self.sink.increment_counter(SUCCESS_METRIC);
                info!(op = %operation, "Op {} was successful: {}", operation, context);
                Classification::Success
            }
            Err(err) => self.observe_error(operation, err, context),
        }
    }

    fn observe_error(
        &self,
        operation: Operation,
        err: &(dyn std::error::Error + 'static),
        context: impl fmt::Display,
    ) -> Classification {
        let classification = Classification::of_error(err);
        let metric = classification.metric_name();

        match &classification {
            Classification::Unknown(detail) => {
                error!(
                    op = %operation,
                    metric,
                    "Unknown error detected in op {} ({}): {}",
                    operation, context, detail
                );
            }
            Classification::Failure(kind) if kind.is_expected() => {
                info!(
                    op = %operation,
                    metric,
                    "Op {} rejected by the balance check ({}): {}",
                    operation, context, err
                );
            }
            Classification::Failure(ErrorKind::RollbackFailed) => {
                let primary = err
                    .downcast_ref::<AccountingError>()
                    .and_then(AccountingError::primary)
                    .map(|p| p.kind().to_string())
                    .unwrap_or_default();
                warn!(
                    op = %operation,
                    metric,
                    primary_kind = %primary,
                    "Op {} returned an error ({}). Error: {}",
                    operation, context, err
                );
            }
            Classification::Failure(_) | Classification::Success => {
                warn!(
                    op = %operation,
                    metric,
                    "Op {} returned an error ({}). Error: {}",
                    operation, context, err
                );
            }
        }

        self.sink.increment_counter(metric);
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Metrics;
    use ledger_accounting::{AccountId, StoreError};
    use uuid::Uuid;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Log lines emitted while `f` runs
    fn captured_lines(f: impl FnOnce()) -> Vec<String> {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f);

        let bytes = logs.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn classifier() -> (OutcomeClassifier, Metrics) {
        let metrics = Metrics::new("test").unwrap();
        (OutcomeClassifier::new(Arc::new(metrics.clone())), metrics)
    }

    fn error_of(kind: ErrorKind) -> AccountingError {
        let account = AccountId::from(Uuid::new_v4());
        let source = || StoreError::Injected(kind.to_string());
        match kind {
            ErrorKind::BeginTxFailed => AccountingError::BeginTx { source: source() },
            ErrorKind::InsertEntryFailed => AccountingError::InsertEntry {
                account,
                source: source(),
            },
            ErrorKind::UpdateBalanceFailed => AccountingError::UpdateBalance {
                account,
                source: source(),
            },
            ErrorKind::ScanBalanceFailed => AccountingError::ScanBalance {
                account,
                source: source(),
            },
            ErrorKind::ScanAccountFailed => AccountingError::ScanAccount { source: source() },
            ErrorKind::CreateAccountFailed => AccountingError::CreateAccount { source: source() },
            ErrorKind::InsufficientFunds => AccountingError::InsufficientFunds {
                account,
                balance_cents: -1,
            },
            ErrorKind::CommitFailed => AccountingError::CommitTx {
                account,
                source: source(),
            },
            ErrorKind::RollbackFailed => AccountingError::rollback_failed(
                source(),
                AccountingError::UpdateBalance {
                    account,
                    source: source(),
                },
            ),
            ErrorKind::DeleteAccountFailed => AccountingError::DeleteAccount {
                account,
                source: source(),
            },
            ErrorKind::RowsAffectedUnknown => AccountingError::RowsAffected { account },
            ErrorKind::DeleteTargetNotFound => AccountingError::DeleteNotFound {
                account,
                rows_affected: 0,
            },
        }
    }

    #[test]
    fn test_success_metric() {
        let (classifier, metrics) = classifier();
        let result: Result<i64, AccountingError> = Ok(500);

        let classification = classifier.observe(Operation::ProcessTransactions, &result, "current balance: 500");
        assert_eq!(classification, Classification::Success);
        assert_eq!(metrics.count(SUCCESS_METRIC), 1);
    }

    #[test]
    fn test_each_kind_emits_its_metric_once() {
        for kind in ErrorKind::ALL {
            let (classifier, metrics) = classifier();
            let result: Result<(), AccountingError> = Err(error_of(kind));

            let classification = classifier.observe(Operation::ReadBalance, &result, "");
            assert_eq!(classification, Classification::Failure(kind));

            let snapshot = metrics.snapshot();
            assert_eq!(snapshot.len(), 1, "{} emitted {:?}", kind, snapshot);
            assert_eq!(snapshot.get(metric_for_kind(kind)), Some(&1));
        }
    }

    #[test]
    fn test_metric_names_are_distinct() {
        let mut names: Vec<_> = ErrorKind::ALL.iter().map(|k| metric_for_kind(*k)).collect();
        names.push(SUCCESS_METRIC);
        names.push(UNKNOWN_METRIC);
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_unrecognised_error_is_unknown() {
        let (classifier, metrics) = classifier();
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by load balancer",
        ));

        let mut classification = Classification::Success;
        let lines = captured_lines(|| {
            classification = classifier.observe(Operation::DeleteAccount, &result, "");
        });

        assert_eq!(
            classification,
            Classification::Unknown("connection reset by load balancer".to_string())
        );
        assert_eq!(metrics.count(UNKNOWN_METRIC), 1);
        assert_eq!(metrics.snapshot().len(), 1);

        let errors: Vec<_> = lines.iter().filter(|line| line.contains("ERROR")).collect();
        assert_eq!(errors.len(), 1, "{:?}", lines);
        assert!(errors[0].contains("delete_account"));
        assert!(errors[0].contains("connection reset by load balancer"));
    }

    #[test]
    fn test_insufficient_funds_is_not_logged_as_fault() {
        let (classifier, metrics) = classifier();
        let result: Result<i64, AccountingError> =
            Err(error_of(ErrorKind::InsufficientFunds));

        let lines = captured_lines(|| {
            classifier.observe(Operation::ProcessTransactions, &result, "current balance: 0");
        });

        assert_eq!(metrics.count("error.insufficient_funds"), 1);
        assert_eq!(lines.len(), 1, "{:?}", lines);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("rejected by the balance check"));
    }

    #[test]
    fn test_system_fault_is_logged_as_warning() {
        let (classifier, _metrics) = classifier();
        for kind in ErrorKind::ALL.into_iter().filter(|kind| !kind.is_expected()) {
            let result: Result<(), AccountingError> = Err(error_of(kind));
            let lines = captured_lines(|| {
                classifier.observe(Operation::ProcessTransactions, &result, "");
            });

            assert_eq!(lines.len(), 1, "{}: {:?}", kind, lines);
            assert!(lines[0].contains("WARN"), "{}: {}", kind, lines[0]);
            assert!(lines[0].contains(metric_for_kind(kind)));
        }
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::GetRandomAccount.to_string(), "get_random_account");
        assert_eq!(Operation::ProcessTransactions.as_str(), "process_transactions");
    }
}
