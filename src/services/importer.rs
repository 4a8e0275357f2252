//! Import orchestrator
//!
//! Drives one upload end-to-end: decode → per-row parse/match/upsert →
//! progress frames → terminal frame. Rows are processed sequentially on
//! purpose: concurrent rows for the same new phone would both decide "no
//! existing record" and create duplicates. Scale comes from running
//! imports for different files concurrently, not rows within one file.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ImportFileError;
use crate::identity::Country;
use crate::services::cancellation::CANCELLATION;
use crate::services::import_history::IMPORT_HISTORY;
use crate::services::row_parser::ColumnMap;
use crate::services::spreadsheet::{self, Cell};
use crate::services::upsert::{upsert_row, CustomerStore};
use crate::types::{ImportEvent, RowFailure};

/// Where progress frames go. A closed channel means the caller disconnected,
/// which the orchestrator treats as a stop signal at the next row boundary.
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ImportEvent>>,
}

impl ProgressSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ImportEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink for non-streaming callers; only the returned terminal frame is
    /// used.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Returns false when the receiving side is gone.
    async fn emit(&self, event: ImportEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => true,
        }
    }
}

/// A decoded, header-bound upload ready to run. Producing one is the only
/// place whole-batch-fatal errors can arise, so nothing has been persisted
/// yet when they do.
pub struct PreparedImport {
    pub job_id: Uuid,
    pub account_id: Uuid,
    pub filename: String,
    map: ColumnMap,
    rows: Vec<Vec<Cell>>,
}

impl PreparedImport {
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }
}

pub struct ImportRunner {
    store: Arc<dyn CustomerStore>,
    home: &'static Country,
    progress_interval: usize,
}

impl ImportRunner {
    pub fn new(store: Arc<dyn CustomerStore>, home: &'static Country, progress_interval: usize) -> Self {
        Self {
            store,
            home,
            progress_interval: progress_interval.max(1),
        }
    }

    /// Decode the upload and bind its header row.
    pub fn prepare(
        &self,
        job_id: Uuid,
        account_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PreparedImport, ImportFileError> {
        let sheet = spreadsheet::decode(filename, bytes)?;
        let map = ColumnMap::from_headers(&sheet.headers)?;
        if sheet.rows.is_empty() {
            return Err(ImportFileError::Empty);
        }
        Ok(PreparedImport {
            job_id,
            account_id,
            filename: filename.to_string(),
            map,
            rows: sheet.rows,
        })
    }

    /// Process every row, emitting frames as work progresses. The returned
    /// terminal frame is authoritative; it is also the last frame emitted.
    ///
    /// Row-level failures never abort the batch. Already-committed rows stay
    /// committed on cancellation or disconnect — this is an at-least-once
    /// contract.
    pub async fn run(&self, import: PreparedImport, progress: &ProgressSink) -> ImportEvent {
        let started_at = Utc::now();
        let total = import.rows.len();
        let _guard = CANCELLATION.register(import.job_id, import.account_id);

        info!(
            "Import {} started: {} rows from '{}'",
            import.job_id, total, import.filename
        );

        if !progress.emit(ImportEvent::Init { total }).await {
            return self.halt_disconnected(&import, started_at, 0, Vec::new());
        }

        let mut success_count = 0usize;
        let mut errors: Vec<RowFailure> = Vec::new();
        let mut cancelled = false;

        for (idx, cells) in import.rows.iter().enumerate() {
            if CANCELLATION.is_cancelled(&import.job_id) {
                cancelled = true;
                break;
            }

            // 1-based spreadsheet row number; the header occupies row 1.
            let row_number = idx + 2;
            let result = match import.map.parse_row(cells, self.home) {
                Ok(row) => upsert_row(self.store.as_ref(), import.account_id, &row)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => success_count += 1,
                Err(e) => {
                    debug!("Import {} row {}: {}", import.job_id, row_number, e);
                    errors.push(RowFailure { row: row_number, error: e.to_string() });
                }
            }

            let current = idx + 1;
            if current % self.progress_interval == 0 || current == total {
                let frame = ImportEvent::Progress {
                    current,
                    total,
                    success_count,
                    error_count: errors.len(),
                };
                if !progress.emit(frame).await {
                    return self.halt_disconnected(&import, started_at, success_count, errors);
                }
            }
        }

        let terminal = ImportEvent::Complete { success_count, errors };
        progress.emit(terminal.clone()).await;

        let error_count = match &terminal {
            ImportEvent::Complete { errors, .. } => errors.len(),
            _ => 0,
        };
        if cancelled {
            IMPORT_HISTORY.record_cancelled(
                import.job_id,
                import.account_id,
                &import.filename,
                started_at,
                success_count,
                error_count,
            );
            info!(
                "Import {} cancelled: {} rows committed, {} errors",
                import.job_id, success_count, error_count
            );
        } else {
            IMPORT_HISTORY.record_completed(
                import.job_id,
                import.account_id,
                &import.filename,
                started_at,
                success_count,
                error_count,
            );
            info!(
                "Import {} completed: {} imported, {} errors",
                import.job_id, success_count, error_count
            );
        }

        terminal
    }

    fn halt_disconnected(
        &self,
        import: &PreparedImport,
        started_at: chrono::DateTime<Utc>,
        success_count: usize,
        errors: Vec<RowFailure>,
    ) -> ImportEvent {
        warn!(
            "Import {} client disconnected after {} committed rows; halting",
            import.job_id, success_count
        );
        IMPORT_HISTORY.record_cancelled(
            import.job_id,
            import.account_id,
            &import.filename,
            started_at,
            success_count,
            errors.len(),
        );
        ImportEvent::Complete { success_count, errors }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::RowError;
    use crate::identity::country_by_alpha2;
    use crate::services::upsert::memory::MemoryStore;
    use crate::types::CustomerRecord;
    use async_trait::async_trait;

    fn runner(store: Arc<dyn CustomerStore>, interval: usize) -> ImportRunner {
        ImportRunner::new(store, country_by_alpha2("US").unwrap(), interval)
    }

    /// CSV body with `total` rows; rows listed in `blank_phone_at` (1-based
    /// data row index) get an empty phone cell.
    fn csv_with_blanks(total: usize, blank_phone_at: &[usize]) -> Vec<u8> {
        let mut body = String::from("Name,Phone,Vehicles\n");
        for i in 1..=total {
            if blank_phone_at.contains(&i) {
                body.push_str(&format!("Customer {},,\n", i));
            } else {
                body.push_str(&format!("Customer {},55500{:05},Sedan\n", i, i));
            }
        }
        body.into_bytes()
    }

    async fn drain(rx: &mut mpsc::Receiver<ImportEvent>) -> Vec<ImportEvent> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            let terminal = frame.is_terminal();
            frames.push(frame);
            if terminal {
                break;
            }
        }
        frames
    }

    #[tokio::test]
    async fn test_partial_failure_counts_and_row_numbers() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store.clone(), 10);
        let blanks = [10, 20, 30, 40, 50];
        let bytes = csv_with_blanks(100, &blanks);

        let prepared = runner
            .prepare(Uuid::new_v4(), Uuid::new_v4(), "customers.csv", &bytes)
            .unwrap();
        let terminal = runner.run(prepared, &ProgressSink::discard()).await;

        match terminal {
            ImportEvent::Complete { success_count, errors } => {
                assert_eq!(success_count, 95);
                assert_eq!(errors.len(), 5);
                // Data row N sits on spreadsheet row N + 1.
                let rows: Vec<usize> = errors.iter().map(|e| e.row).collect();
                assert_eq!(rows, vec![11, 21, 31, 41, 51]);
                assert!(errors.iter().all(|e| e.error == RowError::MissingIdentity.to_string()));
            }
            other => panic!("expected complete frame, got {:?}", other),
        }
        assert_eq!(store.customer_count(), 95);
    }

    #[tokio::test]
    async fn test_frame_sequence_is_ordered_and_terminated() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store, 10);
        let bytes = csv_with_blanks(25, &[]);

        let prepared = runner
            .prepare(Uuid::new_v4(), Uuid::new_v4(), "customers.csv", &bytes)
            .unwrap();
        let (sink, mut rx) = ProgressSink::channel(64);
        runner.run(prepared, &sink).await;
        drop(sink);

        let frames = drain(&mut rx).await;
        assert!(matches!(frames[0], ImportEvent::Init { total: 25 }));
        assert!(frames.last().unwrap().is_terminal());

        let currents: Vec<usize> = frames
            .iter()
            .filter_map(|f| match f {
                ImportEvent::Progress { current, .. } => Some(*current),
                _ => None,
            })
            .collect();
        // Every 10 rows plus the final row.
        assert_eq!(currents, vec![10, 20, 25]);
        assert!(currents.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_reimport_of_same_file_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store.clone(), 10);
        let account_id = Uuid::new_v4();
        let bytes = csv_with_blanks(30, &[]);

        for _ in 0..2 {
            let prepared = runner
                .prepare(Uuid::new_v4(), account_id, "customers.csv", &bytes)
                .unwrap();
            let terminal = runner.run(prepared, &ProgressSink::discard()).await;
            assert!(matches!(terminal, ImportEvent::Complete { success_count: 30, .. }));
        }

        assert_eq!(store.customer_count(), 30);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_fatal_before_any_row() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store.clone(), 10);

        let result = runner.prepare(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "customers.xlsx",
            b"PK\x03\x04garbage",
        );
        assert!(matches!(result, Err(ImportFileError::Unreadable(_))));
        assert_eq!(store.customer_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_phone_column_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store, 10);

        let result = runner.prepare(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "customers.csv",
            b"Name,Email\nJane,jane@example.com\n",
        );
        assert!(matches!(result, Err(ImportFileError::MissingColumn("Phone"))));
    }

    #[tokio::test]
    async fn test_persistence_failures_do_not_abort_batch() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes.store(true, std::sync::atomic::Ordering::Relaxed);
        let runner = runner(store.clone(), 10);
        let bytes = csv_with_blanks(10, &[]);

        let prepared = runner
            .prepare(Uuid::new_v4(), Uuid::new_v4(), "customers.csv", &bytes)
            .unwrap();
        let terminal = runner.run(prepared, &ProgressSink::discard()).await;

        match terminal {
            ImportEvent::Complete { success_count, errors } => {
                assert_eq!(success_count, 0);
                assert_eq!(errors.len(), 10);
            }
            other => panic!("expected complete frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_halts_without_terminal_emission() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store.clone(), 1);
        let bytes = csv_with_blanks(10, &[]);

        let prepared = runner
            .prepare(Uuid::new_v4(), Uuid::new_v4(), "customers.csv", &bytes)
            .unwrap();
        let (sink, rx) = ProgressSink::channel(4);
        // Caller goes away before the stream starts.
        drop(rx);

        let terminal = runner.run(prepared, &sink).await;
        assert!(matches!(terminal, ImportEvent::Complete { success_count: 0, .. }));
        assert_eq!(store.customer_count(), 0);
    }

    /// Store that sleeps on writes so a concurrent cancel lands mid-run.
    struct SlowStore {
        inner: MemoryStore,
        write_delay_ms: AtomicU64,
    }

    #[async_trait]
    impl CustomerStore for SlowStore {
        async fn find_candidates(
            &self,
            account_id: Uuid,
            last10: &str,
        ) -> anyhow::Result<Vec<CustomerRecord>> {
            self.inner.find_candidates(account_id, last10).await
        }

        async fn create(&self, record: &CustomerRecord, note: Option<&str>) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(self.write_delay_ms.load(Ordering::Relaxed)))
                .await;
            self.inner.create(record, note).await
        }

        async fn update(&self, record: &CustomerRecord, note: Option<&str>) -> anyhow::Result<()> {
            self.inner.update(record, note).await
        }
    }

    #[tokio::test]
    async fn test_explicit_cancel_stops_at_row_boundary() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            write_delay_ms: AtomicU64::new(10),
        });
        let runner = Arc::new(runner(store.clone(), 1));
        let job_id = Uuid::new_v4();
        let account_id = Uuid::new_v4();
        let bytes = csv_with_blanks(50, &[]);

        let prepared = runner.prepare(job_id, account_id, "customers.csv", &bytes).unwrap();
        let (sink, mut rx) = ProgressSink::channel(64);

        let run = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(prepared, &sink).await })
        };

        // The init frame proves the job is registered; cancel right after.
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ImportEvent::Init { total: 50 }));
        assert_eq!(CANCELLATION.cancel(&job_id, account_id), Ok(true));

        let terminal = run.await.unwrap();
        match terminal {
            ImportEvent::Complete { success_count, .. } => {
                // Stopped at a row boundary well before the end.
                assert!(success_count < 50);
                assert_eq!(store.inner.customer_count(), success_count);
            }
            other => panic!("expected complete frame, got {:?}", other),
        }
    }
}
