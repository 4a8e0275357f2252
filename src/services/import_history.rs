//! Import history service
//!
//! Keeps recent import runs in memory with file-backed persistence so the
//! results summary survives worker restarts. This is operator-facing
//! bookkeeping, not the authoritative result — that is the terminal frame of
//! each run's stream.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

const MAX_HISTORY_SIZE: usize = 100;

/// Global instance; the file path comes from `LOGS_DIR` like the log files.
pub static IMPORT_HISTORY: Lazy<ImportHistoryService> = Lazy::new(|| {
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string());
    ImportHistoryService::new(PathBuf::from(logs_dir).join("import-history.json"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Completed,
    Failed,
    Cancelled,
}

/// One finished import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub filename: String,
    pub status: ImportStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success_count: usize,
    pub error_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryResponse {
    pub imports: Vec<ImportHistoryEntry>,
    pub total: usize,
}

/// In-memory deque of recent runs plus a JSON file on disk.
pub struct ImportHistoryService {
    entries: Arc<RwLock<VecDeque<ImportHistoryEntry>>>,
    path: PathBuf,
}

impl ImportHistoryService {
    pub fn new(path: PathBuf) -> Self {
        let mut deque = VecDeque::with_capacity(MAX_HISTORY_SIZE);
        if let Some(loaded) = Self::load_from_disk(&path) {
            deque.extend(loaded);
        }
        Self { entries: Arc::new(RwLock::new(deque)), path }
    }

    pub fn record_completed(
        &self,
        id: Uuid,
        account_id: Uuid,
        filename: &str,
        started_at: DateTime<Utc>,
        success_count: usize,
        error_count: usize,
    ) {
        self.add_entry(self.entry(
            id,
            account_id,
            filename,
            ImportStatus::Completed,
            started_at,
            success_count,
            error_count,
            None,
        ));
    }

    pub fn record_failed(
        &self,
        id: Uuid,
        account_id: Uuid,
        filename: &str,
        started_at: DateTime<Utc>,
        error: String,
    ) {
        self.add_entry(self.entry(
            id,
            account_id,
            filename,
            ImportStatus::Failed,
            started_at,
            0,
            0,
            Some(error),
        ));
    }

    /// Explicit cancel or client disconnect. Counts cover the rows committed
    /// before the run stopped.
    pub fn record_cancelled(
        &self,
        id: Uuid,
        account_id: Uuid,
        filename: &str,
        started_at: DateTime<Utc>,
        success_count: usize,
        error_count: usize,
    ) {
        self.add_entry(self.entry(
            id,
            account_id,
            filename,
            ImportStatus::Cancelled,
            started_at,
            success_count,
            error_count,
            None,
        ));
    }

    pub fn recent_for_account(&self, account_id: Uuid, limit: usize) -> ImportHistoryResponse {
        let entries = self.entries.read();
        let imports: Vec<ImportHistoryEntry> = entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .take(limit)
            .cloned()
            .collect();
        let total = imports.len();
        ImportHistoryResponse { imports, total }
    }

    #[allow(clippy::too_many_arguments)]
    fn entry(
        &self,
        id: Uuid,
        account_id: Uuid,
        filename: &str,
        status: ImportStatus,
        started_at: DateTime<Utc>,
        success_count: usize,
        error_count: usize,
        error: Option<String>,
    ) -> ImportHistoryEntry {
        let finished_at = Utc::now();
        ImportHistoryEntry {
            id,
            account_id,
            filename: filename.to_string(),
            status,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            success_count,
            error_count,
            error,
        }
    }

    fn add_entry(&self, entry: ImportHistoryEntry) {
        let mut entries = self.entries.write();
        if entries.len() >= MAX_HISTORY_SIZE {
            entries.pop_back();
        }
        entries.push_front(entry);
        self.save_to_disk(&entries);
    }

    fn load_from_disk(path: &PathBuf) -> Option<Vec<ImportHistoryEntry>> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!("Failed to parse import history file: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read import history file: {}", e);
                None
            }
        }
    }

    fn save_to_disk(&self, entries: &VecDeque<ImportHistoryEntry>) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create import history directory: {}", e);
                return;
            }
        }
        let flat: Vec<&ImportHistoryEntry> = entries.iter().collect();
        match serde_json::to_string_pretty(&flat) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!("Failed to write import history file: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize import history: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_service() -> ImportHistoryService {
        let path = std::env::temp_dir()
            .join(format!("detaildesk-history-{}.json", Uuid::new_v4()));
        ImportHistoryService::new(path)
    }

    #[test]
    fn test_record_completed_run() {
        let service = fresh_service();
        let id = Uuid::new_v4();
        let account_id = Uuid::new_v4();

        service.record_completed(id, account_id, "customers.csv", Utc::now(), 95, 5);

        let history = service.recent_for_account(account_id, 10);
        assert_eq!(history.imports.len(), 1);
        assert_eq!(history.imports[0].status, ImportStatus::Completed);
        assert_eq!(history.imports[0].success_count, 95);
        assert_eq!(history.imports[0].error_count, 5);
    }

    #[test]
    fn test_accounts_are_isolated() {
        let service = fresh_service();
        let account_a = Uuid::new_v4();
        let account_b = Uuid::new_v4();

        service.record_completed(Uuid::new_v4(), account_a, "a.csv", Utc::now(), 1, 0);
        service.record_failed(Uuid::new_v4(), account_b, "b.csv", Utc::now(), "bad file".into());

        let history = service.recent_for_account(account_a, 10);
        assert_eq!(history.imports.len(), 1);
        assert!(history.imports.iter().all(|e| e.account_id == account_a));
    }

    #[test]
    fn test_history_is_bounded() {
        let service = fresh_service();
        let account_id = Uuid::new_v4();

        for i in 0..(MAX_HISTORY_SIZE + 20) {
            service.record_completed(Uuid::new_v4(), account_id, "x.csv", Utc::now(), i, 0);
        }

        let history = service.recent_for_account(account_id, MAX_HISTORY_SIZE * 2);
        assert_eq!(history.imports.len(), MAX_HISTORY_SIZE);
    }

    #[test]
    fn test_cancelled_run_keeps_partial_counts() {
        let service = fresh_service();
        let account_id = Uuid::new_v4();

        service.record_cancelled(Uuid::new_v4(), account_id, "big.xlsx", Utc::now(), 40, 2);

        let history = service.recent_for_account(account_id, 10);
        assert_eq!(history.imports[0].status, ImportStatus::Cancelled);
        assert_eq!(history.imports[0].success_count, 40);
        assert_eq!(history.imports[0].error_count, 2);
    }

    #[test]
    fn test_history_survives_reload() {
        let path = std::env::temp_dir()
            .join(format!("detaildesk-history-{}.json", Uuid::new_v4()));
        let account_id = Uuid::new_v4();

        let service = ImportHistoryService::new(path.clone());
        service.record_completed(Uuid::new_v4(), account_id, "x.csv", Utc::now(), 3, 1);

        let reloaded = ImportHistoryService::new(path);
        let history = reloaded.recent_for_account(account_id, 10);
        assert_eq!(history.imports.len(), 1);
    }
}
