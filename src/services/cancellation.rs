//! Cancellation registry for running imports
//!
//! Cooperative cancellation with owner verification and RAII cleanup via
//! `ImportGuard`. The orchestrator polls `is_cancelled` at each row boundary;
//! already-committed rows stay committed.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Global cancellation registry singleton
pub static CANCELLATION: Lazy<CancellationRegistry> = Lazy::new(CancellationRegistry::default);

struct ImportEntry {
    token: CancellationToken,
    account_id: Uuid,
}

/// RAII guard that removes the import from the registry when dropped. Held
/// by the orchestrator for the duration of a run.
pub struct ImportGuard {
    job_id: Uuid,
    registry: CancellationRegistry,
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.job_id);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CancelError {
    /// Caller's account does not own this import.
    NotOwner,
}

/// Thread-safe registry of running imports and their cancellation tokens.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, ImportEntry>>>,
}

impl CancellationRegistry {
    /// Register a running import for its owning account. The returned guard
    /// must stay in scope while rows are being processed.
    pub fn register(&self, job_id: Uuid, account_id: Uuid) -> ImportGuard {
        self.jobs.lock().insert(
            job_id,
            ImportEntry { token: CancellationToken::new(), account_id },
        );
        ImportGuard { job_id, registry: self.clone() }
    }

    /// Cancel an import — only if the caller's account owns it.
    ///
    /// Returns:
    /// - `Ok(true)`  — import found and cancelled
    /// - `Ok(false)` — import not found (already finished or never started)
    /// - `Err(NotOwner)` — import belongs to a different account
    pub fn cancel(&self, job_id: &Uuid, account_id: Uuid) -> Result<bool, CancelError> {
        let jobs = self.jobs.lock();
        match jobs.get(job_id) {
            Some(entry) => {
                if entry.account_id != account_id {
                    return Err(CancelError::NotOwner);
                }
                entry.token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Polled at each row boundary. Single HashMap lookup under the lock.
    pub fn is_cancelled(&self, job_id: &Uuid) -> bool {
        self.jobs
            .lock()
            .get(job_id)
            .map_or(false, |e| e.token.is_cancelled())
    }

    fn remove(&self, job_id: &Uuid) {
        self.jobs.lock().remove(job_id);
    }

    #[cfg(test)]
    fn contains(&self, job_id: &Uuid) -> bool {
        self.jobs.lock().contains_key(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_registry() -> CancellationRegistry {
        CancellationRegistry::default()
    }

    #[test]
    fn test_registered_import_starts_uncancelled() {
        let registry = new_registry();
        let job_id = Uuid::new_v4();

        let _guard = registry.register(job_id, Uuid::new_v4());
        assert!(!registry.is_cancelled(&job_id));
    }

    #[test]
    fn test_owner_can_cancel() {
        let registry = new_registry();
        let job_id = Uuid::new_v4();
        let account_id = Uuid::new_v4();

        let _guard = registry.register(job_id, account_id);
        assert_eq!(registry.cancel(&job_id, account_id), Ok(true));
        assert!(registry.is_cancelled(&job_id));
    }

    #[test]
    fn test_other_account_cannot_cancel() {
        let registry = new_registry();
        let job_id = Uuid::new_v4();
        let owner = Uuid::new_v4();

        let _guard = registry.register(job_id, owner);
        assert_eq!(registry.cancel(&job_id, Uuid::new_v4()), Err(CancelError::NotOwner));
        assert!(!registry.is_cancelled(&job_id));
    }

    #[test]
    fn test_cancel_unknown_import_returns_false() {
        let registry = new_registry();
        assert_eq!(registry.cancel(&Uuid::new_v4(), Uuid::new_v4()), Ok(false));
    }

    #[test]
    fn test_guard_drop_removes_entry() {
        let registry = new_registry();
        let job_id = Uuid::new_v4();

        {
            let _guard = registry.register(job_id, Uuid::new_v4());
            assert!(registry.contains(&job_id));
        }
        assert!(!registry.contains(&job_id));
    }
}
