//! Import progress protocol
//!
//! A closed tagged union serialized uniformly, so the server and the
//! progress UI cannot drift on frame shape. Exactly one `init` opens a
//! batch, zero or more `progress` frames follow, and exactly one of
//! `complete`/`error` terminates it.

use serde::{Deserialize, Serialize};

use crate::types::import::RowFailure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ImportEvent {
    Init {
        total: usize,
    },
    Progress {
        current: usize,
        total: usize,
        success_count: usize,
        error_count: usize,
    },
    /// Terminal and authoritative even if intermediate `progress` frames
    /// were dropped by the transport.
    Complete {
        success_count: usize,
        errors: Vec<RowFailure>,
    },
    Error {
        message: String,
    },
}

impl ImportEvent {
    /// Whether this frame closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportEvent::Complete { .. } | ImportEvent::Error { .. })
    }
}
