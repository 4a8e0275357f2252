//! Calendar event types
//!
//! Events come from the external booking system and are read-only here.
//! The linker only needs a phone (direct or embedded), a start time and a
//! status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Free-text blob that may embed a `Phone:` line when the source has no
    /// dedicated phone field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .map_or(false, |s| s.eq_ignore_ascii_case("cancelled"))
    }
}

/// Link result, partitioned around "now". Upcoming is soonest-first, past is
/// most-recent-first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEvents {
    pub upcoming: Vec<CalendarEvent>,
    pub past: Vec<CalendarEvent>,
}
