// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Install events
//!
//! Events are serialized to JSON and written to the log, one line each.

use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub enum InstallEvent {
    InstallStarted {
        service: String,
        from_version: String,
        to_version: String,
    },
    InstallCompleted {
        service: String,
        version: String,
        duration_secs: u64,
    },
    InstallFailed {
        service: String,
        to_version: String,
        error: String,
    },
    BackupRestored {
        service: String,
        path: String,
    },
}

/// Log an install event as JSON at info level
pub fn report_event(event: &InstallEvent) -> Result<()> {
    let event_json = serde_json::to_string(event)?;
    tracing::info!("Install event: {event_json}");
    Ok(())
}
