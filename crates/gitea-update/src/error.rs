// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Error types for the updater crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("config error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("invalid version format: {0}")]
    InvalidVersionFormat(String),

    #[error("service control failed for unit {unit}: {reason}")]
    ServiceControl { unit: String, reason: String },

    #[error("file system error on {path}: {source}")]
    FileSystem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no {channel} target version known for {service}")]
    NoTargetVersion { service: String, channel: String },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("setting capabilities on {path} failed: {reason}")]
    Capability { path: String, reason: String },

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("task for {service} did not complete: {reason}")]
    TaskFailed { service: String, reason: String },

    #[error("config serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("event serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UpdaterError {
    /// Wrap an I/O error together with the path it happened on.
    pub fn fs(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Errors that leave a unit in an unknown running state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ServiceControl { .. } | Self::NoTargetVersion { .. }
        )
    }

    /// Process exit status: 2 when a unit may be left in an unknown state
    pub fn exit_code(&self) -> u8 {
        if self.is_fatal() { 2 } else { 1 }
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
