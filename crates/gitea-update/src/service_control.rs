// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Start/stop control of the managed systemd units

use crate::error::{Result, UpdaterError};
use crate::process::run_command;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    Start,
    Stop,
    Restart,
}

impl UnitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Stop => "stopped",
            Self::Restart => "restarted",
        }
    }
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control over a named service unit.
///
/// Every call either succeeds or fails with [`UpdaterError::ServiceControl`].
#[async_trait]
pub trait ServiceControl: Send + Sync + fmt::Debug {
    async fn control(&self, action: UnitAction, unit: &str) -> Result<()>;

    async fn stop(&self, unit: &str) -> Result<()> {
        self.control(UnitAction::Stop, unit).await
    }

    async fn start(&self, unit: &str) -> Result<()> {
        self.control(UnitAction::Start, unit).await
    }

    async fn restart(&self, unit: &str) -> Result<()> {
        self.control(UnitAction::Restart, unit).await
    }
}

/// `systemctl <action> <unit>`
#[derive(Debug, Clone)]
pub struct Systemctl {
    program: PathBuf,
    timeout: Duration,
}

impl Systemctl {
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("systemctl", timeout)
    }

    /// Use a different executable with systemctl's calling convention
    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ServiceControl for Systemctl {
    async fn control(&self, action: UnitAction, unit: &str) -> Result<()> {
        let output = run_command(&self.program, [action.as_str(), unit], self.timeout)
            .await
            .map_err(|e| UpdaterError::ServiceControl {
                unit: unit.to_string(),
                reason: format!("failed to {action}: {e}"),
            })?;

        if !output.success() {
            return Err(UpdaterError::ServiceControl {
                unit: unit.to_string(),
                reason: format!("failed to {action}: {}", output.failure_reason()),
            });
        }

        tracing::info!("Service {unit} {} successfully", action.past_tense());
        Ok(())
    }
}
