// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Install orchestration
//!
//! Services are installed one after another in registry order. For each one
//! the unit is stopped, the current binary is moved aside to `<bin>.old`, the
//! target version is downloaded to `<bin>.new` and renamed into place, and the
//! unit is started again. A failed download restores the old binary and
//! leaves the unit stopped. Stop and start failures end the run.

use crate::downloader::Downloader;
use crate::error::{Result, UpdaterError};
use crate::process::run_command;
use crate::registry::{Registry, Service};
use crate::service_control::ServiceControl;
use crate::telemetry::{InstallEvent, report_event};
use crate::version::VersionSlot;
use nix::unistd::{Gid, Group, Uid, User};
use semver::Version;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const BACKUP_SUFFIX: &str = ".old";
const STAGING_SUFFIX: &str = ".new";
const BINARY_MODE: u32 = 0o755;
const NET_BIND_CAPABILITY: &str = "cap_net_bind_service=+ep";

/// Which version slot an install targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    Stable,
    Dev,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Dev => "dev",
        }
    }

    pub fn target(self, service: &Service) -> &VersionSlot {
        match self {
            Self::Stable => &service.version.latest,
            Self::Dev => &service.version.dev,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a unit refuses to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopFailurePolicy {
    /// End the run
    #[default]
    Halt,
    /// Skip the service and go on with the next one
    Continue,
}

/// Owner and group given to installed binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub user: String,
    pub group: String,
}

impl Ownership {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }

    /// Look up the numeric ids in the system user and group databases
    pub fn resolve(&self) -> Result<ResolvedOwnership> {
        let user = User::from_name(&self.user)
            .map_err(|e| UpdaterError::Config(format!("lookup user {}: {e}", self.user)))?
            .ok_or_else(|| UpdaterError::Config(format!("unknown user {}", self.user)))?;
        let group = Group::from_name(&self.group)
            .map_err(|e| UpdaterError::Config(format!("lookup group {}: {e}", self.group)))?
            .ok_or_else(|| UpdaterError::Config(format!("unknown group {}", self.group)))?;

        Ok(ResolvedOwnership {
            uid: user.uid,
            gid: group.gid,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOwnership {
    pub uid: Uid,
    pub gid: Gid,
}

impl ResolvedOwnership {
    pub fn apply(self, path: &Path) -> Result<()> {
        nix::unistd::chown(path, Some(self.uid), Some(self.gid))
            .map_err(|e| UpdaterError::fs(path, std::io::Error::from(e)))
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub channel: Channel,
    /// `None` keeps whatever owner the process creates files with
    pub owner: Option<Ownership>,
    pub stop_failure_policy: StopFailurePolicy,
    /// Replaces every service's install directory
    pub dir_override: Option<PathBuf>,
    pub command_timeout: Duration,
    pub setcap_program: PathBuf,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            channel: Channel::Stable,
            owner: None,
            stop_failure_policy: StopFailurePolicy::Halt,
            dir_override: None,
            command_timeout: Duration::from_secs(60),
            setcap_program: PathBuf::from("setcap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed { version: Version },
    /// Backup or download failed; the previous binary is back in place
    Skipped { reason: String },
    /// The unit did not stop and the policy allowed moving on
    StopFailed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub outcomes: Vec<(String, InstallOutcome)>,
}

impl InstallReport {
    pub fn outcome(&self, name: &str) -> Option<&InstallOutcome> {
        self.outcomes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, outcome)| outcome)
    }

    pub fn installed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, InstallOutcome::Installed { .. }))
            .count()
    }

    pub fn all_installed(&self) -> bool {
        self.installed_count() == self.outcomes.len()
    }
}

#[derive(Debug)]
pub struct Installer {
    registry: Registry,
    control: Arc<dyn ServiceControl>,
    downloader: Downloader,
    options: InstallOptions,
}

impl Installer {
    pub fn new(
        registry: Registry,
        control: Arc<dyn ServiceControl>,
        downloader: Downloader,
        options: InstallOptions,
    ) -> Self {
        Self {
            registry,
            control,
            downloader,
            options,
        }
    }

    /// Install the selected channel of every registered service.
    ///
    /// An `Err` means the run was halted; services before the failing one
    /// have already been processed.
    pub async fn install_all(&self) -> Result<InstallReport> {
        let owner = self
            .options
            .owner
            .as_ref()
            .map(Ownership::resolve)
            .transpose()?;

        let mut report = InstallReport::default();
        for name in self.registry.list() {
            let Some(service) = self.registry.get(&name) else {
                continue;
            };
            let outcome = self.install_service(&name, &service, owner).await?;
            report.outcomes.push((name, outcome));
        }

        tracing::info!(
            "Install run finished: {}/{} services installed",
            report.installed_count(),
            report.outcomes.len()
        );
        Ok(report)
    }

    async fn install_service(
        &self,
        name: &str,
        service: &Service,
        owner: Option<ResolvedOwnership>,
    ) -> Result<InstallOutcome> {
        let channel = self.options.channel;
        let target = channel
            .target(service)
            .as_version()
            .cloned()
            .ok_or_else(|| UpdaterError::NoTargetVersion {
                service: name.to_string(),
                channel: channel.to_string(),
            })?;

        let unit = service.unit_name();
        let started_at = Instant::now();
        emit(&InstallEvent::InstallStarted {
            service: name.to_string(),
            from_version: service.version.installed.to_string(),
            to_version: target.to_string(),
        });

        if let Err(e) = self.control.stop(unit).await {
            tracing::error!(service = %name, "Stopping service {unit} failed: {e}");
            emit(&InstallEvent::InstallFailed {
                service: name.to_string(),
                to_version: target.to_string(),
                error: e.to_string(),
            });
            return match self.options.stop_failure_policy {
                StopFailurePolicy::Halt => Err(e),
                StopFailurePolicy::Continue => Ok(InstallOutcome::StopFailed {
                    reason: e.to_string(),
                }),
            };
        }

        let binary = service.binary_path(self.options.dir_override.as_deref());
        let backup = with_suffix(&binary, BACKUP_SUFFIX);

        let backed_up = match backup_binary(&binary, &backup).await {
            Ok(backed_up) => backed_up,
            Err(e) => {
                tracing::warn!(service = %name, "Failed to backup the binary {}: {e}", service.bin_name);
                return Ok(InstallOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = self.fetch_and_place(service, &target, &binary, owner).await {
            tracing::error!(service = %name, "Failed to install new version of {}: {e}", service.bin_name);
            emit(&InstallEvent::InstallFailed {
                service: name.to_string(),
                to_version: target.to_string(),
                error: e.to_string(),
            });
            if backed_up {
                restore_backup(name, &backup, &binary).await;
            }
            return Ok(InstallOutcome::Skipped {
                reason: e.to_string(),
            });
        }

        if let Err(e) = self.control.start(unit).await {
            tracing::error!(service = %name, "Starting service {unit} failed: {e}");
            emit(&InstallEvent::InstallFailed {
                service: name.to_string(),
                to_version: target.to_string(),
                error: e.to_string(),
            });
            return Err(e);
        }

        self.registry
            .set_probed_version(name, VersionSlot::Known(target.clone()));
        tracing::info!(service = %name, "Successfully installed {unit} version {target}");
        emit(&InstallEvent::InstallCompleted {
            service: name.to_string(),
            version: target.to_string(),
            duration_secs: started_at.elapsed().as_secs(),
        });

        Ok(InstallOutcome::Installed { version: target })
    }

    /// Download into `<bin>.new`, prepare it and rename it over `binary`.
    ///
    /// The staging file is removed again on any failure.
    async fn fetch_and_place(
        &self,
        service: &Service,
        target: &Version,
        binary: &Path,
        owner: Option<ResolvedOwnership>,
    ) -> Result<()> {
        let staging = with_suffix(binary, STAGING_SUFFIX);
        let mut result = self.stage_binary(service, target, &staging, owner).await;
        if result.is_ok() {
            result = tokio::fs::rename(&staging, binary)
                .await
                .map_err(|e| UpdaterError::fs(binary, e));
        }

        if result.is_err()
            && let Err(e) = tokio::fs::remove_file(&staging).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("Could not remove {}: {e}", staging.display());
        }
        result
    }

    async fn stage_binary(
        &self,
        service: &Service,
        target: &Version,
        staging: &Path,
        owner: Option<ResolvedOwnership>,
    ) -> Result<()> {
        let bytes = self.downloader.download_binary(service, target).await?;

        tokio::fs::write(staging, &bytes)
            .await
            .map_err(|e| UpdaterError::fs(staging, e))?;
        tokio::fs::set_permissions(staging, std::fs::Permissions::from_mode(BINARY_MODE))
            .await
            .map_err(|e| UpdaterError::fs(staging, e))?;

        if let Some(owner) = owner {
            owner.apply(staging)?;
        }

        if service.net_bind_service {
            self.set_net_bind_capability(staging).await?;
        }

        Ok(())
    }

    async fn set_net_bind_capability(&self, path: &Path) -> Result<()> {
        let capability_error = |reason: String| UpdaterError::Capability {
            path: path.display().to_string(),
            reason,
        };

        let output = run_command(
            &self.options.setcap_program,
            [OsStr::new(NET_BIND_CAPABILITY), path.as_os_str()],
            self.options.command_timeout,
        )
        .await
        .map_err(|e| capability_error(e.to_string()))?;

        if !output.success() {
            return Err(capability_error(output.failure_reason()));
        }
        tracing::debug!("Set capabilities on {}", path.display());
        Ok(())
    }
}

/// Move `binary` to `backup`. Returns false if there was nothing to move.
async fn backup_binary(binary: &Path, backup: &Path) -> Result<bool> {
    match tokio::fs::metadata(binary).await {
        Ok(_) => {
            tokio::fs::rename(binary, backup)
                .await
                .map_err(|e| UpdaterError::fs(binary, e))?;
            tracing::debug!("Moved {} to {}", binary.display(), backup.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(UpdaterError::fs(binary, e)),
    }
}

async fn restore_backup(name: &str, backup: &Path, binary: &Path) {
    match tokio::fs::rename(backup, binary).await {
        Ok(()) => {
            tracing::info!(service = %name, "Restored {}", binary.display());
            emit(&InstallEvent::BackupRestored {
                service: name.to_string(),
                path: binary.display().to_string(),
            });
        }
        Err(e) => {
            tracing::error!(service = %name, "Failed to restore {}: {e}", backup.display());
        }
    }
}

fn emit(event: &InstallEvent) {
    if let Err(e) = report_event(event) {
        tracing::warn!("Failed to report install event: {e}");
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
