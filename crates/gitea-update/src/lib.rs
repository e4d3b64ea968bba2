// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! gitea-update - Update checker and installer for Gitea and act_runner
//!
//! Compares the binaries installed on the host with the newest tags published
//! upstream and replaces them in place, stopping and starting their systemd
//! units around the swap.

pub mod app;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod installer;
pub mod probe;
pub mod process;
pub mod registry;
pub mod reporter;
pub mod resolver;
pub mod service_control;
pub mod telemetry;
pub mod version;

pub use app::App;
pub use cli::Cli;
pub use config::{AppConfig, ServiceConfig, Settings};
pub use error::{Result, UpdaterError};
pub use installer::{Channel, InstallOptions, InstallOutcome, InstallReport, Installer, StopFailurePolicy};
pub use registry::{Registry, Service};
pub use service_control::{ServiceControl, Systemctl, UnitAction};
pub use version::{VersionSlot, compare, compare_tokens, is_newer, parse_version, version_from_tag};
