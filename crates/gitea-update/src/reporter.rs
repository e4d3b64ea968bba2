// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Version report
//!
//! One line per service: `gitea 1.21.10 (latest: 1.22.0, dev: 1.23.0-rc1)`.
//! A latest version newer than the installed one is green, a known dev
//! version is yellow.

use crate::registry::Registry;
use crate::version::VersionSlot;
use colored::Colorize;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    pub name: String,
    pub bin_name: String,
    pub installed: VersionSlot,
    pub latest: VersionSlot,
    pub dev: VersionSlot,
}

impl ServiceSummary {
    pub fn upgrade_available(&self) -> bool {
        self.latest.is_known() && self.latest.is_newer_than(&self.installed)
    }

    pub fn dev_available(&self) -> bool {
        self.dev.is_known()
    }

    pub fn render(&self, color: bool) -> String {
        let latest = self.latest.to_string();
        let dev = self.dev.to_string();

        let (latest, dev) = if color {
            let latest = if self.upgrade_available() {
                latest.green().to_string()
            } else {
                latest
            };
            let dev = if self.dev_available() {
                dev.yellow().to_string()
            } else {
                dev
            };
            (latest, dev)
        } else {
            (latest, dev)
        };

        format!(
            "{} {} (latest: {latest}, dev: {dev})",
            self.bin_name, self.installed
        )
    }
}

/// Current view of every registered service, in registry order
pub fn summarize(registry: &Registry) -> Vec<ServiceSummary> {
    registry
        .snapshot()
        .into_iter()
        .map(|(name, service)| ServiceSummary {
            name,
            bin_name: service.bin_name,
            installed: service.version.installed,
            latest: service.version.latest,
            dev: service.version.dev,
        })
        .collect()
}

pub fn render(summaries: &[ServiceSummary], color: bool) -> String {
    let mut out = String::new();
    for summary in summaries {
        tracing::debug!(service = %summary.name, "Printing service {summary:?}");
        let _ = writeln!(out, "{}", summary.render(color));
    }
    out
}
