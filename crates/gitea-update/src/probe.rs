// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Installed-version probe
//!
//! Asks each installed binary for its own version. A missing binary is the
//! normal first-run state, so every failure degrades to `Unknown`.

use crate::error::{Result, UpdaterError};
use crate::process::run_command;
use crate::registry::Registry;
use crate::version::{VersionSlot, parse_version};
use semver::Version;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const VERSION_FLAG: &str = "--version";

/// Token following the word "version", as printed.
///
/// `"Gitea version 1.21.10 built with ..."` yields `1.21.10`,
/// `"act_runner version v0.2.9"` yields `v0.2.9`.
pub fn extract_version(line: &str) -> Option<&str> {
    let mut words = line.split_whitespace();
    while let Some(word) = words.next() {
        if word == "version" {
            return words.next();
        }
    }
    None
}

/// Version reported by `<install_dir>/<binary_name> --version`, or `Unknown`
pub async fn probe(install_dir: &Path, binary_name: &str, timeout: Duration) -> VersionSlot {
    match try_probe(install_dir, binary_name, timeout).await {
        Ok(version) => {
            tracing::debug!(service = %binary_name, "Installed version: {version}");
            VersionSlot::Known(version)
        }
        Err(e) => {
            tracing::warn!(service = %binary_name, "Could not determine installed version: {e}");
            VersionSlot::Unknown
        }
    }
}

async fn try_probe(install_dir: &Path, binary_name: &str, timeout: Duration) -> Result<Version> {
    let path = install_dir.join(binary_name);
    let output = run_command(&path, [VERSION_FLAG], timeout)
        .await
        .map_err(|e| {
            UpdaterError::Probe(format!("error executing {} {VERSION_FLAG}: {e}", path.display()))
        })?;

    if !output.success() {
        return Err(UpdaterError::Probe(format!(
            "{} {VERSION_FLAG} failed: {}",
            path.display(),
            output.failure_reason()
        )));
    }

    let first_line = output
        .stdout
        .lines()
        .next()
        .ok_or_else(|| UpdaterError::Probe(format!("{} printed nothing", path.display())))?;

    let token = extract_version(first_line)
        .ok_or_else(|| UpdaterError::Probe(format!("no version in output {first_line:?}")))?;

    parse_version(token)
}

/// Probe every registered service concurrently and record the results.
///
/// `dir_override` replaces each service's configured install directory.
pub async fn probe_all(
    registry: &Registry,
    dir_override: Option<&Path>,
    timeout: Duration,
) -> BTreeMap<String, VersionSlot> {
    let mut handles = Vec::new();

    for name in registry.list() {
        let Some(service) = registry.get(&name) else {
            continue;
        };
        let dir: PathBuf = dir_override.map_or_else(|| service.path.clone(), Path::to_path_buf);
        let handle =
            tokio::spawn(async move { probe(&dir, &service.bin_name, timeout).await });
        handles.push((name, handle));
    }

    let mut results = BTreeMap::new();
    for (name, handle) in handles {
        match handle.await {
            Ok(version) => {
                registry.set_probed_version(&name, version.clone());
                results.insert(name, version);
            }
            Err(e) => tracing::error!(service = %name, "Probe task failed: {e}"),
        }
    }
    results
}
