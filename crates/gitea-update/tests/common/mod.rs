// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use gitea_update::config::{ServiceUrls, VersionTriple};
use gitea_update::{AppConfig, Registry, ServiceConfig, ServiceControl, UnitAction, UpdaterError, VersionSlot};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Service control that records every call and fails on request
#[derive(Debug, Default)]
pub struct RecordingControl {
    calls: Mutex<Vec<(UnitAction, String)>>,
    failing: Vec<(UnitAction, String)>,
}

impl RecordingControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, action: UnitAction, unit: &str) -> Self {
        self.failing.push((action, unit.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(UnitAction, String)> {
        self.calls.lock().clone()
    }

    pub fn actions_for(&self, unit: &str) -> Vec<UnitAction> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, u)| u == unit)
            .map(|(action, _)| *action)
            .collect()
    }
}

#[async_trait]
impl ServiceControl for RecordingControl {
    async fn control(&self, action: UnitAction, unit: &str) -> gitea_update::Result<()> {
        self.calls.lock().push((action, unit.to_string()));
        if self.failing.iter().any(|(a, u)| *a == action && u == unit) {
            return Err(UpdaterError::ServiceControl {
                unit: unit.to_string(),
                reason: format!("failed to {action}: exit status: 1"),
            });
        }
        Ok(())
    }
}

pub fn slot(s: &str) -> VersionSlot {
    VersionSlot::parse(s).unwrap()
}

pub fn download_path(bin: &str, version: &str) -> String {
    format!("/{bin}/{version}/{bin}-{version}-linux-amd64")
}

fn service(server_url: &str, bin: &str, dir: &Path, latest: &str, dev: &str) -> ServiceConfig {
    ServiceConfig {
        bin_name: bin.to_string(),
        unit: Some(bin.to_string()),
        path: dir.to_path_buf(),
        net_bind_service: false,
        urls: ServiceUrls {
            download: format!("{server_url}/{{bin}}/{{version}}/{{bin}}-{{version}}-linux-amd64"),
            api: format!("{server_url}/{bin}/tags"),
            checksum: None,
        },
        version: VersionTriple {
            installed: VersionSlot::Unknown,
            latest: slot(latest),
            dev: slot(dev),
        },
    }
}

/// gitea and act_runner installed under `dir`, downloading from `server_url`
pub fn config_for(server_url: &str, dir: &Path) -> AppConfig {
    let mut services = BTreeMap::new();
    services.insert(
        "act_runner".to_string(),
        service(server_url, "act_runner", dir, "0.2.10", "n/a"),
    );
    services.insert(
        "gitea".to_string(),
        service(server_url, "gitea", dir, "1.22.0", "1.23.0-rc1"),
    );

    let mut config = AppConfig::default();
    config.settings.services = services;
    config
}

pub fn registry_for(server_url: &str, dir: &Path) -> Registry {
    Registry::from_config(&config_for(server_url, dir))
}

pub fn write_binary(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

pub fn read(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap()
}

/// In-memory log sink for asserting on emitted log lines
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route this thread's logs into a buffer until the guard drops
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
