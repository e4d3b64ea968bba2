// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! In-memory table of managed services and their version slots
//!
//! The registry is the only shared mutable state of a run. Callers get
//! clones of the records and publish whole records back through
//! [`Registry::upsert`], so no reader ever sees a half-updated service.

use crate::config::{AppConfig, ServiceConfig};
use crate::version::VersionSlot;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One managed program. The record layout is the persisted one.
pub type Service = ServiceConfig;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    services: Arc<RwLock<BTreeMap<String, Service>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            services: Arc::new(RwLock::new(config.settings.services.clone())),
        }
    }

    pub fn get(&self, name: &str) -> Option<Service> {
        self.services.read().get(name).cloned()
    }

    /// Registered service names in stable order
    pub fn list(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Insert or replace a whole service record.
    pub fn upsert(&self, name: &str, service: Service) {
        tracing::debug!(service = %name, version = ?service.version, "Updating registry entry");
        self.services.write().insert(name.to_string(), service);
    }

    /// Record the version reported by the installed binary.
    ///
    /// Returns false if `name` is not registered.
    pub fn set_probed_version(&self, name: &str, version: VersionSlot) -> bool {
        let mut services = self.services.write();
        match services.get_mut(name) {
            Some(service) => {
                service.version.installed = version;
                true
            }
            None => false,
        }
    }

    /// Consistent copy of every record
    pub fn snapshot(&self) -> BTreeMap<String, Service> {
        self.services.read().clone()
    }

    /// `base` with its services replaced by the registry contents
    pub fn to_config(&self, base: &AppConfig) -> AppConfig {
        let mut config = base.clone();
        config.settings.services = self.snapshot();
        config
    }
}
