// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Configuration module for the updater
//!
//! The file is YAML with a single `settings` root. Every key added after the
//! first release is optional so older files keep loading.

use crate::error::{Result, UpdaterError};
use crate::version::{UNKNOWN, VersionSlot};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "gitea-update.yml";
const ETC_CONFIG_PATH: &str = "/etc/gitea-update/gitea-update.yml";

fn default_owner() -> String {
    "app".to_string()
}

fn default_true() -> bool {
    true
}

fn default_30() -> u64 {
    30
}

fn default_60() -> u64 {
    60
}

fn default_300() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Owner of installed binaries
    #[serde(default = "default_owner")]
    pub user: String,

    /// Group of installed binaries
    #[serde(default = "default_owner")]
    pub group: String,

    /// Timeout for tag API requests (seconds)
    #[serde(default = "default_30")]
    pub http_timeout_secs: u64,

    /// Timeout for binary downloads (seconds)
    #[serde(default = "default_300")]
    pub download_timeout_secs: u64,

    /// Timeout for systemctl, setcap and `--version` invocations (seconds)
    #[serde(default = "default_60")]
    pub command_timeout_secs: u64,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Binary file name inside `path`
    #[serde(rename = "bin")]
    pub bin_name: String,

    /// systemd unit; the binary name is used when absent
    #[serde(rename = "systemd", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Installation directory
    pub path: PathBuf,

    /// Grant `cap_net_bind_service` after install
    #[serde(default = "default_true")]
    pub net_bind_service: bool,

    pub urls: ServiceUrls,

    #[serde(default)]
    pub version: VersionTriple,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceUrls {
    /// Binary URL template with `{bin}` and `{version}` placeholders
    pub download: String,

    /// Tag list endpoint
    pub api: String,

    /// SHA-256 file URL template, same placeholders as `download`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VersionTriple {
    #[serde(rename = "current", default)]
    pub installed: VersionSlot,
    #[serde(default)]
    pub latest: VersionSlot,
    #[serde(default)]
    pub dev: VersionSlot,
}

impl ServiceConfig {
    pub fn unit_name(&self) -> &str {
        self.unit
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.bin_name)
    }

    /// Path of the installed binary, optionally under a different directory
    pub fn binary_path(&self, dir_override: Option<&Path>) -> PathBuf {
        dir_override.unwrap_or(&self.path).join(&self.bin_name)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            "gitea".to_string(),
            ServiceConfig {
                bin_name: "gitea".to_string(),
                unit: Some("gitea".to_string()),
                path: PathBuf::from("/opt/gitea"),
                net_bind_service: true,
                urls: ServiceUrls {
                    download: "https://dl.gitea.com/gitea/{version}/gitea-{version}-linux-amd64"
                        .to_string(),
                    api: "https://api.github.com/repos/go-gitea/gitea/tags".to_string(),
                    checksum: Some(
                        "https://dl.gitea.com/gitea/{version}/gitea-{version}-linux-amd64.sha256"
                            .to_string(),
                    ),
                },
                version: VersionTriple::default(),
            },
        );
        services.insert(
            "act_runner".to_string(),
            ServiceConfig {
                bin_name: "act_runner".to_string(),
                unit: Some("act_runner".to_string()),
                path: PathBuf::from("/opt/gitea"),
                net_bind_service: false,
                urls: ServiceUrls {
                    download:
                        "https://dl.gitea.com/act_runner/{version}/act_runner-{version}-linux-amd64"
                            .to_string(),
                    api: "https://gitea.com/api/v1/repos/gitea/act_runner/tags".to_string(),
                    checksum: None,
                },
                version: VersionTriple::default(),
            },
        );

        Self {
            settings: Settings {
                user: default_owner(),
                group: default_owner(),
                http_timeout_secs: default_30(),
                download_timeout_secs: default_300(),
                command_timeout_secs: default_60(),
                services,
            },
        }
    }
}

/// Default search order: working directory, home directory, /etc
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(ETC_CONFIG_PATH));
    paths
}

/// Load the first existing file from `paths`.
///
/// Returns the config together with the path it came from.
pub fn load_config(paths: &[PathBuf]) -> Result<(AppConfig, PathBuf)> {
    for path in paths {
        if path.is_file() {
            let content =
                std::fs::read_to_string(path).map_err(|e| UpdaterError::fs(path, e))?;
            let config = parse_config(&content).map_err(|e| {
                UpdaterError::Config(format!("failed to parse {}: {e}", path.display()))
            })?;
            return Ok((config, path.clone()));
        }
    }

    Err(UpdaterError::Config(format!(
        "config file not found in {}",
        paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

/// Load config, falling back to the built-in defaults with a warning.
///
/// The second element is the path the config was read from, if any.
pub fn load_config_with_fallback(paths: &[PathBuf]) -> (AppConfig, Option<PathBuf>) {
    match load_config(paths) {
        Ok((config, path)) => {
            tracing::info!("Loaded configuration from {}", path.display());
            (config, Some(path))
        }
        Err(e) => {
            tracing::warn!("Failed to load config, using default settings: {e}");
            (AppConfig::default(), None)
        }
    }
}

/// Parse a config file.
///
/// A version slot that is not a valid version is reset to `n/a` with a
/// warning; the rest of the file is kept.
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let mut value: Value = serde_yaml::from_str(content)?;
    reset_invalid_versions(&mut value);
    Ok(serde_yaml::from_value(value)?)
}

fn reset_invalid_versions(root: &mut Value) {
    let Some(services) = root
        .get_mut("settings")
        .and_then(|settings| settings.get_mut("services"))
        .and_then(Value::as_mapping_mut)
    else {
        return;
    };

    for (name, service) in services.iter_mut() {
        let Some(slots) = service
            .get_mut("version")
            .and_then(Value::as_mapping_mut)
        else {
            continue;
        };

        for (slot, raw) in slots.iter_mut() {
            let token = match raw {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                ref other => format!("{other:?}"),
            };
            if let Err(e) = VersionSlot::parse(&token) {
                tracing::warn!(
                    service = name.as_str().unwrap_or_default(),
                    "Ignoring {} version {token:?} from config: {e}",
                    slot.as_str().unwrap_or_default()
                );
                *raw = Value::String(UNKNOWN.to_string());
            }
        }
    }
}

pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let content = serde_yaml::to_string(config)?;

    // Atomic write
    std::fs::write(&temp_path, content).map_err(|e| UpdaterError::fs(&temp_path, e))?;
    std::fs::rename(&temp_path, path).map_err(|e| UpdaterError::fs(path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ORIGINAL_STYLE: &str = r#"
settings:
  user: git
  group: git
  services:
    gitea:
      bin: gitea
      systemd: gitea.service
      path: /srv/gitea
      urls:
        download: https://dl.gitea.com/gitea/{version}/gitea-{version}-linux-amd64
        api: https://api.github.com/repos/go-gitea/gitea/tags
      version:
        current: 1.21.10
        latest: n/a
        dev: v1.22.0-rc1
"#;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.settings.user, "app");
        assert_eq!(config.settings.group, "app");
        assert_eq!(config.settings.services.len(), 2);

        let gitea = &config.settings.services["gitea"];
        assert_eq!(gitea.unit_name(), "gitea");
        assert!(gitea.net_bind_service);
        assert_eq!(gitea.version.installed, VersionSlot::Unknown);

        let runner = &config.settings.services["act_runner"];
        assert_eq!(runner.binary_path(None), PathBuf::from("/opt/gitea/act_runner"));
        assert!(!runner.net_bind_service);
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let example = parse_config(include_str!("../gitea-update.example.yml")).unwrap();
        assert_eq!(example, AppConfig::default());
    }

    #[test]
    fn test_parse_original_style_file() {
        let config = parse_config(ORIGINAL_STYLE).unwrap();
        assert_eq!(config.settings.user, "git");
        assert_eq!(config.settings.http_timeout_secs, 30);
        assert_eq!(config.settings.download_timeout_secs, 300);

        let gitea = &config.settings.services["gitea"];
        assert_eq!(gitea.unit_name(), "gitea.service");
        assert!(gitea.net_bind_service);
        assert!(gitea.urls.checksum.is_none());
        assert_eq!(gitea.version.installed.to_string(), "1.21.10");
        assert_eq!(gitea.version.latest, VersionSlot::Unknown);
        assert_eq!(gitea.version.dev.to_string(), "1.22.0-rc1");
    }

    #[test]
    fn test_missing_unit_falls_back_to_binary_name() {
        let mut config = parse_config(ORIGINAL_STYLE).unwrap();
        let gitea = config.settings.services.get_mut("gitea").unwrap();
        gitea.unit = Some(String::new());
        assert_eq!(gitea.unit_name(), "gitea");
        gitea.unit = None;
        assert_eq!(gitea.unit_name(), "gitea");
    }

    #[test]
    fn test_binary_path_override() {
        let config = AppConfig::default();
        let gitea = &config.settings.services["gitea"];
        assert_eq!(
            gitea.binary_path(Some(Path::new("/tmp/install"))),
            PathBuf::from("/tmp/install/gitea")
        );
    }

    #[test]
    fn test_invalid_version_resets_only_that_slot() {
        let content = ORIGINAL_STYLE
            .replace("current: 1.21.10", "current: \"1.21\"")
            .replace("latest: n/a", "latest: 1.22");
        let config = parse_config(&content).unwrap();

        assert_eq!(config.settings.user, "git");
        assert_eq!(config.settings.group, "git");
        let gitea = &config.settings.services["gitea"];
        assert_eq!(gitea.path, PathBuf::from("/srv/gitea"));
        assert_eq!(gitea.unit_name(), "gitea.service");
        assert_eq!(gitea.version.installed, VersionSlot::Unknown);
        assert_eq!(gitea.version.latest, VersionSlot::Unknown);
        assert_eq!(gitea.version.dev.to_string(), "1.22.0-rc1");
    }

    #[test]
    fn test_invalid_version_keeps_loaded_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, ORIGINAL_STYLE.replace("1.21.10", "latest-and-greatest")).unwrap();

        let (config, used) = load_config_with_fallback(std::slice::from_ref(&path));
        assert_eq!(used, Some(path));
        assert_eq!(config.settings.user, "git");
        assert_eq!(
            config.settings.services["gitea"].path,
            PathBuf::from("/srv/gitea")
        );
        assert_eq!(
            config.settings.services["gitea"].version.installed,
            VersionSlot::Unknown
        );
    }

    #[test]
    fn test_load_config_search_order() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.yml");
        let present = dir.path().join("present.yml");
        std::fs::write(&present, ORIGINAL_STYLE).unwrap();

        let (config, path) = load_config(&[missing.clone(), present.clone()]).unwrap();
        assert_eq!(path, present);
        assert_eq!(config.settings.user, "git");

        let err = load_config(&[missing]).unwrap_err();
        assert!(matches!(err, UpdaterError::Config(_)));
    }

    #[test]
    fn test_fallback_to_defaults() {
        let dir = TempDir::new().unwrap();
        let (config, path) = load_config_with_fallback(&[dir.path().join("nope.yml")]);
        assert!(path.is_none());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = parse_config(ORIGINAL_STYLE).unwrap();

        save_config(&config, &path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let (loaded, _) = load_config(&[path]).unwrap();
        assert_eq!(loaded, config);
    }
}
