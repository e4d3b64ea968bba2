// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Top-level `--info` and `--install` runs

use crate::cli::Cli;
use crate::config::{
    AppConfig, CONFIG_FILE_NAME, default_search_paths, load_config, load_config_with_fallback,
    save_config,
};
use crate::downloader::Downloader;
use crate::error::Result;
use crate::installer::{InstallOptions, InstallReport, Installer, Ownership};
use crate::probe::probe_all;
use crate::registry::Registry;
use crate::reporter::{render, summarize};
use crate::resolver::resolve_all;
use crate::service_control::{ServiceControl, Systemctl};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Everything a run needs, built from the command line and the config file
#[derive(Debug)]
pub struct App {
    cli: Cli,
    config: AppConfig,
    config_path: Option<PathBuf>,
    registry: Registry,
}

impl App {
    /// Load the configuration and apply command line overrides.
    ///
    /// An explicit `--config` file must exist and parse; otherwise the
    /// default locations are searched and built-in defaults used as fallback.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let (config, config_path) = match &cli.config {
            Some(path) => {
                let (config, path) = load_config(std::slice::from_ref(path))?;
                tracing::info!("Loaded configuration from {}", path.display());
                (config, Some(path))
            }
            None => load_config_with_fallback(&default_search_paths()),
        };
        Ok(Self::new(cli, config, config_path))
    }

    pub fn new(cli: Cli, mut config: AppConfig, config_path: Option<PathBuf>) -> Self {
        if let Some(ref user) = cli.user {
            config.settings.user.clone_from(user);
        }
        if let Some(ref group) = cli.group {
            config.settings.group.clone_from(group);
        }
        tracing::info!(
            "User: {}, Group: {}",
            config.settings.user,
            config.settings.group
        );

        let registry = Registry::from_config(&config);
        Self {
            cli,
            config,
            config_path,
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.config.settings.http_timeout_secs)
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.settings.command_timeout_secs)
    }

    /// Probe installed versions, resolve remote ones and return the report
    pub async fn run_info(&self, color: bool) -> Result<String> {
        probe_all(&self.registry, self.cli.path.as_deref(), self.command_timeout()).await;

        let downloader = Downloader::new(self.http_timeout())?;
        resolve_all(&self.registry, &downloader).await;

        Ok(render(&summarize(&self.registry), color))
    }

    /// Resolve remote versions and install the selected channel
    pub async fn run_install(&self, control: Arc<dyn ServiceControl>) -> Result<InstallReport> {
        let api = Downloader::new(self.http_timeout())?;
        resolve_all(&self.registry, &api).await;

        let downloads = Downloader::new(Duration::from_secs(
            self.config.settings.download_timeout_secs,
        ))?;
        let options = InstallOptions {
            channel: self.cli.channel(),
            owner: Some(Ownership::new(
                &self.config.settings.user,
                &self.config.settings.group,
            )),
            stop_failure_policy: self.cli.stop_failure_policy(),
            dir_override: self.cli.path.clone(),
            command_timeout: self.command_timeout(),
            ..InstallOptions::default()
        };

        Installer::new(self.registry.clone(), control, downloads, options)
            .install_all()
            .await
    }

    /// Write the registry back to the file the config came from, or to
    /// `./gitea-update.yml` when running on defaults.
    pub fn save(&self) -> Result<PathBuf> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        save_config(&self.registry.to_config(&self.config), &path)?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(path)
    }

    /// Run whichever action the command line selected
    pub async fn run(&self) -> Result<()> {
        if self.cli.info {
            let report = self.run_info(std::io::stdout().is_terminal()).await?;
            print!("{report}");
        } else if self.cli.install {
            let control = Arc::new(Systemctl::new(self.command_timeout()));
            self.run_install(control).await?;
        }

        if self.cli.save_config {
            self.save()?;
        }
        Ok(())
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::version::VersionSlot;
    use mockito::Server;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn config_for(server_url: &str) -> AppConfig {
        let mut config = AppConfig::default();
        for (name, service) in &mut config.settings.services {
            service.urls.api = format!("{server_url}/{name}/tags");
        }
        config
    }

    fn fake_binary(dir: &Path, name: &str, line: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\necho '{line}'\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_cli_overrides_owner() {
        let cli = Cli {
            user: Some("git".to_string()),
            ..Cli::default()
        };
        let app = App::new(cli, AppConfig::default(), None);
        assert_eq!(app.config().settings.user, "git");
        assert_eq!(app.config().settings.group, "app");
        assert_eq!(app.registry().len(), 2);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let cli = Cli {
            config: Some(dir.path().join("missing.yml")),
            ..Cli::default()
        };
        assert!(App::from_cli(cli).is_err());
    }

    #[tokio::test]
    async fn test_run_info_probes_and_resolves() {
        let mut server = Server::new_async().await;
        let _gitea = server
            .mock("GET", "/gitea/tags")
            .with_status(200)
            .with_body(r#"[{"name":"v1.22.0"},{"name":"v1.23.0-rc1"},{"name":"v1.21.10"}]"#)
            .create_async()
            .await;
        let _runner = server
            .mock("GET", "/act_runner/tags")
            .with_status(500)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        fake_binary(dir.path(), "gitea", "Gitea version 1.21.10 built with go1.22");
        fake_binary(dir.path(), "act_runner", "act_runner version v0.2.9");

        let cli = Cli {
            info: true,
            path: Some(dir.path().to_path_buf()),
            ..Cli::default()
        };
        let app = App::new(cli, config_for(&server.url()), None);
        let report = app.run_info(false).await.unwrap();

        assert_eq!(
            report,
            "act_runner 0.2.9 (latest: n/a, dev: n/a)\n\
             gitea 1.21.10 (latest: 1.22.0, dev: 1.23.0-rc1)\n"
        );
    }

    #[tokio::test]
    async fn test_save_writes_resolved_versions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        save_config(&AppConfig::default(), &path).unwrap();

        let cli = Cli {
            config: Some(path.clone()),
            save_config: true,
            ..Cli::default()
        };
        let app = App::from_cli(cli).unwrap();
        app.registry()
            .set_probed_version("gitea", VersionSlot::parse("1.21.10").unwrap());

        assert_eq!(app.save().unwrap(), path);
        let saved = parse_config(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            saved.settings.services["gitea"].version.installed.to_string(),
            "1.21.10"
        );
        assert_eq!(app.config_path(), Some(path.as_path()));
    }
}
