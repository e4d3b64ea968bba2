// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! CLI argument definitions using clap.

use crate::installer::{Channel, StopFailurePolicy};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "gitea-update")]
#[command(author, version, about = "Check and install Gitea and act_runner updates")]
#[command(
    long_about = "Check and install updated Gitea and act_runner binaries managed as systemd units.\n\
    \nExamples:\n  \
    gitea-update --info                    # Show installed and available versions\n  \
    gitea-update --install                 # Install the latest stable versions\n  \
    gitea-update --install --dev           # Install the latest release candidates"
)]
pub struct Cli {
    /// Display version information for gitea and act_runner
    #[arg(long)]
    pub info: bool,

    /// Install the latest version
    #[arg(long)]
    pub install: bool,

    /// Install the development version instead of the stable one
    #[arg(long)]
    pub dev: bool,

    /// Directory holding the binaries, replaces the configured path of every service
    #[arg(long, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// User name for file ownership
    #[arg(long)]
    pub user: Option<String>,

    /// Group name for file ownership
    #[arg(long)]
    pub group: Option<String>,

    /// Configuration file; the default search locations are skipped
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write resolved versions back to the configuration file
    #[arg(long)]
    pub save_config: bool,

    /// Skip a service whose unit does not stop instead of ending the run
    #[arg(long)]
    pub continue_on_stop_failure: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn channel(&self) -> Channel {
        if self.dev { Channel::Dev } else { Channel::Stable }
    }

    pub fn stop_failure_policy(&self) -> StopFailurePolicy {
        if self.continue_on_stop_failure {
            StopFailurePolicy::Continue
        } else {
            StopFailurePolicy::Halt
        }
    }

    /// Neither `--info` nor `--install` was given
    pub fn has_action(&self) -> bool {
        self.info || self.install
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_flags() {
        let cli = Cli::parse_from([
            "gitea-update",
            "--install",
            "--dev",
            "--path",
            "/srv/gitea",
            "--user",
            "git",
            "--continue-on-stop-failure",
        ]);
        assert!(cli.has_action());
        assert_eq!(cli.channel(), Channel::Dev);
        assert_eq!(cli.path, Some(PathBuf::from("/srv/gitea")));
        assert_eq!(cli.user.as_deref(), Some("git"));
        assert!(cli.group.is_none());
        assert_eq!(cli.stop_failure_policy(), StopFailurePolicy::Continue);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["gitea-update", "-v"]);
        assert!(!cli.has_action());
        assert!(cli.verbose);
        assert_eq!(cli.channel(), Channel::Stable);
        assert_eq!(cli.stop_failure_policy(), StopFailurePolicy::Halt);
    }
}
