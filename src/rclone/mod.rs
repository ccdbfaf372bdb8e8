//! rclone client
//!
//! A single [`Rclone`] value is built at startup and shared by the config
//! builder, the remote prober and the mount supervisor.

pub mod config_file;
pub mod options;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::MountSettings;
use crate::process::{CommandRunner, CommandSpec, SpawnedProcess};

pub use config_file::{ConfigBuilder, RcloneConfigFile, RemoteDefinition};
pub use options::mount_args;

/// Handle on the rclone executable
#[derive(Clone)]
pub struct Rclone {
    runner: Arc<dyn CommandRunner>,
    binary: PathBuf,
    command_timeout: Duration,
    probe_timeout: Duration,
}

impl Rclone {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        binary: impl Into<PathBuf>,
        command_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            binary: binary.into(),
            command_timeout,
            probe_timeout,
        }
    }

    pub fn from_settings(runner: Arc<dyn CommandRunner>, settings: &MountSettings) -> Self {
        Self::new(
            runner,
            &settings.rclone_path,
            settings.command_timeout,
            settings.probe_timeout,
        )
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.binary)
    }

    /// Encode a secret with `rclone obscure`. The secret goes through
    /// stdin so it never appears in argv.
    pub async fn obscure(&self, secret: &str) -> io::Result<String> {
        let cmd = self
            .command()
            .arg("obscure")
            .arg("-")
            .stdin(format!("{}\n", secret));
        let output = self.runner.output(&cmd, self.command_timeout).await?;

        let obscured = output.stdout.trim();
        if !output.success() || obscured.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "rclone obscure exited with {:?}: {}",
                    output.code,
                    output.stderr.trim()
                ),
            ));
        }
        Ok(obscured.to_string())
    }

    /// List the top level of `remote_id` without mounting it.
    ///
    /// Never fails: any error or non-zero exit is logged and reported as
    /// unreachable.
    pub async fn test_remote(&self, remote_id: &str, config_path: &Path) -> bool {
        let cmd = self
            .command()
            .arg("lsd")
            .arg(format!("{}:", remote_id))
            .arg("--config")
            .arg(config_path.display().to_string())
            .arg("--max-depth")
            .arg("1");

        match self.runner.output(&cmd, self.probe_timeout).await {
            Ok(output) if output.success() => {
                debug!(remote = %remote_id, "Remote reachable");
                true
            }
            Ok(output) => {
                warn!(
                    remote = %remote_id,
                    code = ?output.code,
                    "Remote probe failed: {}",
                    output.stderr.trim()
                );
                false
            }
            Err(e) => {
                warn!(remote = %remote_id, "Remote probe failed: {}", e);
                false
            }
        }
    }

    /// Start `rclone <args>` in the background, logging into `log`
    pub fn spawn(&self, args: Vec<String>, log: File) -> io::Result<SpawnedProcess> {
        let cmd = self.command().args(args);
        self.runner.spawn_detached(&cmd, log)
    }
}
