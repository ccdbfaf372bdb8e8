//! Generated rclone configuration
//!
//! One `[remote]` section per mountable provider. The file is rewritten from
//! scratch on every orchestration pass and lives in the work directory only.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{MountError, Result};
use crate::paths::PathManager;
use crate::provider::{ProviderKind, ProviderSpec};

use super::Rclone;

/// A WebDAV remote as rclone sees it
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteDefinition {
    pub provider: ProviderKind,
    pub id: String,
    pub url: String,
    pub vendor: String,
    pub user: String,
    pub obscured_password: String,
}

impl RemoteDefinition {
    /// Render as an INI section
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[{}]", self.id);
        let _ = writeln!(out, "type = webdav");
        let _ = writeln!(out, "url = {}", self.url);
        let _ = writeln!(out, "vendor = {}", self.vendor);
        let _ = writeln!(out, "user = {}", self.user);
        let _ = writeln!(out, "pass = {}", self.obscured_password);
        out
    }
}

impl std::fmt::Debug for RemoteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDefinition")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("vendor", &self.vendor)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// The written config file and the remotes it defines
#[derive(Debug, Clone)]
pub struct RcloneConfigFile {
    pub path: PathBuf,
    pub remotes: Vec<RemoteDefinition>,
}

/// Builds the rclone config from provider credentials
pub struct ConfigBuilder<'a> {
    rclone: &'a Rclone,
    paths: &'a PathManager,
    path: PathBuf,
}

impl<'a> ConfigBuilder<'a> {
    pub fn new(rclone: &'a Rclone, paths: &'a PathManager, path: impl Into<PathBuf>) -> Self {
        Self {
            rclone,
            paths,
            path: path.into(),
        }
    }

    /// Derive a remote for every mountable provider.
    ///
    /// Providers that are disabled or lack a url, username or password are
    /// skipped without error.
    pub async fn definitions(&self, providers: &[ProviderSpec]) -> Vec<RemoteDefinition> {
        let mut remotes = Vec::new();
        for provider in providers.iter().filter(|p| p.is_mountable()) {
            let obscured_password = match self.rclone.obscure(&provider.password).await {
                Ok(obscured) => obscured,
                Err(e) => {
                    warn!(
                        provider = %provider.kind,
                        "Failed to obscure password, using it as-is: {}",
                        e
                    );
                    provider.password.clone()
                }
            };

            remotes.push(RemoteDefinition {
                provider: provider.kind,
                id: provider.kind.remote_id().to_string(),
                url: provider.webdav_url.trim().to_string(),
                vendor: "other".to_string(),
                user: provider.username.trim().to_string(),
                obscured_password,
            });
        }
        remotes
    }

    /// Write the config file, replacing any previous one.
    ///
    /// Fails with `ConfigurationIncomplete` when no provider is mountable.
    pub async fn build(&self, providers: &[ProviderSpec]) -> Result<RcloneConfigFile> {
        let remotes = self.definitions(providers).await;
        if remotes.is_empty() {
            return Err(MountError::ConfigurationIncomplete(
                "no WebDAV providers configured; set credentials for realdebrid or torbox \
                 and enable them"
                    .to_string(),
            ));
        }

        if let Some(dir) = self.path.parent() {
            self.paths.ensure_dir_async(dir.to_path_buf(), false).await?;
        }

        let content = remotes
            .iter()
            .map(RemoteDefinition::render)
            .collect::<Vec<_>>()
            .join("\n");
        write_private(&self.path, content.as_bytes()).await?;

        info!(
            "Wrote rclone config with {} remote(s) to {:?}",
            remotes.len(),
            self.path
        );
        Ok(RcloneConfigFile {
            path: self.path.clone(),
            remotes,
        })
    }
}

/// Truncate-and-write, readable by the owner only. A new file is created
/// with mode 0600 so the credentials are never briefly world-readable.
async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;

    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }

    file.write_all(content).await?;
    file.flush().await?;
    Ok(())
}
