//! Debrid providers exposed over WebDAV

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Supported WebDAV providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "rd", alias = "real-debrid")]
    RealDebrid,
    TorBox,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::RealDebrid, ProviderKind::TorBox];

    /// Provider name, also used as the mount directory name
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::RealDebrid => "realdebrid",
            ProviderKind::TorBox => "torbox",
        }
    }

    /// Section name of the remote in the rclone config
    pub fn remote_id(self) -> &'static str {
        match self {
            ProviderKind::RealDebrid => "rd",
            ProviderKind::TorBox => "torbox",
        }
    }

    /// Default WebDAV endpoint
    pub fn default_url(self) -> &'static str {
        match self {
            ProviderKind::RealDebrid => "https://dav.real-debrid.com",
            ProviderKind::TorBox => "https://webdav.torbox.app",
        }
    }

    /// Parse a provider name as found in a `PROVIDERS` list
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "realdebrid" | "real-debrid" | "rd" => Some(ProviderKind::RealDebrid),
            "torbox" => Some(ProviderKind::TorBox),
            _ => None,
        }
    }

    /// Local mount directory for this provider under `base`
    pub fn mount_path(self, base: &Path) -> PathBuf {
        base.join(self.name())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// WebDAV credentials for one provider. Immutable once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub webdav_url: String,
    pub username: String,
    pub password: String,
    pub enabled: bool,
}

impl ProviderSpec {
    /// url, username and password are all non-blank
    pub fn has_complete_credentials(&self) -> bool {
        !self.webdav_url.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.trim().is_empty()
    }

    /// Enabled and complete; the only providers that ever get a remote definition
    pub fn is_mountable(&self) -> bool {
        self.enabled && self.has_complete_credentials()
    }
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("kind", &self.kind)
            .field("webdav_url", &self.webdav_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("enabled", &self.enabled)
            .finish()
    }
}
