//! Scan roots for the downstream organizer
//!
//! Some providers expose a `links` directory inside their WebDAV root. When
//! present it is the preferred place to look for files; otherwise the
//! provider's mount root is scanned directly.

use std::path::{Path, PathBuf};

use crate::provider::ProviderKind;

/// Preferred subdirectory inside a provider mount
pub const LINKS_DIR: &str = "links";

/// Where to scan for one provider mounted under `base`
pub fn scan_root(base: &Path, provider: ProviderKind) -> PathBuf {
    let mount = provider.mount_path(base);
    let links = mount.join(LINKS_DIR);
    if links.is_dir() {
        links
    } else {
        mount
    }
}

/// Scan roots for every provider, in the order given
pub fn scan_roots<I>(base: &Path, providers: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = ProviderKind>,
{
    providers
        .into_iter()
        .map(|provider| scan_root(base, provider))
        .collect()
}
