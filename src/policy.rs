//! Host FUSE policy

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Directive in fuse.conf that lets non-root users pass `allow_other`
pub const USER_ALLOW_OTHER: &str = "user_allow_other";

/// Reads the host FUSE policy file
#[derive(Debug, Clone)]
pub struct HostPolicy {
    fuse_conf: PathBuf,
}

impl HostPolicy {
    pub fn new(fuse_conf: impl Into<PathBuf>) -> Self {
        Self {
            fuse_conf: fuse_conf.into(),
        }
    }

    pub fn fuse_conf(&self) -> &Path {
        &self.fuse_conf
    }

    /// Whether `--allow-other` may be requested. An unreadable policy file
    /// counts as "not permitted".
    pub fn can_use_allow_other(&self) -> bool {
        match fs::read_to_string(&self.fuse_conf) {
            Ok(content) => permits_allow_other(&content),
            Err(e) => {
                debug!("Cannot read {:?}: {}", self.fuse_conf, e);
                false
            }
        }
    }
}

/// True if `content` has an uncommented `user_allow_other` line
pub fn permits_allow_other(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.split('#').next().unwrap_or_default().trim();
        line == USER_ALLOW_OTHER
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_directive() {
        assert!(permits_allow_other("mount_max = 1000\nuser_allow_other\n"));
        assert!(permits_allow_other("  user_allow_other   # enabled for rclone"));
    }

    #[test]
    fn test_commented_directive() {
        assert!(!permits_allow_other("#user_allow_other\n"));
        assert!(!permits_allow_other("# user_allow_other\nmount_max = 1000"));
    }

    #[test]
    fn test_absent_directive() {
        assert!(!permits_allow_other(""));
        assert!(!permits_allow_other("user_allow_other_not_really\n"));
    }

    #[test]
    fn test_reads_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("fuse.conf");
        std::fs::write(&conf, "user_allow_other\n").unwrap();

        assert!(HostPolicy::new(&conf).can_use_allow_other());
    }

    #[test]
    fn test_missing_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!HostPolicy::new(dir.path().join("missing.conf")).can_use_allow_other());
    }
}
