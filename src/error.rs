use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for mount orchestration
#[derive(Error, Debug)]
pub enum MountError {
    /// Nothing can be mounted: no provider produced a remote definition.
    #[error("Configuration incomplete: {0}")]
    ConfigurationIncomplete(String),

    #[error("Stale mount detected at {path:?}: {source}")]
    StaleMountDetected {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Remote {remote} is not reachable: {detail}")]
    ProbeFailed { remote: String, detail: String },

    #[error("Failed to spawn mount process for {remote}: {source}")]
    SpawnFailed {
        remote: String,
        #[source]
        source: io::Error,
    },

    #[error("Mount process for {remote} exited with status {code:?}")]
    ProcessExitedNonZero { remote: String, code: Option<i32> },

    #[error("Mount at {path:?} did not verify (see {log_file:?}): {detail}")]
    VerificationFailed {
        path: PathBuf,
        log_file: PathBuf,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MountError {
    /// Convert error to a libc errno, mostly useful for exit codes and logs
    pub fn to_errno(&self) -> i32 {
        match self {
            MountError::ConfigurationIncomplete(_) => libc::EINVAL,
            MountError::StaleMountDetected { source, .. } => {
                source.raw_os_error().unwrap_or(libc::ENOTCONN)
            }
            MountError::ProbeFailed { .. } => libc::EHOSTUNREACH,
            MountError::SpawnFailed { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            MountError::ProcessExitedNonZero { .. } => libc::EIO,
            MountError::VerificationFailed { .. } => libc::EIO,
            MountError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            MountError::Config(_) => libc::EINVAL,
        }
    }

    /// Whether this error only concerns a single target and must not abort a pass
    pub fn is_per_target(&self) -> bool {
        matches!(
            self,
            MountError::StaleMountDetected { .. }
                | MountError::ProbeFailed { .. }
                | MountError::SpawnFailed { .. }
                | MountError::ProcessExitedNonZero { .. }
                | MountError::VerificationFailed { .. }
        )
    }
}

/// Result type alias for mount orchestration
pub type Result<T> = std::result::Result<T, MountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_errno_preserved() {
        let err = MountError::StaleMountDetected {
            path: PathBuf::from("/mnt/x"),
            source: io::Error::from_raw_os_error(libc::EBUSY),
        };
        assert_eq!(err.to_errno(), libc::EBUSY);
        assert!(err.is_per_target());
    }

    #[test]
    fn test_configuration_incomplete_is_pass_fatal() {
        let err = MountError::ConfigurationIncomplete("nothing".to_string());
        assert!(!err.is_per_target());
        assert_eq!(err.to_errno(), libc::EINVAL);
    }
}
