//! Mount-point directory management and stale mount recovery
//!
//! When an rclone process dies without unmounting, its mount point is left
//! in a disconnected state: every access fails with `ENOTCONN`, `EBUSY` or
//! `EIO`. Only per-provider leaf mount points are ever force-unmounted here.
//! Shared directories (the base mount directory, the work directory) may be
//! host bind mounts and are never touched destructively.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{MountError, Result};

/// errno values that indicate a disconnected mount
pub const STALE_MOUNT_ERRNOS: [i32; 3] = [libc::ENOTCONN, libc::EBUSY, libc::EIO];

/// Per-command limit for the platform unmount helpers
pub const UNMOUNT_TIMEOUT: Duration = Duration::from_secs(3);

/// Whether an I/O error looks like a disconnected mount
pub fn is_stale_mount_error(err: &io::Error) -> bool {
    err.raw_os_error()
        .map(|code| STALE_MOUNT_ERRNOS.contains(&code))
        .unwrap_or(false)
}

/// Host filesystem operations needed to manage mount points
pub trait MountHost: Send + Sync {
    /// `Ok(false)` if the path does not exist, `Err` if it cannot be inspected
    fn try_exists(&self, path: &Path) -> io::Result<bool>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// List a directory, returning the number of entries
    fn list_dir(&self, path: &Path) -> io::Result<usize>;

    /// Best-effort forced unmount; failures are ignored
    fn force_unmount(&self, path: &Path);
}

/// The local machine
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl MountHost for SystemHost {
    fn try_exists(&self, path: &Path) -> io::Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(path)? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn force_unmount(&self, path: &Path) {
        for (program, args) in UNMOUNT_COMMANDS {
            let mut cmd = Command::new(program);
            cmd.args(*args)
                .arg(path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());

            match status_within(&mut cmd, UNMOUNT_TIMEOUT) {
                Ok(Some(status)) if status.success() => {
                    debug!("{} {:?} succeeded for {:?}", program, args, path);
                    return;
                }
                Ok(Some(status)) => {
                    debug!("{} {:?} failed for {:?}: {}", program, args, path, status)
                }
                Ok(None) => warn!(
                    "{} {:?} timed out after {:?} for {:?} (possible ghost mount)",
                    program, args, UNMOUNT_TIMEOUT, path
                ),
                Err(e) => debug!("{} not available: {}", program, e),
            }
        }
    }
}

/// Run `cmd` to completion, or kill it once `timeout` passes (`Ok(None)`)
fn status_within(cmd: &mut Command, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let mut child = cmd.spawn()?;
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            // Reaped off-thread: a process stuck in the kernel may ignore the kill
            std::thread::spawn(move || {
                let _ = child.wait();
            });
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Run a blocking host operation on its own thread, giving up after `timeout`.
///
/// Syscalls against a hung FUSE mount can block forever. On timeout the
/// thread is abandoned; it is not part of the runtime's blocking pool, so it
/// cannot hold up shutdown either.
pub async fn run_bounded<T, F>(timeout: Duration, op: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(op());
    });

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(io::Error::new(
            io::ErrorKind::Other,
            "host operation ended without a result",
        )),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no response within {:?}", timeout),
        )),
    }
}

/// Unmount commands to try, in order
#[cfg(target_os = "macos")]
const UNMOUNT_COMMANDS: &[(&str, &[&str])] =
    &[("umount", &["-f"]), ("diskutil", &["unmount", "force"])];

#[cfg(target_os = "linux")]
const UNMOUNT_COMMANDS: &[(&str, &[&str])] = &[
    ("fusermount", &["-uz"]),
    ("fusermount3", &["-uz"]),
    ("umount", &["-l"]),
];

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
const UNMOUNT_COMMANDS: &[(&str, &[&str])] = &[("umount", &["-f"])];

/// Creates mount-point directories and recovers stale ones
#[derive(Clone)]
pub struct PathManager {
    host: Arc<dyn MountHost>,
    timeout: Duration,
}

impl PathManager {
    /// `timeout` bounds each `ensure_dir_async` call as a whole
    pub fn new(host: Arc<dyn MountHost>, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    pub fn host(&self) -> &Arc<dyn MountHost> {
        &self.host
    }

    /// Make sure `path` exists and can be listed.
    ///
    /// With `cleanup_on_stale`, a stale-mount error triggers one forced
    /// unmount followed by exactly one retry. Without it, every failure is
    /// returned as-is.
    pub fn ensure_dir(&self, path: &Path, cleanup_on_stale: bool) -> Result<()> {
        let err = match self.create_and_probe(path) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if !is_stale_mount_error(&err) {
            return Err(MountError::Io(err));
        }

        if !cleanup_on_stale {
            return Err(MountError::StaleMountDetected {
                path: path.to_path_buf(),
                source: err,
            });
        }

        warn!(
            "Stale mount detected at {:?} ({}), forcing unmount",
            path, err
        );
        self.host.force_unmount(path);

        match self.create_and_probe(path) {
            Ok(()) => {
                info!("Recovered stale mount point {:?}", path);
                Ok(())
            }
            Err(e) if is_stale_mount_error(&e) => Err(MountError::StaleMountDetected {
                path: path.to_path_buf(),
                source: e,
            }),
            Err(e) => Err(MountError::Io(e)),
        }
    }

    /// `ensure_dir` off the runtime, bounded by the manager's timeout.
    ///
    /// A path that does not answer in time is reported as a stale mount
    /// with a `TimedOut` source.
    pub async fn ensure_dir_async(&self, path: PathBuf, cleanup_on_stale: bool) -> Result<()> {
        let manager = self.clone();
        let target = path.clone();
        match run_bounded(self.timeout, move || manager.ensure_dir(&target, cleanup_on_stale)).await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Mount point {:?} is not responding: {}", path, e);
                Err(MountError::StaleMountDetected { path, source: e })
            }
        }
    }

    fn create_and_probe(&self, path: &Path) -> io::Result<()> {
        if !self.host.try_exists(path)? {
            debug!("Creating directory {:?}", path);
            self.host.create_dir_all(path)?;
        }
        self.host.list_dir(path).map(|_| ())
    }
}
