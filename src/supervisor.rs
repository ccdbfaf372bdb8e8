//! Mount supervision
//!
//! Each target moves through
//! `Pending -> Probing -> (Skipped | Mounting) -> (Running | Failed)`.
//! The state is published on a watch channel so callers can wait for a
//! target to settle instead of relying on timers.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MountSettings;
use crate::error::MountError;
use crate::paths::{run_bounded, MountHost};
use crate::policy::HostPolicy;
use crate::process::SpawnedProcess;
use crate::provider::ProviderKind;
use crate::rclone::{mount_args, Rclone};

/// One provider's mount point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountTarget {
    pub provider: ProviderKind,
    pub remote_id: String,
    pub local_path: PathBuf,
    pub log_file: PathBuf,
}

impl MountTarget {
    pub fn new(provider: ProviderKind, settings: &MountSettings) -> Self {
        let remote_id = provider.remote_id().to_string();
        Self {
            provider,
            local_path: provider.mount_path(&settings.base_dir),
            log_file: settings.log_file(&remote_id),
            remote_id,
        }
    }
}

/// Lifecycle of a mount target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountState {
    /// Constructed, not yet probed
    Pending,
    /// Reachability probe in flight
    Probing,
    /// Probe failed; nothing was spawned this pass
    Skipped,
    /// Probe passed; mount process being started
    Mounting,
    /// Mount process started. `verified` is filled in after the delayed
    /// listing of the mount point.
    Running {
        pid: Option<u32>,
        verified: Option<bool>,
    },
    Failed {
        reason: String,
    },
}

impl MountState {
    /// No further transition is expected before the next pass, apart from
    /// `Running` turning into `Failed` if the process exits non-zero.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            MountState::Skipped
                | MountState::Failed { .. }
                | MountState::Running {
                    verified: Some(_),
                    ..
                }
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, MountState::Running { .. })
    }
}

/// A supervised mount target and its observable state
#[derive(Debug)]
pub struct MountHandle {
    target: MountTarget,
    state: watch::Receiver<MountState>,
    monitor: Option<JoinHandle<()>>,
}

impl MountHandle {
    /// A target that failed before supervision began
    pub fn failed(target: MountTarget, reason: impl Into<String>) -> Self {
        let (_, state) = watch::channel(MountState::Failed {
            reason: reason.into(),
        });
        Self {
            target,
            state,
            monitor: None,
        }
    }

    pub fn target(&self) -> &MountTarget {
        &self.target
    }

    /// Last published state
    pub fn state(&self) -> MountState {
        self.state.borrow().clone()
    }

    /// Wait until the target is skipped, failed, or running and verified
    pub async fn settled(&mut self) -> MountState {
        if let Ok(state) = self.state.wait_for(MountState::is_settled).await {
            return state.clone();
        }
        self.state()
    }

    /// Wait for the mount process to exit (for daemon mode, once rclone has
    /// detached) and return the final state
    pub async fn finished(mut self) -> MountState {
        if let Some(monitor) = self.monitor.take() {
            if let Err(e) = monitor.await {
                warn!(remote = %self.target.remote_id, "Mount monitor ended abnormally: {}", e);
            }
        }
        self.state()
    }
}

/// Probes, spawns and monitors mount processes
#[derive(Clone)]
pub struct Supervisor {
    rclone: Rclone,
    host: Arc<dyn MountHost>,
    policy: HostPolicy,
    settings: MountSettings,
}

impl Supervisor {
    pub fn new(
        rclone: Rclone,
        host: Arc<dyn MountHost>,
        policy: HostPolicy,
        settings: MountSettings,
    ) -> Self {
        Self {
            rclone,
            host,
            policy,
            settings,
        }
    }

    /// Whether to pass `--allow-other` for this host
    fn allow_other(&self) -> bool {
        if !self.settings.allow_other {
            return false;
        }
        if self.policy.can_use_allow_other() {
            return true;
        }
        warn!(
            "allow_other requested but {:?} does not enable user_allow_other; mounting without it",
            self.policy.fuse_conf()
        );
        false
    }

    /// Run one target through probe and spawn. Returns once the process has
    /// been started (or the target was skipped or failed); verification and
    /// exit monitoring continue in the background.
    pub async fn supervise(&self, target: MountTarget, config_path: &Path) -> MountHandle {
        let (tx, rx) = watch::channel(MountState::Pending);
        let remote = target.remote_id.clone();

        tx.send_replace(MountState::Probing);
        if !self.rclone.test_remote(&remote, config_path).await {
            warn!(remote = %remote, path = ?target.local_path, "Remote unreachable, skipping mount");
            tx.send_replace(MountState::Skipped);
            return MountHandle {
                target,
                state: rx,
                monitor: None,
            };
        }

        tx.send_replace(MountState::Mounting);
        let args = mount_args(&target, &self.settings, config_path, self.allow_other());
        info!(remote = %remote, "{} {}", self.rclone.binary().display(), args.join(" "));

        let process = match self.spawn(&target, args) {
            Ok(process) => process,
            Err(e) => {
                let err = MountError::SpawnFailed {
                    remote: remote.clone(),
                    source: e,
                };
                error!(remote = %remote, path = ?target.local_path, "{}", err);
                tx.send_replace(MountState::Failed {
                    reason: err.to_string(),
                });
                return MountHandle {
                    target,
                    state: rx,
                    monitor: None,
                };
            }
        };

        debug!(remote = %remote, pid = ?process.pid, "Mount process started");
        tx.send_replace(MountState::Running {
            pid: process.pid,
            verified: None,
        });

        let monitor = tokio::spawn(monitor(
            target.clone(),
            process,
            self.host.clone(),
            self.settings.verify_delay,
            self.settings.command_timeout,
            tx,
        ));

        MountHandle {
            target,
            state: rx,
            monitor: Some(monitor),
        }
    }

    fn spawn(&self, target: &MountTarget, args: Vec<String>) -> io::Result<SpawnedProcess> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target.log_file)?;
        self.rclone.spawn(args, log)
    }
}

/// Verify the mount after `delay` and watch for a non-zero exit
async fn monitor(
    target: MountTarget,
    process: SpawnedProcess,
    host: Arc<dyn MountHost>,
    delay: Duration,
    list_timeout: Duration,
    tx: watch::Sender<MountState>,
) {
    let SpawnedProcess { mut exit, .. } = process;
    let mut exited = false;

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    tokio::select! {
        status = &mut exit => {
            exited = true;
            if record_exit(&target, status, &tx) {
                return;
            }
            (&mut sleep).await;
        }
        _ = &mut sleep => {}
    }

    let verified = verify(&target, host, list_timeout).await;
    tx.send_modify(|state| {
        if let MountState::Running { verified: v, .. } = state {
            *v = Some(verified);
        }
    });

    if !exited {
        let status = exit.await;
        record_exit(&target, status, &tx);
    }
}

/// Log the exit status; returns true if the target is now `Failed`
fn record_exit(
    target: &MountTarget,
    status: io::Result<Option<i32>>,
    tx: &watch::Sender<MountState>,
) -> bool {
    match status {
        Ok(Some(0)) => {
            debug!(remote = %target.remote_id, "Mount process detached");
            false
        }
        Ok(code) => {
            let err = MountError::ProcessExitedNonZero {
                remote: target.remote_id.clone(),
                code,
            };
            error!(
                remote = %target.remote_id,
                log_file = ?target.log_file,
                "{}",
                err
            );
            tx.send_replace(MountState::Failed {
                reason: err.to_string(),
            });
            true
        }
        Err(e) => {
            warn!(remote = %target.remote_id, "Lost track of mount process: {}", e);
            false
        }
    }
}

/// List the local mount point. Diagnostic only: failure never unmounts.
async fn verify(target: &MountTarget, host: Arc<dyn MountHost>, list_timeout: Duration) -> bool {
    let path = target.local_path.clone();
    let listing = run_bounded(list_timeout, move || host.list_dir(&path)).await;

    let detail = match listing {
        Ok(Ok(entries)) => {
            info!(
                remote = %target.remote_id,
                path = ?target.local_path,
                entries,
                "Mount verified"
            );
            return true;
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("listing failed: {}", e),
    };

    let err = MountError::VerificationFailed {
        path: target.local_path.clone(),
        log_file: target.log_file.clone(),
        detail,
    };
    warn!(remote = %target.remote_id, "{}", err);
    false
}
