//! Scriptable stand-ins for rclone and the host filesystem
//!
//! Used by the unit tests and the integration tests under `tests/`.
//! [`FakeRunner`] answers `obscure`, `lsd` and `mount` without a real rclone
//! binary. [`FakeHost`] works on the real filesystem (normally a temp dir)
//! but can inject errno failures on listing and never runs unmount commands.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::paths::{MountHost, SystemHost};
use crate::process::{CommandOutput, CommandRunner, CommandSpec, ExitFuture, SpawnedProcess};

enum ExitScript {
    Immediate(Option<i32>),
    Held(Option<i32>, oneshot::Receiver<()>),
}

#[derive(Default)]
struct RunnerState {
    output_calls: Vec<CommandSpec>,
    spawn_calls: Vec<CommandSpec>,
    obscure_fails: bool,
    failing_probes: HashSet<String>,
    timed_out_probes: HashSet<String>,
    failing_spawns: HashSet<String>,
    exits: HashMap<String, ExitScript>,
}

/// Scripted rclone. Everything succeeds unless told otherwise; spawned mount
/// processes exit 0 straight away, like `rclone mount --daemon` does once
/// it has detached.
#[derive(Default)]
pub struct FakeRunner {
    state: Mutex<RunnerState>,
}

/// Keeps a held mount process alive until released
pub struct ExitRelease {
    tx: oneshot::Sender<()>,
}

impl ExitRelease {
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

impl FakeRunner {
    /// pid reported for every spawned process
    pub const PID: u32 = 4242;

    pub fn new() -> Self {
        Self::default()
    }

    /// What `obscure` returns for `secret`
    pub fn obscured(secret: &str) -> String {
        let reversed: String = secret.chars().rev().collect();
        format!("obscured-{}", reversed)
    }

    pub fn fail_obscure(&self) {
        self.state.lock().obscure_fails = true;
    }

    /// `lsd` on `remote` exits non-zero
    pub fn fail_probe(&self, remote: &str) {
        self.state.lock().failing_probes.insert(remote.to_string());
    }

    /// `lsd` on `remote` fails with `TimedOut`
    pub fn time_out_probe(&self, remote: &str) {
        self.state.lock().timed_out_probes.insert(remote.to_string());
    }

    /// `mount` for `remote` cannot be started
    pub fn fail_spawn(&self, remote: &str) {
        self.state.lock().failing_spawns.insert(remote.to_string());
    }

    /// `mount` for `remote` exits immediately with `code`
    pub fn exit_with(&self, remote: &str, code: Option<i32>) {
        self.state
            .lock()
            .exits
            .insert(remote.to_string(), ExitScript::Immediate(code));
    }

    /// `mount` for `remote` stays alive until the returned guard is released,
    /// then exits with `code`. Dropping the guard keeps it alive forever.
    pub fn hold_exit(&self, remote: &str, code: Option<i32>) -> ExitRelease {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .exits
            .insert(remote.to_string(), ExitScript::Held(code, rx));
        ExitRelease { tx }
    }

    pub fn output_calls(&self) -> Vec<CommandSpec> {
        self.state.lock().output_calls.clone()
    }

    pub fn spawn_calls(&self) -> Vec<CommandSpec> {
        self.state.lock().spawn_calls.clone()
    }

    /// Remote named by `rclone <subcommand> <remote>: ...`
    fn remote_of(command: &CommandSpec) -> String {
        command
            .args
            .get(1)
            .map(|arg| arg.trim_end_matches(':').to_string())
            .unwrap_or_default()
    }
}

fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: stdout.into(),
        stderr: stderr.into(),
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn output(
        &self,
        command: &CommandSpec,
        _timeout: Duration,
    ) -> io::Result<CommandOutput> {
        let mut state = self.state.lock();
        state.output_calls.push(command.clone());

        match command.subcommand() {
            Some("obscure") => {
                if state.obscure_fails {
                    return Ok(exited(1, "", "obscure: unavailable"));
                }
                // `obscure -` reads one line from stdin
                let secret = match command.args.get(1).map(String::as_str) {
                    Some("-") => command
                        .stdin
                        .as_deref()
                        .and_then(|input| input.lines().next())
                        .unwrap_or_default(),
                    other => other.unwrap_or_default(),
                };
                Ok(exited(0, format!("{}\n", Self::obscured(secret)), ""))
            }
            Some("lsd") => {
                let remote = Self::remote_of(command);
                if state.timed_out_probes.contains(&remote) {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("rclone lsd {}: timed out", remote),
                    ));
                }
                if state.failing_probes.contains(&remote) {
                    return Ok(exited(1, "", "Failed to lsd: 401 Unauthorized"));
                }
                Ok(exited(0, "          -1 2024-01-01 00:00:00        -1 links\n", ""))
            }
            _ => Ok(exited(0, "", "")),
        }
    }

    fn spawn_detached(&self, command: &CommandSpec, _log: File) -> io::Result<SpawnedProcess> {
        let mut state = self.state.lock();
        state.spawn_calls.push(command.clone());

        let remote = Self::remote_of(command);
        if state.failing_spawns.contains(&remote) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "rclone: no such file or directory",
            ));
        }

        let exit: ExitFuture = match state.exits.remove(&remote) {
            Some(ExitScript::Held(code, rx)) => Box::pin(async move {
                if rx.await.is_err() {
                    futures::future::pending::<()>().await;
                }
                Ok::<_, io::Error>(code)
            }),
            Some(ExitScript::Immediate(code)) => {
                state.exits.insert(remote, ExitScript::Immediate(code));
                Box::pin(async move { Ok::<_, io::Error>(code) })
            }
            None => Box::pin(async { Ok::<_, io::Error>(Some(0)) }),
        };

        Ok(SpawnedProcess {
            pid: Some(Self::PID),
            exit,
        })
    }
}

/// A host operation recorded by [`FakeHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Exists(PathBuf),
    Create(PathBuf),
    List(PathBuf),
    Unmount(PathBuf),
}

#[derive(Default)]
struct HostState {
    calls: Vec<HostCall>,
    list_failures: HashMap<PathBuf, VecDeque<i32>>,
    list_hangs: HashMap<PathBuf, Duration>,
}

/// Real filesystem with injectable listing errors and recorded unmounts
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` listings of `path` fail with `errno`
    pub fn fail_list(&self, path: &Path, errno: i32, times: usize) {
        self.state
            .lock()
            .list_failures
            .entry(path.to_path_buf())
            .or_default()
            .extend(std::iter::repeat(errno).take(times));
    }

    /// Every listing of `path` blocks for `delay` first, like a FUSE mount
    /// whose daemon stopped answering
    pub fn hang_list(&self, path: &Path, delay: Duration) {
        self.state
            .lock()
            .list_hangs
            .insert(path.to_path_buf(), delay);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&HostCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Paths passed to `force_unmount`, in order
    pub fn unmount_calls(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Unmount(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) {
        self.state.lock().calls.push(call);
    }
}

impl MountHost for FakeHost {
    fn try_exists(&self, path: &Path) -> io::Result<bool> {
        self.record(HostCall::Exists(path.to_path_buf()));
        SystemHost.try_exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.record(HostCall::Create(path.to_path_buf()));
        SystemHost.create_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<usize> {
        let (hang, injected) = {
            let mut state = self.state.lock();
            state.calls.push(HostCall::List(path.to_path_buf()));
            let hang = state.list_hangs.get(path).copied();
            let injected = state
                .list_failures
                .get_mut(path)
                .and_then(VecDeque::pop_front);
            (hang, injected)
        };

        if let Some(delay) = hang {
            std::thread::sleep(delay);
        }

        match injected {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => SystemHost.list_dir(path),
        }
    }

    fn force_unmount(&self, path: &Path) {
        self.record(HostCall::Unmount(path.to_path_buf()));
    }
}
