//! Shared fixtures for orchestration tests
//!
//! Each harness owns a temp dir holding the base mount directory, the work
//! directory and a FUSE policy file. rclone and the host are the scriptable
//! fakes from `debrid_mount::testing`.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use debrid_mount::config::Config;
use debrid_mount::orchestrator::Orchestrator;
use debrid_mount::provider::ProviderKind;
use debrid_mount::testing::{FakeHost, FakeRunner};
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub runner: Arc<FakeRunner>,
    pub host: Arc<FakeHost>,
    pub config: Config,
}

/// Builds a harness from provider entries and extra `mount:` settings
pub struct HarnessBuilder {
    providers: Vec<(ProviderKind, String, String)>,
    mount_extra: Vec<String>,
    fuse_conf: String,
}

impl HarnessBuilder {
    pub fn provider(mut self, kind: ProviderKind, username: &str, password: &str) -> Self {
        self.providers
            .push((kind, username.to_string(), password.to_string()));
        self
    }

    /// Add a raw line under `mount:`, e.g. `options: "--read-only"`
    pub fn mount_setting(mut self, line: &str) -> Self {
        self.mount_extra.push(line.to_string());
        self
    }

    pub fn fuse_conf(mut self, content: &str) -> Self {
        self.fuse_conf = content.to_string();
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().expect("create temp dir");
        let fuse_conf = dir.path().join("fuse.conf");
        std::fs::write(&fuse_conf, &self.fuse_conf).expect("write fuse.conf");

        let mut yaml = String::new();
        let _ = writeln!(yaml, "mount:");
        let _ = writeln!(yaml, "  base_dir: {}", dir.path().join("mnt").display());
        let _ = writeln!(yaml, "  work_dir: {}", dir.path().join("work").display());
        let _ = writeln!(yaml, "  fuse_conf: {}", fuse_conf.display());
        let _ = writeln!(yaml, "  probe_timeout: 1s");
        let _ = writeln!(yaml, "  command_timeout: 1s");
        let _ = writeln!(yaml, "  verify_delay: 10ms");
        for line in &self.mount_extra {
            let _ = writeln!(yaml, "  {}", line);
        }
        let _ = writeln!(yaml, "providers:");
        for (kind, username, password) in &self.providers {
            let _ = writeln!(yaml, "  - name: {}", kind);
            let _ = writeln!(yaml, "    username: \"{}\"", username);
            let _ = writeln!(yaml, "    password: \"{}\"", password);
        }
        if self.providers.is_empty() {
            yaml = yaml.replace("providers:\n", "providers: []\n");
        }

        let config = Config::from_str(&yaml).expect("parse harness config");
        config.validate().expect("valid harness config");

        Harness {
            dir,
            runner: Arc::new(FakeRunner::new()),
            host: Arc::new(FakeHost::new()),
            config,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            providers: Vec::new(),
            mount_extra: Vec::new(),
            fuse_conf: "user_allow_other\n".to_string(),
        }
    }

    /// Both providers with complete credentials
    pub fn both() -> Harness {
        Self::builder()
            .provider(ProviderKind::RealDebrid, "alice", "pw1")
            .provider(ProviderKind::TorBox, "bob", "pw2")
            .build()
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::with_collaborators(
            self.config.clone(),
            self.runner.clone(),
            self.host.clone(),
        )
    }

    pub fn base(&self) -> PathBuf {
        self.config.mount.base_dir.clone()
    }

    pub fn work(&self) -> PathBuf {
        self.config.mount.work_dir.clone()
    }

    pub fn rclone_config(&self) -> String {
        std::fs::read_to_string(self.config.mount.rclone_config_path()).unwrap_or_default()
    }
}
