//! One orchestration pass: credentials in, supervised mounts out

use std::sync::Arc;

use tracing::{error, info};

use crate::config::Config;
use crate::error::Result;
use crate::paths::{MountHost, PathManager, SystemHost};
use crate::policy::HostPolicy;
use crate::process::{CommandRunner, SystemRunner};
use crate::rclone::{ConfigBuilder, Rclone, RemoteDefinition};
use crate::supervisor::{MountHandle, MountTarget, Supervisor};

/// Owns the rclone client and host access for the lifetime of the process
pub struct Orchestrator {
    config: Config,
    rclone: Rclone,
    paths: PathManager,
    supervisor: Supervisor,
}

impl Orchestrator {
    /// Orchestrator backed by the real host and rclone binary
    pub fn new(config: Config) -> Self {
        Self::with_collaborators(config, Arc::new(SystemRunner), Arc::new(SystemHost))
    }

    pub fn with_collaborators(
        config: Config,
        runner: Arc<dyn CommandRunner>,
        host: Arc<dyn MountHost>,
    ) -> Self {
        let rclone = Rclone::from_settings(runner, &config.mount);
        let paths = PathManager::new(host.clone(), config.mount.command_timeout);
        let supervisor = Supervisor::new(
            rclone.clone(),
            host,
            HostPolicy::new(&config.mount.fuse_conf),
            config.mount.clone(),
        );

        Self {
            config,
            rclone,
            paths,
            supervisor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One target per remote definition
    pub fn targets(&self, remotes: &[RemoteDefinition]) -> Vec<MountTarget> {
        remotes
            .iter()
            .map(|remote| MountTarget::new(remote.provider, &self.config.mount))
            .collect()
    }

    /// Run one pass over every mountable provider, one target at a time.
    ///
    /// Fails only if nothing can be mounted at all: no provider is
    /// configured, or the shared base directory is unusable. Per-target
    /// problems are logged and reflected in that target's handle.
    pub async fn run(&self) -> Result<Vec<MountHandle>> {
        let settings = &self.config.mount;

        let builder = ConfigBuilder::new(&self.rclone, &self.paths, settings.rclone_config_path());
        let rclone_config = builder.build(&self.config.providers).await.map_err(|e| {
            error!("Cannot build rclone config: {}", e);
            e
        })?;

        // Possibly a host bind mount: never force-unmounted
        self.paths
            .ensure_dir_async(settings.base_dir.clone(), false)
            .await
            .map_err(|e| {
                error!("Base mount directory {:?} unusable: {}", settings.base_dir, e);
                e
            })?;

        let mut handles = Vec::new();
        for target in self.targets(&rclone_config.remotes) {
            if let Err(e) = self
                .paths
                .ensure_dir_async(target.local_path.clone(), true)
                .await
            {
                error!(
                    remote = %target.remote_id,
                    path = ?target.local_path,
                    "Mount point unusable: {}",
                    e
                );
                handles.push(MountHandle::failed(target, e.to_string()));
                continue;
            }

            handles.push(self.supervisor.supervise(target, &rclone_config.path).await);
        }

        info!("Mounts initiated at {:?}", settings.base_dir);
        Ok(handles)
    }
}
