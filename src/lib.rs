//! debrid-mount: supervised rclone WebDAV mounts for debrid providers
//!
//! Turns provider credentials into one local mount point per provider by
//! driving `rclone mount`.
//!
//! # Architecture
//!
//! - **Config Builder** (`rclone::config_file`): writes one WebDAV remote per
//!   provider with complete credentials into a private rclone config file.
//! - **Path Manager** (`paths`): creates mount points and recovers stale
//!   ones left behind by dead mount processes.
//! - **Remote Prober** (`rclone`): checks a remote is reachable before any
//!   mount is attempted.
//! - **Supervisor** (`supervisor`): probes, spawns and verifies each mount,
//!   publishing its state on a watch channel.
//! - **Orchestrator** (`orchestrator`): one sequential pass over all targets.
//!
//! # Example
//!
//! ```no_run
//! use debrid_mount::config::Config;
//! use debrid_mount::orchestrator::Orchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! config.validate()?;
//!
//! let orchestrator = Orchestrator::new(config);
//! for mut handle in orchestrator.run().await? {
//!     let state = handle.settled().await;
//!     println!("{}: {:?}", handle.target().remote_id, state);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod orchestrator;
pub mod organize;
pub mod paths;
pub mod policy;
pub mod process;
pub mod provider;
pub mod rclone;
pub mod supervisor;
pub mod testing;

pub use error::{MountError, Result};
