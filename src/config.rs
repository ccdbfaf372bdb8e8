//! Configuration parsing and structures

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use humantime_serde::re::humantime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::env::substitute_env_vars;
use crate::provider::{ProviderKind, ProviderSpec};

/// Fallback umask when no explicit permission strings are configured
pub const DEFAULT_UMASK: &str = "002";
/// rclone log level used when the raw option string does not set one
pub const DEFAULT_RCLONE_LOG_LEVEL: &str = "INFO";
/// Host FUSE policy file
pub const DEFAULT_FUSE_CONF: &str = "/etc/fuse.conf";

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_VERIFY_DELAY: Duration = Duration::from_secs(3);

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Mount settings shared by every provider
    #[serde(default)]
    pub mount: RawMountSettings,

    /// Provider credentials
    #[serde(default)]
    pub providers: Vec<RawProviderConfig>,
}

/// Provider entry before defaults are applied
#[derive(Debug, Clone, Deserialize)]
pub struct RawProviderConfig {
    /// Provider name (`realdebrid` or `torbox`)
    pub name: ProviderKind,

    /// WebDAV endpoint; defaults to the provider's public endpoint
    pub url: Option<String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Mount settings before resolution; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMountSettings {
    /// Directory holding one mount point per provider
    pub base_dir: Option<PathBuf>,

    /// Directory for the generated rclone config and per-remote logs
    pub work_dir: Option<PathBuf>,

    /// rclone executable
    pub rclone_path: Option<PathBuf>,

    /// Request `--allow-other` when the host permits it
    pub allow_other: Option<bool>,

    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub dir_perms: Option<String>,
    pub file_perms: Option<String>,
    pub umask: Option<String>,

    /// rclone `--log-level`
    pub log_level: Option<String>,

    /// Raw rclone option string, passed through verbatim
    pub options: Option<String>,

    /// Individually configurable performance flags
    pub performance: Option<PerformanceFlags>,

    /// Timeout for the pre-mount reachability probe (e.g., "20s")
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Option<Duration>,

    /// Timeout for short helper commands such as `rclone obscure`
    #[serde(with = "humantime_serde")]
    pub command_timeout: Option<Duration>,

    /// Delay before the post-mount verification listing
    #[serde(with = "humantime_serde")]
    pub verify_delay: Option<Duration>,

    /// FUSE policy file consulted before requesting `--allow-other`
    pub fuse_conf: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Mount settings (fully resolved)
    pub mount: MountSettings,

    /// One entry per configured provider
    pub providers: Vec<ProviderSpec>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Mount settings (resolved)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSettings {
    pub base_dir: PathBuf,
    pub work_dir: PathBuf,
    pub rclone_path: PathBuf,
    pub allow_other: bool,
    pub ownership: Ownership,
    pub permissions: Permissions,
    pub log_level: String,
    pub options: MountOptions,
    pub probe_timeout: Duration,
    pub command_timeout: Duration,
    pub verify_delay: Duration,
    pub fuse_conf: PathBuf,
}

impl MountSettings {
    /// Path of the generated rclone config
    pub fn rclone_config_path(&self) -> PathBuf {
        self.work_dir.join("rclone.conf")
    }

    /// Per-remote rclone log file
    pub fn log_file(&self, remote_id: &str) -> PathBuf {
        self.work_dir.join(format!("rclone-{}.log", remote_id))
    }
}

/// Explicit uid/gid for mounted files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Permission strings for mounted entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permissions {
    pub dir_perms: Option<String>,
    pub file_perms: Option<String>,
    /// Applied only when neither `dir_perms` nor `file_perms` is set
    pub umask: String,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            dir_perms: None,
            file_perms: None,
            umask: DEFAULT_UMASK.to_string(),
        }
    }
}

/// The two mutually exclusive option strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOptions {
    /// User-supplied option string, split on whitespace and passed verbatim
    Raw(String),
    /// Individually configured performance flags
    Structured(PerformanceFlags),
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions::Structured(PerformanceFlags::default())
    }
}

/// rclone VFS cache mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VfsCacheMode {
    Off,
    Minimal,
    Writes,
    #[default]
    Full,
}

impl VfsCacheMode {
    pub fn as_str(self) -> &'static str {
        match self {
            VfsCacheMode::Off => "off",
            VfsCacheMode::Minimal => "minimal",
            VfsCacheMode::Writes => "writes",
            VfsCacheMode::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Some(VfsCacheMode::Off),
            "minimal" => Some(VfsCacheMode::Minimal),
            "writes" => Some(VfsCacheMode::Writes),
            "full" => Some(VfsCacheMode::Full),
            _ => None,
        }
    }
}

/// Individually configurable rclone performance flags
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PerformanceFlags {
    pub vfs_cache_mode: VfsCacheMode,
    /// `--dir-cache-time` (e.g., "12h")
    pub dir_cache_time: String,
    /// `--buffer-size` (e.g., "64M")
    pub buffer_size: String,
    /// `--poll-interval`; "0" disables polling
    pub poll_interval: String,
    pub vfs_read_chunk_size: Option<String>,
    pub vfs_read_chunk_size_limit: Option<String>,
    pub vfs_cache_max_age: Option<String>,
    pub vfs_cache_max_size: Option<String>,
}

impl Default for PerformanceFlags {
    fn default() -> Self {
        Self {
            vfs_cache_mode: VfsCacheMode::Full,
            dir_cache_time: "12h".to_string(),
            buffer_size: "64M".to_string(),
            poll_interval: "0".to_string(),
            vfs_read_chunk_size: None,
            vfs_read_chunk_size_limit: None,
            vfs_cache_max_age: None,
            vfs_cache_max_size: None,
        }
    }
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by applying defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            mount,
            providers,
        } = self;

        let providers = providers
            .into_iter()
            .map(|p| ProviderSpec {
                kind: p.name,
                webdav_url: p
                    .url
                    .unwrap_or_else(|| p.name.default_url().to_string()),
                username: p.username,
                password: p.password,
                enabled: p.enabled,
            })
            .collect();

        Ok(Config {
            logging,
            mount: Self::resolve_mount(mount)?,
            providers,
        })
    }

    fn resolve_mount(raw: RawMountSettings) -> Result<MountSettings, ConfigError> {
        let raw_options = raw.options.filter(|s| !s.trim().is_empty());
        let options = match (raw_options, raw.performance) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::ValidationError(
                    "mount.options and mount.performance are mutually exclusive".to_string(),
                ))
            }
            (Some(raw), None) => MountOptions::Raw(raw),
            (None, performance) => MountOptions::Structured(performance.unwrap_or_default()),
        };

        Ok(MountSettings {
            base_dir: raw.base_dir.unwrap_or_else(default_mount_base),
            work_dir: raw.work_dir.unwrap_or_else(default_work_dir),
            rclone_path: raw.rclone_path.unwrap_or_else(|| PathBuf::from("rclone")),
            allow_other: raw.allow_other.unwrap_or(true),
            ownership: Ownership {
                uid: raw.uid,
                gid: raw.gid,
            },
            permissions: Permissions {
                dir_perms: non_blank(raw.dir_perms),
                file_perms: non_blank(raw.file_perms),
                umask: non_blank(raw.umask).unwrap_or_else(|| DEFAULT_UMASK.to_string()),
            },
            log_level: non_blank(raw.log_level)
                .unwrap_or_else(|| DEFAULT_RCLONE_LOG_LEVEL.to_string()),
            options,
            probe_timeout: raw.probe_timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT),
            command_timeout: raw.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            verify_delay: raw.verify_delay.unwrap_or(DEFAULT_VERIFY_DELAY),
            fuse_conf: raw
                .fuse_conf
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FUSE_CONF)),
        })
    }

    /// Build a raw config from environment-style variables.
    ///
    /// `lookup` returns the value of a variable, or `None` if unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let enabled: HashSet<ProviderKind> = get("PROVIDERS")
            .unwrap_or_else(|| "torbox,realdebrid".to_string())
            .split(',')
            .filter_map(ProviderKind::parse)
            .collect();

        let providers = ProviderKind::ALL
            .iter()
            .map(|&kind| {
                let prefix = match kind {
                    ProviderKind::RealDebrid => "RD",
                    ProviderKind::TorBox => "TORBOX",
                };
                RawProviderConfig {
                    name: kind,
                    url: get(&format!("{}_WEBDAV_URL", prefix)),
                    username: get(&format!("{}_WEBDAV_USERNAME", prefix)).unwrap_or_default(),
                    password: get(&format!("{}_WEBDAV_PASSWORD", prefix)).unwrap_or_default(),
                    enabled: enabled.contains(&kind),
                }
            })
            .collect();

        let parse_id = |primary: &str, fallback: &str| -> Result<Option<u32>, ConfigError> {
            match get(primary).or_else(|| get(fallback)) {
                Some(v) => v.trim().parse::<u32>().map(Some).map_err(|_| {
                    ConfigError::ValidationError(format!("{} must be a number, got {:?}", primary, v))
                }),
                None => Ok(None),
            }
        };

        let allow_other = get("MOUNT_ALLOW_OTHER").map(|v| v.trim().eq_ignore_ascii_case("true"));

        let vfs_cache_mode = match get("MOUNT_VFS_CACHE_MODE") {
            Some(v) => VfsCacheMode::parse(&v).ok_or_else(|| {
                ConfigError::ValidationError(format!("Unknown MOUNT_VFS_CACHE_MODE {:?}", v))
            })?,
            None => VfsCacheMode::default(),
        };
        let defaults = PerformanceFlags::default();
        let performance = PerformanceFlags {
            vfs_cache_mode,
            dir_cache_time: get("MOUNT_DIR_CACHE_TIME").unwrap_or(defaults.dir_cache_time),
            buffer_size: get("MOUNT_BUFFER_SIZE").unwrap_or(defaults.buffer_size),
            poll_interval: get("MOUNT_POLL_INTERVAL").unwrap_or(defaults.poll_interval),
            vfs_read_chunk_size: get("MOUNT_VFS_READ_CHUNK_SIZE"),
            vfs_read_chunk_size_limit: get("MOUNT_VFS_READ_CHUNK_SIZE_LIMIT"),
            vfs_cache_max_age: get("MOUNT_VFS_CACHE_MAX_AGE"),
            vfs_cache_max_size: get("MOUNT_VFS_CACHE_MAX_SIZE"),
        };
        let options = get("MOUNT_OPTIONS");
        let performance = if options.is_some() {
            None
        } else {
            Some(performance)
        };

        Ok(RawConfig {
            logging: LoggingConfig {
                level: get("LOG_LEVEL").unwrap_or_else(default_log_level),
            },
            mount: RawMountSettings {
                base_dir: get("MOUNT_BASE").map(PathBuf::from),
                work_dir: None,
                rclone_path: get("RCLONE_PATH").map(PathBuf::from),
                allow_other,
                uid: parse_id("MOUNT_UID", "PUID")?,
                gid: parse_id("MOUNT_GID", "PGID")?,
                dir_perms: get("MOUNT_DIR_PERMS"),
                file_perms: get("MOUNT_FILE_PERMS"),
                umask: None,
                log_level: None,
                options,
                performance,
                probe_timeout: None,
                command_timeout: None,
                verify_delay: None,
                fuse_conf: None,
            },
            providers,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_mount_base() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Volumes/SchroDrive")
    } else {
        PathBuf::from("/mnt/schrodrive")
    }
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("schrodrive")
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        RawConfig::from_lookup(|key| std::env::var(key).ok())?.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // One mount path per provider kind
        let mut kinds = HashSet::new();
        for provider in &self.providers {
            if !kinds.insert(provider.kind) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate provider: {}",
                    provider.kind
                )));
            }
        }

        let mount = &self.mount;
        if mount.probe_timeout.is_zero() || mount.command_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "probe_timeout and command_timeout must be non-zero".to_string(),
            ));
        }
        if mount.verify_delay.is_zero() {
            return Err(ConfigError::ValidationError(
                "verify_delay must be non-zero".to_string(),
            ));
        }

        let perms = &mount.permissions;
        for (name, value) in [
            ("dir_perms", perms.dir_perms.as_deref()),
            ("file_perms", perms.file_perms.as_deref()),
            ("umask", Some(perms.umask.as_str())),
        ] {
            if let Some(value) = value {
                if parse_mode(value).is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "{} must be an octal mode, got {:?}",
                        name, value
                    )));
                }
            }
        }

        if let MountOptions::Structured(flags) = &mount.options {
            flags.validate()?;
        }

        Ok(())
    }
}

impl PerformanceFlags {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("dir_cache_time", Some(&self.dir_cache_time)),
            ("poll_interval", Some(&self.poll_interval)),
            ("vfs_cache_max_age", self.vfs_cache_max_age.as_ref()),
        ] {
            if let Some(value) = value {
                if parse_duration(value).is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "{} is not a duration: {:?}",
                        name, value
                    )));
                }
            }
        }

        for (name, value) in [
            ("buffer_size", Some(&self.buffer_size)),
            ("vfs_read_chunk_size", self.vfs_read_chunk_size.as_ref()),
            ("vfs_read_chunk_size_limit", self.vfs_read_chunk_size_limit.as_ref()),
            ("vfs_cache_max_size", self.vfs_cache_max_size.as_ref()),
        ] {
            if let Some(value) = value {
                if parse_size(value).is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "{} is not a size: {:?}",
                        name, value
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Parse an rclone size like "64M", "1Gi" or "1.5G" to bytes. "off" means
/// unlimited.
pub fn parse_size(s: &str) -> Option<u64> {
    let upper = s.trim().to_uppercase();
    if upper == "OFF" {
        return Some(u64::MAX);
    }
    let s = upper.as_str();
    let s = s.strip_suffix('B').unwrap_or(s);
    let s = s.strip_suffix('I').unwrap_or(s);
    let (num_part, multiplier): (&str, u64) = match s.chars().last()? {
        'K' => (&s[..s.len() - 1], 1 << 10),
        'M' => (&s[..s.len() - 1], 1 << 20),
        'G' => (&s[..s.len() - 1], 1 << 30),
        'T' => (&s[..s.len() - 1], 1 << 40),
        'P' => (&s[..s.len() - 1], 1 << 50),
        _ => (s, 1),
    };
    let num_part = num_part.trim();

    if let Ok(whole) = num_part.parse::<u64>() {
        return whole.checked_mul(multiplier);
    }

    let value = num_part.parse::<f64>().ok()?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
        return None;
    }
    Some(bytes.round() as u64)
}

/// One `<number><unit>` piece of an rclone duration, e.g. "1.5h" or "30m"
static DURATION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|s|m|h|d|w|M|y)").unwrap()
});

fn unit_nanos(unit: &str) -> Option<f64> {
    let nanos = match unit {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60.0 * 1e9,
        "h" => 3600.0 * 1e9,
        "d" => 86_400.0 * 1e9,
        "w" => 7.0 * 86_400.0 * 1e9,
        "M" => 30.0 * 86_400.0 * 1e9,
        "y" => 365.0 * 86_400.0 * 1e9,
        _ => return None,
    };
    Some(nanos)
}

/// Sum of `<number><unit>` pieces that cover `s` exactly
fn parse_unit_duration(s: &str) -> Option<Duration> {
    let mut end = 0;
    let mut nanos = 0.0;
    for caps in DURATION_PART.captures_iter(s) {
        let whole = caps.get(0)?;
        if whole.start() != end {
            return None;
        }
        end = whole.end();
        nanos += caps[1].parse::<f64>().ok()? * unit_nanos(&caps[2])?;
    }
    if end == 0 || end != s.len() || !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos.round() as u64))
}

/// Parse an rclone duration like "12h", "1.5h", "1h30m" or "0"
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s == "0" || s.eq_ignore_ascii_case("off") {
        return Some(Duration::ZERO);
    }
    parse_unit_duration(s).or_else(|| humantime::parse_duration(s).ok())
}

/// Parse an octal permission string like "0755"
pub fn parse_mode(s: &str) -> Option<u32> {
    u32::from_str_radix(s.trim(), 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
logging:
  level: debug

mount:
  base_dir: /mnt/debrid
  work_dir: /tmp/debrid
  rclone_path: /usr/local/bin/rclone
  uid: 1000
  gid: 1000
  verify_delay: 5s
  performance:
    vfs_cache_mode: writes
    buffer_size: 32M
    vfs_cache_max_size: 10G

providers:
  - name: realdebrid
    username: alice
    password: secret
  - name: torbox
    url: https://webdav.example
    username: bob
    password: hunter2
    enabled: false
"#;

        let config = Config::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.mount.base_dir, PathBuf::from("/mnt/debrid"));
        assert_eq!(config.mount.ownership.uid, Some(1000));
        assert_eq!(config.mount.verify_delay, Duration::from_secs(5));
        assert_eq!(
            config.mount.rclone_config_path(),
            PathBuf::from("/tmp/debrid/rclone.conf")
        );

        match &config.mount.options {
            MountOptions::Structured(flags) => {
                assert_eq!(flags.vfs_cache_mode, VfsCacheMode::Writes);
                assert_eq!(flags.buffer_size, "32M");
                assert_eq!(flags.dir_cache_time, "12h");
                assert_eq!(flags.vfs_cache_max_size, Some("10G".to_string()));
            }
            _ => panic!("Expected structured options"),
        }

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::RealDebrid);
        assert_eq!(config.providers[0].webdav_url, "https://dav.real-debrid.com");
        assert!(config.providers[0].enabled);
        assert_eq!(config.providers[1].webdav_url, "https://webdav.example");
        assert!(!config.providers[1].enabled);
    }

    #[test]
    fn test_raw_options_selected() {
        let yaml = r#"
mount:
  options: "--vfs-cache-mode=full --log-level=DEBUG"
providers: []
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(
            config.mount.options,
            MountOptions::Raw("--vfs-cache-mode=full --log-level=DEBUG".to_string())
        );
    }

    #[test]
    fn test_blank_raw_options_fall_back_to_structured() {
        let yaml = r#"
mount:
  options: "   "
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.mount.options, MountOptions::default());
    }

    #[test]
    fn test_both_option_strategies_rejected() {
        let yaml = r#"
mount:
  options: "--buffer-size=16M"
  performance:
    buffer_size: 32M
"#;
        let err = Config::from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"), "{}", err);
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let yaml = r#"
providers:
  - name: torbox
    username: a
    password: b
  - name: torbox
    username: c
    password: d
"#;
        let config = Config::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate provider"), "{}", err);
    }

    #[test]
    fn test_invalid_permissions_rejected() {
        let yaml = r#"
mount:
  dir_perms: "0799"
"#;
        let config = Config::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_size_rejected() {
        let yaml = r#"
mount:
  performance:
    buffer_size: lots
"#;
        let config = Config::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buffer_size"), "{}", err);
    }

    #[test]
    fn test_env_substitution_in_yaml() {
        std::env::set_var("DEBRID_MOUNT_TEST_PASSWORD", "from-env");
        let yaml = r#"
providers:
  - name: realdebrid
    username: alice
    password: ${DEBRID_MOUNT_TEST_PASSWORD}
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.providers[0].password, "from-env");
        std::env::remove_var("DEBRID_MOUNT_TEST_PASSWORD");
    }

    #[test]
    fn test_from_lookup_defaults() {
        let raw = RawConfig::from_lookup(lookup(&[
            ("TORBOX_WEBDAV_USERNAME", "bob"),
            ("TORBOX_WEBDAV_PASSWORD", "pw"),
        ]))
        .unwrap();
        let config = raw.resolve().unwrap();
        config.validate().unwrap();

        assert_eq!(config.providers.len(), 2);
        let torbox = config
            .providers
            .iter()
            .find(|p| p.kind == ProviderKind::TorBox)
            .unwrap();
        assert!(torbox.is_mountable());
        assert_eq!(torbox.webdav_url, "https://webdav.torbox.app");

        let rd = config
            .providers
            .iter()
            .find(|p| p.kind == ProviderKind::RealDebrid)
            .unwrap();
        assert!(rd.enabled);
        assert!(!rd.is_mountable());

        assert!(config.mount.allow_other);
        assert_eq!(config.mount.options, MountOptions::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let raw = RawConfig::from_lookup(lookup(&[
            ("PROVIDERS", "realdebrid"),
            ("MOUNT_BASE", "/data/mnt"),
            ("MOUNT_ALLOW_OTHER", "false"),
            ("PUID", "1001"),
            ("MOUNT_GID", "1002"),
            ("PGID", "9999"),
            ("MOUNT_OPTIONS", "--vfs-cache-mode=writes"),
        ]))
        .unwrap();
        let config = raw.resolve().unwrap();

        let torbox = config
            .providers
            .iter()
            .find(|p| p.kind == ProviderKind::TorBox)
            .unwrap();
        assert!(!torbox.enabled);
        assert_eq!(config.mount.base_dir, PathBuf::from("/data/mnt"));
        assert!(!config.mount.allow_other);
        assert_eq!(config.mount.ownership.uid, Some(1001));
        assert_eq!(config.mount.ownership.gid, Some(1002));
        assert_eq!(
            config.mount.options,
            MountOptions::Raw("--vfs-cache-mode=writes".to_string())
        );
    }

    #[test]
    fn test_from_lookup_bad_uid() {
        let result = RawConfig::from_lookup(lookup(&[("MOUNT_UID", "root")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("64M"), Some(64 * 1024 * 1024));
        assert_eq!(parse_size("1G"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size("1GiB"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size("512k"), Some(512 * 1024));
        assert_eq!(parse_size("1024"), Some(1024));
        assert_eq!(parse_size("off"), Some(u64::MAX));
        assert_eq!(parse_size("M"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn test_parse_fractional_size() {
        assert_eq!(parse_size("1.5G"), Some(3 * 512 * 1024 * 1024));
        assert_eq!(parse_size("0.5M"), Some(512 * 1024));
        assert_eq!(parse_size(".25k"), Some(256));
        assert_eq!(parse_size("-1.5G"), None);
        assert_eq!(parse_size("1.5.5G"), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("12h"), Some(Duration::from_secs(12 * 3600)));
        assert_eq!(parse_duration("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_parse_fractional_duration() {
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("0.5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2d"), Some(Duration::from_secs(2 * 86_400)));
        assert_eq!(parse_duration("1.5x"), None);
        assert_eq!(parse_duration("h"), None);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("0755"), Some(0o755));
        assert_eq!(parse_mode("002"), Some(0o002));
        assert_eq!(parse_mode("888"), None);
        assert_eq!(parse_mode("17777"), None);
    }
}
