//! `rclone mount` argument assembly
//!
//! Order is fixed: base flags, `--allow-other` (host permitting),
//! `--allow-non-empty`, one option strategy, ownership and permissions,
//! logging, and `--daemon` last.

use std::path::Path;

use crate::config::{MountOptions, MountSettings, PerformanceFlags};
use crate::supervisor::MountTarget;

/// Build the full argument list for mounting `target`.
///
/// Pure: identical inputs always produce identical output.
pub fn mount_args(
    target: &MountTarget,
    settings: &MountSettings,
    config_path: &Path,
    allow_other: bool,
) -> Vec<String> {
    let mut args = vec![
        "mount".to_string(),
        format!("{}:", target.remote_id),
        target.local_path.display().to_string(),
        "--config".to_string(),
        config_path.display().to_string(),
    ];

    if allow_other {
        args.push("--allow-other".to_string());
    }

    // Mount points are pre-created, so rclone always sees them as non-empty
    args.push("--allow-non-empty".to_string());

    match &settings.options {
        MountOptions::Raw(raw) => args.extend(split_raw_options(raw)),
        MountOptions::Structured(flags) => args.extend(performance_args(flags)),
    }

    let ownership = &settings.ownership;
    if let Some(uid) = ownership.uid {
        args.push(format!("--uid={}", uid));
    }
    if let Some(gid) = ownership.gid {
        args.push(format!("--gid={}", gid));
    }

    let perms = &settings.permissions;
    if let Some(dir_perms) = &perms.dir_perms {
        args.push(format!("--dir-perms={}", dir_perms));
    }
    if let Some(file_perms) = &perms.file_perms {
        args.push(format!("--file-perms={}", file_perms));
    }
    if perms.dir_perms.is_none() && perms.file_perms.is_none() {
        args.push(format!("--umask={}", perms.umask));
    }

    if !raw_sets_log_level(&settings.options) {
        args.push(format!("--log-level={}", settings.log_level));
    }
    args.push(format!("--log-file={}", target.log_file.display()));

    args.push("--daemon".to_string());
    args
}

/// Split a raw option string on whitespace
pub fn split_raw_options(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split_whitespace().map(str::to_string)
}

fn performance_args(flags: &PerformanceFlags) -> Vec<String> {
    let mut args = vec![
        format!("--vfs-cache-mode={}", flags.vfs_cache_mode.as_str()),
        format!("--dir-cache-time={}", flags.dir_cache_time),
        format!("--buffer-size={}", flags.buffer_size),
        format!("--poll-interval={}", flags.poll_interval),
    ];

    let optional = [
        ("--vfs-read-chunk-size", &flags.vfs_read_chunk_size),
        ("--vfs-read-chunk-size-limit", &flags.vfs_read_chunk_size_limit),
        ("--vfs-cache-max-age", &flags.vfs_cache_max_age),
        ("--vfs-cache-max-size", &flags.vfs_cache_max_size),
    ];
    for (flag, value) in optional {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            args.push(format!("{}={}", flag, value));
        }
    }

    args
}

/// Whether the raw options already choose a log level. rclone refuses
/// `--log-level` combined with `-v`/`-q` style flags.
fn raw_sets_log_level(options: &MountOptions) -> bool {
    match options {
        MountOptions::Raw(raw) => raw.split_whitespace().any(sets_log_level),
        MountOptions::Structured(_) => false,
    }
}

fn sets_log_level(token: &str) -> bool {
    let flag = token.split('=').next().unwrap_or(token);
    match flag {
        "--log-level" | "--verbose" | "--quiet" | "-q" => true,
        // -v, -vv, -vvv
        _ => flag
            .strip_prefix('-')
            .map(|rest| !rest.is_empty() && rest.chars().all(|c| c == 'v'))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::config::{Ownership, Permissions, VfsCacheMode};
    use crate::provider::ProviderKind;

    fn settings(options: MountOptions) -> MountSettings {
        MountSettings {
            base_dir: PathBuf::from("/mnt/schrodrive"),
            work_dir: PathBuf::from("/tmp/schrodrive"),
            rclone_path: PathBuf::from("rclone"),
            allow_other: true,
            ownership: Ownership::default(),
            permissions: Permissions::default(),
            log_level: "INFO".to_string(),
            options,
            probe_timeout: Duration::from_secs(20),
            command_timeout: Duration::from_secs(10),
            verify_delay: Duration::from_secs(3),
            fuse_conf: PathBuf::from("/etc/fuse.conf"),
        }
    }

    fn target(settings: &MountSettings) -> MountTarget {
        MountTarget::new(ProviderKind::RealDebrid, settings)
    }

    fn args_for(settings: &MountSettings, allow_other: bool) -> Vec<String> {
        mount_args(
            &target(settings),
            settings,
            Path::new("/tmp/schrodrive/rclone.conf"),
            allow_other,
        )
    }

    #[test]
    fn test_default_structured_args() {
        let s = settings(MountOptions::default());
        assert_eq!(
            args_for(&s, true),
            vec![
                "mount",
                "rd:",
                "/mnt/schrodrive/realdebrid",
                "--config",
                "/tmp/schrodrive/rclone.conf",
                "--allow-other",
                "--allow-non-empty",
                "--vfs-cache-mode=full",
                "--dir-cache-time=12h",
                "--buffer-size=64M",
                "--poll-interval=0",
                "--umask=002",
                "--log-level=INFO",
                "--log-file=/tmp/schrodrive/rclone-rd.log",
                "--daemon",
            ]
        );
    }

    #[test]
    fn test_allow_other_omitted_when_not_permitted() {
        let s = settings(MountOptions::default());
        let args = args_for(&s, false);
        assert!(!args.iter().any(|a| a == "--allow-other"));
        assert!(args.iter().any(|a| a == "--allow-non-empty"));
    }

    #[test]
    fn test_raw_options_passed_verbatim() {
        let s = settings(MountOptions::Raw(
            "  --vfs-cache-mode=writes   --buffer-size=16M ".to_string(),
        ));
        let args = args_for(&s, true);

        let start = args.iter().position(|a| a == "--allow-non-empty").unwrap() + 1;
        assert_eq!(
            &args[start..start + 2],
            &["--vfs-cache-mode=writes", "--buffer-size=16M"]
        );
        assert!(!args.iter().any(|a| a.starts_with("--dir-cache-time")));
        assert!(!args.iter().any(|a| a.starts_with("--poll-interval")));
    }

    #[test]
    fn test_strategies_never_merged() {
        let structured = args_for(&settings(MountOptions::default()), true);
        let raw = args_for(
            &settings(MountOptions::Raw("--read-only".to_string())),
            true,
        );

        assert!(!structured.iter().any(|a| a == "--read-only"));
        for flag in ["--vfs-cache-mode", "--dir-cache-time", "--buffer-size", "--poll-interval"] {
            assert!(!raw.iter().any(|a| a.starts_with(flag)), "{} leaked", flag);
        }
    }

    #[test]
    fn test_raw_log_level_not_duplicated() {
        let s = settings(MountOptions::Raw("--log-level=DEBUG".to_string()));
        let args = args_for(&s, true);
        let levels: Vec<_> = args.iter().filter(|a| a.starts_with("--log-level")).collect();
        assert_eq!(levels, vec!["--log-level=DEBUG"]);
        assert!(args.iter().any(|a| a.starts_with("--log-file=")));

        let s = settings(MountOptions::Raw("--log-level NOTICE".to_string()));
        let args = args_for(&s, true);
        assert!(!args.iter().any(|a| a == "--log-level=INFO"));
    }

    #[test]
    fn test_raw_verbosity_flags_suppress_log_level() {
        for raw in [
            "--vfs-cache-mode=full -v",
            "--vfs-cache-mode=full -vv",
            "-vvv --buffer-size=16M",
            "--verbose",
            "--verbose=2",
            "-q",
            "--quiet",
        ] {
            let args = args_for(&settings(MountOptions::Raw(raw.to_string())), true);
            assert!(
                !args.iter().any(|a| a.starts_with("--log-level")),
                "{:?} still got --log-level",
                raw
            );
            assert!(args.iter().any(|a| a.starts_with("--log-file=")));
        }
    }

    #[test]
    fn test_lookalike_flags_keep_log_level() {
        for raw in ["--vfs-cache-mode=full", "-vx", "--vfs-read-chunk-size=32M", "-"] {
            let args = args_for(&settings(MountOptions::Raw(raw.to_string())), true);
            assert!(args.contains(&"--log-level=INFO".to_string()), "{:?}", raw);
        }
    }

    #[test]
    fn test_optional_performance_flags() {
        let flags = PerformanceFlags {
            vfs_cache_mode: VfsCacheMode::Writes,
            vfs_read_chunk_size: Some("32M".to_string()),
            vfs_read_chunk_size_limit: Some(" ".to_string()),
            vfs_cache_max_age: Some("24h".to_string()),
            vfs_cache_max_size: Some("20G".to_string()),
            ..PerformanceFlags::default()
        };
        let args = args_for(&settings(MountOptions::Structured(flags)), true);

        assert!(args.contains(&"--vfs-cache-mode=writes".to_string()));
        assert!(args.contains(&"--vfs-read-chunk-size=32M".to_string()));
        assert!(args.contains(&"--vfs-cache-max-age=24h".to_string()));
        assert!(args.contains(&"--vfs-cache-max-size=20G".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--vfs-read-chunk-size-limit")));
    }

    #[test]
    fn test_ownership_and_explicit_permissions() {
        let mut s = settings(MountOptions::default());
        s.ownership = Ownership {
            uid: Some(1000),
            gid: Some(100),
        };
        s.permissions.dir_perms = Some("0775".to_string());
        let args = args_for(&s, true);

        assert!(args.contains(&"--uid=1000".to_string()));
        assert!(args.contains(&"--gid=100".to_string()));
        assert!(args.contains(&"--dir-perms=0775".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--file-perms")));
        assert!(!args.iter().any(|a| a.starts_with("--umask")));
    }

    #[test]
    fn test_daemon_is_last() {
        let s = settings(MountOptions::Raw("--daemon-timeout=10s".to_string()));
        assert_eq!(args_for(&s, false).last().map(String::as_str), Some("--daemon"));
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let s = settings(MountOptions::Raw("--vfs-cache-mode=full".to_string()));
        let first = args_for(&s, true);
        for _ in 0..5 {
            assert_eq!(args_for(&s, true), first);
        }
    }
}
