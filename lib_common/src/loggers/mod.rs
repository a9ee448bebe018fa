//! # Process Logging
//!
//! Installs the global `log` backend: every record goes to stdout and to a
//! per-run log file named `<app_name>_<timestamp>.log` in the log directory.
//! Only the newest earlier log file of the same application is kept.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Maps a textual level to a filter. Unknown values fall back to `info`.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Installs console and file logging for `app_name`.
///
/// # Returns
/// The path of the log file for this run.
///
/// # Errors
/// Fails if the log directory or file cannot be created, or a global logger
/// is already installed.
pub fn setup_logging(log_dir: &Path, log_level: &str, app_name: &str) -> Result<PathBuf> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    cleanup_old_logs(log_dir, app_name)?;

    let log_file_name = format!("{}_{}.log", app_name, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        // Connection pool internals are chatty at debug.
        .level_for("tokio_postgres", log::LevelFilter::Info)
        .level_for("hyper_util", log::LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    Ok(log_path)
}

/// Deletes all but the most recent `<app_name>_*.log` file in `log_dir`.
///
/// # Returns
/// The number of files deleted.
pub fn cleanup_old_logs(log_dir: &Path, app_name: &str) -> Result<usize> {
    let prefix = format!("{}_", app_name);
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "log"))
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| {
            let modified = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, e.path())
        })
        .collect();

    // Newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(1) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level(" warn "), log::LevelFilter::Warn);
        assert_eq!(parse_level("fatal"), log::LevelFilter::Info);
    }

    #[test]
    fn test_cleanup_keeps_one_file_per_app() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "server_devices_2024-01-01_00-00-00.log",
            "server_devices_2024-01-02_00-00-00.log",
            "server_devices_2024-01-03_00-00-00.log",
            "other_2024-01-01_00-00-00.log",
            "server_devices.conf",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        let removed = cleanup_old_logs(dir.path(), "server_devices").unwrap();
        assert_eq!(removed, 2);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left.len(), 3);
        assert!(left.contains(&"other_2024-01-01_00-00-00.log".to_string()));
        assert!(left.contains(&"server_devices.conf".to_string()));
    }
}
