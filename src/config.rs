use std::path::PathBuf;
use std::time::Duration;

use crate::application::todo_store::WritePolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub log_file: PathBuf,
    pub write_policy: WritePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { database_url: "sqlite://todos.db".to_string(), log_file: PathBuf::from("todos.log"), write_policy: WritePolicy::default() }
    }
}

impl AppConfig {
    /// Reads configuration from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Self { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let retries = parse_or(&lookup, "TODOS_WRITE_RETRIES", defaults.write_policy.retries);
        let backoff_ms = parse_or(&lookup, "TODOS_WRITE_BACKOFF_MS", defaults.write_policy.backoff.as_millis() as u64);
        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            log_file: lookup("TODOS_LOG_FILE").map(PathBuf::from).unwrap_or(defaults.log_file),
            write_policy: WritePolicy { retries, backoff: Duration::from_millis(backoff_ms) },
        }
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid number, using default");
            default
        }),
    }
}

/// Makes sure a file-backed SQLite URL points at an existing file.
pub fn prepare_sqlite_file(database_url: &str) -> anyhow::Result<()> {
    if database_url.contains(":memory:") { return Ok(()); }
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        // On Windows, absolute paths may look like /C:/path; strip the leading slash
        let path = if cfg!(windows) && path.len() >= 3 && path.as_bytes()[0] == b'/' && path.as_bytes()[2] == b':' {
            &path[1..]
        } else {
            path
        };
        let path = path.split('?').next().unwrap_or(path);
        use std::{fs, fs::OpenOptions, path::Path};
        let p = Path::new(path);
        if let Some(parent) = p.parent() { if !parent.as_os_str().is_empty() { fs::create_dir_all(parent)?; } }
        if !p.exists() {
            OpenOptions::new().create(true).append(true).open(p)?;
        }
    }
    Ok(())
}
