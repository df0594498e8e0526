use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "cricket_ingest";
const DB_FILE: &str = "cricket.sqlite";
const DEFAULT_DATA_DIR: &str = "t20s_male_json";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DECODE_BATCH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Directory holding one match document per file.
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Upper bound on how long a single store operation waits for a lock.
    pub busy_timeout: Duration,
    /// Files decoded in parallel ahead of the sequential persist loop.
    pub decode_batch: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            db_path: default_db_path().unwrap_or_else(|| PathBuf::from(DB_FILE)),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            decode_batch: DEFAULT_DECODE_BATCH,
        }
    }
}

impl IngestConfig {
    /// Defaults overridden by `CRICKET_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env_path("CRICKET_DATA_DIR") {
            config.data_dir = dir;
        }
        if let Some(db) = env_path("CRICKET_DB_PATH") {
            config.db_path = db;
        }
        if let Some(ms) = env_parse::<u64>("CRICKET_BUSY_TIMEOUT_MS") {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(batch) = env_parse::<usize>("CRICKET_DECODE_BATCH") {
            config.decode_batch = batch.max(1);
        }
        config
    }

    /// Applies `--dir` and `--db` flags, in either `--flag value` or
    /// `--flag=value` form.
    pub fn apply_args(mut self, args: &[String]) -> Self {
        if let Some(dir) = arg_value(args, "--dir") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = arg_value(args, "--db") {
            self.db_path = PathBuf::from(db);
        }
        self
    }
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg
            .strip_prefix(flag)
            .and_then(|rest| rest.strip_prefix('='))
        {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim());
            }
        }
    }
    None
}

fn env_path(key: &str) -> Option<PathBuf> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_accept_both_forms() {
        let config =
            IngestConfig::default().apply_args(&args(&["--dir", "data", "--db=/tmp/x.sqlite"]));
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.sqlite"));
    }

    #[test]
    fn empty_flag_values_are_ignored() {
        let base = IngestConfig::default();
        let config = base.clone().apply_args(&args(&["--dir=", "--db"]));
        assert_eq!(config, base);
    }

    #[test]
    fn unrelated_flag_with_shared_prefix_is_ignored() {
        let base = IngestConfig::default();
        let config = base.clone().apply_args(&args(&["--dirty=yes"]));
        assert_eq!(config.data_dir, base.data_dir);
    }
}
