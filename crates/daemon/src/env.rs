//! Centralized environment variable access for the daemon crate. CLI flags
//! take precedence where both exist; see `config::Config::resolve`.

use std::path::PathBuf;
use std::time::Duration;

/// Resolve the daemon's state directory: `PROCD_STATE_DIR` >
/// `XDG_STATE_HOME/procd` > `~/.local/state/procd`.
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("PROCD_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("procd"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/procd"))
}

pub fn run_prefix() -> Option<PathBuf> {
    std::env::var("PROCD_RUN_PREFIX").ok().map(PathBuf::from)
}

pub fn tmp_prefix() -> Option<PathBuf> {
    std::env::var("PROCD_TMP_PREFIX").ok().map(PathBuf::from)
}

pub fn var_prefix() -> Option<PathBuf> {
    std::env::var("PROCD_VAR_PREFIX").ok().map(PathBuf::from)
}

pub fn client_port() -> Option<u16> {
    std::env::var("PROCD_CLIENT_PORT").ok().and_then(|s| s.parse().ok())
}

pub fn auth_token() -> Option<String> {
    std::env::var("PROCD_AUTH_TOKEN").ok().filter(|s| !s.is_empty())
}

pub fn ipc_timeout() -> Duration {
    millis_env("PROCD_IPC_TIMEOUT_MS").unwrap_or(Duration::from_secs(5))
}

pub fn catalogue_interval() -> Duration {
    millis_env("PROCD_CATALOGUE_INTERVAL_MS").unwrap_or(Duration::from_secs(300))
}

pub fn start_deadline() -> Option<Duration> {
    millis_env("PROCD_START_DEADLINE_MS")
}

pub fn work_deadline() -> Option<Duration> {
    millis_env("PROCD_WORK_DEADLINE_MS")
}

pub fn finish_kill_deadline() -> Option<Duration> {
    millis_env("PROCD_FINISH_KILL_MS")
}

pub fn term_kill_deadline() -> Option<Duration> {
    millis_env("PROCD_TERM_KILL_MS")
}

fn millis_env(key: &str) -> Option<Duration> {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}
