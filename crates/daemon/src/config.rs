//! Resolved daemon configuration and the filesystem layout it implies.

use procd_core::Deadlines;
use std::path::PathBuf;
use std::time::Duration;

/// CLI flags accepted by the `procd` binary, pre-merge with environment
/// defaults. Kept separate from [`Config`] so `clap`'s `Option<T>` fields
/// don't leak into the rest of the crate.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub name: Option<String>,
    pub client_port: Option<u16>,
    pub run_prefix: Option<PathBuf>,
    pub tmp_prefix: Option<PathBuf>,
    pub var_prefix: Option<PathBuf>,
    pub debug: bool,
}

/// Fully resolved daemon configuration: CLI flags win, then environment
/// variables, then built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub run_prefix: PathBuf,
    pub tmp_prefix: PathBuf,
    pub var_prefix: PathBuf,
    pub client_port: Option<u16>,
    pub auth_token: Option<String>,
    pub ipc_timeout: Duration,
    pub catalogue_interval: Duration,
    pub deadlines: Deadlines,
    pub debug: bool,
}

const DEFAULT_NAME: &str = "procd";

impl Config {
    pub fn resolve(cli: CliOverrides) -> Self {
        let state_dir = crate::env::state_dir().unwrap_or_else(|| PathBuf::from("/tmp/procd-state"));
        let name = cli.name.unwrap_or_else(|| DEFAULT_NAME.to_string());

        let run_prefix = cli
            .run_prefix
            .or_else(crate::env::run_prefix)
            .unwrap_or_else(|| PathBuf::from("/tmp").join(&name).join("run"));
        let tmp_prefix = cli
            .tmp_prefix
            .or_else(crate::env::tmp_prefix)
            .unwrap_or_else(|| PathBuf::from("/tmp").join(&name).join("tmp"));
        let var_prefix = cli.var_prefix.or_else(crate::env::var_prefix).unwrap_or(state_dir);

        let mut deadlines = Deadlines::default();
        if let Some(d) = crate::env::start_deadline() {
            deadlines = deadlines.start_deadline(d);
        }
        if let Some(d) = crate::env::work_deadline() {
            deadlines = deadlines.work_deadline(d);
        }
        if let Some(d) = crate::env::finish_kill_deadline() {
            deadlines = deadlines.finish_kill_deadline(d);
        }
        if let Some(d) = crate::env::term_kill_deadline() {
            deadlines = deadlines.term_kill_deadline(d);
        }

        Self {
            name,
            run_prefix,
            tmp_prefix,
            var_prefix,
            client_port: cli.client_port.or_else(crate::env::client_port),
            auth_token: crate::env::auth_token(),
            ipc_timeout: crate::env::ipc_timeout(),
            catalogue_interval: crate::env::catalogue_interval(),
            deadlines,
            debug: cli.debug,
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.run_prefix.join(&self.name).join("processes.socket")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.run_prefix.join(&self.name).join("procd.lock")
    }

    pub fn catalogue_dir(&self) -> PathBuf {
        self.var_prefix.join(&self.name).join("workers")
    }

    pub fn event_sink_path(&self) -> PathBuf {
        self.var_prefix.join("lib").join(&self.name).join("processes.log")
    }

    pub fn instance_var_dir(&self, id: u64) -> PathBuf {
        self.var_prefix.join("lib").join(&self.name).join("processes").join(id.to_string())
    }

    pub fn instance_tmp_dir(&self, id: u64) -> PathBuf {
        self.tmp_prefix.join(&self.name).join("processes").join(id.to_string())
    }

    pub fn instance_log_dir(&self, id: u64) -> PathBuf {
        self.var_prefix.join("log").join(&self.name).join("processes").join(id.to_string())
    }

    /// Create an instance's three scratch directories, returning their paths
    /// in `(var, tmp, log)` order.
    pub fn create_instance_dirs(&self, id: u64) -> std::io::Result<(PathBuf, PathBuf, PathBuf)> {
        let var = self.instance_var_dir(id);
        let tmp = self.instance_tmp_dir(id);
        let log = self.instance_log_dir(id);
        for dir in [&var, &tmp, &log] {
            std::fs::create_dir_all(dir)?;
        }
        Ok((var, tmp, log))
    }

    /// Remove an instance's three scratch directories; best-effort, called
    /// once an instance leaves the Instance Table entirely.
    pub fn remove_instance_dirs(&self, id: u64) {
        for dir in [self.instance_var_dir(id), self.instance_tmp_dir(id), self.instance_log_dir(id)] {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    pub fn ensure_prefixes(&self) -> std::io::Result<()> {
        for dir in [&self.run_prefix, &self.tmp_prefix, &self.var_prefix, &self.catalogue_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

