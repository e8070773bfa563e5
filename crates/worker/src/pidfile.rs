//! Startup guard for the worker runtime: refuses to start a second copy of
//! the same worker (by name) while another instance's pid is still alive,
//! mirroring the supervisor's own name-keyed `running_instance_of` check but
//! enforced even when the worker is launched without a supervisor at all.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    #[error("worker {name:?} is already running as pid {pid}")]
    AlreadyRunning { name: String, pid: u32 },
    #[error("creating pid-file directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("writing pid-file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Held for the worker's entire lifetime; removes the pid-file on drop.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Acquire the guard for `name` under `dir`. Rejects if `dir/name.pid`
    /// names a live pid whose `/proc/{pid}/cmdline` still mentions `name`;
    /// otherwise removes whatever stale file is there and claims it.
    pub fn acquire(dir: &Path, name: &str) -> Result<Self, PidFileError> {
        fs::create_dir_all(dir).map_err(|source| PidFileError::CreateDir { path: dir.to_path_buf(), source })?;
        let path = dir.join(format!("{name}.pid"));
        if let Some(pid) = live_holder(&path, name) {
            return Err(PidFileError::AlreadyRunning { name: name.to_string(), pid });
        }
        let _ = fs::remove_file(&path);
        fs::write(&path, std::process::id().to_string()).map_err(|source| PidFileError::Write { path: path.clone(), source })?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// `Some(pid)` if `path` names a live process whose cmdline still mentions
/// `name` — i.e. the same worker, not just a recycled pid.
fn live_holder(path: &Path, name: &str) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    let pid: u32 = contents.trim().parse().ok()?;
    if !pid_alive(pid) {
        return None;
    }
    let cmdline = fs::read_to_string(format!("/proc/{pid}/cmdline")).ok()?;
    cmdline.contains(name).then_some(pid)
}

fn pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_drop_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.b.pid");
        {
            let _guard = PidFile::acquire(dir.path(), "a.b").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn stale_file_with_a_dead_pid_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.b.pid"), "999999999").unwrap();
        assert!(PidFile::acquire(dir.path(), "a.b").is_ok());
    }
}
