//! Daemon startup: directory/lock setup, Event Sink recovery, orphan scan,
//! and socket/port binding. Mirrors the numbered startup sequence in the
//! supervisor's design notes: lock before anything else touches shared
//! paths, bind last so a partially-initialized daemon never looks live.

use crate::config::Config;
use fs2::FileExt;
use procd_catalogue::Catalogue;
use procd_storage::{EventSink, FileEventSink};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("creating directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("another procd instance already holds the lock at {path}: {source}")]
    LockFailed { path: PathBuf, source: std::io::Error },
    #[error("writing lock file {path}: {source}")]
    WriteLock { path: PathBuf, source: std::io::Error },
    #[error("opening event sink: {0}")]
    EventSink(#[from] procd_storage::SinkError),
    #[error("removing stale socket {path}: {source}")]
    RemoveStaleSocket { path: PathBuf, source: std::io::Error },
    #[error("binding worker socket {path}: {source}")]
    BindUnix { path: PathBuf, source: std::io::Error },
    #[error("binding client port {port}: {source}")]
    BindTcp { port: u16, source: std::io::Error },
}

/// Everything startup hands off to the running supervisor. `_lock_file` is
/// held for the daemon's entire lifetime; dropping it releases the advisory
/// lock, so it must stay alive in the caller's scope.
pub struct Started {
    pub unix_listener: UnixListener,
    pub tcp_listener: Option<TcpListener>,
    pub sink: Box<dyn EventSink + Send>,
    pub catalogue: Catalogue,
    _lock_file: File,
}

/// Run the startup sequence described in the supervisor's design notes.
pub async fn startup(config: &Config) -> Result<Started, LifecycleError> {
    // 1. Resolve + create the run/var/tmp prefixes and the lock's parent dir.
    config.ensure_prefixes().map_err(|source| LifecycleError::CreateDir {
        path: config.run_prefix.clone(),
        source,
    })?;
    let lock_path = config.lock_path();
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| LifecycleError::CreateDir { path: parent.to_path_buf(), source })?;
    }

    // 2. Acquire the advisory lock before touching the socket path, so two
    // daemons racing on the same run prefix can't both believe they're the
    // owner.
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| LifecycleError::WriteLock { path: lock_path.clone(), source })?;
    lock_file
        .try_lock_exclusive()
        .map_err(|source| LifecycleError::LockFailed { path: lock_path.clone(), source })?;
    lock_file.set_len(0).map_err(|source| LifecycleError::WriteLock { path: lock_path.clone(), source })?;
    writeln!(lock_file, "{}", std::process::id())
        .map_err(|source| LifecycleError::WriteLock { path: lock_path.clone(), source })?;

    // 3. Open (or create) the Event Sink and do one synchronous catalogue scan.
    let sink_path = config.event_sink_path();
    if let Some(parent) = sink_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| LifecycleError::CreateDir { path: parent.to_path_buf(), source })?;
    }
    let sink = FileEventSink::open(&sink_path)?;
    scan_for_orphans(&sink);

    let catalogue = match procd_catalogue::scan(&config.catalogue_dir(), &Catalogue::default()) {
        Ok((catalogue, _events)) => catalogue,
        Err(e) => {
            tracing::warn!(error = %e, "initial catalogue scan failed, starting with an empty catalogue");
            Catalogue::default()
        }
    };

    // 4. Remove a stale socket file, then bind. Binding is the last step so
    // a partially-initialized daemon is never visible to workers.
    let socket_path = config.socket_path();
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| LifecycleError::CreateDir { path: parent.to_path_buf(), source })?;
    }
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .map_err(|source| LifecycleError::RemoveStaleSocket { path: socket_path.clone(), source })?;
    }
    let unix_listener = UnixListener::bind(&socket_path)
        .map_err(|source| LifecycleError::BindUnix { path: socket_path, source })?;

    let tcp_listener = match config.client_port {
        Some(port) => {
            let addr = (std::net::Ipv4Addr::UNSPECIFIED, port);
            Some(TcpListener::bind(addr).await.map_err(|source| LifecycleError::BindTcp { port, source })?)
        }
        None => None,
    };

    Ok(Started { unix_listener, tcp_listener, sink: Box::new(sink), catalogue, _lock_file: lock_file })
}

/// Log (don't act on) instances the Event Sink recorded as started but never
/// finished, with no live pid to reap. See the zombie-reaping open question:
/// this is an observability step, not a recovery one.
fn scan_for_orphans(sink: &FileEventSink) {
    let Ok(records) = sink.replay() else { return };
    use std::collections::HashSet;
    let mut finished = HashSet::new();
    for record in &records {
        if let procd_storage::EventRecord::Finished { id, .. } = record {
            finished.insert(*id);
        }
    }
    for record in &records {
        if let procd_storage::EventRecord::Started { id, name, .. } = record {
            if !finished.contains(id) {
                tracing::warn!(instance = %id, worker = %name, "orphaned instance from a previous run, left untouched");
            }
        }
    }
}
