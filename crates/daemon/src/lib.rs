// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The Supervisor Core's process: configuration, startup, the per-connection
//! I/O loop, and the single-threaded event loop that owns the Instance
//! Table, Monitor Registry, and Catalogue.

pub mod config;
pub mod connection;
pub mod env;
pub mod lifecycle;
pub mod progress;
pub mod supervisor;

use procd_engine::PeerId;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::supervisor::{CoreMsg, Supervisor};

/// Accept loop shared by the Unix worker endpoint and the optional TCP
/// client endpoint. Each accepted connection gets a fresh [`PeerId`] handed
/// out by a tiny atomic counter so both listeners can allocate ids without
/// going through the single-threaded supervisor.
async fn accept_unix(listener: UnixListener, core_tx: mpsc::Sender<CoreMsg>, next_id: std::sync::Arc<std::sync::atomic::AtomicU64>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let peer = PeerId(next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
                let core_tx = core_tx.clone();
                tokio::spawn(async move {
                    connection::handle_connection(stream, peer, core_tx).await;
                });
            }
            Err(e) => warn!(error = %e, "accept failed on worker socket"),
        }
    }
}

async fn accept_tcp(listener: TcpListener, core_tx: mpsc::Sender<CoreMsg>, next_id: std::sync::Arc<std::sync::atomic::AtomicU64>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(peer = %addr, "client connected");
                let peer = PeerId(next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
                let core_tx = core_tx.clone();
                tokio::spawn(async move {
                    connection::handle_connection(stream, peer, core_tx).await;
                });
            }
            Err(e) => warn!(error = %e, "accept failed on client port"),
        }
    }
}

/// Run the daemon until `shutdown` is cancelled: performs startup, spawns
/// both accept loops, and drives the supervisor's event loop to completion.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), lifecycle::LifecycleError> {
    let started = lifecycle::startup(&config).await?;
    let next_peer_id = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(1));

    let (core_tx, core_rx) = mpsc::channel(256);
    let supervisor = Supervisor::new(config, started.catalogue, started.sink, core_tx.clone());

    let unix_task = tokio::spawn(accept_unix(started.unix_listener, core_tx.clone(), next_peer_id.clone()));
    let tcp_task = started
        .tcp_listener
        .map(|listener| tokio::spawn(accept_tcp(listener, core_tx.clone(), next_peer_id.clone())));

    info!("supervisor core ready");
    supervisor.run(core_rx, shutdown).await;

    unix_task.abort();
    if let Some(task) = tcp_task {
        task.abort();
    }
    Ok(())
}
