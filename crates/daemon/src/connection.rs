//! Per-connection I/O loop, shared by the TCP client endpoint and the Unix
//! worker endpoint: both speak the same length-prefixed JSON framing and the
//! same `Request`/`Response` vocabulary, so one generic loop handles either.
//! A connection is "client" or "worker" only by which `Request` variants it
//! happens to send — the supervisor dispatches on the variant, not the
//! transport.

use procd_wire::{read_value, write_value, MonitorEvent, Request, WorkerCommand};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::supervisor::{CoreMsg, PeerId};

/// Drive one connection until its socket closes or the core shuts down.
/// `core_tx` is the channel into the supervisor's single-threaded event loop.
///
/// Two outgoing channels are registered alongside the connection: `monitor`
/// carries fan-out pushes for any subscription this peer holds, `command`
/// carries directives (terminate, set update interval) for a peer that has
/// registered as a worker. Both are harmless no-ops for a peer that never
/// plays that role — nothing ever sends on them.
pub async fn handle_connection<S>(stream: S, peer: PeerId, core_tx: mpsc::Sender<CoreMsg>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (monitor_tx, mut monitor_rx) = mpsc::unbounded_channel::<MonitorEvent>();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<WorkerCommand>();

    if core_tx.send(CoreMsg::PeerConnected { peer, monitor_tx, command_tx }).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = read_value::<_, Request>(&mut reader) => {
                let req = match frame {
                    Ok(req) => req,
                    Err(_) => break,
                };
                let (reply_tx, reply_rx) = oneshot::channel();
                if core_tx.send(CoreMsg::Request { peer, req, reply: reply_tx }).await.is_err() {
                    break;
                }
                let Ok(resp) = reply_rx.await else { break };
                if write_value(&mut writer, &resp).await.is_err() {
                    break;
                }
            }
            Some(event) = monitor_rx.recv() => {
                if write_value(&mut writer, &event).await.is_err() {
                    break;
                }
            }
            Some(cmd) = command_rx.recv() => {
                if write_value(&mut writer, &cmd).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = core_tx.send(CoreMsg::PeerGone { peer }).await;
}
