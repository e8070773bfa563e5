//! Thin RPC client for `procctl`: speaks the same length-prefixed JSON
//! request/reply protocol the Supervisor Core's connections use, over
//! either the local worker/client Unix socket or the optional TCP endpoint.

use procd_core::{InstanceId, MonitorType, SubscriptionTarget, WorkerName};
use procd_wire::{read_value, subscribe_request, write_value, MonitorEvent, ProtocolError, Request, Response, RpcError};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connecting to the supervisor core at {addr}: {source}")]
    Connect { addr: String, source: std::io::Error },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("unexpected response from the supervisor core: {0:?}")]
    Unexpected(Response),
}

/// Either transport the client can speak to the Supervisor Core over; both
/// sides of the wire treat them identically once connected.
enum Transport {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Unix(s) => Pin::new(s).poll_flush(cx),
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

pub struct DaemonClient {
    stream: Transport,
}

impl DaemonClient {
    /// Connect over TCP if `tcp_addr` is given, otherwise over the local
    /// Unix socket at `socket_path`.
    pub async fn connect(socket_path: &Path, tcp_addr: Option<SocketAddr>) -> Result<Self, ClientError> {
        let stream = match tcp_addr {
            Some(addr) => Transport::Tcp(
                TcpStream::connect(addr)
                    .await
                    .map_err(|source| ClientError::Connect { addr: addr.to_string(), source })?,
            ),
            None => Transport::Unix(UnixStream::connect(socket_path).await.map_err(|source| {
                ClientError::Connect { addr: socket_path.display().to_string(), source }
            })?),
        };
        Ok(Self { stream })
    }

    async fn call(&mut self, request: &Request) -> Result<Response, ClientError> {
        write_value(&mut self.stream, request).await?;
        Ok(read_value(&mut self.stream).await?)
    }

    fn reject<T>(response: Response) -> Result<T, ClientError> {
        match response {
            Response::Error(e) => Err(ClientError::Rpc(e)),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub async fn hello(&mut self) -> Result<String, ClientError> {
        let request = Request::Hello { version: procd_wire::PROTOCOL_VERSION.to_string() };
        match self.call(&request).await? {
            Response::Hello { version } => Ok(version),
            other => Self::reject(other),
        }
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        match self.call(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn list_workers(&mut self) -> Result<Vec<WorkerName>, ClientError> {
        match self.call(&Request::ListWorkers).await? {
            Response::Workers { names } => Ok(names),
            other => Self::reject(other),
        }
    }

    pub async fn query_worker(
        &mut self,
        name: WorkerName,
        keys: Vec<String>,
    ) -> Result<BTreeMap<String, Option<String>>, ClientError> {
        match self.call(&Request::QueryWorker { name, keys }).await? {
            Response::WorkerValues { values } => Ok(values),
            other => Self::reject(other),
        }
    }

    pub async fn query_workers(
        &mut self,
        names: Vec<WorkerName>,
        keys: Vec<String>,
    ) -> Result<BTreeMap<WorkerName, Option<BTreeMap<String, Option<String>>>>, ClientError> {
        match self.call(&Request::QueryWorkers { names, keys }).await? {
            Response::WorkersValues { values } => Ok(values),
            other => Self::reject(other),
        }
    }

    pub async fn run(
        &mut self,
        name: WorkerName,
        args: Vec<String>,
        monitor: Option<MonitorType>,
        debug: bool,
    ) -> Result<InstanceId, ClientError> {
        match self.call(&Request::Run { name, args, monitor, debug }).await? {
            Response::Ran { id } => Ok(id),
            other => Self::reject(other),
        }
    }

    pub async fn terminate(&mut self, id: InstanceId) -> Result<(), ClientError> {
        match self.call(&Request::Terminate { id }).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn subscribe(&mut self, target: SubscriptionTarget, monitor_type: MonitorType) -> Result<(), ClientError> {
        match self.call(&subscribe_request(target, monitor_type)).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn unsubscribe(&mut self, target: SubscriptionTarget) -> Result<(), ClientError> {
        let request = match target {
            SubscriptionTarget::Instance(id) => Request::UnsubscribeInstance { id },
            SubscriptionTarget::Worker(name) => Request::UnsubscribeWorker { name },
            SubscriptionTarget::All => Request::UnsubscribeWorkers,
        };
        match self.call(&request).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    /// After a successful [`subscribe`](Self::subscribe), read pushed
    /// monitor events until the connection closes or `on_event` returns
    /// `false`.
    pub async fn read_events(&mut self, mut on_event: impl FnMut(MonitorEvent) -> bool) -> Result<(), ClientError> {
        loop {
            let event: MonitorEvent = read_value(&mut self.stream).await?;
            if !on_event(event) {
                return Ok(());
            }
        }
    }
}
