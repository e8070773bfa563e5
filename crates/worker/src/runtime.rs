//! Worker Runtime: spawns the actual program, captures its output streams
//! plus the structured `stdlog` channel, and reports back to the Supervisor
//! Core over the local worker endpoint — or runs standalone with no
//! telemetry if the supervisor can't be reached.

use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{mkfifo, Pid};
use parking_lot::Mutex;
use procd_core::{InstanceId, WorkerName};
use procd_wire::{read_message, write_value, ProtocolError, Request, Response, WorkerCommand};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::pidfile::PidFile;

const DEFAULT_UPDATE_INTERVAL_MS: u64 = 1000;
const READ_CHUNK: usize = 8192;

pub struct WorkerArgs {
    pub name: String,
    pub server_socket: Option<PathBuf>,
    pub server_token: Option<String>,
    pub debug: bool,
}

/// Frame arriving on the supervisor connection: either the reply to a
/// request the worker just sent, or a directive pushed unsolicited.
enum Inbound {
    Response(Response),
    Command(WorkerCommand),
}

type Buffer = Arc<Mutex<Vec<u8>>>;

/// Run the worker runtime to completion. Returns the process exit code —
/// `0` unless startup itself failed; the child's own exit status is
/// reported to the supervisor via `finish`, not reflected in this return
/// value, matching the teacher's convention that the wrapping process's
/// exit code reflects its own health, not the job it ran.
pub async fn run(args: WorkerArgs) -> i32 {
    let pid_dir = std::env::temp_dir().join("procd-worker-pids");
    let _pidfile = match PidFile::acquire(&pid_dir, &args.name) {
        Ok(guard) => guard,
        Err(e) => {
            tracing::error!(error = %e, "startup guard refused to start");
            return 1;
        }
    };

    let Ok(run_cmd) = std::env::var("PROCD_WORKER_CMD") else {
        tracing::error!("PROCD_WORKER_CMD is not set; nothing to run");
        return 1;
    };
    let mut parts = run_cmd.split_whitespace();
    let Some(program) = parts.next() else {
        tracing::error!("PROCD_WORKER_CMD is empty");
        return 1;
    };
    let program_args: Vec<&str> = parts.collect();

    let log_dir = std::env::var("PROCESS_LOG").map(PathBuf::from).unwrap_or_else(|_| std::env::temp_dir());
    let stdlog_fifo = log_dir.join("stdlog.fifo");
    let ctl_fifo = log_dir.join("ctl.fifo");
    let _ = mkfifo(&stdlog_fifo, Mode::from_bits_truncate(0o600));
    let _ = mkfifo(&ctl_fifo, Mode::from_bits_truncate(0o600));

    let mut cmd = Command::new(program);
    cmd.args(&program_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("PROCESS_STDLOG", &stdlog_fifo)
        .env("PROCESS_CTL", &ctl_fifo);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, program, "failed to spawn worker program");
            return 1;
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    // O_RDWR on a FIFO never blocks waiting for a peer, unlike a read-only
    // open; the worker holds both ends so the child opening its write end
    // (or never opening it at all) can't wedge this open() call.
    let stdlog = tokio::fs::OpenOptions::new().read(true).write(true).open(&stdlog_fifo).await.ok();

    match &args.server_socket {
        Some(path) => match UnixStream::connect(path).await {
            Ok(stream) => run_supervised(&args, child, stdout, stderr, stdlog, ctl_fifo, stream).await,
            Err(e) => {
                tracing::warn!(error = %e, socket = %path.display(), "supervisor unreachable, running standalone");
                run_standalone(child, stdout, stderr).await
            }
        },
        None => run_standalone(child, stdout, stderr).await,
    }
}

/// No supervisor connection: drain output so the child never blocks on a
/// full pipe, then wait for it to exit. No telemetry is sent anywhere.
async fn run_standalone(
    mut child: Child,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
) -> i32 {
    if let Some(mut out) = stdout {
        tokio::spawn(async move {
            let mut buf = [0u8; READ_CHUNK];
            while matches!(out.read(&mut buf).await, Ok(n) if n > 0) {}
        });
    }
    if let Some(mut err) = stderr {
        tokio::spawn(async move {
            let mut buf = [0u8; READ_CHUNK];
            while matches!(err.read(&mut buf).await, Ok(n) if n > 0) {}
        });
    }
    match child.wait().await {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            tracing::error!(error = %e, "failed to wait on standalone child");
            1
        }
    }
}

async fn run_supervised(
    args: &WorkerArgs,
    mut child: Child,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    stdlog: Option<tokio::fs::File>,
    ctl_fifo: PathBuf,
    stream: UnixStream,
) -> i32 {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let name = match WorkerName::parse(args.name.clone()) {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %e, "invalid worker name");
            return terminate_and_wait(child).await;
        }
    };

    let register = Request::Register { name: name.clone(), pid: std::process::id(), token: args.server_token.clone() };
    if write_value(&mut writer, &register).await.is_err() {
        return run_standalone(child, stdout, stderr).await;
    }

    let id = match await_registration(&mut reader).await {
        RegisterOutcome::Accepted(id) => id,
        RegisterOutcome::Rejected => return terminate_and_wait(child).await,
        RegisterOutcome::Unreachable => return run_standalone(child, stdout, stderr).await,
    };
    tracing::info!(instance = %id, worker = %name.as_str(), "registered with supervisor");

    let out_buf: Buffer = Arc::new(Mutex::new(Vec::new()));
    let err_buf: Buffer = Arc::new(Mutex::new(Vec::new()));
    let log_buf: Buffer = Arc::new(Mutex::new(Vec::new()));
    if let Some(out) = stdout {
        spawn_drain(out, out_buf.clone());
    }
    if let Some(err) = stderr {
        spawn_drain(err, err_buf.clone());
    }
    if let Some(file) = stdlog {
        spawn_drain(file, log_buf.clone());
    }

    let pid = child.id();
    let (exit_tx, mut exit_rx) = oneshot::channel();
    tokio::spawn(async move {
        let status = child.wait().await;
        let _ = exit_tx.send(status);
    });

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            match read_inbound(&mut reader).await {
                Ok(frame) => {
                    if inbound_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut heartbeat = tokio::time::interval(Duration::from_millis(DEFAULT_UPDATE_INTERVAL_MS));
    heartbeat.tick().await; // the first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                poke_child(&ctl_fifo);
                send_update(&mut writer, id, &out_buf, &err_buf, &log_buf).await;
            }
            Some(frame) = inbound_rx.recv() => {
                match frame {
                    Inbound::Command(WorkerCommand::Terminate) => {
                        if let Some(pid) = pid {
                            send_signal(pid, Signal::SIGTERM);
                        }
                    }
                    Inbound::Command(WorkerCommand::SetUpdateInterval { interval_ms }) => {
                        heartbeat = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
                        heartbeat.tick().await;
                        let _ = write_value(&mut writer, &Request::SetUpdateIntervalAck { id }).await;
                    }
                    Inbound::Response(_) => {}
                }
            }
            status = &mut exit_rx => {
                send_update(&mut writer, id, &out_buf, &err_buf, &log_buf).await;
                let exit_code = status.ok().and_then(|r| r.ok()).and_then(exit_code_of);
                let _ = write_value(&mut writer, &Request::Finish { id, exit_code }).await;
                return 0;
            }
        }
    }
}

enum RegisterOutcome {
    Accepted(InstanceId),
    Rejected,
    Unreachable,
}

async fn await_registration<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> RegisterOutcome {
    loop {
        match read_inbound(reader).await {
            Ok(Inbound::Response(Response::Registered { id })) => return RegisterOutcome::Accepted(id),
            Ok(Inbound::Response(Response::TerminateDirective))
            | Ok(Inbound::Response(Response::AlreadyRegistered { .. }))
            | Ok(Inbound::Response(Response::Error(_))) => return RegisterOutcome::Rejected,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "connection dropped while registering");
                return RegisterOutcome::Unreachable;
            }
        }
    }
}

async fn read_inbound<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<Inbound, ProtocolError> {
    let payload = read_message(reader).await?;
    let value: serde_json::Value = serde_json::from_slice(&payload).map_err(ProtocolError::Decode)?;
    let tag = value.get("type").and_then(|t| t.as_str()).unwrap_or("");
    if matches!(tag, "Terminate" | "SetUpdateInterval") {
        let cmd = serde_json::from_value(value).map_err(ProtocolError::Decode)?;
        Ok(Inbound::Command(cmd))
    } else {
        let resp = serde_json::from_value(value).map_err(ProtocolError::Decode)?;
        Ok(Inbound::Response(resp))
    }
}

fn spawn_drain<R>(mut reader: R, buf: Buffer)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.lock().extend_from_slice(&chunk[..n]),
            }
        }
    });
}

async fn send_update<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, id: InstanceId, out: &Buffer, err: &Buffer, log: &Buffer) {
    let mut buffers = Vec::new();
    for (channel, buf) in [(1u8, out), (2u8, err), (3u8, log)] {
        let drained = std::mem::take(&mut *buf.lock());
        if !drained.is_empty() {
            buffers.push((channel, drained));
        }
    }
    let _ = write_value(writer, &Request::Update { id, buffers }).await;
}

/// Write a byte to the control FIFO so a cooperating child knows to emit a
/// fresh status line before this heartbeat's update is sent. Best-effort —
/// most child programs never open the other end. `O_NONBLOCK` is essential
/// here: a write-only open of a FIFO with no reader blocks indefinitely
/// without it, which would wedge the whole heartbeat loop.
fn poke_child(ctl_fifo: &std::path::Path) {
    use std::os::unix::fs::OpenOptionsExt;
    let opened = std::fs::OpenOptions::new()
        .write(true)
        .custom_flags(nix::fcntl::OFlag::O_NONBLOCK.bits())
        .open(ctl_fifo);
    if let Ok(mut file) = opened {
        use std::io::Write;
        let _ = file.write_all(b"\n");
    }
}

async fn terminate_and_wait(mut child: Child) -> i32 {
    if let Some(pid) = child.id() {
        send_signal(pid, Signal::SIGTERM);
    }
    let _ = child.wait().await;
    1
}

fn send_signal(pid: u32, signal: Signal) {
    let _ = kill(Pid::from_raw(pid as i32), Some(signal));
}

/// §4.4's exit-code split: a normal exit reports its own code, a
/// signal-terminated child reports the negated signal number.
fn exit_code_of(status: std::process::ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        Some(code)
    } else {
        status.signal().map(|s| -s)
    }
}
