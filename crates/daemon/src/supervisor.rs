//! The Supervisor Core's single-threaded event loop: owns the Instance
//! Table, Monitor Registry, and Catalogue; dispatches RPCs arriving from
//! either endpoint; drives the periodic deadline sweeps.

use crate::config::Config;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use procd_catalogue::{Catalogue, ScanEvent};
use procd_core::{
    Clock, Instance, InstanceId, InstanceState, MonitorType, SubscriptionTarget, SystemClock,
    Token, TransitionEvent, WorkerDescriptor, WorkerName,
};
use procd_engine::{InstanceTable, MonitorRegistry};
pub use procd_engine::PeerId;
use procd_storage::EventSink;
use procd_wire::{MonitorEvent, Request, Response, RpcError, WorkerCommand};
use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Messages the per-connection tasks send into the core loop. The core is
/// the only task that ever mutates the Instance Table, Monitor Registry, or
/// Catalogue, so every cross-task interaction is a message, never a lock.
pub enum CoreMsg {
    PeerConnected {
        peer: PeerId,
        monitor_tx: mpsc::UnboundedSender<MonitorEvent>,
        command_tx: mpsc::UnboundedSender<WorkerCommand>,
    },
    Request {
        peer: PeerId,
        req: Request,
        reply: oneshot::Sender<Response>,
    },
    PeerGone {
        peer: PeerId,
    },
    /// A spawned worker-runtime process exited. Informational: the normal
    /// path is `Finish` arriving first and the reap sweep observing the pid
    /// gone afterwards; this only matters when the process dies without
    /// ever calling `finish`.
    ChildWaited {
        id: InstanceId,
    },
}

pub struct Supervisor {
    config: Config,
    instances: InstanceTable,
    monitors: MonitorRegistry,
    catalogue: Catalogue,
    sink: Box<dyn EventSink + Send>,
    clock: SystemClock,
    peer_monitor_tx: HashMap<PeerId, mpsc::UnboundedSender<MonitorEvent>>,
    peer_command_tx: HashMap<PeerId, mpsc::UnboundedSender<WorkerCommand>>,
    /// The worker-runtime connection (if any) that registered a given
    /// instance; used to push `Terminate`/`SetUpdateInterval` directives.
    instance_owner: HashMap<InstanceId, PeerId>,
    /// Instances for which the realtime cadence is currently active, so a
    /// subscribe/unsubscribe only triggers `set_update_interval` on the
    /// edge, not on every call.
    realtime_active: HashSet<InstanceId>,
    core_tx: mpsc::Sender<CoreMsg>,
}

const NORMAL_UPDATE_INTERVAL_MS: u64 = 1000;
const REALTIME_UPDATE_INTERVAL_MS: u64 = 200;

impl Supervisor {
    pub fn new(
        config: Config,
        catalogue: Catalogue,
        sink: Box<dyn EventSink + Send>,
        core_tx: mpsc::Sender<CoreMsg>,
    ) -> Self {
        Self {
            config,
            instances: InstanceTable::default(),
            monitors: MonitorRegistry::default(),
            catalogue,
            sink,
            clock: SystemClock,
            peer_monitor_tx: HashMap::new(),
            peer_command_tx: HashMap::new(),
            instance_owner: HashMap::new(),
            realtime_active: HashSet::new(),
            core_tx,
        }
    }

    fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Drive the event loop until `shutdown` is cancelled.
    pub async fn run(mut self, mut msg_rx: mpsc::Receiver<CoreMsg>, shutdown: CancellationToken) {
        let mut start_tick = tokio::time::interval(std::time::Duration::from_secs(1));
        let mut work_tick = tokio::time::interval(std::time::Duration::from_secs(2));
        let mut reap_tick = tokio::time::interval(std::time::Duration::from_secs(1));
        let mut progress_tick = tokio::time::interval(std::time::Duration::from_secs(1));
        let mut catalogue_tick = tokio::time::interval(self.config.catalogue_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("supervisor shutting down");
                    break;
                }
                Some(msg) = msg_rx.recv() => self.handle_msg(msg),
                _ = start_tick.tick() => self.sweep_start(),
                _ = work_tick.tick() => self.sweep_work(),
                _ = reap_tick.tick() => self.sweep_reap(),
                _ = progress_tick.tick() => self.broadcast_progress(),
                _ = catalogue_tick.tick() => self.rescan_catalogue(),
            }
        }
    }

    fn handle_msg(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::PeerConnected { peer, monitor_tx, command_tx } => {
                self.peer_monitor_tx.insert(peer, monitor_tx);
                self.peer_command_tx.insert(peer, command_tx);
            }
            CoreMsg::Request { peer, req, reply } => {
                let resp = self.dispatch(peer, req);
                let _ = reply.send(resp);
            }
            CoreMsg::PeerGone { peer } => {
                self.peer_monitor_tx.remove(&peer);
                self.peer_command_tx.remove(&peer);
                self.monitors.drop_peer(peer);
                self.instance_owner.retain(|_, owner| *owner != peer);
            }
            CoreMsg::ChildWaited { id } => {
                debug!(instance = %id, "worker-runtime process exited");
            }
        }
    }

    // ---- RPC dispatch ------------------------------------------------

    fn dispatch(&mut self, peer: PeerId, req: Request) -> Response {
        debug!(?req, "handling request");
        match req {
            Request::Hello { version } => {
                if procd_wire::is_compatible(&version) {
                    Response::Hello { version: procd_wire::PROTOCOL_VERSION.to_string() }
                } else {
                    Response::Error(RpcError::ParseError {
                        reason: format!("incompatible protocol version {version}"),
                    })
                }
            }
            Request::Ping => Response::Pong,
            Request::ListWorkers => {
                let names = self.catalogue.iter().map(|(n, _)| n.clone()).collect();
                Response::Workers { names }
            }
            Request::QueryWorker { name, keys } => match self.catalogue.get(&name) {
                Some(desc) => Response::WorkerValues { values: Response::descriptor_values(desc, &keys) },
                None => Response::Error(RpcError::UnknownWorker { name: name.to_string() }),
            },
            Request::QueryWorkers { names, keys } => {
                let values = names
                    .into_iter()
                    .map(|name| {
                        let v = self.catalogue.get(&name).map(|d| Response::descriptor_values(d, &keys));
                        (name, v)
                    })
                    .collect();
                Response::WorkersValues { values }
            }
            Request::Run { name, args, monitor, debug } => self.handle_run(peer, name, args, monitor, debug),
            Request::Terminate { id } => self.handle_terminate(id),
            Request::SubscribeWorker { name, monitor_type } => {
                self.handle_subscribe(peer, SubscriptionTarget::Worker(name), monitor_type)
            }
            Request::SubscribeWorkers { monitor_type } => {
                self.handle_subscribe(peer, SubscriptionTarget::All, monitor_type)
            }
            Request::SubscribeInstance { id, monitor_type } => {
                self.handle_subscribe(peer, SubscriptionTarget::Instance(id), monitor_type)
            }
            Request::UnsubscribeWorker { name } => {
                self.handle_unsubscribe(peer, SubscriptionTarget::Worker(name))
            }
            Request::UnsubscribeWorkers => self.handle_unsubscribe(peer, SubscriptionTarget::All),
            Request::UnsubscribeInstance { id } => {
                self.handle_unsubscribe(peer, SubscriptionTarget::Instance(id))
            }
            Request::Register { name, pid, token } => self.handle_register(peer, name, pid, token),
            Request::Update { id, buffers } => self.handle_update(id, buffers),
            Request::Finish { id, exit_code } => self.handle_finish(id, exit_code),
            Request::SetUpdateIntervalAck { id } => {
                debug!(instance = %id, "worker acknowledged update-interval change");
                Response::Ok
            }
        }
    }

    fn handle_run(
        &mut self,
        _peer: PeerId,
        name: WorkerName,
        args: Vec<String>,
        _monitor: Option<MonitorType>,
        debug_mode: bool,
    ) -> Response {
        let Some(descriptor) = self.catalogue.get(&name).cloned() else {
            return Response::Error(RpcError::UnknownWorker { name: name.to_string() });
        };
        if let Some(existing_id) = self.instances.running_instance_of(&name) {
            return Response::Error(RpcError::AlreadyRunning { existing_id });
        }

        let id = self.sink.next_instance_id();
        let now = self.now();
        let token = Token::generate();
        let token_str = token.as_str().to_string();

        if let Err(e) = self.config.create_instance_dirs(id.0) {
            warn!(instance = %id, error = %e, "failed to create scratch directories");
            return Response::Error(RpcError::ParseError { reason: "scratch directory setup failed".into() });
        }

        if let Err(e) = self.sink.record_started(id, &name, now) {
            warn!(instance = %id, error = %e, "event sink write failed");
        }

        let mut instance = Instance::new(id, name.clone(), now, token);
        match self.spawn_worker_runtime(id, &descriptor, &args, &token_str, debug_mode) {
            Ok(pid) => instance.pid = Some(pid),
            Err(e) => {
                warn!(instance = %id, error = %e, "failed to spawn worker runtime");
                self.config.remove_instance_dirs(id.0);
                return Response::Error(RpcError::ParseError { reason: format!("spawn failed: {e}") });
            }
        }

        self.instances.insert_starting(instance);
        self.fan_out(id, &name, MonitorEvent::MonitorNew { id, name: name.clone() });
        self.fan_out(id, &name, MonitorEvent::MonitorStarting { id });
        info!(instance = %id, worker = %name.as_str(), "run accepted");
        Response::Ran { id }
    }

    fn spawn_worker_runtime(
        &self,
        id: InstanceId,
        descriptor: &WorkerDescriptor,
        args: &[String],
        token: &str,
        debug_mode: bool,
    ) -> std::io::Result<u32> {
        let (program, program_args) = descriptor.spawn_argv(args);
        let run_cmd = std::iter::once(program).chain(program_args).collect::<Vec<_>>().join(" ");

        let mut cmd = Command::new("procw");
        cmd.arg(descriptor.name.as_str())
            .arg("--server-socket")
            .arg(self.config.socket_path())
            .arg("--server-token")
            .arg(token)
            .env("PROCD_WORKER_CMD", run_cmd)
            .env("PROCESS_VAR", self.config.instance_var_dir(id.0))
            .env("PROCESS_TMP", self.config.instance_tmp_dir(id.0))
            .env("PROCESS_LOG", self.config.instance_log_dir(id.0))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        if debug_mode {
            cmd.arg("--debug");
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "spawned process has no pid")
        })?;

        let core_tx = self.core_tx.clone();
        tokio::spawn(async move {
            let _ = child.wait().await;
            let _ = core_tx.send(CoreMsg::ChildWaited { id }).await;
        });

        Ok(pid)
    }

    fn handle_terminate(&mut self, id: InstanceId) -> Response {
        let Some(instance) = self.instances.get(id) else {
            return Response::Error(RpcError::UnknownInstance { id });
        };
        let name = instance.name.clone();
        match self.instances.apply(id, TransitionEvent::Terminate, self.now()) {
            Ok(InstanceState::Terminating) => {
                self.send_worker_command(id, WorkerCommand::Terminate);
                self.fan_out(id, &name, MonitorEvent::MonitorTerminating { id });
                Response::Ok
            }
            Ok(other) => {
                warn!(instance = %id, state = %other, "terminate landed on an unexpected state");
                Response::Ok
            }
            Err(e) => Response::Error(RpcError::ParseError { reason: e.to_string() }),
        }
    }

    fn handle_subscribe(&mut self, peer: PeerId, target: SubscriptionTarget, monitor_type: MonitorType) -> Response {
        let Some(tx) = self.peer_monitor_tx.get(&peer).cloned() else {
            return Response::Error(RpcError::ParseError { reason: "peer has no monitor channel".into() });
        };
        if let Err(e) = self.monitors.subscribe(peer, target.clone(), monitor_type, tx) {
            return Response::Error(RpcError::ParseError { reason: e.to_string() });
        }
        self.send_catch_up(peer, &target);
        if monitor_type == MonitorType::Realtime {
            self.reevaluate_realtime_cadence(&target);
        }
        Response::Ok
    }

    fn handle_unsubscribe(&mut self, peer: PeerId, target: SubscriptionTarget) -> Response {
        self.monitors.unsubscribe(peer, &target);
        self.reevaluate_realtime_cadence(&target);
        Response::Ok
    }

    /// Send the immediately-after-subscribe catch-up message required by
    /// §4.3: the current state of every target the subscription now
    /// matches.
    fn send_catch_up(&mut self, peer: PeerId, target: &SubscriptionTarget) {
        let Some(tx) = self.peer_monitor_tx.get(&peer) else { return };
        let instances: Vec<(InstanceId, InstanceState)> = match target {
            SubscriptionTarget::Instance(id) => {
                self.instances.get(*id).map(|i| vec![(*id, i.state)]).unwrap_or_default()
            }
            SubscriptionTarget::Worker(name) => self
                .instances
                .registered()
                .chain(self.instances.starting())
                .chain(self.instances.finishing())
                .chain(self.instances.terminating())
                .filter_map(|id| self.instances.get(id).filter(|i| &i.name == name).map(|i| (id, i.state)))
                .collect(),
            SubscriptionTarget::All => self
                .instances
                .starting()
                .chain(self.instances.registered())
                .chain(self.instances.finishing())
                .chain(self.instances.terminating())
                .filter_map(|id| self.instances.get(id).map(|i| (id, i.state)))
                .collect(),
        };
        for (id, state) in instances {
            let event = state_to_event(id, state);
            let _ = tx.send(event);
        }
    }

    fn reevaluate_realtime_cadence(&mut self, target: &SubscriptionTarget) {
        let ids: Vec<InstanceId> = match target {
            SubscriptionTarget::Instance(id) => vec![*id],
            SubscriptionTarget::Worker(name) => self
                .instances
                .registered()
                .filter(|id| self.instances.get(*id).is_some_and(|i| &i.name == name))
                .collect(),
            SubscriptionTarget::All => return,
        };
        for id in ids {
            let Some(instance) = self.instances.get(id) else { continue };
            let wants_realtime = self.monitors.realtime_subscribed(id, &instance.name);
            let currently = self.realtime_active.contains(&id);
            if wants_realtime && !currently {
                self.realtime_active.insert(id);
                self.send_worker_command(id, WorkerCommand::SetUpdateInterval { interval_ms: REALTIME_UPDATE_INTERVAL_MS });
            } else if !wants_realtime && currently {
                self.realtime_active.remove(&id);
                self.send_worker_command(id, WorkerCommand::SetUpdateInterval { interval_ms: NORMAL_UPDATE_INTERVAL_MS });
            }
        }
    }

    fn send_worker_command(&self, id: InstanceId, cmd: WorkerCommand) {
        let Some(owner) = self.instance_owner.get(&id) else { return };
        if let Some(tx) = self.peer_command_tx.get(owner) {
            let _ = tx.send(cmd);
        }
    }

    fn handle_register(&mut self, peer: PeerId, name: WorkerName, pid: u32, token: Option<String>) -> Response {
        let Some(token) = token else {
            return Response::TerminateDirective;
        };
        let Some(existing_id) = self.instances.running_instance_of(&name) else {
            return Response::TerminateDirective;
        };
        if self.instances.get(existing_id).is_some_and(|i| i.state != InstanceState::Starting) {
            return Response::AlreadyRegistered { existing_id };
        }
        if !self.instances.check_and_consume_token(existing_id, &token) {
            return Response::TerminateDirective;
        }

        match self.instances.apply(existing_id, TransitionEvent::Registered, self.now()) {
            Ok(InstanceState::Working) => {
                self.instance_owner.insert(existing_id, peer);
                // Registration confirms the effective pid (it may differ
                // from the spawn-time pid if the runtime re-execed).
                if let Some(inst) = self.instances.get_mut(existing_id) {
                    inst.pid = Some(pid);
                }
                self.fan_out(existing_id, &name, MonitorEvent::MonitorWorking { id: existing_id });
                info!(instance = %existing_id, worker = %name.as_str(), "registered");
                Response::Registered { id: existing_id }
            }
            Ok(_) | Err(_) => Response::TerminateDirective,
        }
    }

    fn handle_update(&mut self, id: InstanceId, buffers: Vec<(u8, Vec<u8>)>) -> Response {
        let Some(instance) = self.instances.get(id) else {
            return Response::Error(RpcError::NotRegistered { id });
        };
        if instance.state != InstanceState::Working {
            return Response::Error(RpcError::NotRegistered { id });
        }
        let name = instance.name.clone();

        let stdlog: Vec<u8> = buffers.iter().filter(|(ch, _)| *ch == 3).flat_map(|(_, b)| b.clone()).collect();
        let mut parse_error = None;
        if !stdlog.is_empty() {
            let now = self.now();
            match crate::progress::extract_progress(&stdlog) {
                Some(progress) => {
                    if let Some(inst) = self.instances.get_mut(id) {
                        inst.set_progress(progress);
                        inst.updated = Some(now);
                    }
                }
                None => parse_error = Some("malformed or missing progress line".to_string()),
            }
        } else {
            let now = self.now();
            if let Some(inst) = self.instances.get_mut(id) {
                inst.updated = Some(now);
            }
        }

        let realtime = self.monitors.realtime_subscribed(id, &name);
        if realtime {
            let progress = self.instances.get(id).map(|i| i.progress).unwrap_or(0.0);
            self.fan_out(
                id,
                &name,
                MonitorEvent::MonitorUpdate { name: name.clone(), id, progress, buffers },
            );
        }

        match parse_error {
            Some(reason) => Response::Error(RpcError::ParseError { reason }),
            None => Response::Ok,
        }
    }

    fn handle_finish(&mut self, id: InstanceId, exit_code: Option<i32>) -> Response {
        let Some(instance) = self.instances.get(id) else {
            return Response::Error(RpcError::NotRegistered { id });
        };
        let name = instance.name.clone();
        let now = self.now();
        match self.instances.apply(id, TransitionEvent::Finished, now) {
            Ok(InstanceState::Finished) => {
                if let Some(inst) = self.instances.get_mut(id) {
                    inst.exit_code = exit_code;
                }
                if let Err(e) = self.sink.record_finished(id, now, exit_code) {
                    warn!(instance = %id, error = %e, "event sink write failed");
                }
                self.fan_out(id, &name, MonitorEvent::MonitorFinished { id, exit_code });
                info!(instance = %id, worker = %name.as_str(), exit_code, "finished");
                Response::Ok
            }
            Ok(_) | Err(_) => Response::Error(RpcError::NotRegistered { id }),
        }
    }

    // ---- periodic sweeps -----------------------------------------------

    fn sweep_start(&mut self) {
        let now = self.now();
        let deadlines = self.config.deadlines;
        let elapsed = procd_engine::sweep_start_deadline(&mut self.instances, now, &deadlines);
        for id in elapsed {
            if let Some(name) = self.instances.get(id).map(|i| i.name.clone()) {
                warn!(instance = %id, worker = %name.as_str(), "start deadline elapsed, terminating");
                self.send_worker_command(id, WorkerCommand::Terminate);
                self.fan_out(id, &name, MonitorEvent::MonitorTerminating { id });
            }
        }
    }

    fn sweep_work(&mut self) {
        let now = self.now();
        let deadlines = self.config.deadlines;
        let elapsed = procd_engine::sweep_work_deadline(&mut self.instances, now, &deadlines);
        for id in elapsed {
            if let Some(name) = self.instances.get(id).map(|i| i.name.clone()) {
                warn!(instance = %id, worker = %name.as_str(), "work deadline elapsed, terminating");
                self.send_worker_command(id, WorkerCommand::Terminate);
                self.fan_out(id, &name, MonitorEvent::MonitorTerminating { id });
            }
        }
    }

    fn sweep_reap(&mut self) {
        let now = self.now();
        let deadlines = self.config.deadlines;
        // Capture names before the sweep: a reaped instance reaching
        // NOT_RUNNING is dropped from the table entirely by `apply`, so the
        // name has to come from here, not from a post-sweep lookup.
        let names: HashMap<InstanceId, WorkerName> = self
            .instances
            .finishing()
            .chain(self.instances.terminating())
            .filter_map(|id| self.instances.get(id).map(|i| (id, i.name.clone())))
            .collect();
        let reaped = procd_engine::sweep_reap(
            &mut self.instances,
            now,
            &deadlines,
            pid_alive,
            |pid| send_signal(pid, Signal::SIGKILL),
        );
        for id in reaped {
            let name = names.get(&id).cloned();
            self.cleanup_instance(id, name);
        }
    }

    fn cleanup_instance(&mut self, id: InstanceId, name: Option<WorkerName>) {
        self.config.remove_instance_dirs(id.0);
        self.instance_owner.remove(&id);
        self.realtime_active.remove(&id);
        if let Some(name) = name {
            self.fan_out(id, &name, MonitorEvent::MonitorNotRunning { id });
        }
    }

    fn broadcast_progress(&mut self) {
        let running: Vec<(InstanceId, WorkerName, f64)> = self
            .instances
            .registered()
            .filter_map(|id| self.instances.get(id).map(|i| (id, i.name.clone(), i.progress)))
            .collect();
        for (id, name, progress) in running {
            let event = MonitorEvent::MonitorUpdate { name: name.clone(), id, progress, buffers: Vec::new() };
            self.fan_out(id, &name, event);
        }
    }

    fn rescan_catalogue(&mut self) {
        match procd_catalogue::scan(&self.config.catalogue_dir(), &self.catalogue) {
            Ok((catalogue, events)) => {
                self.catalogue = catalogue;
                for event in events {
                    match event {
                        ScanEvent::Added(desc) => info!(worker = %desc.name.as_str(), "worker added"),
                        ScanEvent::Modified(desc) => {
                            let event = MonitorEvent::MonitorModified { name: desc.name.clone() };
                            self.fan_out(InstanceId::new(0), &desc.name, event);
                        }
                        ScanEvent::Removed(name) => {
                            let event = MonitorEvent::MonitorDeleted { name: name.clone() };
                            self.fan_out(InstanceId::new(0), &name, event);
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "catalogue rescan failed, keeping previous catalogue"),
        }
    }

    // ---- helpers ---------------------------------------------------------

    fn fan_out(&mut self, id: InstanceId, name: &WorkerName, event: MonitorEvent) {
        self.monitors.fan_out(id, name, &event);
    }
}

fn state_to_event(id: InstanceId, state: InstanceState) -> MonitorEvent {
    match state {
        InstanceState::Starting => MonitorEvent::MonitorStarting { id },
        InstanceState::Working => MonitorEvent::MonitorWorking { id },
        InstanceState::Finished => MonitorEvent::MonitorFinished { id, exit_code: None },
        InstanceState::Terminating => MonitorEvent::MonitorTerminating { id },
        InstanceState::Terminated => MonitorEvent::MonitorTerminated { id },
        _ => MonitorEvent::MonitorNotRunning { id },
    }
}

fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn send_signal(pid: u32, signal: Signal) {
    let _ = kill(Pid::from_raw(pid as i32), Some(signal));
}
