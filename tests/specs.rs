//! End-to-end coverage for the supervisor core, worker runtime, and CLI:
//! spawns real `procd`/`procw`/`procctl` binaries against a tempdir-scoped
//! run/tmp/var layout and talks to them over the real Unix socket.

use assert_cmd::cargo::cargo_bin;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const WAIT_MAX: Duration = Duration::from_secs(5);

struct TestEnv {
    _tmp: tempfile::TempDir,
    run_prefix: PathBuf,
    tmp_prefix: PathBuf,
    var_prefix: PathBuf,
    name: String,
    daemon: Option<Child>,
}

impl TestEnv {
    fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let run_prefix = tmp.path().join("run");
        let tmp_prefix = tmp.path().join("tmp");
        let var_prefix = tmp.path().join("var");
        Self { _tmp: tmp, run_prefix, tmp_prefix, var_prefix, name: "procd".to_string(), daemon: None }
    }

    fn socket_path(&self) -> PathBuf {
        self.run_prefix.join(&self.name).join("processes.socket")
    }

    fn catalogue_dir(&self) -> PathBuf {
        self.var_prefix.join(&self.name).join("workers")
    }

    /// Write a declarative worker descriptor straight into the Catalogue
    /// directory, in the `<name>.toml` shape `procd_catalogue` scans for.
    fn write_worker(&self, worker_name: &str, cmd: &str) {
        let dir = self.catalogue_dir();
        std::fs::create_dir_all(&dir).expect("create catalogue dir");
        let mut file = std::fs::File::create(dir.join(format!("{worker_name}.toml"))).expect("create descriptor");
        writeln!(file, "title = \"{worker_name}\"").expect("write descriptor");
        writeln!(file, "cmd = \"{cmd}\"").expect("write descriptor");
    }

    /// Start `procd` against this env's prefixes and block until its Unix
    /// socket exists. `procw` must be resolvable on PATH since the
    /// supervisor core shells out to it by name, not by absolute path.
    fn start_daemon(&mut self) {
        let procw_dir = cargo_bin("procw").parent().expect("procw has a parent dir").to_path_buf();

        let child = Command::new(cargo_bin("procd"))
            .arg("--name")
            .arg(&self.name)
            .arg("--run-prefix")
            .arg(&self.run_prefix)
            .arg("--tmp-prefix")
            .arg(&self.tmp_prefix)
            .arg("--var-prefix")
            .arg(&self.var_prefix)
            .env("PATH", prepend_path(&procw_dir))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn procd");
        self.daemon = Some(child);
        self.wait_for_socket();
    }

    fn wait_for_socket(&self) {
        let socket = self.socket_path();
        if !wait_for(|| socket.exists()) {
            panic!("daemon never created {}", socket.display());
        }
    }

    fn procctl(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("procctl").expect("procctl binary");
        cmd.arg("--name").arg(&self.name).arg("--run-prefix").arg(&self.run_prefix);
        cmd
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        if let Some(mut child) = self.daemon.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn prepend_path(dir: &Path) -> std::ffi::OsString {
    let existing = std::env::var_os("PATH").unwrap_or_default();
    let mut parts = vec![dir.to_path_buf()];
    parts.extend(std::env::split_paths(&existing));
    std::env::join_paths(parts).expect("join PATH")
}

fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_MAX;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

#[test]
fn daemon_starts_and_binds_socket() {
    let mut env = TestEnv::new();
    env.start_daemon();
    assert!(env.socket_path().exists());
}

#[test]
fn procctl_hello_and_ping() {
    let mut env = TestEnv::new();
    env.start_daemon();

    let hello = env.procctl().arg("hello").assert().success();
    assert!(stdout_of(&hello).contains("protocol"));

    let ping = env.procctl().arg("ping").assert().success();
    assert!(stdout_of(&ping).contains("pong"));
}

#[test]
fn list_workers_reflects_catalogue() {
    let mut env = TestEnv::new();
    env.write_worker("echo", "/bin/echo hello");
    env.start_daemon();

    let listing = env.procctl().arg("list-workers").assert().success();
    assert!(stdout_of(&listing).contains("echo"));
}

#[test]
fn list_workers_empty_catalogue_says_so() {
    let mut env = TestEnv::new();
    env.start_daemon();

    let listing = env.procctl().arg("list-workers").assert().success();
    assert!(stdout_of(&listing).contains("No workers registered"));
}

#[test]
fn query_reports_descriptor_fields() {
    let mut env = TestEnv::new();
    env.write_worker("echo", "/bin/echo hi");
    env.start_daemon();

    let query = env.procctl().arg("query").arg("echo").assert().success();
    let stdout = stdout_of(&query);
    assert!(stdout.contains("title"));
    assert!(stdout.contains("echo"));
}

#[test]
fn run_then_terminate_instance() {
    let mut env = TestEnv::new();
    env.write_worker("sleeper", "/bin/sleep 5");
    env.start_daemon();

    let ran = env.procctl().arg("run").arg("sleeper").assert().success();
    let id: u64 = stdout_of(&ran).trim().parse().expect("instance id");

    env.procctl().arg("terminate").arg(id.to_string()).assert().success();
}

#[test]
fn run_unknown_worker_fails() {
    let mut env = TestEnv::new();
    env.start_daemon();

    env.procctl().arg("run").arg("does-not-exist").assert().failure();
}

#[test]
fn subscribe_streams_monitor_events() {
    let mut env = TestEnv::new();
    env.write_worker("sleeper", "/bin/sleep 5");
    env.start_daemon();

    let mut subscriber = Command::new(cargo_bin("procctl"))
        .arg("--name")
        .arg(&env.name)
        .arg("--run-prefix")
        .arg(&env.run_prefix)
        .arg("subscribe")
        .arg("sleeper")
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn procctl subscribe");

    let stdout = subscriber.stdout.take().expect("subscriber stdout");
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines().flatten() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    env.procctl().arg("run").arg("sleeper").assert().success();

    let deadline = Instant::now() + WAIT_MAX;
    let mut saw_event = false;
    while Instant::now() < deadline {
        if let Ok(line) = rx.recv_timeout(Duration::from_millis(200)) {
            if line.contains("new") || line.contains("starting") {
                saw_event = true;
                break;
            }
        }
    }

    let _ = subscriber.kill();
    let _ = subscriber.wait();
    assert!(saw_event, "expected a pushed monitor event for the sleeper worker");
}
