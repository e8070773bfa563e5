//! Worker descriptor: the catalogue's unit of "a runnable worker".

use crate::id::WorkerName;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a worker is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerKind {
    /// Carries a literal command string, split on whitespace.
    Declarative { cmd: String },
    /// Carries the filesystem path of an executable launch script.
    Executable { path: PathBuf },
}

/// Identifies a runnable worker. Published by the Catalogue, consumed by the
/// Supervisor Core when a client calls `run(name, ...)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub name: WorkerName,
    pub title: String,
    pub desc: String,
    /// Last-modified timestamp (epoch millis) of the backing file, used for
    /// change detection between Catalogue scans.
    pub mtime: u64,
    pub kind: WorkerKind,
}

impl WorkerDescriptor {
    /// Build the argv for spawning this worker, with the inner-program args
    /// appended after the command/path.
    pub fn spawn_argv(&self, args: &[String]) -> (String, Vec<String>) {
        match &self.kind {
            WorkerKind::Declarative { cmd } => {
                let mut parts = cmd.split_whitespace();
                let program = parts.next().unwrap_or_default().to_string();
                let mut argv: Vec<String> = parts.map(str::to_string).collect();
                argv.extend(args.iter().cloned());
                (program, argv)
            }
            WorkerKind::Executable { path } => {
                (path.to_string_lossy().into_owned(), args.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: WorkerKind) -> WorkerDescriptor {
        WorkerDescriptor {
            name: WorkerName::parse("test.wait").unwrap(),
            title: "Wait".into(),
            desc: String::new(),
            mtime: 0,
            kind,
        }
    }

    #[test]
    fn declarative_splits_cmd_and_appends_args() {
        let d = descriptor(WorkerKind::Declarative { cmd: "sleep 0".into() });
        let (program, argv) = d.spawn_argv(&["extra".into()]);
        assert_eq!(program, "sleep");
        assert_eq!(argv, vec!["0".to_string(), "extra".to_string()]);
    }

    #[test]
    fn executable_passes_args_through_unchanged() {
        let d = descriptor(WorkerKind::Executable { path: "/bin/worker".into() });
        let (program, argv) = d.spawn_argv(&["3".into()]);
        assert_eq!(program, "/bin/worker");
        assert_eq!(argv, vec!["3".to_string()]);
    }
}
