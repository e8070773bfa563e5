//! `.toml` declarative worker descriptor loading.

use procd_core::{WorkerDescriptor, WorkerKind, WorkerName};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// On-disk shape of a declarative descriptor file.
#[derive(Debug, Deserialize)]
pub struct TomlDescriptor {
    pub title: String,
    #[serde(default)]
    pub desc: String,
    pub cmd: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {path}: {source}")]
    Read { path: std::path::PathBuf, source: std::io::Error },
    #[error("parsing {path}: {source}")]
    Parse { path: std::path::PathBuf, source: toml::de::Error },
}

pub(crate) fn load(path: &Path, name: WorkerName, mtime: u64) -> Result<WorkerDescriptor, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: TomlDescriptor = toml::from_str(&content).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(WorkerDescriptor {
        name,
        title: parsed.title,
        desc: parsed.desc,
        mtime,
        kind: WorkerKind::Declarative { cmd: parsed.cmd },
    })
}
