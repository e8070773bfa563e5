// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Worker catalogue: scans a directory for worker descriptors and reports
//! what changed since the previous scan.
//!
//! Two descriptor kinds live side by side in the same directory:
//! - `<name>.toml` declarative descriptors (`title`, `desc`, `cmd`)
//! - executable files, whose executable bit marks them as worker binaries
//!
//! A name present as both an executable and a `.toml` file resolves to the
//! executable; the declarative entry is shadowed, not an error.

mod toml_descriptor;

use procd_core::{WorkerDescriptor, WorkerKind, WorkerName};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use toml_descriptor::TomlDescriptor;

/// A scan result: the current set of descriptors, keyed by worker name and
/// carrying the source mtime used for change detection.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    entries: BTreeMap<WorkerName, WorkerDescriptor>,
}

impl Catalogue {
    pub fn get(&self, name: &WorkerName) -> Option<&WorkerDescriptor> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WorkerName, &WorkerDescriptor)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A change reported by [`scan`] relative to the previous [`Catalogue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Added(WorkerDescriptor),
    Modified(WorkerDescriptor),
    Removed(WorkerName),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("reading catalogue directory {path}: {source}")]
    ReadDir { path: PathBuf, source: std::io::Error },
}

/// Scan `dir` for worker descriptors and diff against `previous`.
///
/// Per-name failures (an unparsable `.toml` file, an unreadable entry) are
/// logged and skipped rather than failing the whole scan; only a failure to
/// read the directory itself is fatal.
pub fn scan(dir: &Path, previous: &Catalogue) -> Result<(Catalogue, Vec<ScanEvent>), ScanError> {
    if !dir.exists() {
        let removed = previous
            .entries
            .keys()
            .cloned()
            .map(ScanEvent::Removed)
            .collect();
        return Ok((Catalogue::default(), removed));
    }

    let read_dir = std::fs::read_dir(dir).map_err(|source| ScanError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    // executables shadow declarative descriptors of the same name, so scan
    // declaratives first into a staging map, then let executables overwrite.
    let mut staged: BTreeMap<WorkerName, WorkerDescriptor> = BTreeMap::new();

    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
        let name = match WorkerName::parse(stem) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping descriptor with invalid name");
                continue;
            }
        };

        let mtime = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable descriptor");
                continue;
            }
        };

        if is_toml {
            // An executable of the same stem always wins; don't let a later
            // directory-order declarative entry clobber it.
            if matches!(staged.get(&name).map(|d| &d.kind), Some(WorkerKind::Executable { .. })) {
                continue;
            }
            match toml_descriptor::load(&path, name.clone(), mtime) {
                Ok(desc) => {
                    staged.insert(name, desc);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping invalid declarative descriptor");
                }
            }
        } else if is_executable(&entry) {
            let desc = WorkerDescriptor {
                name: name.clone(),
                title: name.as_str().to_string(),
                desc: String::new(),
                mtime,
                kind: WorkerKind::Executable { path: path.clone() },
            };
            staged.insert(name, desc);
        }
    }

    let mut events = Vec::new();
    for (name, desc) in &staged {
        match previous.entries.get(name) {
            None => events.push(ScanEvent::Added(desc.clone())),
            Some(prev) if prev.mtime != desc.mtime || prev.kind != desc.kind => {
                events.push(ScanEvent::Modified(desc.clone()))
            }
            Some(_) => {}
        }
    }
    for name in previous.entries.keys() {
        if !staged.contains_key(name) {
            events.push(ScanEvent::Removed(name.clone()));
        }
    }

    Ok((Catalogue { entries: staged }, events))
}

#[cfg(unix)]
fn is_executable(entry: &std::fs::DirEntry) -> bool {
    use std::os::unix::fs::PermissionsExt;
    entry
        .metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_entry: &std::fs::DirEntry) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn scans_a_declarative_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "ping.toml",
            r#"title = "Ping"
desc = "pings a host"
cmd = "ping -c 1 example.com"
"#,
        );
        let (catalogue, events) = scan(dir.path(), &Catalogue::default()).unwrap();
        assert_eq!(catalogue.len(), 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ScanEvent::Added(d) if d.title == "Ping"));
    }

    #[test]
    fn executable_shadows_declarative_of_same_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ping.toml", "title = \"x\"\ndesc = \"y\"\ncmd = \"z\"\n");
        let exe = write(dir.path(), "ping", "#!/bin/sh\necho hi\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let (catalogue, _) = scan(dir.path(), &Catalogue::default()).unwrap();
        assert_eq!(catalogue.len(), 1);
        let name = WorkerName::parse("ping").unwrap();
        assert!(matches!(catalogue.get(&name).unwrap().kind, WorkerKind::Executable { .. }));
    }

    #[test]
    fn detects_removal_between_scans() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.toml", "title = \"a\"\ndesc = \"b\"\ncmd = \"c\"\n");
        let (first, _) = scan(dir.path(), &Catalogue::default()).unwrap();
        fs::remove_file(&path).unwrap();
        let (second, events) = scan(dir.path(), &first).unwrap();
        assert!(second.is_empty());
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ScanEvent::Removed(n) if n.as_str() == "a"));
    }

    #[test]
    fn invalid_descriptor_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.toml", "not valid toml {{{");
        write(dir.path(), "ok.toml", "title = \"ok\"\ndesc = \"\"\ncmd = \"true\"\n");
        let (catalogue, events) = scan(dir.path(), &Catalogue::default()).unwrap();
        assert_eq!(catalogue.len(), 1);
        assert_eq!(events.len(), 1);
    }
}
