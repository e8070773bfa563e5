//! File-backed [`EventSink`]: one JSON object per line, opened in append mode.
//!
//! Modeled after the write-ahead-log idiom: `open` creates the file if
//! missing and recovers the next instance id from the highest id seen on
//! disk, `append` writes and flushes a single record, `replay` reads every
//! record back in order.

use crate::{EventRecord, EventSink, SinkError};
use procd_core::{InstanceId, WorkerName};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct FileEventSink {
    path: PathBuf,
    file: File,
    next_id: u64,
}

impl FileEventSink {
    /// Open (creating if absent) the event log at `path`, scanning it to
    /// recover the next unused instance id.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let existing = Self::read_all(&path)?;
        let next_id = existing.iter().map(|r| r.instance_id().0).max().map(|m| m + 1).unwrap_or(1);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Open { path: path.clone(), source })?;
        Ok(Self { path, file, next_id })
    }

    fn read_all(path: &Path) -> Result<Vec<EventRecord>, SinkError> {
        let Ok(file) = File::open(path) else {
            return Ok(Vec::new());
        };
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| SinkError::Open { path: path.to_path_buf(), source })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: EventRecord = serde_json::from_str(&line)
                .map_err(|source| SinkError::Malformed { line: line_no + 1, source })?;
            records.push(record);
        }
        Ok(records)
    }

    fn append_record(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record).expect("EventRecord is always serializable");
        line.push('\n');
        self.file.write_all(line.as_bytes()).map_err(|source| SinkError::Append { source })?;
        self.file.flush().map_err(|source| SinkError::Flush { source })
    }
}

impl EventSink for FileEventSink {
    fn next_instance_id(&mut self) -> InstanceId {
        let id = InstanceId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn record_started(&mut self, id: InstanceId, name: &WorkerName, started: u64) -> Result<(), SinkError> {
        self.append_record(&EventRecord::Started { id, name: name.clone(), started })
    }

    fn record_finished(&mut self, id: InstanceId, finished: u64, exit_code: Option<i32>) -> Result<(), SinkError> {
        self.append_record(&EventRecord::Finished { id, finished, exit_code })
    }

    fn replay(&self) -> Result<Vec<EventRecord>, SinkError> {
        Self::read_all(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procd_core::WorkerName;

    #[test]
    fn assigns_monotonically_increasing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileEventSink::open(dir.path().join("processes.log")).unwrap();
        let a = sink.next_instance_id();
        let b = sink.next_instance_id();
        assert_eq!(a.0 + 1, b.0);
    }

    #[test]
    fn records_round_trip_through_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processes.log");
        let mut sink = FileEventSink::open(&path).unwrap();
        let id = sink.next_instance_id();
        let name = WorkerName::parse("ftp.download").unwrap();
        sink.record_started(id, &name, 1000).unwrap();
        sink.record_finished(id, 2000, Some(0)).unwrap();

        let records = sink.replay().unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], EventRecord::Started { id: rid, .. } if *rid == id));
        assert!(matches!(&records[1], EventRecord::Finished { exit_code: Some(0), .. }));
    }

    #[test]
    fn reopening_recovers_next_id_past_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processes.log");
        let name = WorkerName::parse("a").unwrap();
        {
            let mut sink = FileEventSink::open(&path).unwrap();
            let id = sink.next_instance_id();
            sink.record_started(id, &name, 1).unwrap();
        }
        let mut reopened = FileEventSink::open(&path).unwrap();
        let next = reopened.next_instance_id();
        assert_eq!(next.0, 2);
    }
}
