// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Directory-backed snapshot store
//
// Snapshots are named `YYYY_MM_DD_HH_MM_SS_<counter>.json`. The counter
// separates snapshots taken within the same second and restarts at zero when
// the second changes. Writes are atomic (write to `.tmp`, then rename).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::snapshot::{self, SnapshotError, SnapshotInfo, SnapshotRecord, SnapshotStore};

const EXTENSION: &str = "json";
const STAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

pub struct FileSnapshotStore {
    directory: PathBuf,
    counter: Mutex<(String, u32)>,
}

impl FileSnapshotStore {
    /// Open a snapshot directory, creating it if needed
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|source| SnapshotError::Io {
            path: directory.clone(),
            source,
        })?;
        Ok(Self {
            directory,
            counter: Mutex::new((String::new(), 0)),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Next free file name for the current second
    fn next_name(&self, now: DateTime<Utc>) -> String {
        let stamp = now.format(STAMP_FORMAT).to_string();
        let mut counter = self.counter.lock();
        if counter.0 == stamp {
            counter.1 += 1;
        } else {
            *counter = (stamp.clone(), 0);
        }
        loop {
            let name = format!("{}_{}.{}", stamp, counter.1, EXTENSION);
            if !self.directory.join(&name).exists() {
                return name;
            }
            counter.1 += 1;
        }
    }

    fn resolve_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() || path.components().count() > 1 {
            return path.to_path_buf();
        }
        if path.extension().is_some() {
            self.directory.join(name)
        } else {
            self.directory.join(format!("{}.{}", name, EXTENSION))
        }
    }

    fn info_for(&self, path: PathBuf) -> Result<SnapshotInfo, SnapshotError> {
        let metadata = std::fs::metadata(&path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(SnapshotInfo {
            name,
            path,
            modified,
            size_bytes: metadata.len(),
        })
    }
}

/// Ordering key for a snapshot name: (timestamp, counter)
fn name_key(name: &str) -> (String, u64) {
    let stem = name.strip_suffix(".json").unwrap_or(name);
    match stem.rsplit_once('_') {
        Some((stamp, counter)) => match counter.parse::<u64>() {
            Ok(n) => (stamp.to_string(), n),
            Err(_) => (stem.to_string(), 0),
        },
        None => (stem.to_string(), 0),
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn persist(&self, records: &[SnapshotRecord]) -> Result<SnapshotInfo, SnapshotError> {
        let json = snapshot::to_json(records)?;
        let name = self.next_name(Utc::now());
        let path = self.directory.join(&name);

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json).map_err(|source| SnapshotError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;

        info!(snapshot = %name, records = records.len(), "Persisted snapshot");
        self.info_for(path)
    }

    fn load(&self, name: &str) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        let path = self.resolve_path(name);
        if !path.exists() {
            return Err(SnapshotError::NotFound(name.to_string()));
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = ?path, "Loaded snapshot");
        snapshot::from_json(&contents)
    }

    fn list(&self) -> Result<Vec<SnapshotInfo>, SnapshotError> {
        let entries = std::fs::read_dir(&self.directory).map_err(|source| SnapshotError::Io {
            path: self.directory.clone(),
            source,
        })?;

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SnapshotError::Io {
                path: self.directory.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().map(|e| e == EXTENSION).unwrap_or(false) {
                snapshots.push(self.info_for(path)?);
            }
        }

        snapshots.sort_by_key(|s| Reverse((s.modified, name_key(&s.name))));
        Ok(snapshots)
    }

    fn prune(&self, keep: usize) -> Result<Vec<SnapshotInfo>, SnapshotError> {
        let stale: Vec<SnapshotInfo> = self.list()?.into_iter().skip(keep).collect();
        for snapshot in &stale {
            std::fs::remove_file(&snapshot.path).map_err(|source| SnapshotError::Io {
                path: snapshot.path.clone(),
                source,
            })?;
            debug!(snapshot = %snapshot.name, "Pruned snapshot");
        }
        Ok(stale)
    }
}
