// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON snapshot persistence.
//!
//! `save` always replaces the whole file: the snapshot is written to a
//! staging file, flushed, then renamed over the state file. A crash leaves
//! either the previous snapshot or the new one on disk, never a mix.
//!
//! `load` never fails: a missing file is an empty snapshot, and a file that
//! cannot be read or parsed is logged, moved aside, and treated as empty.
//! If it cannot be moved aside, later saves are refused so the only copy is
//! never replaced. `peek` reads without touching the disk.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use super::StoragePaths;
use crate::models::Snapshot;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state file {} could not be read or moved aside; refusing to overwrite it", .0.display())]
    OverwriteBlocked(PathBuf),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home of the wallet snapshot. Disk I/O only.
pub trait StateStore: Send + Sync {
    /// Load the snapshot, or an empty one when nothing usable is on disk.
    fn load(&self) -> Snapshot;

    /// Read the snapshot for inspection. Never moves, repairs or writes
    /// anything.
    fn peek(&self) -> Snapshot {
        self.load()
    }

    /// Replace the persisted snapshot.
    fn save(&self, snapshot: &Snapshot) -> StorageResult<()>;
}

/// Snapshot store backed by a single JSON file.
///
/// Clones share the overwrite guard, so every handle on the same file
/// refuses to save once an unreadable file could not be moved aside.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    paths: StoragePaths,
    overwrite_blocked: Arc<AtomicBool>,
}

impl JsonFileStore {
    /// Store reading and writing `paths.state_file()`.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            overwrite_blocked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Strict variant of [`StateStore::load`]: `Ok(None)` when the file is
    /// absent, an error when it cannot be read or parsed.
    pub fn try_load(&self) -> StorageResult<Option<Snapshot>> {
        let bytes = match fs::read(self.paths.state_file()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_slice(&bytes)?;
        Ok(Some(snapshot))
    }

    /// Move an unreadable state file out of the way so the next save does
    /// not destroy it. An existing quarantine entry is never replaced.
    fn quarantine(&self) -> io::Result<PathBuf> {
        let target = self.paths.quarantine_file(Utc::now().timestamp());
        if fs::symlink_metadata(&target).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            ));
        }
        fs::rename(self.paths.state_file(), &target)?;
        Ok(target)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Snapshot {
        let path = self.paths.state_file();
        match self.try_load() {
            Ok(Some(snapshot)) => {
                info!(
                    path = %path.display(),
                    utxos = snapshot.utxos.len(),
                    sessions = snapshot.nwc_info.len(),
                    "Loaded wallet state"
                );
                snapshot
            }
            Ok(None) => {
                info!(path = %path.display(), "No state file, starting empty");
                Snapshot::default()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Error loading state, starting empty");
                match self.quarantine() {
                    Ok(target) => {
                        warn!(path = %target.display(), "Moved unreadable state file aside");
                    }
                    Err(e) => {
                        self.overwrite_blocked.store(true, Ordering::SeqCst);
                        error!(
                            path = %path.display(),
                            error = %e,
                            "Could not move unreadable state file aside, saves disabled"
                        );
                    }
                }
                Snapshot::default()
            }
        }
    }

    fn peek(&self) -> Snapshot {
        match self.try_load() {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                warn!(
                    path = %self.paths.state_file().display(),
                    error = %e,
                    "State file unreadable, reporting empty state"
                );
                Snapshot::default()
            }
        }
    }

    fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let path = self.paths.state_file();
        if self.overwrite_blocked.load(Ordering::SeqCst) {
            return Err(StorageError::OverwriteBlocked(path.to_path_buf()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = self.paths.staging_file();
        {
            let file = File::create(&staging)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&staging, path)?;
        Ok(())
    }
}
