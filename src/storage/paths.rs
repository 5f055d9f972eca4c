// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path utilities for the durable state file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_STATE_PATH;

/// Locations derived from the configured state file.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    state_file: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_PATH)
    }
}

impl StoragePaths {
    /// Paths around `state_file`.
    pub fn new(state_file: impl AsRef<Path>) -> Self {
        Self {
            state_file: state_file.as_ref().to_path_buf(),
        }
    }

    /// The snapshot file itself.
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Staging file a snapshot is written to before the rename.
    pub fn staging_file(&self) -> PathBuf {
        self.sibling("tmp")
    }

    /// Where an unparsable snapshot is moved aside before it gets replaced.
    pub fn quarantine_file(&self, timestamp: i64) -> PathBuf {
        self.sibling(&format!("corrupt-{timestamp}"))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .state_file
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(DEFAULT_STATE_PATH));
        name.push(".");
        name.push(suffix);
        self.state_file.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_db_json() {
        let paths = StoragePaths::default();
        assert_eq!(paths.state_file(), Path::new("db.json"));
        assert_eq!(paths.staging_file(), PathBuf::from("db.json.tmp"));
    }

    #[test]
    fn derived_files_live_next_to_state_file() {
        let paths = StoragePaths::new("/tmp/test-data/db.json");
        assert_eq!(
            paths.staging_file(),
            PathBuf::from("/tmp/test-data/db.json.tmp")
        );
        assert_eq!(
            paths.quarantine_file(1706400000),
            PathBuf::from("/tmp/test-data/db.json.corrupt-1706400000")
        );
    }
}
