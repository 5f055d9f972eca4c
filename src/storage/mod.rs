// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Durable State Store
//!
//! The wallet's recovery copy lives in one JSON file (default `db.json`):
//! unspent records, remote-control session descriptors, and the ids of
//! settlements already applied. It is loaded once at startup, flushed on a
//! timer while running, and flushed synchronously on shutdown.
//!
//! A single writer is assumed: one running bridge per state file.

pub mod autosave;
pub mod paths;
pub mod snapshot_store;

pub use autosave::Autosave;
pub use paths::StoragePaths;
pub use snapshot_store::{JsonFileStore, StateStore, StorageError, StorageResult};
