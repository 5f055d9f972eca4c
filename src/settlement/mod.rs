// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement merging: claim step plus the serialized merge worker shared by
//! the sweeper and the push listener.

pub mod claim;
pub mod worker;

pub use claim::{settlement_record_id, BookkeepingClaimer, ClaimError, LedgerClaimer};
pub use worker::{MergeError, MergeHandle, MergeWorker};
