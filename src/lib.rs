// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cashu-NWC Bridge - Custodial Ecash Wallet Bridge
//!
//! Exposes a custodial Cashu balance to remote applications over Nostr
//! Wallet Connect, and folds payments received through npub.cash into that
//! balance exactly once, whether they are seen by polling, by push, or both.
//!
//! ## Modules
//!
//! - `bridge` - lifecycle controller (`start`, `stop`, status)
//! - `config` - options object and environment loading
//! - `nwc` - session registry, provisioning and reconnection
//! - `providers` - payment-status service and push feed
//! - `settlement` - claim step and serialized merge worker
//! - `storage` - JSON snapshot store and autosave
//! - `sweeper` / `listener` - the two settlement sources

pub mod bridge;
pub mod config;
pub mod error;
pub mod listener;
pub mod models;
pub mod nwc;
pub mod providers;
pub mod settlement;
pub mod signing;
pub mod state;
pub mod storage;
pub mod sweeper;

#[cfg(test)]
mod testing;

pub use bridge::{bridge_status, Bridge, Collaborators, LifecycleState, StartReport};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use models::BridgeStatus;
