// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Nostr Wallet Connect sessions
//!
//! - `registry` - remote identity → session descriptor map
//! - `protocol` - remote-control protocol seam and NWC provisioner
//! - `manager` - startup reconciliation of the registry with live sessions

pub mod manager;
pub mod protocol;
pub mod registry;

pub use manager::{ConnectionManager, ReconcileReport, SessionDefaults, SessionError};
pub use protocol::{
    ExistingSession, NwcProvisioner, ProtocolError, RemoteControlProtocol, SessionOutcome,
    SessionRequest, DEFAULT_PERMISSIONS,
};
pub use registry::{RegistryError, SessionRegistry};
