// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote-control protocol seam and the Nostr Wallet Connect provisioner.
//!
//! [`RemoteControlProtocol::create_session`] either provisions a new session
//! (returning a freshly minted connection string) or, when given an existing
//! identity, re-establishes that session without minting anything. The relay
//! wire protocol itself lives behind this trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::models::SessionDescriptor;
use crate::signing::SigningIdentity;

/// URI scheme of NWC connection strings.
pub const NWC_URI_SCHEME: &str = "nostr+walletconnect";

/// Capabilities granted to a newly provisioned session.
pub const DEFAULT_PERMISSIONS: &[&str] =
    &["pay_invoice", "get_balance", "make_invoice", "lookup_invoice"];

/// Descriptor field holding the wallet-service secret of a session.
const SERVICE_SECRET_FIELD: &str = "service_secret";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("relay unreachable: {0}")]
    Relay(String),

    #[error("session descriptor for {identity} is unusable: {reason}")]
    InvalidDescriptor { identity: String, reason: String },

    #[error("protocol error: {0}")]
    Other(String),
}

/// A session already recorded in the registry.
#[derive(Debug, Clone)]
pub struct ExistingSession {
    pub identity: String,
    pub descriptor: SessionDescriptor,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub mint_url: String,
    pub permissions: Vec<String>,
    pub relay: String,
    /// Present for reconnects; absent to provision a new session.
    pub existing: Option<ExistingSession>,
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// A new session with a newly minted connection string.
    Provisioned {
        identity: String,
        descriptor: SessionDescriptor,
    },
    /// An existing session is live again; nothing was minted.
    Reconnected { identity: String },
}

#[async_trait]
pub trait RemoteControlProtocol: Send + Sync {
    async fn create_session(&self, request: SessionRequest)
        -> Result<SessionOutcome, ProtocolError>;

    /// Release the live session for `identity`, if any.
    async fn close_session(&self, identity: &str) -> Result<(), ProtocolError>;
}

/// Live binding tracked by the provisioner.
#[derive(Debug, Clone)]
struct LiveSession {
    relay: String,
    permissions: Vec<String>,
    service_pubkey: String,
    opened_at: DateTime<Utc>,
}

/// Provisions NWC credentials and tracks which sessions are live.
///
/// Each session gets its own wallet-service key (persisted in the descriptor)
/// and client key (handed to the counterparty inside the connection string).
/// The remote identity is the client public key.
#[derive(Default)]
pub struct NwcProvisioner {
    live: Mutex<HashMap<String, LiveSession>>,
}

impl NwcProvisioner {
    /// Provisioner with no live sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently live.
    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    pub fn is_live(&self, identity: &str) -> bool {
        self.live
            .lock()
            .map(|live| live.contains_key(identity))
            .unwrap_or(false)
    }

    fn mark_live(&self, identity: &str, session: LiveSession) {
        if let Ok(mut live) = self.live.lock() {
            live.insert(identity.to_string(), session);
        }
    }

    fn provision(&self, request: &SessionRequest) -> SessionOutcome {
        let service = SigningIdentity::generate();
        let client = SigningIdentity::generate();
        let identity = client.public_key_hex();

        let nwc_string = connection_string(
            &service.public_key_hex(),
            &request.relay,
            &client.secret_hex(),
        );

        let mut descriptor = SessionDescriptor {
            mymint: request.mint_url.clone(),
            permissions: request.permissions.clone(),
            relay: request.relay.clone(),
            nwc_string,
            ..SessionDescriptor::default()
        };
        descriptor.extra.insert(
            SERVICE_SECRET_FIELD.to_string(),
            Value::String(service.secret_hex()),
        );

        self.mark_live(
            &identity,
            LiveSession {
                relay: request.relay.clone(),
                permissions: request.permissions.clone(),
                service_pubkey: service.public_key_hex(),
                opened_at: Utc::now(),
            },
        );

        info!(identity = %identity, relay = %request.relay, "Provisioned NWC session");
        SessionOutcome::Provisioned {
            identity,
            descriptor,
        }
    }

    fn reconnect(&self, existing: &ExistingSession) -> Result<SessionOutcome, ProtocolError> {
        let invalid = |reason: &str| ProtocolError::InvalidDescriptor {
            identity: existing.identity.clone(),
            reason: reason.to_string(),
        };

        let descriptor = &existing.descriptor;
        if descriptor.nwc_string.is_empty() {
            return Err(invalid("missing connection string"));
        }
        url::Url::parse(&descriptor.relay).map_err(|e| invalid(&format!("bad relay: {e}")))?;

        let service_pubkey = match descriptor.extra.get(SERVICE_SECRET_FIELD) {
            Some(Value::String(secret)) => SigningIdentity::parse(secret)
                .map_err(|e| invalid(&e.to_string()))?
                .public_key_hex(),
            _ => service_pubkey_from_uri(&descriptor.nwc_string)
                .ok_or_else(|| invalid("cannot determine wallet service key"))?,
        };

        self.mark_live(
            &existing.identity,
            LiveSession {
                relay: descriptor.relay.clone(),
                permissions: descriptor.permissions.clone(),
                service_pubkey,
                opened_at: Utc::now(),
            },
        );

        debug!(identity = %existing.identity, "Re-established NWC session");
        Ok(SessionOutcome::Reconnected {
            identity: existing.identity.clone(),
        })
    }
}

#[async_trait]
impl RemoteControlProtocol for NwcProvisioner {
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<SessionOutcome, ProtocolError> {
        match &request.existing {
            Some(existing) => self.reconnect(existing),
            None => Ok(self.provision(&request)),
        }
    }

    async fn close_session(&self, identity: &str) -> Result<(), ProtocolError> {
        let closed = self
            .live
            .lock()
            .ok()
            .and_then(|mut live| live.remove(identity));
        if let Some(session) = closed {
            debug!(
                identity,
                relay = %session.relay,
                service_pubkey = %session.service_pubkey,
                permissions = ?session.permissions,
                uptime_secs = (Utc::now() - session.opened_at).num_seconds(),
                "Closed NWC session"
            );
        }
        Ok(())
    }
}

/// Render `nostr+walletconnect://<service-pubkey>?relay=<relay>&secret=<client-secret>`.
pub fn connection_string(service_pubkey: &str, relay: &str, client_secret: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("relay", relay)
        .append_pair("secret", client_secret)
        .finish();
    format!("{NWC_URI_SCHEME}://{service_pubkey}?{query}")
}

/// Wallet-service public key embedded in a connection string.
pub fn service_pubkey_from_uri(nwc_string: &str) -> Option<String> {
    let rest = nwc_string.strip_prefix(NWC_URI_SCHEME)?.strip_prefix("://")?;
    let pubkey = rest.split(['?', '/']).next()?;
    (!pubkey.is_empty()).then(|| pubkey.to_string())
}
