// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory registry of remote-control sessions, keyed by remote identity.

use std::collections::BTreeMap;

use crate::models::SessionDescriptor;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("remote identity {0} already has a session")]
    AlreadyRegistered(String),

    #[error("session descriptor for {0} has no connection string")]
    MissingConnectionString(String),
}

/// At most one descriptor per remote identity; the map key is the identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRegistry {
    entries: BTreeMap<String, SessionDescriptor>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry over descriptors loaded from a snapshot.
    pub fn from_entries(entries: BTreeMap<String, SessionDescriptor>) -> Self {
        Self { entries }
    }

    /// Copy of every descriptor, keyed by identity.
    pub fn to_entries(&self) -> BTreeMap<String, SessionDescriptor> {
        self.entries.clone()
    }

    /// Number of recorded sessions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor recorded for `identity`.
    pub fn get(&self, identity: &str) -> Option<&SessionDescriptor> {
        self.entries.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Sessions in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SessionDescriptor)> {
        self.entries.iter()
    }

    /// First session (by identity) carrying a connection string.
    pub fn primary(&self) -> Option<(&String, &SessionDescriptor)> {
        self.entries
            .iter()
            .find(|(_, descriptor)| !descriptor.nwc_string.is_empty())
    }

    /// Register a freshly provisioned session.
    ///
    /// Refuses to replace an existing identity: doing so would discard the
    /// connection string the counterparty already saved.
    pub fn insert_new(
        &mut self,
        identity: impl Into<String>,
        descriptor: SessionDescriptor,
    ) -> Result<(), RegistryError> {
        let identity = identity.into();
        if descriptor.nwc_string.is_empty() {
            return Err(RegistryError::MissingConnectionString(identity));
        }
        if self.entries.contains_key(&identity) {
            return Err(RegistryError::AlreadyRegistered(identity));
        }
        self.entries.insert(identity, descriptor);
        Ok(())
    }

    /// Update relay/permission metadata. The connection string is untouched.
    pub fn update_metadata(
        &mut self,
        identity: &str,
        relay: Option<String>,
        permissions: Option<Vec<String>>,
    ) -> bool {
        let Some(descriptor) = self.entries.get_mut(identity) else {
            return false;
        };
        if let Some(relay) = relay {
            descriptor.relay = relay;
        }
        if let Some(permissions) = permissions {
            descriptor.permissions = permissions;
        }
        true
    }

    /// Explicit revocation. Not used by the reconciliation path.
    pub fn revoke(&mut self, identity: &str) -> Option<SessionDescriptor> {
        self.entries.remove(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(nwc: &str) -> SessionDescriptor {
        SessionDescriptor {
            mymint: "https://mint.example".to_string(),
            permissions: vec!["pay_invoice".to_string()],
            relay: "wss://relay.example".to_string(),
            nwc_string: nwc.to_string(),
            ..SessionDescriptor::default()
        }
    }

    #[test]
    fn insert_new_refuses_second_session_for_identity() {
        let mut registry = SessionRegistry::new();
        registry.insert_new("aa", descriptor("nwc-1")).unwrap();

        let err = registry.insert_new("aa", descriptor("nwc-2")).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("aa".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("aa").unwrap().nwc_string, "nwc-1");
    }

    #[test]
    fn insert_new_requires_connection_string() {
        let mut registry = SessionRegistry::new();
        assert!(matches!(
            registry.insert_new("aa", descriptor("")),
            Err(RegistryError::MissingConnectionString(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn update_metadata_keeps_connection_string() {
        let mut registry = SessionRegistry::new();
        registry.insert_new("aa", descriptor("nwc-1")).unwrap();

        assert!(registry.update_metadata(
            "aa",
            Some("wss://other.example".to_string()),
            Some(vec!["get_balance".to_string()]),
        ));
        let updated = registry.get("aa").unwrap();
        assert_eq!(updated.relay, "wss://other.example");
        assert_eq!(updated.permissions, vec!["get_balance".to_string()]);
        assert_eq!(updated.nwc_string, "nwc-1");

        assert!(!registry.update_metadata("missing", None, None));
    }

    #[test]
    fn primary_skips_descriptors_without_string() {
        let mut entries = BTreeMap::new();
        entries.insert("aa".to_string(), descriptor(""));
        entries.insert("bb".to_string(), descriptor("nwc-b"));
        let registry = SessionRegistry::from_entries(entries);

        let (identity, primary) = registry.primary().unwrap();
        assert_eq!(identity, "bb");
        assert_eq!(primary.nwc_string, "nwc-b");
    }

    #[test]
    fn revoke_removes_entry() {
        let mut registry = SessionRegistry::new();
        registry.insert_new("aa", descriptor("nwc-1")).unwrap();
        assert!(registry.revoke("aa").is_some());
        assert!(registry.is_empty());
    }
}
