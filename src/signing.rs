// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Nostr signing identity.
//!
//! Keys are secp256k1 BIP-340 Schnorr keys. Events follow NIP-01 (the id is
//! the SHA-256 of the canonical `[0, pubkey, created_at, kind, tags, content]`
//! array and the signature covers that id). HTTP assertions follow NIP-98.

use std::fmt;

use base64ct::{Base64, Encoding};
use chrono::Utc;
use k256::schnorr::signature::hazmat::PrehashSigner;
use k256::schnorr::{Signature, SigningKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Placeholder written into freshly generated config files.
pub const PLACEHOLDER_SECRET: &str = "nsec1...";

/// NIP-98 HTTP auth event kind.
pub const HTTP_AUTH_KIND: u16 = 27235;

const NSEC_HRP: &str = "nsec";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SigningError {
    #[error("signing identity is not configured")]
    Missing,

    #[error("signing identity is malformed: {0}")]
    Malformed(String),

    #[error("signing failed: {0}")]
    Signature(String),

    #[error("event serialization failed: {0}")]
    Serialize(String),
}

/// Event fields chosen by the caller; id, pubkey and signature are filled
/// in by [`SigningIdentity::sign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub kind: u16,
    pub created_at: i64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    pub fn new(kind: u16, tags: Vec<Vec<String>>, content: impl Into<String>) -> Self {
        Self {
            kind,
            created_at: Utc::now().timestamp(),
            tags,
            content: content.into(),
        }
    }
}

/// A signed Nostr event, serialized as defined by NIP-01.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

#[derive(Clone)]
pub struct SigningIdentity {
    key: SigningKey,
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("pubkey", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl SigningIdentity {
    /// Parse a 64-char hex secret or a bech32 `nsec1…` string.
    pub fn parse(secret: &str) -> Result<Self, SigningError> {
        let secret = secret.trim();
        if secret.is_empty() || secret.starts_with(PLACEHOLDER_SECRET) {
            return Err(SigningError::Missing);
        }

        let bytes = if secret.to_ascii_lowercase().starts_with("nsec1") {
            decode_nsec(secret)?
        } else {
            hex::decode(secret).map_err(|e| SigningError::Malformed(format!("invalid hex: {e}")))?
        };

        if bytes.len() != 32 {
            return Err(SigningError::Malformed(format!(
                "expected 32 key bytes, got {}",
                bytes.len()
            )));
        }

        let key = SigningKey::from_bytes(&bytes)
            .map_err(|e| SigningError::Malformed(format!("invalid secp256k1 scalar: {e}")))?;
        Ok(Self { key })
    }

    /// Fresh random identity.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// x-only public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    /// Secret key, hex encoded. Handle with care.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    /// Sign an event draft.
    pub fn sign(&self, draft: UnsignedEvent) -> Result<SignedEvent, SigningError> {
        let pubkey = self.public_key_hex();
        let canonical = json!([
            0,
            pubkey,
            draft.created_at,
            draft.kind,
            draft.tags,
            draft.content
        ]);
        let serialized = serde_json::to_string(&canonical)
            .map_err(|e| SigningError::Serialize(e.to_string()))?;
        let id: [u8; 32] = Sha256::digest(serialized.as_bytes()).into();

        let signature: Signature = self
            .key
            .sign_prehash(&id)
            .map_err(|e| SigningError::Signature(e.to_string()))?;

        Ok(SignedEvent {
            id: hex::encode(id),
            pubkey,
            created_at: draft.created_at,
            kind: draft.kind,
            tags: draft.tags,
            content: draft.content,
            sig: hex::encode(signature.to_bytes()),
        })
    }

    /// Build a NIP-98 `Authorization` header value for one request.
    pub fn http_auth_header(&self, url: &str, method: &str) -> Result<String, SigningError> {
        let draft = UnsignedEvent::new(
            HTTP_AUTH_KIND,
            vec![
                vec!["u".to_string(), url.to_string()],
                vec!["method".to_string(), method.to_ascii_uppercase()],
            ],
            "",
        );
        let event = self.sign(draft)?;
        let body =
            serde_json::to_vec(&event).map_err(|e| SigningError::Serialize(e.to_string()))?;
        Ok(format!("Nostr {}", Base64::encode_string(&body)))
    }
}

/// Whether the bridge has a usable signing identity.
#[derive(Debug, Clone)]
pub enum IdentityStatus {
    Ready(SigningIdentity),
    Missing,
    Malformed(String),
}

impl IdentityStatus {
    /// Resolve the configured secret. Absent and placeholder values are
    /// `Missing`; anything unparsable is `Malformed`.
    pub fn resolve(secret: Option<&str>) -> Self {
        let Some(secret) = secret else {
            return IdentityStatus::Missing;
        };
        match SigningIdentity::parse(secret) {
            Ok(identity) => IdentityStatus::Ready(identity),
            Err(SigningError::Missing) => IdentityStatus::Missing,
            Err(e) => IdentityStatus::Malformed(e.to_string()),
        }
    }

    pub fn identity(&self) -> Option<&SigningIdentity> {
        match self {
            IdentityStatus::Ready(identity) => Some(identity),
            _ => None,
        }
    }

    /// Human-readable reason the identity is unusable.
    pub fn reason(&self) -> Option<String> {
        match self {
            IdentityStatus::Ready(_) => None,
            IdentityStatus::Missing => Some("signing identity not configured".to_string()),
            IdentityStatus::Malformed(e) => Some(e.clone()),
        }
    }
}

fn decode_nsec(secret: &str) -> Result<Vec<u8>, SigningError> {
    let (hrp, data) = bech32::decode(secret)
        .map_err(|e| SigningError::Malformed(format!("invalid bech32: {e}")))?;
    if hrp.to_lowercase() != NSEC_HRP {
        return Err(SigningError::Malformed(format!(
            "expected nsec prefix, got {}",
            hrp.to_lowercase()
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use k256::schnorr::signature::hazmat::PrehashVerifier;
    use k256::schnorr::VerifyingKey;

    const TEST_SECRET_HEX: &str =
        "5c2d6d098c4713c7723906aa7c2448342743956793e230787479637c2237ec16";

    #[test]
    fn parses_hex_secret() {
        let identity = SigningIdentity::parse(TEST_SECRET_HEX).unwrap();
        assert_eq!(identity.secret_hex(), TEST_SECRET_HEX);
        assert_eq!(identity.public_key_hex().len(), 64);
    }

    #[test]
    fn nsec_and_hex_forms_agree() {
        let bytes = hex::decode(TEST_SECRET_HEX).unwrap();
        let hrp = bech32::Hrp::parse("nsec").unwrap();
        let nsec = bech32::encode::<bech32::Bech32>(hrp, &bytes).unwrap();

        let from_nsec = SigningIdentity::parse(&nsec).unwrap();
        assert_eq!(from_nsec.secret_hex(), TEST_SECRET_HEX);
    }

    #[test]
    fn placeholder_and_empty_are_missing() {
        assert_eq!(
            SigningIdentity::parse("nsec1...").unwrap_err(),
            SigningError::Missing
        );
        assert_eq!(SigningIdentity::parse("  ").unwrap_err(), SigningError::Missing);
        assert!(matches!(IdentityStatus::resolve(None), IdentityStatus::Missing));
        assert!(matches!(
            IdentityStatus::resolve(Some("nsec1...")),
            IdentityStatus::Missing
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            SigningIdentity::parse("nsec1mock"),
            Err(SigningError::Malformed(_))
        ));
        assert!(matches!(
            SigningIdentity::parse("abcd"),
            Err(SigningError::Malformed(_))
        ));
        assert!(matches!(
            IdentityStatus::resolve(Some("zz")),
            IdentityStatus::Malformed(_)
        ));
    }

    #[test]
    fn signed_event_verifies_against_pubkey() {
        let identity = SigningIdentity::parse(TEST_SECRET_HEX).unwrap();
        let event = identity
            .sign(UnsignedEvent::new(1, vec![], "hello"))
            .unwrap();

        let pubkey = hex::decode(&event.pubkey).unwrap();
        let verifying_key = VerifyingKey::from_bytes(&pubkey).unwrap();
        let id = hex::decode(&event.id).unwrap();
        let sig = Signature::try_from(hex::decode(&event.sig).unwrap().as_slice()).unwrap();
        assert!(verifying_key.verify_prehash(&id, &sig).is_ok());
    }

    #[test]
    fn event_id_matches_canonical_serialization() {
        let identity = SigningIdentity::generate();
        let draft = UnsignedEvent {
            kind: 1,
            created_at: 1_700_000_000,
            tags: vec![vec!["t".to_string(), "x".to_string()]],
            content: "hi".to_string(),
        };
        let event = identity.sign(draft).unwrap();

        let canonical = format!(
            r#"[0,"{}",1700000000,1,[["t","x"]],"hi"]"#,
            identity.public_key_hex()
        );
        let expected = hex::encode(Sha256::digest(canonical.as_bytes()));
        assert_eq!(event.id, expected);
    }

    #[test]
    fn http_auth_header_carries_url_and_method() {
        let identity = SigningIdentity::generate();
        let header = identity
            .http_auth_header("https://npubx.cash/api/v2/auth/nip98", "get")
            .unwrap();

        let encoded = header.strip_prefix("Nostr ").expect("Nostr scheme");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        let event: SignedEvent = serde_json::from_slice(&decoded).unwrap();

        assert_eq!(event.kind, HTTP_AUTH_KIND);
        assert_eq!(event.pubkey, identity.public_key_hex());
        assert!(event
            .tags
            .contains(&vec!["u".to_string(), "https://npubx.cash/api/v2/auth/nip98".to_string()]));
        assert!(event
            .tags
            .contains(&vec!["method".to_string(), "GET".to_string()]));
    }

    #[test]
    fn debug_output_hides_secret() {
        let identity = SigningIdentity::parse(TEST_SECRET_HEX).unwrap();
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains(TEST_SECRET_HEX));
        assert!(rendered.contains(&identity.public_key_hex()));
    }
}
