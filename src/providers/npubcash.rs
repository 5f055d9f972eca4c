// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! npub.cash payment-status integration.
//!
//! Authentication exchanges a NIP-98 signed assertion for a bearer token;
//! the token then lists every quote known for the identity.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::models::{SettlementStatus, MAX_SETTLEMENT_AMOUNT};
use crate::signing::{SigningError, SigningIdentity};

const AUTH_PATH: &str = "/api/v2/auth/nip98";
const QUOTES_PATH: &str = "/api/v2/wallet/quotes";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum PaymentSourceError {
    #[error("payment service signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("payment service auth failed: {0}")]
    Auth(String),

    #[error("payment service request failed: {0}")]
    Request(String),

    #[error("payment service response was invalid: {0}")]
    InvalidResponse(String),
}

/// Bearer credential for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHandle {
    pub pubkey: String,
    pub token: String,
}

/// One payment record as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    pub id: String,
    pub amount: u64,
    pub status: SettlementStatus,
}

#[async_trait]
pub trait PaymentStatusSource: Send + Sync {
    async fn authenticate(&self, signer: &SigningIdentity)
        -> Result<AuthHandle, PaymentSourceError>;

    /// Every known payment record for the authenticated identity, in the
    /// order the service returns them.
    async fn list_settlements(
        &self,
        auth: &AuthHandle,
    ) -> Result<Vec<SettlementRecord>, PaymentSourceError>;
}

#[derive(Debug, Clone)]
pub struct NpubCashClient {
    base_url: String,
    http: Client,
}

impl NpubCashClient {
    /// Client for the service at `base_url`, with a 15 second timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, PaymentSourceError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentSourceError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str, authorization: &str) -> Result<Value, PaymentSourceError> {
        let response = self
            .http
            .get(self.url(path))
            .header("Authorization", authorization)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PaymentSourceError::Request(format!("GET {path} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentSourceError::Request(format!(
                "GET {path} returned {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            PaymentSourceError::InvalidResponse(format!("GET {path} invalid JSON: {e}"))
        })
    }
}

#[async_trait]
impl PaymentStatusSource for NpubCashClient {
    async fn authenticate(
        &self,
        signer: &SigningIdentity,
    ) -> Result<AuthHandle, PaymentSourceError> {
        let assertion = signer.http_auth_header(&self.url(AUTH_PATH), "GET")?;
        let response = self
            .get_json(AUTH_PATH, &assertion)
            .await
            .map_err(|e| PaymentSourceError::Auth(e.to_string()))?;

        let token = extract_token(&response).ok_or_else(|| {
            PaymentSourceError::Auth("auth response did not include a token".to_string())
        })?;

        Ok(AuthHandle {
            pubkey: signer.public_key_hex(),
            token: token.to_string(),
        })
    }

    async fn list_settlements(
        &self,
        auth: &AuthHandle,
    ) -> Result<Vec<SettlementRecord>, PaymentSourceError> {
        let response = self
            .get_json(QUOTES_PATH, &format!("Bearer {}", auth.token))
            .await?;

        let quotes = extract_quotes(&response).ok_or_else(|| {
            PaymentSourceError::InvalidResponse("quote list missing from response".to_string())
        })?;

        let records: Vec<_> = quotes.iter().filter_map(parse_quote).collect();
        debug!(
            received = quotes.len(),
            parsed = records.len(),
            "Fetched payment records"
        );
        Ok(records)
    }
}

pub fn map_quote_status(raw: &str) -> SettlementStatus {
    SettlementStatus::from_raw(raw)
}

fn extract_token(response: &Value) -> Option<&str> {
    ["/data/token", "/token", "/data/access_token"]
        .iter()
        .find_map(|path| response.pointer(path).and_then(Value::as_str))
        .filter(|token| !token.trim().is_empty())
}

fn extract_quotes(response: &Value) -> Option<&Vec<Value>> {
    if let Some(list) = response.as_array() {
        return Some(list);
    }
    ["/data/quotes", "/quotes", "/data"]
        .iter()
        .find_map(|path| response.pointer(path).and_then(Value::as_array))
}

/// Amounts arrive as numbers or numeric strings depending on service version.
/// Amount in sats, refusing anything above [`MAX_SETTLEMENT_AMOUNT`].
fn parse_amount(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|amount| *amount <= MAX_SETTLEMENT_AMOUNT)
}

fn parse_quote(quote: &Value) -> Option<SettlementRecord> {
    let id = ["/quoteId", "/quote_id", "/id", "/quote"]
        .iter()
        .find_map(|path| quote.pointer(path).and_then(Value::as_str))?;
    let amount = quote.get("amount").and_then(parse_amount)?;
    let status = quote
        .pointer("/state")
        .or_else(|| quote.pointer("/status"))
        .and_then(Value::as_str)
        .map(map_quote_status)
        .unwrap_or(SettlementStatus::Unknown);

    Some(SettlementRecord {
        id: id.to_string(),
        amount,
        status,
    })
}
