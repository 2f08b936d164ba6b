use crate::app::ports::TokenProvider;
use crate::constants::{
    ASSERTION_LIFETIME_SECS, DEFAULT_IMS_HOST, DEFAULT_METASCOPE, DEFAULT_TOKEN_VALIDITY_SECS,
    MAX_TOKEN_VALIDITY_SECS, TOKEN_EXCHANGE_PATH,
};
use crate::error::{ConnectorError, Result};
use crate::types::{Credential, Token};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

/// Exchanges an RS256-signed JWT assertion for an access token at the
/// Identity Management Service.
pub struct ImsTokenProvider {
    client: reqwest::Client,
    ims_host: String,
    metascope: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    /// Milliseconds.
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ImsTokenProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_host(client, DEFAULT_IMS_HOST, DEFAULT_METASCOPE)
    }

    pub fn with_host(client: reqwest::Client, ims_host: &str, metascope: &str) -> Self {
        Self {
            client,
            ims_host: ims_host.trim_end_matches('/').to_string(),
            metascope: metascope.to_string(),
        }
    }

    fn exchange_url(&self) -> String {
        format!("{}{}", self.ims_host, TOKEN_EXCHANGE_PATH)
    }

    fn claims(&self, credential: &Credential) -> Value {
        let mut claims = Map::new();
        claims.insert("exp".into(), json!(Utc::now().timestamp() + ASSERTION_LIFETIME_SECS));
        claims.insert("iss".into(), json!(credential.org_id));
        claims.insert("sub".into(), json!(credential.technical_account_id));
        claims.insert(
            "aud".into(),
            json!(format!("{}/c/{}", self.ims_host, credential.api_key)),
        );
        claims.insert(format!("{}/s/{}", self.ims_host, self.metascope), json!(true));
        Value::Object(claims)
    }

    /// Builds and signs the JWT assertion for `credential`.
    pub fn sign_assertion(&self, credential: &Credential) -> Result<String> {
        let pem = normalize_private_key(&credential.private_key);
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| ConnectorError::Auth(format!("invalid private key: {}", e)))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &self.claims(credential), &key)
            .map_err(|e| ConnectorError::Auth(format!("failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for ImsTokenProvider {
    #[instrument(skip_all, fields(api_key = %credential.api_key))]
    async fn obtain_token(&self, credential: &Credential) -> Result<Token> {
        let assertion = self.sign_assertion(credential)?;
        let form = [
            ("client_id", credential.api_key.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("jwt_token", assertion.as_str()),
        ];

        let issued_at = Utc::now();
        let resp = self
            .client
            .post(self.exchange_url())
            .header("cache-control", "no-cache")
            .form(&form)
            .send()
            .await
            .map_err(|e| ConnectorError::Auth(format!("token exchange request failed: {}", e)))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ConnectorError::Auth(format!("failed to read token response: {}", e)))?;
        let parsed: ExchangeResponse = serde_json::from_str(&body).map_err(|e| {
            ConnectorError::Auth(format!("token response (HTTP {}) is not JSON: {}", status, e))
        })?;

        let value = match parsed.access_token {
            Some(v) if !v.is_empty() => v,
            _ => {
                let reason = match (parsed.error, parsed.error_description) {
                    (Some(e), Some(d)) => format!("{}: {}", e, d),
                    (Some(e), None) => e,
                    (None, Some(d)) => d,
                    (None, None) => "no access_token in response".to_string(),
                };
                return Err(ConnectorError::Auth(format!(
                    "token exchange rejected (HTTP {}): {}",
                    status, reason
                )));
            }
        };

        let validity = token_validity(parsed.expires_in);
        let token = Token { value, issued_at, validity };
        debug!(expires_at = %token.expires_at(), "obtained bearer token");

        Ok(token)
    }
}

/// `expires_in` is in milliseconds. Missing or non-positive values get the
/// default, oversized ones are capped.
fn token_validity(expires_in: Option<i64>) -> Duration {
    match expires_in {
        Some(ms) if ms > 0 => Duration::milliseconds(ms.min(MAX_TOKEN_VALIDITY_SECS * 1000)),
        _ => Duration::seconds(DEFAULT_TOKEN_VALIDITY_SECS),
    }
}

/// Restores the line structure of a PEM key that was flattened to one line,
/// or whose newlines arrived as literal `\n` escapes.
pub fn normalize_private_key(raw: &str) -> String {
    let unescaped = raw.trim().replace("\\n", "\n");
    if unescaped.contains('\n') {
        return unescaped;
    }

    let Some(header_end) = unescaped.find("-----").and_then(|start| {
        unescaped[start + 5..].find("-----").map(|i| start + 5 + i + 5)
    }) else {
        return unescaped;
    };
    let Some(footer_start) = unescaped.rfind("-----END") else {
        return unescaped;
    };
    if footer_start < header_end {
        return unescaped;
    }

    let header = &unescaped[..header_end];
    let footer = &unescaped[footer_start..];
    let body: String = unescaped[header_end..footer_start]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let mut out = String::with_capacity(unescaped.len() + body.len() / 64 + 4);
    out.push_str(header);
    out.push('\n');
    for chunk in body.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(footer);
    out.push('\n');
    out
}
