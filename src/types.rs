use crate::error::{ConnectorError, Result};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::fmt;

/// Everything needed to authenticate against the event API and read one journal.
#[derive(Clone)]
pub struct Credential {
    pub api_key: String,
    pub technical_account_id: String,
    pub org_id: String,
    pub client_secret: String,
    pub private_key: String,
    pub endpoint: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &self.api_key)
            .field("technical_account_id", &self.technical_account_id)
            .field("org_id", &self.org_id)
            .field("client_secret", &"<redacted>")
            .field("private_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Credential {
    /// Rejects blank fields and endpoints that are not http(s) URLs.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("api_key", &self.api_key),
            ("technical_account_id", &self.technical_account_id),
            ("org_id", &self.org_id),
            ("client_secret", &self.client_secret),
            ("private_key", &self.private_key),
            ("endpoint", &self.endpoint),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConnectorError::Config(format!("credential field '{}' is empty", name)));
            }
        }
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(ConnectorError::Config(format!(
                "journal endpoint '{}' is not an http(s) URL",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// Deterministic key scoping checkpoint state to this credential.
    ///
    /// The api key is used verbatim when it is safe as a file name, otherwise
    /// its SHA-256 digest is used.
    pub fn checkpoint_key(&self) -> String {
        let safe = !self.api_key.is_empty()
            && self
                .api_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if safe {
            return self.api_key.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.api_key.as_bytes());
        format!("sha256-{}", hex::encode(hasher.finalize()))
    }
}

/// Short-lived bearer token returned by the token exchange.
#[derive(Clone)]
pub struct Token {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub validity: Duration,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("validity", &self.validity)
            .finish()
    }
}

impl Token {
    /// Saturates at the latest representable instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at
            .checked_add_signed(self.validity)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.expires_at()
    }
}

/// One journal entry. `payload` is the entry exactly as the journal returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub payload: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

/// One page of the journal. `next_cursor == None` marks the end of what is available now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub events: Vec<Event>,
    pub next_cursor: Option<String>,
}
