use crate::app::ports::JournalClient;
use crate::constants::{API_KEY_HEADER, CURSOR_QUERY_PARAM};
use crate::error::{ConnectorError, Result};
use crate::types::{Event, Page, Token};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument};

/// Reads journal pages over HTTP.
pub struct HttpJournalClient {
    client: reqwest::Client,
}

impl HttpJournalClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JournalClient for HttpJournalClient {
    #[instrument(skip(self, token, api_key))]
    async fn fetch_page(
        &self,
        endpoint: &str,
        token: &Token,
        api_key: &str,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let mut req = self
            .client
            .get(endpoint)
            .header(API_KEY_HEADER, api_key)
            .bearer_auth(&token.value);
        if let Some(c) = cursor.filter(|c| !c.trim().is_empty()) {
            req = req.query(&[(CURSOR_QUERY_PARAM, c)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ConnectorError::Transport(format!("failed to read body: {}", e)))?;
        if !status.is_success() {
            return Err(ConnectorError::Transport(format!(
                "journal returned HTTP {}: {}",
                status,
                truncate(&body, 256)
            )));
        }

        let page = parse_page(&body, Utc::now())?;
        debug!(events = page.events.len(), next = ?page.next_cursor, "fetched journal page");
        Ok(page)
    }
}

/// Parses a journal response body into a [`Page`].
///
/// A missing `events` field is an empty page. An empty, blank, null or
/// missing `next` ends the journal.
pub fn parse_page(body: &str, observed_at: DateTime<Utc>) -> Result<Page> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ConnectorError::Protocol(format!("body is not JSON: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ConnectorError::Protocol("body is not a JSON object".to_string()))?;

    let events = match obj.get("events") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_event(i, item, observed_at))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(ConnectorError::Protocol("'events' is not an array".to_string()));
        }
    };

    let next_cursor = match obj.get("next") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => {
            return Err(ConnectorError::Protocol("'next' is not a string".to_string()));
        }
    };

    Ok(Page { events, next_cursor })
}

fn parse_event(index: usize, item: &Value, observed_at: DateTime<Utc>) -> Result<Event> {
    let event_id = item
        .get("event_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ConnectorError::Protocol(format!("event at index {} has no string event_id", index))
        })?;
    // Checkpoint logs hold one id per line.
    if event_id.contains(&['\n', '\r'][..]) {
        return Err(ConnectorError::Protocol(format!(
            "event at index {} has a line break in its event_id",
            index
        )));
    }
    Ok(Event { event_id: event_id.to_string(), payload: item.clone(), observed_at })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
