use crate::error::{Result, SinkError};
use crate::types::{Credential, Event, Page, Token};
use async_trait::async_trait;

/// Turns a credential into a short-lived bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn obtain_token(&self, credential: &Credential) -> Result<Token>;
}

/// Fetches a single page of the remote journal.
#[async_trait]
pub trait JournalClient: Send + Sync {
    async fn fetch_page(
        &self,
        endpoint: &str,
        token: &Token,
        api_key: &str,
        cursor: Option<&str>,
    ) -> Result<Page>;
}

/// Downstream consumer of delivered events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &Event) -> std::result::Result<(), SinkError>;
}

/// Durable record of delivered event ids and the last journal cursor for one credential.
///
/// Implementations must flush every append to stable storage before returning.
pub trait CheckpointStore: Send + Sync {
    /// Creates an empty record if none exists and loads existing state otherwise.
    fn initialize(&mut self) -> Result<()>;

    fn contains(&self, event_id: &str) -> bool;

    /// Appending an id that is already present is harmless.
    fn append(&mut self, event_id: &str) -> Result<()> {
        self.append_batch(&[event_id.to_string()])
    }

    fn append_batch(&mut self, event_ids: &[String]) -> Result<()>;

    fn last_cursor(&self) -> Option<String>;

    fn save_cursor(&mut self, cursor: &str) -> Result<()>;

    fn delivered_count(&self) -> usize;
}
