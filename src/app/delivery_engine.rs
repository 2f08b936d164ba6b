//! Journal delivery engine.
//!
//! One engine owns one credential's checkpoint and walks the journal
//! strictly page by page:
//!
//! ```text
//! Start → Authenticating → Fetching → Processing → Committing ─┐
//!                             ▲                                │ next cursor
//!                             └────────────────────────────────┘
//!                                   Committing → Draining → Terminated
//! ```
//!
//! Any fatal error ends in `Failed`. A stop signal seen between pages ends in
//! `Cancelled`. Event ids are committed only after the sink accepted them, so a
//! crash can repeat at most the deliveries of one page and never loses one.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::app::ports::{CheckpointStore, EventSink, JournalClient, TokenProvider};
use crate::error::{ConnectorError, Result};
use crate::metrics;
use crate::types::{Credential, Page, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Start,
    Authenticating,
    Fetching,
    Processing,
    Committing,
    Draining,
    Terminated,
    Cancelled,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The journal reported no further cursor.
    Drained,
    /// The stop signal was observed between pages.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: usize,
    pub delivered: usize,
    pub skipped: usize,
    /// Cursor persisted when the run ended.
    pub final_cursor: Option<String>,
    pub outcome: RunOutcome,
}

/// Result of pushing one page through the sink.
struct PageProgress {
    delivered: Vec<String>,
    skipped: usize,
    failure: Option<ConnectorError>,
}

pub struct DeliveryEngine {
    credential: Credential,
    tokens: Arc<dyn TokenProvider>,
    journal: Arc<dyn JournalClient>,
    sink: Arc<dyn EventSink>,
    store: Box<dyn CheckpointStore>,
    cancel: CancellationToken,
    state: EngineState,
}

impl DeliveryEngine {
    pub fn new(
        credential: Credential,
        tokens: Arc<dyn TokenProvider>,
        journal: Arc<dyn JournalClient>,
        sink: Arc<dyn EventSink>,
        store: Box<dyn CheckpointStore>,
    ) -> Self {
        Self {
            credential,
            tokens,
            journal,
            sink,
            store,
            cancel: CancellationToken::new(),
            state: EngineState::Start,
        }
    }

    /// Stops the run at the next page boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    fn transition(&mut self, next: EngineState) {
        debug!(from = %self.state, to = %next, "engine transition");
        self.state = next;
    }

    /// Runs one invocation: authenticate once, then consume pages until the
    /// journal is drained, the stop signal fires, or a fatal error occurs.
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4(), api_key = %self.credential.api_key))]
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.state = EngineState::Start;
        match self.drive().await {
            Ok(summary) => {
                metrics::record_run_completed();
                info!(
                    pages = summary.pages,
                    delivered = summary.delivered,
                    skipped = summary.skipped,
                    outcome = ?summary.outcome,
                    "run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                self.transition(EngineState::Failed);
                metrics::record_run_failed(e.kind());
                error!(kind = e.kind(), error = %e, "run failed");
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<RunSummary> {
        self.transition(EngineState::Authenticating);
        let token = self.tokens.obtain_token(&self.credential).await?;
        metrics::record_token_obtained();

        // Only touched once authentication succeeded.
        self.store.initialize()?;
        let mut cursor = self.store.last_cursor();
        if let Some(c) = &cursor {
            info!(cursor = %c, delivered = self.store.delivered_count(), "resuming from checkpoint");
        }

        let mut summary = RunSummary {
            pages: 0,
            delivered: 0,
            skipped: 0,
            final_cursor: cursor.clone(),
            outcome: RunOutcome::Drained,
        };

        loop {
            if self.cancel.is_cancelled() {
                self.transition(EngineState::Cancelled);
                info!(cursor = ?cursor, "stop requested, leaving at page boundary");
                summary.outcome = RunOutcome::Cancelled;
                return Ok(summary);
            }

            self.transition(EngineState::Fetching);
            let page = self.fetch(&token, cursor.as_deref()).await?;
            summary.pages += 1;
            metrics::record_page_fetched(page.events.len());

            self.transition(EngineState::Processing);
            let progress = self.process_page(&page).await;

            if let Some(failure) = progress.failure {
                // Keep what the sink already accepted so a retry does not repeat the page.
                if let Err(e) = self.store.append_batch(&progress.delivered) {
                    error!(
                        error = %e,
                        staged = progress.delivered.len(),
                        "failed to checkpoint deliveries preceding the sink failure"
                    );
                } else {
                    metrics::record_delivered(progress.delivered.len());
                }
                return Err(failure);
            }

            self.transition(EngineState::Committing);
            self.store.append_batch(&progress.delivered)?;
            summary.delivered += progress.delivered.len();
            summary.skipped += progress.skipped;
            metrics::record_delivered(progress.delivered.len());
            metrics::record_skipped(progress.skipped);
            info!(
                delivered = progress.delivered.len(),
                skipped = progress.skipped,
                "page committed"
            );

            match page.next_cursor {
                Some(next) => {
                    self.store.save_cursor(&next)?;
                    summary.final_cursor = Some(next.clone());
                    cursor = Some(next);
                }
                None => {
                    self.transition(EngineState::Draining);
                    self.transition(EngineState::Terminated);
                    return Ok(summary);
                }
            }
        }
    }

    async fn fetch(&self, token: &Token, cursor: Option<&str>) -> Result<Page> {
        self.journal
            .fetch_page(&self.credential.endpoint, token, &self.credential.api_key, cursor)
            .await
    }

    /// Hands every not-yet-delivered event of `page` to the sink, in order,
    /// stopping at the first rejection.
    async fn process_page(&self, page: &Page) -> PageProgress {
        let mut progress = PageProgress { delivered: Vec::new(), skipped: 0, failure: None };
        let mut staged: HashSet<&str> = HashSet::new();

        for event in &page.events {
            let id = event.event_id.as_str();
            if self.store.contains(id) || staged.contains(id) {
                progress.skipped += 1;
                continue;
            }
            match self.sink.deliver(event).await {
                Ok(()) => {
                    debug!(event_id = %id, "delivered event");
                    staged.insert(id);
                    progress.delivered.push(event.event_id.clone());
                }
                Err(e) => {
                    warn!(event_id = %id, error = %e, "sink rejected event");
                    progress.failure = Some(ConnectorError::Delivery {
                        event_id: event.event_id.clone(),
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }
        progress
    }
}

/// Checks that `credential` can authenticate and read the journal, without
/// touching any checkpoint or sink. Returns the number of events on the first page.
#[instrument(skip_all, fields(api_key = %credential.api_key))]
pub async fn validate_credential(
    credential: &Credential,
    tokens: &dyn TokenProvider,
    journal: &dyn JournalClient,
) -> Result<usize> {
    credential.validate()?;
    let token = tokens.obtain_token(credential).await?;
    let page = journal
        .fetch_page(&credential.endpoint, &token, &credential.api_key, None)
        .await?;
    info!(events = page.events.len(), more = page.next_cursor.is_some(), "credential validated");
    Ok(page.events.len())
}
