use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::app::delivery_engine::{validate_credential, DeliveryEngine, RunSummary};
use crate::app::ports::{EventSink, JournalClient, TokenProvider};
use crate::checkpoint::open_store;
use crate::config::{ConnectorSettings, InputConfig};
use crate::error::Result;
use crate::infra::http_client::build_client;
use crate::infra::http_journal::HttpJournalClient;
use crate::infra::ims_token::ImsTokenProvider;
use crate::infra::sinks::{NdjsonSink, StdoutSink};

/// Builds one engine per configured input and runs them one after another.
pub struct Connector {
    settings: ConnectorSettings,
    tokens: Arc<dyn TokenProvider>,
    journal: Arc<dyn JournalClient>,
}

/// Result of one input's run.
pub struct InputReport {
    pub input: String,
    pub result: Result<RunSummary>,
}

impl Connector {
    pub fn from_settings(settings: ConnectorSettings) -> Result<Self> {
        let client = build_client(settings.request_timeout())?;
        let tokens = Arc::new(ImsTokenProvider::with_host(
            client.clone(),
            &settings.ims_host,
            &settings.metascope,
        ));
        let journal = Arc::new(HttpJournalClient::new(client));
        Ok(Self::with_parts(settings, tokens, journal))
    }

    pub fn with_parts(
        settings: ConnectorSettings,
        tokens: Arc<dyn TokenProvider>,
        journal: Arc<dyn JournalClient>,
    ) -> Self {
        Self { settings, tokens, journal }
    }

    fn sink_for(&self, source: &str) -> Arc<dyn EventSink> {
        match &self.settings.output {
            Some(path) => Arc::new(NdjsonSink::new(path, source)),
            None => Arc::new(StdoutSink::new(source)),
        }
    }

    pub fn engine_for(&self, input: &InputConfig) -> Result<DeliveryEngine> {
        let credential = input.credential()?;
        let store = open_store(
            self.settings.checkpoint_backend,
            &self.settings.checkpoint_dir,
            &credential.checkpoint_key(),
        );
        let sink = self.sink_for(&input.name);
        Ok(DeliveryEngine::new(
            credential,
            self.tokens.clone(),
            self.journal.clone(),
            sink,
            store,
        ))
    }

    /// Runs every input once. A failing input does not stop the others.
    pub async fn run_once(
        &self,
        inputs: &[&InputConfig],
        cancel: &CancellationToken,
    ) -> Vec<InputReport> {
        let mut reports = Vec::with_capacity(inputs.len());
        for input in inputs {
            if cancel.is_cancelled() {
                break;
            }
            let span = info_span!("input", name = %input.name);
            let result = async {
                let mut engine = self.engine_for(input)?.with_cancellation(cancel.clone());
                engine.run().await
            }
            .instrument(span)
            .await;
            reports.push(InputReport { input: input.name.clone(), result });
        }
        reports
    }

    /// Checks each input's credential and journal access. Returns the number of
    /// inputs that failed.
    pub async fn validate(&self, inputs: &[&InputConfig]) -> usize {
        let mut failed = 0;
        for input in inputs {
            let outcome = async {
                let credential = input.credential()?;
                validate_credential(&credential, self.tokens.as_ref(), self.journal.as_ref()).await
            }
            .instrument(info_span!("validate", name = %input.name))
            .await;
            match outcome {
                Ok(events) => info!(input = %input.name, events, "input is valid"),
                Err(e) => {
                    failed += 1;
                    error!(input = %input.name, error = %e, "input failed validation");
                }
            }
        }
        failed
    }
}
