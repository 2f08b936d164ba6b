pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod runner;
pub mod types;

// Layered boundaries: the engine and its ports, then the adapters behind them
pub mod app;
pub mod infra;

pub use app::delivery_engine::{
    validate_credential, DeliveryEngine, EngineState, RunOutcome, RunSummary,
};
pub use app::ports::{CheckpointStore, EventSink, JournalClient, TokenProvider};
pub use error::{ConnectorError, Result, SinkError};
pub use types::{Credential, Event, Page, Token};
