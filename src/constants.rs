//! Constants shared by the token exchange, journal client and sinks.

// Identity Management Service defaults
pub const DEFAULT_IMS_HOST: &str = "https://ims-na1.adobelogin.com";
pub const DEFAULT_METASCOPE: &str = "ent_adobeio_sdk";
pub const TOKEN_EXCHANGE_PATH: &str = "/ims/exchange/jwt/";

/// Lifetime of the signed assertion, a little over a day.
pub const ASSERTION_LIFETIME_SECS: i64 = 87_000;

/// Validity assumed for a bearer token when the exchange does not report one.
pub const DEFAULT_TOKEN_VALIDITY_SECS: i64 = 24 * 60 * 60;

/// Upper bound applied to a validity reported by the token exchange.
pub const MAX_TOKEN_VALIDITY_SECS: i64 = 7 * 24 * 60 * 60;

// Journal request
pub const API_KEY_HEADER: &str = "x-api-key";
pub const CURSOR_QUERY_PARAM: &str = "from";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Sink record fields
pub const SOURCETYPE: &str = "adobe_io_events";

// Checkpoint files
pub const CHECKPOINT_LOG_EXT: &str = "txt";
pub const CHECKPOINT_CURSOR_EXT: &str = "cursor";
pub const CHECKPOINT_DB_FILE: &str = "checkpoints.db";
