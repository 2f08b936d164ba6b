pub mod http_client;
pub mod http_journal;
pub mod ims_token;
pub mod sinks;
