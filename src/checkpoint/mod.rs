//! Durable checkpoint backends.

mod file;
mod sqlite;

pub use file::FileCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use crate::app::ports::CheckpointStore;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// One id-per-line log plus a cursor file per credential.
    #[default]
    File,
    /// A shared SQLite database with rows scoped per credential.
    Sqlite,
}

/// Binds a store of the chosen backend to `dir`, scoped by `key`.
///
/// Nothing touches the filesystem until [`CheckpointStore::initialize`].
pub fn open_store(backend: CheckpointBackend, dir: &Path, key: &str) -> Box<dyn CheckpointStore> {
    match backend {
        CheckpointBackend::File => Box::new(FileCheckpointStore::new(dir, key)),
        CheckpointBackend::Sqlite => Box::new(SqliteCheckpointStore::new(dir, key)),
    }
}
