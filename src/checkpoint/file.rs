use crate::app::ports::CheckpointStore;
use crate::constants::{CHECKPOINT_CURSOR_EXT, CHECKPOINT_LOG_EXT};
use crate::error::{ConnectorError, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Checkpoint kept as two files under the checkpoint directory:
///
/// - `<key>.txt`: delivered event ids, one per line, append-only.
/// - `<key>.cursor`: the last journal cursor, replaced atomically.
pub struct FileCheckpointStore {
    dir: PathBuf,
    key: String,
    ids: HashSet<String>,
    cursor: Option<String>,
    log: Option<File>,
}

impl FileCheckpointStore {
    pub fn new<P: Into<PathBuf>>(dir: P, key: &str) -> Self {
        Self {
            dir: dir.into(),
            key: key.to_string(),
            ids: HashSet::new(),
            cursor: None,
            log: None,
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.key, CHECKPOINT_LOG_EXT))
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.key, CHECKPOINT_CURSOR_EXT))
    }

    fn log_mut(&mut self) -> Result<&mut File> {
        self.log
            .as_mut()
            .ok_or_else(|| ConnectorError::Checkpoint("checkpoint store used before initialize".into()))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn initialize(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let log_path = self.log_path();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&log_path)?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        // A crash mid-append can leave a partial id without its newline.
        if !contents.is_empty() && !contents.ends_with('\n') {
            let keep = contents.rfind('\n').map(|i| i + 1).unwrap_or(0);
            warn!(
                path = %log_path.display(),
                dropped = %&contents[keep..],
                "truncating partial trailing checkpoint entry"
            );
            file.set_len(keep as u64)?;
            file.sync_all()?;
            contents.truncate(keep);
        }

        self.ids = contents
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        self.cursor = match fs::read_to_string(self.cursor_path()) {
            Ok(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        self.log = Some(file);

        debug!(
            path = %log_path.display(),
            delivered = self.ids.len(),
            cursor = ?self.cursor,
            "checkpoint loaded"
        );
        Ok(())
    }

    fn contains(&self, event_id: &str) -> bool {
        self.ids.contains(event_id)
    }

    fn append_batch(&mut self, event_ids: &[String]) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut fresh: Vec<&String> = Vec::new();
        for id in event_ids {
            if id.contains(&['\n', '\r'][..]) {
                warn!(event_id = ?id, "not checkpointing event id with a line break");
                continue;
            }
            if !self.ids.contains(id.as_str()) && seen.insert(id.as_str()) {
                fresh.push(id);
            }
        }
        if fresh.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for id in &fresh {
            buf.push_str(id);
            buf.push('\n');
        }

        let log = self.log_mut()?;
        log.write_all(buf.as_bytes())?;
        log.sync_data()?;

        for id in fresh {
            self.ids.insert(id.clone());
        }
        Ok(())
    }

    fn last_cursor(&self) -> Option<String> {
        self.cursor.clone()
    }

    fn save_cursor(&mut self, cursor: &str) -> Result<()> {
        let target = self.cursor_path();
        let tmp = target.with_extension(format!("{}.tmp", CHECKPOINT_CURSOR_EXT));
        {
            let mut f = File::create(&tmp)?;
            f.write_all(cursor.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        sync_dir(&self.dir);
        self.cursor = Some(cursor.to_string());
        Ok(())
    }

    fn delivered_count(&self) -> usize {
        self.ids.len()
    }
}

/// Makes a rename durable. Not every platform allows opening a directory.
fn sync_dir(dir: &Path) {
    if cfg!(unix) {
        if let Ok(d) = File::open(dir) {
            if let Err(e) = d.sync_all() {
                warn!(dir = %dir.display(), error = %e, "failed to sync checkpoint directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn initialize_creates_empty_log_and_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCheckpointStore::new(dir.path().join("nested"), "key");
        store.initialize().unwrap();
        assert!(store.log_path().exists());
        assert_eq!(store.delivered_count(), 0);
        assert_eq!(store.last_cursor(), None);

        store.initialize().unwrap();
        assert_eq!(store.delivered_count(), 0);
    }

    #[test]
    fn appended_ids_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCheckpointStore::new(dir.path(), "key");
        store.initialize().unwrap();
        store.append_batch(&ids(&["a", "b"])).unwrap();
        store.append("c").unwrap();
        drop(store);

        let mut reopened = FileCheckpointStore::new(dir.path(), "key");
        reopened.initialize().unwrap();
        assert!(reopened.contains("a"));
        assert!(reopened.contains("b"));
        assert!(reopened.contains("c"));
        assert!(!reopened.contains("d"));
        assert_eq!(fs::read_to_string(reopened.log_path()).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn duplicate_appends_do_not_grow_the_log() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCheckpointStore::new(dir.path(), "key");
        store.initialize().unwrap();
        store.append("a").unwrap();
        store.append("a").unwrap();
        store.append_batch(&ids(&["b", "b", "a"])).unwrap();
        assert_eq!(store.delivered_count(), 2);
        assert_eq!(fs::read_to_string(store.log_path()).unwrap(), "a\nb\n");
    }

    #[test]
    fn duplicate_lines_in_existing_log_are_tolerated() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("key.txt"), "a\na\nb\n").unwrap();
        let mut store = FileCheckpointStore::new(dir.path(), "key");
        store.initialize().unwrap();
        assert_eq!(store.delivered_count(), 2);
        assert!(store.contains("a"));
    }

    #[test]
    fn partial_trailing_line_is_truncated() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("key.txt"), "event-1\nevent-2\nevent-").unwrap();
        let mut store = FileCheckpointStore::new(dir.path(), "key");
        store.initialize().unwrap();
        assert!(store.contains("event-2"));
        assert!(!store.contains("event-"));
        assert_eq!(store.delivered_count(), 2);

        store.append("event-3").unwrap();
        assert_eq!(
            fs::read_to_string(store.log_path()).unwrap(),
            "event-1\nevent-2\nevent-3\n"
        );
    }

    #[test]
    fn cursor_is_persisted_separately_from_ids() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCheckpointStore::new(dir.path(), "key");
        store.initialize().unwrap();
        store.append("event-9").unwrap();
        store.save_cursor("cursor-x").unwrap();
        store.save_cursor("cursor-y").unwrap();
        drop(store);

        let mut reopened = FileCheckpointStore::new(dir.path(), "key");
        reopened.initialize().unwrap();
        assert_eq!(reopened.last_cursor().as_deref(), Some("cursor-y"));
        assert!(!dir.path().join("key.cursor.tmp").exists());
    }

    #[test]
    fn append_before_initialize_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCheckpointStore::new(dir.path(), "key");
        assert!(matches!(store.append("a"), Err(ConnectorError::Checkpoint(_))));
    }

    #[test]
    fn ids_with_line_breaks_are_skipped_without_failing_the_batch() {
        let dir = TempDir::new().unwrap();
        let mut store = FileCheckpointStore::new(dir.path(), "key");
        store.initialize().unwrap();
        store.append_batch(&ids(&["good-1", "bad\nid", "bad\rid", "good-2"])).unwrap();
        assert_eq!(store.delivered_count(), 2);
        assert!(!store.contains("bad\nid"));
        assert_eq!(fs::read_to_string(store.log_path()).unwrap(), "good-1\ngood-2\n");
    }
}
