//! JSON-Lines store adapter.
//!
//! Reads a history file of one JSON-encoded [`ClipEntry`] per line, written
//! by whatever captures clipboard changes on this machine. The file is the
//! store's own business: this adapter only loads it and answers queries.
//! `refresh()` re-reads the file to pick up entries appended since open.

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;

use super::{ClipEntry, EntryKind, HistoryStore, StoreError};

/// Store open parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the JSON-Lines history file.
    pub path: PathBuf,
}

impl StoreConfig {
    /// Default history location: `$XDG_DATA_HOME/cliphist/history.jsonl`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("cliphist").join("history.jsonl"))
    }
}

/// File-backed [`HistoryStore`].
///
/// Entries are held in memory in file order (oldest first); queries scan
/// from the tail so `limit` keeps the most recent matches. No ordering
/// promise is made to callers.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<Vec<ClipEntry>>,
}

impl FileStore {
    /// Open the store at the configured path.
    ///
    /// A missing file is an empty store (nothing captured yet). A file that
    /// exists but cannot be read or parsed is `StoreError::Unavailable`.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let entries = load_entries(&config.path).await?;
        tracing::info!(
            path = %config.path.display(),
            count = entries.len(),
            "history store opened"
        );
        Ok(Self {
            path: config.path,
            entries: RwLock::new(entries),
        })
    }
}

/// Read and parse the history file. Missing file → empty.
async fn load_entries(path: &Path) -> Result<Vec<ClipEntry>, StoreError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StoreError::Unavailable(format!(
                "read {}: {e}",
                path.display()
            )));
        }
    };

    let mut entries = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: ClipEntry = serde_json::from_str(line).map_err(|e| {
            StoreError::Unavailable(format!("{}:{}: {e}", path.display(), lineno + 1))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

fn kind_matches(kind: EntryKind, kinds: Option<&[EntryKind]>) -> bool {
    match kinds {
        Some(list) => list.contains(&kind),
        None => true,
    }
}

#[async_trait::async_trait]
impl HistoryStore for FileStore {
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<ClipEntry>, StoreError> {
        let entries = self.entries.read().await;
        let take = (limit as usize).min(entries.len());
        // Tail of the file = most recently appended.
        Ok(entries[entries.len() - take..].to_vec())
    }

    async fn search(
        &self,
        query: &str,
        limit: u32,
        kinds: Option<&[EntryKind]>,
    ) -> Result<Vec<ClipEntry>, StoreError> {
        if query.is_empty() {
            return Err(StoreError::Query("empty query".into()));
        }
        let needle = query.to_lowercase();
        let entries = self.entries.read().await;
        let matches: Vec<ClipEntry> = entries
            .iter()
            .rev()
            .filter(|e| kind_matches(e.kind, kinds))
            .filter(|e| e.content.to_lowercase().contains(&needle))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        let fresh = load_entries(&self.path)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let mut entries = self.entries.write().await;
        *entries = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entry(id: u64, ts: u64, content: &str, kind: EntryKind) -> ClipEntry {
        ClipEntry {
            id,
            content: content.into(),
            timestamp: ts,
            kind,
        }
    }

    fn write_history(path: &Path, entries: &[ClipEntry]) {
        let mut f = std::fs::File::create(path).unwrap();
        for e in entries {
            writeln!(f, "{}", serde_json::to_string(e).unwrap()).unwrap();
        }
    }

    async fn open_with(entries: &[ClipEntry]) -> (FileStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        write_history(&path, entries);
        let store = FileStore::open(StoreConfig { path }).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(StoreConfig {
            path: dir.path().join("nonexistent.jsonl"),
        })
        .await
        .unwrap();
        assert!(store.fetch_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_line_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        let err = FileStore::open(StoreConfig { path }).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn fetch_recent_keeps_file_tail() {
        let (store, _dir) = open_with(&[
            entry(1, 100, "oldest", EntryKind::Text),
            entry(2, 200, "middle", EntryKind::Text),
            entry(3, 300, "newest", EntryKind::Text),
        ])
        .await;

        let got = store.fetch_recent(2).await.unwrap();
        assert_eq!(got.len(), 2);
        // Tail of the file, in file order: no sorting promise here.
        assert_eq!(got[0].id, 2);
        assert_eq!(got[1].id, 3);
    }

    #[tokio::test]
    async fn fetch_recent_limit_larger_than_store() {
        let (store, _dir) = open_with(&[entry(1, 100, "only", EntryKind::Text)]).await;
        assert_eq!(store.fetch_recent(50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let (store, _dir) = open_with(&[
            entry(1, 100, "Hello World", EntryKind::Text),
            entry(2, 200, "goodbye", EntryKind::Text),
            entry(3, 300, "hello again", EntryKind::Text),
        ])
        .await;

        let got = store.search("HELLO", 10, None).await.unwrap();
        let ids: Vec<u64> = got.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn search_respects_limit_from_newest() {
        let (store, _dir) = open_with(&[
            entry(1, 100, "match a", EntryKind::Text),
            entry(2, 200, "match b", EntryKind::Text),
            entry(3, 300, "match c", EntryKind::Text),
        ])
        .await;

        let got = store.search("match", 2, None).await.unwrap();
        let ids: Vec<u64> = got.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn search_filters_by_kind() {
        let (store, _dir) = open_with(&[
            entry(1, 100, "/tmp/report.txt", EntryKind::Path),
            entry(2, 200, "report draft", EntryKind::Text),
        ])
        .await;

        let got = store
            .search("report", 10, Some(&[EntryKind::Path]))
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, 1);
    }

    #[tokio::test]
    async fn search_empty_query_is_an_error() {
        let (store, _dir) = open_with(&[entry(1, 100, "x", EntryKind::Text)]).await;
        let err = store.search("", 10, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[tokio::test]
    async fn refresh_picks_up_appended_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        write_history(&path, &[entry(1, 100, "first", EntryKind::Text)]);
        let store = FileStore::open(StoreConfig { path: path.clone() })
            .await
            .unwrap();
        assert_eq!(store.fetch_recent(10).await.unwrap().len(), 1);

        // Simulate the external capture process appending a line.
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(
            f,
            "{}",
            serde_json::to_string(&entry(2, 200, "second", EntryKind::Text)).unwrap()
        )
        .unwrap();
        drop(f);

        store.refresh().await.unwrap();
        assert_eq!(store.fetch_recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn refresh_failure_is_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        write_history(&path, &[entry(1, 100, "ok", EntryKind::Text)]);
        let store = FileStore::open(StoreConfig { path: path.clone() })
            .await
            .unwrap();

        std::fs::write(&path, "broken\n").unwrap();
        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
        // Previous in-memory state survives a failed refresh.
        assert_eq!(store.fetch_recent(10).await.unwrap().len(), 1);
    }
}
