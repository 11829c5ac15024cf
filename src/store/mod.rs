//! Clipboard store client — entry model and the narrow store interface.
//!
//! The history store itself is an external concern: something else captures
//! clipboard changes and persists them. The daemon only consumes the
//! request/response contract defined by [`HistoryStore`], so the backing
//! implementation is swappable behind the trait.

pub mod file;

use serde::{Deserialize, Serialize};

/// Default number of entries fetched when no explicit limit is given.
pub const DEFAULT_LIMIT: u32 = 40;

/// One historical clipboard item.
///
/// Immutable once returned by a store: callers reorder and filter the
/// collections they hold, never the fields of an entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClipEntry {
    /// Stable identifier, unique within the store.
    pub id: u64,
    /// Text payload restored to the clipboard on selection.
    pub content: String,
    /// Capture time, Unix epoch millis. Recency ordering key.
    pub timestamp: u64,
    /// Content discriminator. Used only as a filter hint; the daemon never
    /// interprets it.
    pub kind: EntryKind,
}

/// Entry content discriminator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Text,
    Path,
    Other,
}

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be opened. Fatal to store-backed
    /// features, not to the process.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A single retrieval/search call failed. Recovered by the caller
    /// substituting an empty list.
    #[error("store query failed: {0}")]
    Query(String),
}

/// The four-operation store client contract.
///
/// All operations may suspend on I/O; callers must not block an event loop
/// on them. Result ordering is *not* part of the contract — callers sort
/// with [`sort_for_display`] before presenting anything.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Up to `limit` most recent entries, in store order.
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<ClipEntry>, StoreError>;

    /// Up to `limit` entries matching `query`, optionally restricted to the
    /// given kinds.
    ///
    /// An empty `query` is a caller error: route empty input to
    /// [`HistoryStore::fetch_recent`] instead.
    async fn search(
        &self,
        query: &str,
        limit: u32,
        kinds: Option<&[EntryKind]>,
    ) -> Result<Vec<ClipEntry>, StoreError>;

    /// Ask the store to re-sync with externally captured content.
    /// Optional capability; implementations without one return `Ok(())`.
    async fn refresh(&self) -> Result<(), StoreError>;
}

/// Fallback used when the configured backend cannot be opened. Every
/// query fails with `StoreError::Query`, which callers degrade to an
/// empty list: store loss is fatal to store-backed features, never to
/// the process.
pub struct UnavailableStore;

#[async_trait::async_trait]
impl HistoryStore for UnavailableStore {
    async fn fetch_recent(&self, _limit: u32) -> Result<Vec<ClipEntry>, StoreError> {
        Err(StoreError::Query("store unavailable".into()))
    }

    async fn search(
        &self,
        _query: &str,
        _limit: u32,
        _kinds: Option<&[EntryKind]>,
    ) -> Result<Vec<ClipEntry>, StoreError> {
        Err(StoreError::Query("store unavailable".into()))
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Sort entries into display order: newest first, ties broken by
/// descending id so the order is deterministic.
///
/// Applied to every store result before it crosses the bridge. The store's
/// own ordering is never trusted.
pub fn sort_for_display(entries: &mut [ClipEntry]) {
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}
