//! Overlay state — entry list, selection, input mode, query text.
//!
//! The selection state machine lives here as plain data with named
//! transitions; input handlers never poke fields directly. Two states:
//! empty (no entries) and listed; the machine persists for the process
//! lifetime and re-enters the empty state on every visibility cycle.

use crate::store::ClipEntry;

/// Which input device last drove the selection.
///
/// Pointer hover is ignored while in keyboard mode, so the highlight does
/// not jump to wherever the mouse happens to rest during arrow-key
/// navigation. Any mouse movement switches back to pointer mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Pointer,
    Keyboard,
}

/// What a query edit should request next.
///
/// Empty input never reaches the store's search: it routes to a plain
/// recent fetch instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryAction {
    FetchRecent,
    Search(String),
}

/// The overlay's complete view state.
#[derive(Debug)]
pub struct OverlayState {
    entries: Vec<ClipEntry>,
    /// Highlighted row. `None` is the "nothing selected" sentinel; every
    /// installed list starts there.
    selected: Option<usize>,
    mode: InputMode,
    query: String,
    /// Sequence of the last applied list; lower-tagged pushes are stale.
    last_seq: u64,
    visible: bool,
    /// Transient status message (e.g. a failed clipboard write).
    flash: Option<String>,
}

impl OverlayState {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            selected: None,
            mode: InputMode::Pointer,
            query: String::new(),
            last_seq: 0,
            visible: false,
            flash: None,
        }
    }

    pub fn entries(&self) -> &[ClipEntry] {
        &self.entries
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn flash(&self) -> Option<&str> {
        self.flash.as_deref()
    }

    pub fn set_flash(&mut self, message: String) {
        self.flash = Some(message);
    }

    /// Install a pushed entry list.
    ///
    /// Returns `false` when the push is stale (tagged lower than the last
    /// applied sequence) and was discarded without touching any state.
    /// Selection always resets on a successful install.
    pub fn apply_list(&mut self, seq: u64, entries: Vec<ClipEntry>) -> bool {
        if seq < self.last_seq {
            return false;
        }
        self.last_seq = seq;
        self.entries = entries;
        self.selected = None;
        true
    }

    /// Apply a visibility push. Hiding re-enters the empty state.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if !visible {
            self.clear();
        }
    }

    /// Back to empty: entries dropped, query cleared, selection gone.
    /// The sequence watermark survives — daemon sequence numbers are
    /// monotonic for the life of the connection, not per cycle.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.selected = None;
        self.query.clear();
        self.mode = InputMode::Pointer;
        self.flash = None;
    }

    /// Any mouse movement returns control to the pointer.
    pub fn pointer_moved(&mut self) {
        self.mode = InputMode::Pointer;
    }

    /// Pointer hover over row `index`. Ignored in keyboard mode and for
    /// out-of-range rows.
    pub fn hover(&mut self, index: usize) {
        if self.mode == InputMode::Pointer && index < self.entries.len() {
            self.selected = Some(index);
        }
    }

    /// Arrow-key navigation: `selected = clamp(selected + delta, 0, len-1)`,
    /// where "nothing selected" counts as -1. Switches to keyboard mode.
    pub fn key_nav(&mut self, delta: i64) {
        self.mode = InputMode::Keyboard;
        if self.entries.is_empty() {
            self.selected = None;
            return;
        }
        let current = self.selected.map_or(-1, |i| i as i64);
        let max = (self.entries.len() - 1) as i64;
        self.selected = Some(current.saturating_add(delta).clamp(0, max) as usize);
    }

    /// Make a clicked row the selection. Returns `false` for rows outside
    /// the list.
    pub fn select_clicked(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.selected = Some(index);
            true
        } else {
            false
        }
    }

    /// The entry a commit would copy, or `None` when nothing is selected
    /// (commit is then a no-op and the overlay stays up).
    pub fn commit_target(&self) -> Option<&ClipEntry> {
        self.selected.and_then(|i| self.entries.get(i))
    }

    /// Append a character to the query. Returns the follow-up request.
    pub fn push_query_char(&mut self, c: char) -> QueryAction {
        self.query.push(c);
        self.query_action()
    }

    /// Delete the last query character. `None` when there was nothing to
    /// delete (no new request needed).
    pub fn pop_query_char(&mut self) -> Option<QueryAction> {
        self.query.pop()?;
        Some(self.query_action())
    }

    fn query_action(&self) -> QueryAction {
        if self.query.is_empty() {
            QueryAction::FetchRecent
        } else {
            QueryAction::Search(self.query.clone())
        }
    }
}
