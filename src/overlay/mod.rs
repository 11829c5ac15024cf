//! Presentation surface — the interactive picker overlay.
//!
//! A terminal client of the daemon bridge: renders the entry list, owns
//! the selection state machine, forwards user input as bridge requests,
//! and performs the final clipboard write-back on commit. Visibility is
//! daemon-owned; this process renders a blank placeholder until a
//! `visibility` push reveals the list.

pub mod bridge_client;
pub mod state;
mod view;

use std::io::{self, Stdout};

use crossterm::event::{
    DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture, Event,
    EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::widgets::ListState;

use bridge_client::{BridgeClient, BridgeError};
use state::{OverlayState, QueryAction};

use crate::clipboard::{ClipboardWriter, XClipWriter};
use crate::ipc::codec::CodecError;
use crate::ipc::protocol::Message;
use crate::store::DEFAULT_LIMIT;

/// Overlay errors.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error("terminal I/O: {0}")]
    Io(#[from] io::Error),
    #[error("daemon connection closed")]
    DaemonGone,
}

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Run the overlay until the user quits or the daemon goes away.
pub async fn run() -> Result<(), OverlayError> {
    let bridge = BridgeClient::connect().await?;
    let mut terminal = init_terminal()?;
    let result = event_loop(bridge, &mut terminal).await;
    if let Err(e) = restore_terminal() {
        tracing::warn!(error = %e, "failed to restore terminal");
    }
    result
}

fn init_terminal() -> io::Result<Tui> {
    enable_raw_mode()?;
    execute!(
        io::stdout(),
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange
    )?;

    // Restore the terminal before any panic message is printed.
    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        hook(panic_info);
    }));

    Terminal::new(CrosstermBackend::new(io::stdout()))
}

fn restore_terminal() -> io::Result<()> {
    execute!(
        io::stdout(),
        DisableFocusChange,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    disable_raw_mode()
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

async fn event_loop(mut bridge: BridgeClient, terminal: &mut Tui) -> Result<(), OverlayError> {
    let mut state = OverlayState::new();
    let mut list_ui = ListState::default();
    let mut list_inner = Rect::default();
    let clipboard = XClipWriter::new();
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| {
            list_inner = view::draw(frame, &state, &mut list_ui);
        })?;

        tokio::select! {
            maybe_event = events.next() => {
                let event = match maybe_event {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => return Err(OverlayError::Io(e)),
                    None => return Ok(()), // Terminal input ended.
                };
                let flow = handle_terminal_event(
                    event,
                    &mut state,
                    &mut bridge,
                    &clipboard,
                    list_inner,
                    list_ui.offset(),
                )
                .await?;
                if flow == Flow::Exit {
                    return Ok(());
                }
            }
            push = bridge.next_push() => {
                match push {
                    Some(Ok(msg)) => apply_push(&mut state, &mut list_ui, msg),
                    Some(Err(e)) => return Err(OverlayError::Codec(e)),
                    None => return Err(OverlayError::DaemonGone),
                }
            }
        }
    }
}

/// Apply a pushed message to the view state.
fn apply_push(state: &mut OverlayState, list_ui: &mut ListState, msg: Message) {
    match msg {
        Message::ListUpdated { seq, entries, .. } => {
            if state.apply_list(seq, entries) {
                // Fresh list: selection gone, scroll back to the top.
                *list_ui = ListState::default();
            } else {
                tracing::debug!(seq, "discarded stale list push");
            }
        }
        Message::Visibility { visible, .. } => {
            state.set_visible(visible);
            if !visible {
                *list_ui = ListState::default();
            }
        }
        Message::Response { error, .. } => {
            if let Some(reason) = error {
                tracing::debug!(reason = %reason, "daemon rejected a request");
            }
        }
        other => {
            tracing::debug!(?other, "unexpected push ignored");
        }
    }
}

async fn handle_terminal_event(
    event: Event,
    state: &mut OverlayState,
    bridge: &mut BridgeClient,
    clipboard: &dyn ClipboardWriter,
    list_inner: Rect,
    list_offset: usize,
) -> Result<Flow, OverlayError> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => {
            handle_key(key, state, bridge, clipboard).await
        }
        Event::Mouse(mouse) if state.is_visible() => {
            handle_mouse(mouse, state, bridge, clipboard, list_inner, list_offset).await?;
            Ok(Flow::Continue)
        }
        // Losing input focus dismisses the overlay, same as an explicit
        // hide request.
        Event::FocusLost if state.is_visible() => {
            bridge.notify_hide_and_clear().await?;
            Ok(Flow::Continue)
        }
        _ => Ok(Flow::Continue),
    }
}

async fn handle_key(
    key: KeyEvent,
    state: &mut OverlayState,
    bridge: &mut BridgeClient,
    clipboard: &dyn ClipboardWriter,
) -> Result<Flow, OverlayError> {
    // Ctrl+C quits the overlay process regardless of visibility.
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Ok(Flow::Exit);
    }
    if !state.is_visible() {
        return Ok(Flow::Continue);
    }

    match key.code {
        KeyCode::Esc => {
            bridge.notify_hide_and_clear().await?;
        }
        KeyCode::Up => state.key_nav(-1),
        KeyCode::Down => state.key_nav(1),
        KeyCode::Enter => {
            if commit(state, clipboard) == CommitOutcome::Copied {
                bridge.notify_hide_and_clear().await?;
            }
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let action = state.push_query_char(c);
            issue(bridge, action).await?;
        }
        KeyCode::Backspace => {
            if let Some(action) = state.pop_query_char() {
                issue(bridge, action).await?;
            }
        }
        _ => {}
    }
    Ok(Flow::Continue)
}

async fn handle_mouse(
    mouse: MouseEvent,
    state: &mut OverlayState,
    bridge: &mut BridgeClient,
    clipboard: &dyn ClipboardWriter,
    list_inner: Rect,
    list_offset: usize,
) -> Result<(), OverlayError> {
    let hit = view::row_at(
        list_inner,
        list_offset,
        mouse.column,
        mouse.row,
        state.entries().len(),
    );
    match mouse.kind {
        MouseEventKind::Moved => {
            state.pointer_moved();
            if let Some(index) = hit {
                state.hover(index);
            }
        }
        MouseEventKind::Down(MouseButton::Left) => {
            if let Some(index) = hit
                && state.select_clicked(index)
                && commit(state, clipboard) == CommitOutcome::Copied
            {
                bridge.notify_hide_and_clear().await?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Every query edit that issues a new request supersedes any in-flight
/// request: its eventual result carries a lower sequence tag and is
/// discarded on arrival.
async fn issue(bridge: &mut BridgeClient, action: QueryAction) -> Result<(), BridgeError> {
    match action {
        QueryAction::FetchRecent => bridge.request_recent(DEFAULT_LIMIT).await,
        QueryAction::Search(query) => bridge.request_search(query, DEFAULT_LIMIT).await,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CommitOutcome {
    /// Nothing selected: no write, overlay stays up.
    NoSelection,
    /// Content copied; the caller dismisses the overlay.
    Copied,
    /// Write failed; selection kept so the user can retry.
    Failed,
}

/// Copy the selected entry to the system clipboard.
///
/// Copy and dismissal are one user-visible action, but a failed dismissal
/// never rolls back the copy: the caller sends the hide notification only
/// after `Copied`.
fn commit(state: &mut OverlayState, clipboard: &dyn ClipboardWriter) -> CommitOutcome {
    let Some(entry) = state.commit_target() else {
        return CommitOutcome::NoSelection;
    };
    match clipboard.write_text(&entry.content) {
        Ok(()) => CommitOutcome::Copied,
        Err(e) => {
            tracing::warn!(error = %e, "clipboard write failed");
            state.set_flash(e.to_string());
            CommitOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::ClipboardError;
    use crate::store::{ClipEntry, EntryKind};
    use std::cell::RefCell;

    struct FakeWriter {
        written: RefCell<Vec<String>>,
        fail: bool,
    }

    impl FakeWriter {
        fn new(fail: bool) -> Self {
            Self {
                written: RefCell::new(Vec::new()),
                fail,
            }
        }
    }

    impl ClipboardWriter for FakeWriter {
        fn write_text(&self, content: &str) -> Result<(), ClipboardError> {
            if self.fail {
                return Err(ClipboardError::Write("no clipboard".into()));
            }
            self.written.borrow_mut().push(content.to_string());
            Ok(())
        }
    }

    fn listed_state() -> OverlayState {
        let mut s = OverlayState::new();
        s.apply_list(
            1,
            vec![
                ClipEntry {
                    id: 1,
                    content: "first".into(),
                    timestamp: 200,
                    kind: EntryKind::Text,
                },
                ClipEntry {
                    id: 2,
                    content: "second".into(),
                    timestamp: 100,
                    kind: EntryKind::Text,
                },
            ],
        );
        s.set_visible(true);
        s
    }

    #[test]
    fn commit_with_no_selection_writes_nothing() {
        let mut s = listed_state();
        let writer = FakeWriter::new(false);
        assert_eq!(commit(&mut s, &writer), CommitOutcome::NoSelection);
        assert!(writer.written.borrow().is_empty());
        // The overlay stays up: state untouched.
        assert!(s.is_visible());
    }

    #[test]
    fn commit_writes_selected_content_exactly_once() {
        let mut s = listed_state();
        assert!(s.select_clicked(1));
        let writer = FakeWriter::new(false);
        assert_eq!(commit(&mut s, &writer), CommitOutcome::Copied);
        assert_eq!(writer.written.borrow().as_slice(), ["second"]);
    }

    #[test]
    fn failed_write_keeps_selection_and_sets_flash() {
        let mut s = listed_state();
        s.key_nav(1);
        let writer = FakeWriter::new(true);
        assert_eq!(commit(&mut s, &writer), CommitOutcome::Failed);
        assert_eq!(s.selected(), Some(0), "selection kept for retry");
        assert!(s.flash().is_some());
    }
}
