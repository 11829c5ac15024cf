//! Session state — visibility, attached surface, request sequencing.
//!
//! All methods are pure state transitions with no I/O, owned exclusively by
//! the daemon loop. Error strings are machine-readable reasons sent over
//! the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ipc::protocol::Role;

/// Unique identifier for a client connection.
///
/// Monotonically increasing counter. Used to route pushes to the right
/// connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Overlay visibility, owned by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVisibility {
    Hidden,
    Visible,
}

/// Result of a hotkey toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Shown,
    Hidden,
}

/// Process-wide session state: who is connected, whether the overlay is
/// visible, and the sequence counter that tags every retrieval/search
/// request.
///
/// At most one surface connection may be attached at a time. The presence
/// check here replaces a nullable global window reference: a second attach
/// attempt is rejected instead of silently replacing the first.
#[derive(Debug)]
pub struct SessionState {
    connections: HashMap<ConnectionId, Role>,
    surface: Option<ConnectionId>,
    visibility: SessionVisibility,
    last_seq: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            surface: None,
            visibility: SessionVisibility::Hidden,
            last_seq: 0,
        }
    }

    /// Register a handshaken connection.
    ///
    /// Returns `Err("surface_attached")` when a second surface tries to
    /// attach while one is already connected.
    pub fn add_connection(&mut self, id: ConnectionId, role: Role) -> Result<(), &'static str> {
        if role == Role::Surface {
            if self.surface.is_some() {
                return Err("surface_attached");
            }
            self.surface = Some(id);
        }
        self.connections.insert(id, role);
        Ok(())
    }

    /// Remove a connection.
    ///
    /// If the attached surface drops, the session falls back to hidden:
    /// there is nothing left to show.
    pub fn remove_connection(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
        if self.surface == Some(id) {
            self.surface = None;
            self.visibility = SessionVisibility::Hidden;
        }
    }

    pub fn connection_role(&self, id: ConnectionId) -> Option<Role> {
        self.connections.get(&id).copied()
    }

    /// The attached surface connection, if any.
    pub fn surface(&self) -> Option<ConnectionId> {
        self.surface
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == SessionVisibility::Visible
    }

    /// Allocate the next request sequence number. Monotonic for the
    /// process lifetime; receivers discard results tagged lower than the
    /// last one they applied.
    pub fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }

    /// Transition to visible. Returns `false` if already visible.
    pub fn show(&mut self) -> bool {
        match self.visibility {
            SessionVisibility::Visible => false,
            SessionVisibility::Hidden => {
                self.visibility = SessionVisibility::Visible;
                true
            }
        }
    }

    /// Transition to hidden. Idempotent: hiding while hidden is a no-op
    /// and returns `false`.
    pub fn hide(&mut self) -> bool {
        match self.visibility {
            SessionVisibility::Hidden => false,
            SessionVisibility::Visible => {
                self.visibility = SessionVisibility::Hidden;
                true
            }
        }
    }

    /// Hotkey toggle.
    pub fn toggle(&mut self) -> Toggle {
        if self.hide() {
            Toggle::Hidden
        } else {
            self.show();
            Toggle::Shown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::new()
    }

    #[test]
    fn attach_surface_once() {
        let mut s = SessionState::new();
        let c = conn();
        assert!(s.add_connection(c, Role::Surface).is_ok());
        assert_eq!(s.surface(), Some(c));
    }

    #[test]
    fn second_surface_rejected() {
        let mut s = SessionState::new();
        let c1 = conn();
        let c2 = conn();
        s.add_connection(c1, Role::Surface).unwrap();
        assert_eq!(s.add_connection(c2, Role::Surface), Err("surface_attached"));
        // First surface is untouched.
        assert_eq!(s.surface(), Some(c1));
    }

    #[test]
    fn surface_can_reattach_after_disconnect() {
        let mut s = SessionState::new();
        let c1 = conn();
        s.add_connection(c1, Role::Surface).unwrap();
        s.remove_connection(c1);
        let c2 = conn();
        assert!(s.add_connection(c2, Role::Surface).is_ok());
        assert_eq!(s.surface(), Some(c2));
    }

    #[test]
    fn control_connections_are_unlimited() {
        let mut s = SessionState::new();
        for _ in 0..3 {
            assert!(s.add_connection(conn(), Role::Control).is_ok());
        }
        assert_eq!(s.surface(), None);
    }

    #[test]
    fn control_disconnect_keeps_surface() {
        let mut s = SessionState::new();
        let surface = conn();
        let control = conn();
        s.add_connection(surface, Role::Surface).unwrap();
        s.add_connection(control, Role::Control).unwrap();
        s.remove_connection(control);
        assert_eq!(s.surface(), Some(surface));
    }

    #[test]
    fn surface_disconnect_resets_visibility() {
        let mut s = SessionState::new();
        let c = conn();
        s.add_connection(c, Role::Surface).unwrap();
        s.show();
        s.remove_connection(c);
        assert!(!s.is_visible());
        assert_eq!(s.surface(), None);
    }

    #[test]
    fn seq_is_monotonic() {
        let mut s = SessionState::new();
        let a = s.next_seq();
        let b = s.next_seq();
        let c = s.next_seq();
        assert!(a < b && b < c);
    }

    #[test]
    fn show_then_show_is_noop() {
        let mut s = SessionState::new();
        assert!(s.show());
        assert!(!s.show());
        assert!(s.is_visible());
    }

    #[test]
    fn hide_is_idempotent() {
        let mut s = SessionState::new();
        s.show();
        assert!(s.hide());
        // Hiding twice in a row leaves the same state as hiding once.
        assert!(!s.hide());
        assert!(!s.is_visible());
    }

    #[test]
    fn hide_while_hidden_is_noop() {
        let mut s = SessionState::new();
        assert!(!s.hide());
        assert!(!s.is_visible());
    }

    #[test]
    fn toggle_cycles() {
        let mut s = SessionState::new();
        assert_eq!(s.toggle(), Toggle::Shown);
        assert!(s.is_visible());
        assert_eq!(s.toggle(), Toggle::Hidden);
        assert!(!s.is_visible());
        assert_eq!(s.toggle(), Toggle::Shown);
    }
}
