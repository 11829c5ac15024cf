//! Message dispatch and request handling.
//!
//! Pure logic with no I/O. Each request produces an [`Outcome`]: an
//! optional direct reply, an optional store fetch for the daemon loop to
//! spawn, and an optional push to a connection. Store calls never run
//! here; the loop owns all scheduling.

use crate::ipc::protocol::{Message, PROTOCOL_VERSION, Role, Status};
use crate::store::EntryKind;

use super::session::{ConnectionId, SessionState, Toggle};

/// A store call the daemon loop must spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSpec {
    /// Sequence tag carried into the resulting `list_updated` push.
    pub seq: u64,
    pub kind: FetchKind,
    /// Connection the result is pushed to.
    pub target: ConnectionId,
    /// Reveal the overlay once the result has been delivered. Set only by
    /// the hotkey show path so the list lands before the surface becomes
    /// visible.
    pub then_show: bool,
}

/// Which store operation to invoke.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchKind {
    Recent {
        limit: u32,
    },
    Search {
        query: String,
        limit: u32,
        kinds: Option<Vec<EntryKind>>,
    },
}

/// Result of dispatching one request.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Direct reply to the requesting connection, if any. Retrieval and
    /// search requests have none: the pushed `list_updated` is the answer.
    pub reply: Option<Message>,
    pub fetch: Option<FetchSpec>,
    pub push: Option<(ConnectionId, Message)>,
}

impl Outcome {
    fn reply(msg: Message) -> Self {
        Self {
            reply: Some(msg),
            ..Self::default()
        }
    }

    fn fetch(spec: FetchSpec) -> Self {
        Self {
            fetch: Some(spec),
            ..Self::default()
        }
    }
}

/// Effect of a hotkey press.
#[derive(Debug, PartialEq)]
pub enum HotkeyOutcome {
    /// Became visible: fetch recent entries, deliver them, then reveal.
    Show(FetchSpec),
    /// Became hidden: push a hide to the surface.
    Hide(ConnectionId),
}

/// Dispatch a request message.
pub fn handle_message(
    state: &mut SessionState,
    request: Message,
    connection_id: ConnectionId,
) -> Outcome {
    match request {
        Message::Hello { id, version, role } => handle_hello(state, id, version, role, connection_id),

        Message::RequestRecent { id, limit } => {
            if limit == 0 {
                return Outcome::reply(error_response(id, "invalid_limit"));
            }
            Outcome::fetch(FetchSpec {
                seq: state.next_seq(),
                kind: FetchKind::Recent { limit },
                target: connection_id,
                then_show: false,
            })
        }

        Message::RequestSearch {
            id,
            query,
            limit,
            kinds,
        } => {
            if limit == 0 {
                return Outcome::reply(error_response(id, "invalid_limit"));
            }
            Outcome::fetch(FetchSpec {
                seq: state.next_seq(),
                kind: FetchKind::Search { query, limit, kinds },
                target: connection_id,
                then_show: false,
            })
        }

        // -- Surface-only --
        Message::HideAndClear { id } => {
            if state.connection_role(connection_id) != Some(Role::Surface) {
                return Outcome::reply(error_response(id, "unknown_type"));
            }
            // Idempotent: no transition, no push.
            let mut outcome = Outcome::default();
            if state.hide()
                && let Some(surface) = state.surface()
            {
                outcome.push = Some((
                    surface,
                    Message::Visibility {
                        id: 0,
                        visible: false,
                    },
                ));
            }
            outcome
        }

        // Server-originated messages should never be sent by clients.
        Message::HelloAck { id, .. }
        | Message::ListUpdated { id, .. }
        | Message::Visibility { id, .. }
        | Message::Response { id, .. } => Outcome::reply(error_response(id, "unknown_type")),
    }
}

/// Handle a global hotkey press.
///
/// Returns `None` when no surface is attached: the toggle has nothing to
/// show or hide, and the visibility state is left untouched.
pub fn handle_hotkey(state: &mut SessionState, limit: u32) -> Option<HotkeyOutcome> {
    let surface = state.surface()?;
    match state.toggle() {
        Toggle::Shown => Some(HotkeyOutcome::Show(FetchSpec {
            seq: state.next_seq(),
            kind: FetchKind::Recent { limit },
            target: surface,
            then_show: true,
        })),
        Toggle::Hidden => Some(HotkeyOutcome::Hide(surface)),
    }
}

// -- Individual handlers --

fn handle_hello(
    state: &mut SessionState,
    id: u32,
    version: u32,
    role: Role,
    connection_id: ConnectionId,
) -> Outcome {
    // hello.id must be 0; the ack always echoes 0.
    if id != 0 {
        return Outcome::reply(hello_error("invalid_hello_id"));
    }
    if version != PROTOCOL_VERSION {
        return Outcome::reply(hello_error("version_mismatch"));
    }
    if let Err(reason) = state.add_connection(connection_id, role) {
        return Outcome::reply(hello_error(reason));
    }
    Outcome::reply(Message::HelloAck {
        id: 0,
        status: Status::Ok,
        error: None,
    })
}

// -- Helpers --

fn hello_error(reason: &str) -> Message {
    Message::HelloAck {
        id: 0,
        status: Status::Error,
        error: Some(reason.into()),
    }
}

fn error_response(id: u32, reason: &str) -> Message {
    Message::Response {
        id,
        status: Status::Error,
        error: Some(reason.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntryKind;

    fn fresh() -> (SessionState, ConnectionId) {
        (SessionState::new(), ConnectionId::new())
    }

    fn hello(version: u32, role: Role) -> Message {
        Message::Hello {
            id: 0,
            version,
            role,
        }
    }

    fn attach_surface(state: &mut SessionState) -> ConnectionId {
        let c = ConnectionId::new();
        let outcome = handle_message(state, hello(PROTOCOL_VERSION, Role::Surface), c);
        assert!(matches!(
            outcome.reply,
            Some(Message::HelloAck {
                status: Status::Ok,
                ..
            })
        ));
        c
    }

    // -- Hello --

    #[test]
    fn hello_success() {
        let (mut s, c) = fresh();
        let outcome = handle_message(&mut s, hello(PROTOCOL_VERSION, Role::Surface), c);
        assert!(outcome.fetch.is_none());
        assert!(outcome.push.is_none());
        assert!(matches!(
            outcome.reply,
            Some(Message::HelloAck {
                id: 0,
                status: Status::Ok,
                ..
            })
        ));
    }

    #[test]
    fn hello_version_mismatch() {
        let (mut s, c) = fresh();
        let outcome = handle_message(&mut s, hello(999, Role::Surface), c);
        match outcome.reply {
            Some(Message::HelloAck {
                id, status, error, ..
            }) => {
                assert_eq!(id, 0);
                assert_eq!(status, Status::Error);
                assert_eq!(error.as_deref(), Some("version_mismatch"));
            }
            other => panic!("expected HelloAck, got {other:?}"),
        }
    }

    #[test]
    fn hello_nonzero_id_rejected() {
        let (mut s, c) = fresh();
        let outcome = handle_message(
            &mut s,
            Message::Hello {
                id: 5,
                version: PROTOCOL_VERSION,
                role: Role::Control,
            },
            c,
        );
        match outcome.reply {
            Some(Message::HelloAck { id, error, .. }) => {
                assert_eq!(id, 0);
                assert_eq!(error.as_deref(), Some("invalid_hello_id"));
            }
            other => panic!("expected HelloAck, got {other:?}"),
        }
    }

    #[test]
    fn second_surface_hello_rejected() {
        let (mut s, _) = fresh();
        attach_surface(&mut s);
        let c2 = ConnectionId::new();
        let outcome = handle_message(&mut s, hello(PROTOCOL_VERSION, Role::Surface), c2);
        match outcome.reply {
            Some(Message::HelloAck { status, error, .. }) => {
                assert_eq!(status, Status::Error);
                assert_eq!(error.as_deref(), Some("surface_attached"));
            }
            other => panic!("expected HelloAck, got {other:?}"),
        }
    }

    // -- Retrieval / search --

    #[test]
    fn request_recent_produces_fetch() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        let outcome = handle_message(&mut s, Message::RequestRecent { id: 1, limit: 40 }, c);
        assert!(outcome.reply.is_none(), "list push is the only response");
        let spec = outcome.fetch.expect("expected fetch");
        assert_eq!(spec.kind, FetchKind::Recent { limit: 40 });
        assert_eq!(spec.target, c);
        assert!(!spec.then_show);
    }

    #[test]
    fn request_seq_increases_per_request() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        let first = handle_message(&mut s, Message::RequestRecent { id: 1, limit: 10 }, c)
            .fetch
            .unwrap();
        let second = handle_message(
            &mut s,
            Message::RequestSearch {
                id: 2,
                query: "foo".into(),
                limit: 10,
                kinds: None,
            },
            c,
        )
        .fetch
        .unwrap();
        assert!(second.seq > first.seq);
    }

    #[test]
    fn request_search_carries_query_and_kinds() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        let outcome = handle_message(
            &mut s,
            Message::RequestSearch {
                id: 3,
                query: "needle".into(),
                limit: 20,
                kinds: Some(vec![EntryKind::Text]),
            },
            c,
        );
        match outcome.fetch.unwrap().kind {
            FetchKind::Search { query, limit, kinds } => {
                assert_eq!(query, "needle");
                assert_eq!(limit, 20);
                assert_eq!(kinds, Some(vec![EntryKind::Text]));
            }
            other => panic!("expected Search, got {other:?}"),
        }
    }

    #[test]
    fn zero_limit_rejected() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        let outcome = handle_message(&mut s, Message::RequestRecent { id: 9, limit: 0 }, c);
        assert!(outcome.fetch.is_none());
        match outcome.reply {
            Some(Message::Response { id, error, .. }) => {
                assert_eq!(id, 9);
                assert_eq!(error.as_deref(), Some("invalid_limit"));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    // -- Hide and clear --

    #[test]
    fn hide_pushes_visibility_false_when_visible() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        s.show();
        let outcome = handle_message(&mut s, Message::HideAndClear { id: 1 }, c);
        assert!(outcome.reply.is_none());
        match outcome.push {
            Some((target, Message::Visibility { visible, .. })) => {
                assert_eq!(target, c);
                assert!(!visible);
            }
            other => panic!("expected Visibility push, got {other:?}"),
        }
        assert!(!s.is_visible());
    }

    #[test]
    fn hide_while_hidden_is_silent() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        let outcome = handle_message(&mut s, Message::HideAndClear { id: 1 }, c);
        assert!(outcome.reply.is_none());
        assert!(outcome.push.is_none());
    }

    #[test]
    fn hide_twice_same_as_once() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        s.show();
        handle_message(&mut s, Message::HideAndClear { id: 1 }, c);
        let second = handle_message(&mut s, Message::HideAndClear { id: 2 }, c);
        assert!(second.push.is_none());
        assert!(!s.is_visible());
    }

    #[test]
    fn hide_rejected_from_control_role() {
        let (mut s, _) = fresh();
        attach_surface(&mut s);
        let control = ConnectionId::new();
        handle_message(&mut s, hello(PROTOCOL_VERSION, Role::Control), control);
        s.show();
        let outcome = handle_message(&mut s, Message::HideAndClear { id: 4 }, control);
        match outcome.reply {
            Some(Message::Response { error, .. }) => {
                assert_eq!(error.as_deref(), Some("unknown_type"));
            }
            other => panic!("expected Response, got {other:?}"),
        }
        assert!(s.is_visible(), "control client must not change visibility");
    }

    // -- Unknown / server-originated --

    #[test]
    fn server_messages_return_unknown_type() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        for msg in [
            Message::HelloAck {
                id: 1,
                status: Status::Ok,
                error: None,
            },
            Message::ListUpdated {
                id: 2,
                seq: 1,
                entries: vec![],
            },
            Message::Visibility {
                id: 3,
                visible: true,
            },
            Message::Response {
                id: 4,
                status: Status::Ok,
                error: None,
            },
        ] {
            let expected_id = match &msg {
                Message::HelloAck { id, .. }
                | Message::ListUpdated { id, .. }
                | Message::Visibility { id, .. }
                | Message::Response { id, .. } => *id,
                _ => unreachable!(),
            };
            let outcome = handle_message(&mut s, msg, c);
            match outcome.reply {
                Some(Message::Response { id, error, .. }) => {
                    assert_eq!(id, expected_id);
                    assert_eq!(error.as_deref(), Some("unknown_type"));
                }
                other => panic!("expected error Response, got {other:?}"),
            }
        }
    }

    // -- Hotkey --

    #[test]
    fn hotkey_without_surface_is_ignored() {
        let (mut s, _) = fresh();
        assert_eq!(handle_hotkey(&mut s, 40), None);
        assert!(!s.is_visible());
    }

    #[test]
    fn hotkey_show_schedules_fetch_then_reveal() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        match handle_hotkey(&mut s, 40) {
            Some(HotkeyOutcome::Show(spec)) => {
                assert_eq!(spec.kind, FetchKind::Recent { limit: 40 });
                assert_eq!(spec.target, c);
                assert!(spec.then_show);
            }
            other => panic!("expected Show, got {other:?}"),
        }
        assert!(s.is_visible());
    }

    #[test]
    fn hotkey_toggle_hides_when_visible() {
        let (mut s, _) = fresh();
        let c = attach_surface(&mut s);
        handle_hotkey(&mut s, 40);
        match handle_hotkey(&mut s, 40) {
            Some(HotkeyOutcome::Hide(target)) => assert_eq!(target, c),
            other => panic!("expected Hide, got {other:?}"),
        }
        assert!(!s.is_visible());
    }
}
