//! Wire protocol message types for the daemon ⇄ overlay bridge.
//!
//! All messages are MessagePack-encoded maps with at minimum `type` and `id`
//! fields. Requests carry a client-chosen `id`; pushed messages from the
//! daemon use `id: 0`.

use serde::{Deserialize, Serialize};

use crate::store::{ClipEntry, EntryKind};

/// All bridge messages.
///
/// Serialized as a tagged union on the `type` field via MessagePack.
///
/// The request surface exposed to the overlay is deliberately narrow:
/// `request_recent`, `request_search`, and `hide_and_clear` are the only
/// operations a connected client can invoke. Everything the daemon knows
/// beyond that (store handle, hotkey, visibility internals) is unreachable
/// over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    // -- Handshake --
    #[serde(rename = "hello")]
    Hello { id: u32, version: u32, role: Role },

    #[serde(rename = "hello_ack")]
    HelloAck {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- Requests (client → daemon) --
    #[serde(rename = "request_recent")]
    RequestRecent { id: u32, limit: u32 },

    #[serde(rename = "request_search")]
    RequestSearch {
        id: u32,
        query: String,
        limit: u32,
        /// Optional entry-kind filter. Absent means all kinds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kinds: Option<Vec<EntryKind>>,
    },

    /// Dismiss notification: hide the overlay and drop pending input.
    /// Fire-and-forget — the daemon sends no direct reply.
    #[serde(rename = "hide_and_clear")]
    HideAndClear { id: u32 },

    // -- Pushes (daemon → client) --
    /// A fresh entry list produced by one retrieval or search call.
    ///
    /// `seq` is the monotonically increasing tag assigned when the request
    /// was accepted. Receivers must discard any `list_updated` whose `seq`
    /// is lower than the last one they applied — store calls may complete
    /// out of order.
    #[serde(rename = "list_updated")]
    ListUpdated {
        id: u32,
        seq: u64,
        entries: Vec<ClipEntry>,
    },

    #[serde(rename = "visibility")]
    Visibility { id: u32, visible: bool },

    // -- Generic error/ack response --
    #[serde(rename = "response")]
    Response {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Client role declared in the handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The interactive overlay. At most one may be attached; it receives
    /// `list_updated` and `visibility` pushes.
    Surface,
    /// One-shot query clients. Request/response only, no visibility pushes.
    Control,
}

/// Response status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Minimal envelope for extracting `{type, id}` from unknown messages.
///
/// Used by the daemon as a fallback when [`Message`] deserialization fails
/// (e.g., unknown `type` tag), so the error response can echo the request
/// `id` instead of dropping the connection.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    /// Consumed by serde for structural matching; not read by daemon code.
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub msg_type: String,
    pub id: u32,
}
