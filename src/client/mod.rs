//! One-shot CLI client for daemon queries.
//!
//! Connects to the daemon as `Role::Control`, performs a single
//! retrieval or search, prints the entries as a table, and exits. The
//! pushed `list_updated` is the reply to a query request, so the client
//! reads the stream until one arrives.

use std::path::PathBuf;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::cli::{KindArg, QueryCommand};
use crate::ipc::codec::MessageCodec;
use crate::ipc::protocol::{Message, PROTOCOL_VERSION, Role, Status};
use crate::store::{ClipEntry, EntryKind};

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon: {0}")]
    Daemon(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the query command.
pub async fn run(command: QueryCommand) -> Result<(), ClientError> {
    let mut client = ControlClient::connect().await?;

    let entries = match command {
        QueryCommand::Recent { limit } => client.recent(limit).await?,
        QueryCommand::Search {
            query,
            limit,
            kinds,
        } => {
            if query.is_empty() {
                // Empty queries route to a plain recent fetch; the store's
                // search never sees them.
                client.recent(limit).await?
            } else {
                let kinds = to_entry_kinds(&kinds);
                client.search(query, limit, kinds).await?
            }
        }
    };

    print_entries(&entries);
    Ok(())
}

fn to_entry_kinds(kinds: &[KindArg]) -> Option<Vec<EntryKind>> {
    if kinds.is_empty() {
        return None;
    }
    Some(
        kinds
            .iter()
            .map(|k| match k {
                KindArg::Text => EntryKind::Text,
                KindArg::Path => EntryKind::Path,
                KindArg::Other => EntryKind::Other,
            })
            .collect(),
    )
}

/// Control-role connection performing one request/response cycle.
struct ControlClient {
    framed: Framed<UnixStream, MessageCodec>,
    next_id: u32,
}

impl ControlClient {
    async fn connect() -> Result<Self, ClientError> {
        let socket_path = resolve_socket_path()?;

        let stream = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| ClientError::Daemon(format!("connect failed: {e}")))?;
        let mut framed = Framed::new(stream, MessageCodec::new());

        framed
            .send(Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
                role: Role::Control,
            })
            .await
            .map_err(|e| ClientError::Daemon(format!("send hello: {e}")))?;

        match framed.next().await {
            Some(Ok(Message::HelloAck {
                status: Status::Ok, ..
            })) => {}
            Some(Ok(Message::HelloAck {
                status: Status::Error,
                error,
                ..
            })) => {
                return Err(ClientError::Daemon(format!(
                    "handshake rejected: {}",
                    error.unwrap_or_default()
                )));
            }
            other => {
                return Err(ClientError::Daemon(format!(
                    "unexpected handshake response: {other:?}"
                )));
            }
        }

        Ok(Self {
            framed,
            next_id: 1, // 0 = Hello
        })
    }

    async fn recent(&mut self, limit: u32) -> Result<Vec<ClipEntry>, ClientError> {
        let id = self.next_id;
        self.next_id += 1;
        self.framed
            .send(Message::RequestRecent { id, limit })
            .await
            .map_err(|e| ClientError::Daemon(format!("send request_recent: {e}")))?;
        self.await_list().await
    }

    async fn search(
        &mut self,
        query: String,
        limit: u32,
        kinds: Option<Vec<EntryKind>>,
    ) -> Result<Vec<ClipEntry>, ClientError> {
        let id = self.next_id;
        self.next_id += 1;
        self.framed
            .send(Message::RequestSearch {
                id,
                query,
                limit,
                kinds,
            })
            .await
            .map_err(|e| ClientError::Daemon(format!("send request_search: {e}")))?;
        self.await_list().await
    }

    /// Read pushes until the list for our request arrives.
    async fn await_list(&mut self) -> Result<Vec<ClipEntry>, ClientError> {
        loop {
            match self.framed.next().await {
                Some(Ok(Message::ListUpdated { entries, .. })) => return Ok(entries),
                Some(Ok(Message::Response {
                    status: Status::Error,
                    error,
                    ..
                })) => {
                    return Err(ClientError::Daemon(format!(
                        "request rejected: {}",
                        error.unwrap_or_default()
                    )));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::Daemon(format!("codec: {e}"))),
                None => return Err(ClientError::Daemon("connection closed".into())),
            }
        }
    }
}

/// Print entries as a table to stdout. Entries arrive in display order
/// (newest first).
fn print_entries(entries: &[ClipEntry]) {
    if entries.is_empty() {
        println!("No entries");
        return;
    }

    println!("{:>8} {:>14} {:<6} CONTENT", "ID", "TIMESTAMP", "KIND");
    println!("{}", "-".repeat(72));
    for e in entries {
        println!(
            "{:>8} {:>14} {:<6} {}",
            e.id,
            e.timestamp,
            kind_name(e.kind),
            content_preview(&e.content),
        );
    }
}

fn kind_name(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Text => "text",
        EntryKind::Path => "path",
        EntryKind::Other => "other",
    }
}

/// One table cell per entry: control characters collapse to spaces and
/// long content is cut with an ellipsis.
fn content_preview(content: &str) -> String {
    const MAX: usize = 48;
    let flat: String = content
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= MAX {
        flat
    } else {
        let cut: String = flat.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

/// Resolve the daemon socket path from `$XDG_RUNTIME_DIR`.
fn resolve_socket_path() -> Result<PathBuf, ClientError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .map_err(|_| ClientError::Daemon("$XDG_RUNTIME_DIR not set".into()))?;
    Ok(PathBuf::from(runtime_dir).join("cliphist").join("daemon.sock"))
}
