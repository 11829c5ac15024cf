//! Bridge client for the overlay.
//!
//! Connects to the daemon socket as `Role::Surface` and performs the
//! handshake. Requests are fire-and-forget: the answers arrive as pushed
//! `list_updated` / `visibility` messages on the same stream, consumed by
//! the overlay's event loop via [`BridgeClient::next_push`].

use std::path::PathBuf;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::ipc::codec::{CodecError, MessageCodec};
use crate::ipc::protocol::{Message, PROTOCOL_VERSION, Role, Status};

/// Bridge connection errors.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("daemon: {0}")]
    Daemon(String),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

/// The overlay's connection to the daemon.
pub struct BridgeClient {
    framed: Framed<UnixStream, MessageCodec>,
    next_id: u32,
}

impl BridgeClient {
    /// Connect to the daemon and perform the surface handshake.
    pub async fn connect() -> Result<Self, BridgeError> {
        let socket_path = resolve_socket_path()?;

        let stream = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| BridgeError::Daemon(format!("connect failed (is the daemon running?): {e}")))?;
        let mut framed = Framed::new(stream, MessageCodec::new());

        framed
            .send(Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
                role: Role::Surface,
            })
            .await?;

        match framed.next().await {
            Some(Ok(Message::HelloAck {
                status: Status::Ok, ..
            })) => {}
            Some(Ok(Message::HelloAck {
                status: Status::Error,
                error,
                ..
            })) => {
                return Err(BridgeError::Daemon(format!(
                    "handshake rejected: {}",
                    error.unwrap_or_default()
                )));
            }
            other => {
                return Err(BridgeError::Daemon(format!(
                    "unexpected handshake response: {other:?}"
                )));
            }
        }

        Ok(Self {
            framed,
            next_id: 1, // 0 = Hello
        })
    }

    fn take_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Request the most recent entries. The result arrives as a push.
    pub async fn request_recent(&mut self, limit: u32) -> Result<(), BridgeError> {
        let id = self.take_id();
        self.framed
            .send(Message::RequestRecent { id, limit })
            .await?;
        Ok(())
    }

    /// Request a search. The result arrives as a push.
    pub async fn request_search(&mut self, query: String, limit: u32) -> Result<(), BridgeError> {
        let id = self.take_id();
        self.framed
            .send(Message::RequestSearch {
                id,
                query,
                limit,
                kinds: None,
            })
            .await?;
        Ok(())
    }

    /// Tell the daemon to hide the overlay and clear pending input.
    pub async fn notify_hide_and_clear(&mut self) -> Result<(), BridgeError> {
        let id = self.take_id();
        self.framed.send(Message::HideAndClear { id }).await?;
        Ok(())
    }

    /// Next pushed message from the daemon. `None` means the daemon went
    /// away.
    pub async fn next_push(&mut self) -> Option<Result<Message, CodecError>> {
        self.framed.next().await
    }
}

/// Resolve the daemon socket path from `$XDG_RUNTIME_DIR`.
fn resolve_socket_path() -> Result<PathBuf, BridgeError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .map_err(|_| BridgeError::Daemon("$XDG_RUNTIME_DIR not set".into()))?;
    Ok(PathBuf::from(runtime_dir).join("cliphist").join("daemon.sock"))
}
