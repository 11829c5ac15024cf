//! Per-connection task — framed I/O, handshake, command forwarding.
//!
//! Each client connection spawns a tokio task that:
//! 1. Wraps the socket in the length-prefixed MessagePack codec.
//! 2. Reads the first message (must be `Hello`) and forwards it to the
//!    daemon loop for handshake validation.
//! 3. Enters a select loop: forward requests to the daemon loop, deliver
//!    pushed messages (`list_updated`, `visibility`) to the client.
//! 4. On disconnect, notifies the daemon loop for cleanup.

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

use crate::ipc::codec::{CodecError, DecodeResult, FrameCodec, decode_frame};
use crate::ipc::protocol::{Message, Status};

use super::session::ConnectionId;

/// Command sent from a connection task to the daemon loop.
#[derive(Debug)]
pub struct DaemonCommand {
    pub request: Message,
    /// `None` reply means the request is fire-and-forget (hide_and_clear).
    pub reply_tx: oneshot::Sender<Option<Message>>,
    pub connection_id: ConnectionId,
}

/// Notification sent when a connection closes.
#[derive(Debug)]
pub struct DisconnectNotice {
    pub connection_id: ConnectionId,
}

/// Connection-level errors.
#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error("unexpected EOF during handshake")]
    HandshakeEof,
    #[error("first message must be Hello")]
    NotHello,
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] rmp_serde::decode::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("daemon loop closed")]
    DaemonGone,
    #[error("reply channel closed")]
    ReplyDropped,
}

/// Spawn a connection handler task.
///
/// The task runs until the client disconnects or a protocol error occurs.
/// On exit, a [`DisconnectNotice`] is sent to the daemon loop.
pub fn spawn_connection(
    stream: UnixStream,
    conn_id: ConnectionId,
    cmd_tx: mpsc::UnboundedSender<DaemonCommand>,
    push_rx: mpsc::UnboundedReceiver<Message>,
    disconnect_tx: mpsc::UnboundedSender<DisconnectNotice>,
) {
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, conn_id, cmd_tx, push_rx).await {
            tracing::debug!(?conn_id, error = %e, "connection closed");
        }
        // Always notify the daemon of disconnect for cleanup.
        let _ = disconnect_tx.send(DisconnectNotice {
            connection_id: conn_id,
        });
    });
}

async fn handle_connection(
    stream: UnixStream,
    conn_id: ConnectionId,
    cmd_tx: mpsc::UnboundedSender<DaemonCommand>,
    mut push_rx: mpsc::UnboundedReceiver<Message>,
) -> Result<(), ConnectionError> {
    let mut framed = Framed::new(stream, FrameCodec::new());

    // -- Handshake: first message must be Hello --
    let first_frame = framed
        .next()
        .await
        .ok_or(ConnectionError::HandshakeEof)?
        .map_err(ConnectionError::Codec)?;

    let first_msg = match decode_frame(&first_frame) {
        DecodeResult::Ok(msg @ Message::Hello { .. }) => msg,
        DecodeResult::Ok(_) | DecodeResult::UnknownType(_) => {
            // Protocol violation before the handshake: close immediately.
            return Err(ConnectionError::NotHello);
        }
        DecodeResult::Malformed(e) => {
            return Err(ConnectionError::MalformedFrame(e));
        }
    };

    let ack = send_command(&cmd_tx, first_msg, conn_id)
        .await?
        .ok_or(ConnectionError::ReplyDropped)?;
    let rejected = is_error_hello_ack(&ack);
    framed.send(ack).await.map_err(ConnectionError::Codec)?;

    if rejected {
        // Version mismatch or surface already attached: close.
        return Ok(());
    }

    // -- Main loop: requests + push delivery --
    loop {
        tokio::select! {
            frame = framed.next() => {
                let raw = match frame {
                    Some(Ok(raw)) => raw,
                    Some(Err(e)) => return Err(ConnectionError::Codec(e)),
                    None => return Ok(()), // Clean disconnect.
                };
                match decode_frame(&raw) {
                    DecodeResult::Ok(msg) => {
                        // Replies are optional: hide_and_clear has none.
                        if let Some(reply) = send_command(&cmd_tx, msg, conn_id).await? {
                            framed.send(reply).await.map_err(ConnectionError::Codec)?;
                        }
                    }
                    DecodeResult::UnknownType(envelope) => {
                        // Unknown message type: error with echoed id, keep
                        // the connection open.
                        let reply = Message::Response {
                            id: envelope.id,
                            status: Status::Error,
                            error: Some("unknown_type".into()),
                        };
                        framed.send(reply).await.map_err(ConnectionError::Codec)?;
                    }
                    DecodeResult::Malformed(e) => {
                        // Unrecoverable: can't even extract an id to echo.
                        return Err(ConnectionError::MalformedFrame(e));
                    }
                }
            }
            push = push_rx.recv() => {
                match push {
                    Some(msg) => {
                        framed.send(msg).await.map_err(ConnectionError::Codec)?;
                    }
                    None => {
                        // Daemon loop dropped our push sender: shutting down.
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Forward a request to the daemon loop and wait for the (optional) reply.
async fn send_command(
    cmd_tx: &mpsc::UnboundedSender<DaemonCommand>,
    request: Message,
    conn_id: ConnectionId,
) -> Result<Option<Message>, ConnectionError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(DaemonCommand {
            request,
            reply_tx,
            connection_id: conn_id,
        })
        .map_err(|_| ConnectionError::DaemonGone)?;
    reply_rx.await.map_err(|_| ConnectionError::ReplyDropped)
}

fn is_error_hello_ack(msg: &Message) -> bool {
    matches!(
        msg,
        Message::HelloAck {
            status: Status::Error,
            ..
        }
    )
}
