//! Session coordinator daemon — visibility, hotkey, store access.
//!
//! The daemon is the single authority over overlay visibility and over
//! every store call; the overlay never talks to the history store
//! directly. It listens on a Unix domain socket and serves the restricted
//! bridge surface (`request_recent`, `request_search`, `hide_and_clear`).
//!
//! Architecture: channel-based actor. A single daemon loop owns all
//! mutable state ([`session::SessionState`]). Per-connection tasks forward
//! commands via mpsc channels; pushes travel back over per-connection
//! channels, so delivery to one client is FIFO. Store calls run as
//! spawned tasks and report back over a completion channel — the loop
//! never blocks on store I/O, and out-of-order completions are handled by
//! the sequence tags on `list_updated`, not by serializing calls.

mod connection;
pub mod handler;
pub mod session;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use connection::{DaemonCommand, DisconnectNotice};
use handler::{FetchKind, FetchSpec, HotkeyOutcome};
use session::{ConnectionId, SessionState};

use crate::hotkey::GlobalHotkey;
use crate::ipc::protocol::Message;
use crate::store::file::{FileStore, StoreConfig};
use crate::store::{ClipEntry, HistoryStore, UnavailableStore, sort_for_display};

/// Cap on a single retrieval/search call. Expiry degrades to an empty
/// list like any other query failure.
const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Daemon configuration from the command line.
#[derive(Debug)]
pub struct DaemonConfig {
    /// History file path; `None` uses the default data-dir location.
    pub store_path: Option<PathBuf>,
    /// Toggle hotkey binding spec, e.g. `Super+Shift+L`.
    pub hotkey: String,
    /// Entry count fetched when the hotkey reveals the overlay.
    pub limit: u32,
}

/// Daemon startup/runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("$XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,
    #[error("daemon already running at {0}")]
    AlreadyRunning(PathBuf),
    #[error("no store path given and no data directory available")]
    NoStorePath,
    #[error("failed to create directory {path}: {source}")]
    MkdirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind socket {path}: {source}")]
    BindFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the daemon until SIGTERM or SIGINT.
///
/// # Errors
///
/// Returns `DaemonError` if `$XDG_RUNTIME_DIR` is unset, the socket bind
/// fails, or another daemon is already running. Neither a broken store
/// nor a failed hotkey registration is fatal: an unopenable store serves
/// empty lists, a lost hotkey disables only the toggle, and both are
/// logged once at startup.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let socket_path = resolve_socket_path()?;
    let listener = bind_socket(&socket_path).await?;

    let store_path = config
        .store_path
        .or_else(StoreConfig::default_path)
        .ok_or(DaemonError::NoStorePath)?;
    let store: Arc<dyn HistoryStore> =
        match FileStore::open(StoreConfig { path: store_path }).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!(error = %e, "history store unavailable — serving empty lists");
                eprintln!("warning: history store unavailable: {e}");
                Arc::new(UnavailableStore)
            }
        };

    // Hotkey registration failure disables only the hotkey feature.
    let (hotkey_guard, hotkey_rx) = match GlobalHotkey::register(&config.hotkey) {
        Ok((guard, rx)) => (Some(guard), Some(rx)),
        Err(e) => {
            tracing::warn!(binding = %config.hotkey, error = %e, "global hotkey disabled");
            eprintln!("warning: global hotkey disabled: {e}");
            (None, None)
        }
    };

    tracing::info!(path = %socket_path.display(), "daemon listening");

    // Graceful shutdown on SIGTERM or SIGINT.
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        result = serve(listener, store, hotkey_rx, config.limit) => result?,
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down");
        }
    }

    // Cleanup: ungrab the hotkey, remove the socket file.
    if let Some(mut guard) = hotkey_guard {
        guard.unregister();
    }
    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::warn!(error = %e, path = %socket_path.display(), "failed to remove socket");
    }

    tracing::info!("daemon stopped");
    Ok(())
}

/// A completed store call, reported back to the daemon loop.
#[derive(Debug)]
struct FetchDone {
    spec: FetchSpec,
    entries: Vec<ClipEntry>,
}

/// The daemon event loop. Runs until the listener fails fatally; callers
/// race it against shutdown signals.
async fn serve(
    listener: UnixListener,
    store: Arc<dyn HistoryStore>,
    mut hotkey_rx: Option<mpsc::UnboundedReceiver<()>>,
    hotkey_limit: u32,
) -> Result<(), DaemonError> {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<DaemonCommand>();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<DisconnectNotice>();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<FetchDone>();

    // Per-connection push channels for list/visibility delivery.
    let mut push_senders: HashMap<ConnectionId, mpsc::UnboundedSender<Message>> = HashMap::new();

    let mut state = SessionState::new();

    loop {
        tokio::select! {
            // -- New connection --
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        accept_connection(stream, &cmd_tx, &disconnect_tx, &mut push_senders);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }

            // -- Request from a connection task --
            Some(cmd) = cmd_rx.recv() => {
                let outcome = handler::handle_message(&mut state, cmd.request, cmd.connection_id);
                let _ = cmd.reply_tx.send(outcome.reply);
                if let Some((target, msg)) = outcome.push {
                    dispatch_push(&push_senders, target, msg);
                }
                if let Some(spec) = outcome.fetch {
                    spawn_fetch(Arc::clone(&store), spec, done_tx.clone());
                }
            }

            // -- Store call completed --
            Some(done) = done_rx.recv() => {
                deliver_fetch(&state, &push_senders, done);
            }

            // -- Global hotkey --
            event = recv_hotkey(&mut hotkey_rx) => {
                match event {
                    Some(()) => match handler::handle_hotkey(&mut state, hotkey_limit) {
                        Some(HotkeyOutcome::Show(spec)) => {
                            spawn_fetch(Arc::clone(&store), spec, done_tx.clone());
                        }
                        Some(HotkeyOutcome::Hide(target)) => {
                            dispatch_push(&push_senders, target, Message::Visibility {
                                id: 0,
                                visible: false,
                            });
                        }
                        None => {
                            tracing::debug!("hotkey pressed with no surface attached");
                        }
                    },
                    None => {
                        // Hotkey event source died; run on without it.
                        tracing::warn!("hotkey event channel closed");
                        hotkey_rx = None;
                    }
                }
            }

            // -- Connection disconnected --
            Some(notice) = disconnect_rx.recv() => {
                let conn_id = notice.connection_id;
                push_senders.remove(&conn_id);
                state.remove_connection(conn_id);
                tracing::debug!(?conn_id, "connection cleaned up");
            }
        }
    }
}

/// Accept a new connection — create channels and spawn the handler task.
fn accept_connection(
    stream: UnixStream,
    cmd_tx: &mpsc::UnboundedSender<DaemonCommand>,
    disconnect_tx: &mpsc::UnboundedSender<DisconnectNotice>,
    push_senders: &mut HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
) {
    let conn_id = ConnectionId::new();
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    push_senders.insert(conn_id, push_tx);

    connection::spawn_connection(stream, conn_id, cmd_tx.clone(), push_rx, disconnect_tx.clone());

    tracing::debug!(?conn_id, "accepted connection");
}

/// Spawn a store call off the daemon loop.
fn spawn_fetch(
    store: Arc<dyn HistoryStore>,
    spec: FetchSpec,
    done_tx: mpsc::UnboundedSender<FetchDone>,
) {
    tokio::spawn(async move {
        let entries = run_fetch(store.as_ref(), &spec).await;
        let _ = done_tx.send(FetchDone { spec, entries });
    });
}

/// Execute one store call with the timeout cap, degrading every failure
/// path to an empty list. Store failures are never fatal to the daemon.
async fn run_fetch(store: &dyn HistoryStore, spec: &FetchSpec) -> Vec<ClipEntry> {
    // The hotkey show path nudges the store to re-sync first, so the list
    // reflects anything captured since the last fetch.
    if spec.then_show
        && let Err(e) = store.refresh().await
    {
        tracing::debug!(error = %e, "store refresh failed");
    }

    let call = async {
        match &spec.kind {
            FetchKind::Recent { limit } => store.fetch_recent(*limit).await,
            FetchKind::Search { query, limit, kinds } => {
                store.search(query, *limit, kinds.as_deref()).await
            }
        }
    };

    match tokio::time::timeout(STORE_CALL_TIMEOUT, call).await {
        Ok(Ok(entries)) => entries,
        Ok(Err(e)) => {
            tracing::warn!(seq = spec.seq, error = %e, "store query failed, serving empty list");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(seq = spec.seq, "store call timed out, serving empty list");
            Vec::new()
        }
    }
}

/// Deliver a completed fetch: sort into display order, push the list, and
/// reveal the overlay if this fetch was scheduled by a hotkey show.
///
/// A show-fetch whose session was toggled hidden in the meantime is
/// discarded — logical cancellation, the overlay never flashes a list the
/// user already dismissed.
fn deliver_fetch(
    state: &SessionState,
    push_senders: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    done: FetchDone,
) {
    let FetchDone { spec, mut entries } = done;

    if spec.then_show && !state.is_visible() {
        tracing::debug!(seq = spec.seq, "discarding fetch result for dismissed session");
        return;
    }

    sort_for_display(&mut entries);
    dispatch_push(
        push_senders,
        spec.target,
        Message::ListUpdated {
            id: 0,
            seq: spec.seq,
            entries,
        },
    );
    if spec.then_show {
        dispatch_push(
            push_senders,
            spec.target,
            Message::Visibility {
                id: 0,
                visible: true,
            },
        );
    }
}

/// Route a push to a connection's task.
fn dispatch_push(
    push_senders: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    target: ConnectionId,
    message: Message,
) {
    if let Some(tx) = push_senders.get(&target) {
        if tx.send(message).is_err() {
            tracing::warn!(conn_id = ?target, "push send failed — connection gone");
        }
    } else {
        tracing::warn!(conn_id = ?target, "push target not found");
    }
}

/// Receive the next hotkey event, or pend forever when the hotkey feature
/// is disabled.
async fn recv_hotkey(rx: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// -- Socket setup --

/// Resolve the daemon socket path from `$XDG_RUNTIME_DIR`.
fn resolve_socket_path() -> Result<PathBuf, DaemonError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").map_err(|_| DaemonError::NoRuntimeDir)?;
    Ok(PathBuf::from(runtime_dir).join("cliphist").join("daemon.sock"))
}

/// Create the socket directory and bind the Unix listener.
///
/// Handles stale socket detection: on EADDRINUSE, attempt to connect to
/// the existing socket. If the connection succeeds, another daemon is
/// running. If it fails, the socket is stale and is removed.
async fn bind_socket(path: &std::path::Path) -> Result<UnixListener, DaemonError> {
    let parent = path.parent().expect("socket path has parent");
    if !parent.exists() {
        std::fs::create_dir_all(parent).map_err(|e| DaemonError::MkdirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    // Validate/set directory permissions to 0700 even if the directory
    // already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
            DaemonError::MkdirFailed {
                path: parent.to_path_buf(),
                source: e,
            }
        })?;
    }

    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            match UnixStream::connect(path).await {
                Ok(_) => Err(DaemonError::AlreadyRunning(path.to_path_buf())),
                Err(_) => {
                    // Stale socket — remove and retry.
                    tracing::info!(path = %path.display(), "removing stale socket");
                    std::fs::remove_file(path).map_err(|e| DaemonError::BindFailed {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                    UnixListener::bind(path).map_err(|e| DaemonError::BindFailed {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            }
        }
        Err(e) => Err(DaemonError::BindFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
