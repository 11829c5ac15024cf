//! Global toggle hotkey — X11 key grab and event thread.
//!
//! Registers one global binding on the root window and delivers a unit
//! event per press over a channel to the daemon loop. Registration
//! failure (no display, grab conflict) is reported once by the caller and
//! disables only the hotkey feature, never the daemon.

pub mod keybinding;

use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{self, GrabMode, Keysym, ModMask, Window};
use x11rb::rust_connection::RustConnection;

use keybinding::Binding;

/// CapsLock modifier bit (always LockMask, bit 1).
const LOCK_MASK: u16 = 0x0002;

/// XK_Num_Lock keysym for dynamic modifier detection.
const XK_NUM_LOCK: Keysym = 0xff7f;

/// Hotkey errors.
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    /// No X11 display reachable.
    #[error("X11 unavailable: {0}")]
    Unavailable(String),
    #[error("invalid key binding: {0}")]
    InvalidBinding(String),
    /// Another application already holds the grab.
    #[error("binding conflict: {0}")]
    Conflict(String),
    #[error("X11 request failed: {0}")]
    Request(String),
}

/// A registered global hotkey.
///
/// Process-wide singleton by construction: the daemon registers exactly
/// one at startup. [`GlobalHotkey::unregister`] releases the grab and
/// joins the event thread; it runs on daemon shutdown.
pub struct GlobalHotkey {
    conn: Arc<RustConnection>,
    root: Window,
    binding: Binding,
    numlock_mask: u16,
    stop: Arc<AtomicBool>,
    event_thread: Option<JoinHandle<()>>,
}

impl GlobalHotkey {
    /// Connect to the X11 display, grab the binding, and start the event
    /// thread. Returns the registration guard and the press-event channel.
    pub fn register(
        spec: &str,
    ) -> Result<(Self, tokio::sync::mpsc::UnboundedReceiver<()>), HotkeyError> {
        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| HotkeyError::Unavailable(format!("connect failed: {e}")))?;
        let root = conn.setup().roots[screen_num].root;

        let numlock_mask = detect_numlock_mask(&conn);
        tracing::debug!(
            numlock_mask = format_args!("0x{numlock_mask:04x}"),
            "detected NumLock modifier"
        );

        let binding = keybinding::parse(spec, &conn)?;
        let conn = Arc::new(conn);

        grab_binding(&conn, root, &binding, numlock_mask)?;
        tracing::info!(binding = %binding.raw, keycode = binding.keycode, "toggle hotkey grabbed");

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let event_thread = spawn_event_thread(
            Arc::clone(&conn),
            Arc::clone(&stop),
            binding.clone(),
            numlock_mask,
            tx,
        );

        Ok((
            Self {
                conn,
                root,
                binding,
                numlock_mask,
                stop,
                event_thread: Some(event_thread),
            },
            rx,
        ))
    }

    /// Release the grab and stop the event thread. Best-effort; errors
    /// are logged.
    pub fn unregister(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        for &lock_mask in &lock_masks(self.numlock_mask) {
            let mods = ModMask::from(self.binding.modifiers | lock_mask);
            if let Err(e) = xproto::ungrab_key(&*self.conn, self.binding.keycode, self.root, mods) {
                tracing::debug!(binding = %self.binding.raw, error = %e, "XUngrabKey failed");
            }
        }
        if let Err(e) = self.conn.flush() {
            tracing::debug!(error = %e, "flush after ungrab failed");
        }

        // The thread exits within 100ms due to the poll timeout.
        if let Some(handle) = self.event_thread.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!("hotkey event thread panicked: {e:?}");
        }
    }
}

/// Lock mask combinations for grab registration:
/// [none, CapsLock, NumLock, CapsLock|NumLock].
fn lock_masks(numlock_mask: u16) -> [u16; 4] {
    [0, LOCK_MASK, numlock_mask, LOCK_MASK | numlock_mask]
}

/// Grab the binding on the root window for every lock-mask variant.
///
/// A grab refused for any variant means another application holds the
/// key: the partial grabs are released and the whole registration fails
/// with [`HotkeyError::Conflict`].
fn grab_binding(
    conn: &RustConnection,
    root: Window,
    binding: &Binding,
    numlock_mask: u16,
) -> Result<(), HotkeyError> {
    let mut conflict = false;

    for &lock_mask in &lock_masks(numlock_mask) {
        let mods = ModMask::from(binding.modifiers | lock_mask);
        let cookie = xproto::grab_key(
            conn,
            true, // owner_events
            root,
            mods,
            binding.keycode,
            GrabMode::ASYNC,
            GrabMode::ASYNC,
        )
        .map_err(|e| HotkeyError::Request(format!("grab_key send: {e}")))?;

        if let Err(e) = cookie.check() {
            tracing::warn!(
                binding = %binding.raw,
                lock_mask,
                error = %e,
                "XGrabKey failed — binding may conflict with another application"
            );
            conflict = true;
        }
    }

    if conflict {
        // Release whatever variants did succeed.
        for &lock_mask in &lock_masks(numlock_mask) {
            let mods = ModMask::from(binding.modifiers | lock_mask);
            let _ = xproto::ungrab_key(conn, binding.keycode, root, mods);
        }
        let _ = conn.flush();
        return Err(HotkeyError::Conflict(binding.raw.clone()));
    }

    Ok(())
}

/// Detect which modifier bit corresponds to NumLock by querying the X11
/// modifier mapping and keyboard mapping.
///
/// Falls back to Mod2 (0x0010) if detection fails, matching xmodmap
/// defaults.
fn detect_numlock_mask(conn: &RustConnection) -> u16 {
    const FALLBACK: u16 = 0x0010; // Mod2Mask

    let Ok(Ok(mod_reply)) = xproto::get_modifier_mapping(conn).map(|c| c.reply()) else {
        return FALLBACK;
    };

    let keycodes_per_mod = mod_reply.keycodes_per_modifier() as usize;
    if keycodes_per_mod == 0 {
        return FALLBACK;
    }

    // Resolve XK_Num_Lock → set of keycodes via the keyboard mapping.
    let setup = conn.setup();
    let min_kc = setup.min_keycode;
    let count = setup.max_keycode - min_kc + 1;

    let Ok(Ok(kb_reply)) = xproto::get_keyboard_mapping(conn, min_kc, count).map(|c| c.reply())
    else {
        return FALLBACK;
    };

    let syms_per_code = kb_reply.keysyms_per_keycode as usize;
    if syms_per_code == 0 {
        return FALLBACK;
    }

    let mut numlock_keycodes: Vec<u8> = Vec::new();
    for i in 0..count as usize {
        let base = i * syms_per_code;
        for j in 0..syms_per_code {
            if kb_reply.keysyms.get(base + j) == Some(&XK_NUM_LOCK) {
                numlock_keycodes.push(min_kc + i as u8);
                break;
            }
        }
    }

    // Scan the modifier map: 8 rows × keycodes_per_modifier. Row 0 =
    // Shift, 1 = Lock, 2 = Control, 3 = Mod1, ..., 7 = Mod5; mask bit for
    // row i is 1 << i.
    for modifier_idx in 0..8usize {
        let row_start = modifier_idx * keycodes_per_mod;
        for k in 0..keycodes_per_mod {
            if let Some(&keycode) = mod_reply.keycodes.get(row_start + k)
                && keycode != 0
                && numlock_keycodes.contains(&keycode)
            {
                return 1u16 << modifier_idx;
            }
        }
    }

    FALLBACK
}

/// Spawn a dedicated thread that polls the X11 connection for events.
///
/// Uses `nix::poll()` on the connection fd with a 100ms timeout. When
/// readable, drains all available events; matching key presses become
/// unit messages on `tx`. Checks the `stop` flag each iteration for
/// clean shutdown.
fn spawn_event_thread(
    conn: Arc<RustConnection>,
    stop: Arc<AtomicBool>,
    binding: Binding,
    numlock_mask: u16,
    tx: tokio::sync::mpsc::UnboundedSender<()>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("hotkey-events".into())
        .spawn(move || {
            let raw_fd = conn.stream().as_raw_fd();

            while !stop.load(Ordering::Relaxed) {
                // SAFETY: raw_fd is the X11 connection fd, valid while
                // conn is alive.
                let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
                let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];

                match poll(&mut fds, PollTimeout::from(100u16)) {
                    Ok(0) => continue, // Timeout — check stop flag.
                    Ok(_) => loop {
                        match conn.poll_for_event() {
                            Ok(Some(Event::KeyPress(press))) => {
                                if binding.matches(
                                    press.detail,
                                    u16::from(press.state),
                                    numlock_mask,
                                ) && tx.send(()).is_err()
                                {
                                    // Receiver dropped — shut down.
                                    return;
                                }
                            }
                            Ok(Some(_)) => {}
                            Ok(None) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "X11 connection error");
                                return;
                            }
                        }
                    },
                    Err(nix::Error::EINTR) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "poll error on X11 fd");
                        return;
                    }
                }
            }
        })
        .expect("failed to spawn hotkey event thread")
}
