//! Key binding parser — "Super+Shift+L" → (modifier mask, keycode).

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, Keysym, ModMask};

use super::HotkeyError;

/// A parsed key binding ready for X11 grab registration.
#[derive(Debug, Clone)]
pub struct Binding {
    /// X11 modifier mask (e.g., Shift | Mod4).
    pub modifiers: u16,
    /// X11 keycode for the key.
    pub keycode: u8,
    /// Original user-provided string, for logs and error reports.
    pub raw: String,
}

impl Binding {
    /// Check whether a key event matches this binding.
    ///
    /// CapsLock (LockMask) and the detected NumLock bit are masked out of
    /// the event state first, so the toggle fires regardless of lock key
    /// state. Mouse button bits (above 0x00ff) are ignored as well.
    pub fn matches(&self, event_keycode: u8, event_state: u16, numlock_mask: u16) -> bool {
        let lock_mask = u16::from(ModMask::LOCK) | numlock_mask;
        let clean_mods = event_state & !lock_mask & 0x00ff;
        event_keycode == self.keycode && clean_mods == self.modifiers
    }
}

/// Parse a key binding specification string into an X11 binding.
///
/// Format: `Modifier[+Modifier...]+Key` with at least one modifier.
/// Modifiers: `Shift`, `Control`/`Ctrl`, `Alt`, `Super`. Keys: single
/// letter or digit, F1-F12, or a named key (space, return, escape, ...).
pub fn parse(spec: &str, conn: &impl Connection) -> Result<Binding, HotkeyError> {
    let parts: Vec<&str> = spec.split('+').map(str::trim).collect();

    let Some((&key_name, modifier_parts)) = parts.split_last() else {
        return Err(HotkeyError::InvalidBinding("empty binding".into()));
    };
    if modifier_parts.is_empty() {
        return Err(HotkeyError::InvalidBinding(format!(
            "bare key without modifier: {spec:?}"
        )));
    }

    let mut modifiers: u16 = 0;
    for &m in modifier_parts {
        let mask = parse_modifier(m)
            .ok_or_else(|| HotkeyError::InvalidBinding(format!("unknown modifier: {m:?}")))?;
        modifiers |= mask;
    }

    let keysym = key_name_to_keysym(key_name)
        .ok_or_else(|| HotkeyError::InvalidBinding(format!("unknown key: {key_name:?}")))?;

    let keycode = keysym_to_keycode(conn, keysym).ok_or_else(|| {
        HotkeyError::InvalidBinding(format!(
            "keysym 0x{keysym:04x} not found in keyboard mapping"
        ))
    })?;

    Ok(Binding {
        modifiers,
        keycode,
        raw: spec.to_string(),
    })
}

/// Modifier name → X11 modifier mask bits.
fn parse_modifier(name: &str) -> Option<u16> {
    match name.to_ascii_lowercase().as_str() {
        "shift" => Some(ModMask::SHIFT.into()),
        "control" | "ctrl" => Some(ModMask::CONTROL.into()),
        "alt" | "mod1" => Some(u16::from(ModMask::M1)),
        "super" | "mod4" => Some(u16::from(ModMask::M4)),
        _ => None,
    }
}

/// Key name → X11 keysym.
fn key_name_to_keysym(name: &str) -> Option<Keysym> {
    if name.len() == 1 {
        let ch = name.chars().next()?;
        if ch.is_ascii_alphabetic() {
            return Some(ch.to_ascii_lowercase() as Keysym);
        }
        if ch.is_ascii_digit() {
            return Some(ch as Keysym);
        }
    }

    // Function keys: XK_F1 = 0xffbe.
    if let Some(rest) = name.strip_prefix('F').or_else(|| name.strip_prefix('f'))
        && let Ok(n) = rest.parse::<u32>()
        && (1..=12).contains(&n)
    {
        return Some(0xffbe + n - 1);
    }

    match name.to_ascii_lowercase().as_str() {
        "space" => Some(0x0020),
        "return" | "enter" => Some(0xff0d),
        "escape" | "esc" => Some(0xff1b),
        "tab" => Some(0xff09),
        "backspace" => Some(0xff08),
        "insert" => Some(0xff63),
        "delete" => Some(0xffff),
        "home" => Some(0xff50),
        "end" => Some(0xff57),
        "up" => Some(0xff52),
        "down" => Some(0xff54),
        "left" => Some(0xff51),
        "right" => Some(0xff53),
        _ => None,
    }
}

/// Resolve a keysym to a keycode via the server's keyboard mapping.
///
/// Returns the first matching keycode, or `None` if the keysym is not
/// present in any keycode's keysym list.
fn keysym_to_keycode(conn: &impl Connection, keysym: Keysym) -> Option<u8> {
    let setup = conn.setup();
    let min_keycode = setup.min_keycode;
    let count = setup.max_keycode - min_keycode + 1;

    let reply = xproto::get_keyboard_mapping(conn, min_keycode, count)
        .ok()?
        .reply()
        .ok()?;

    let syms_per_code = reply.keysyms_per_keycode as usize;
    if syms_per_code == 0 {
        return None;
    }

    for i in 0..count as usize {
        let base = i * syms_per_code;
        for j in 0..syms_per_code {
            if reply.keysyms.get(base + j) == Some(&keysym) {
                return Some(min_keycode + i as u8);
            }
        }
    }

    None
}
