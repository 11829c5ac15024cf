//! System clipboard write-back.
//!
//! The overlay performs the final copy through this trait so the platform
//! mechanism stays swappable and tests can substitute a fake.

use std::io::Write;
use std::process::{Command, Stdio};

/// Clipboard write errors. Reported to the user via the overlay status
/// line; the selection is kept so the copy can be retried.
#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("clipboard write failed: {0}")]
    Write(String),
}

/// Writes the single system-wide clipboard slot.
pub trait ClipboardWriter: Send {
    fn write_text(&self, content: &str) -> Result<(), ClipboardError>;
}

/// X11 clipboard writer via `xclip -selection clipboard`.
pub struct XClipWriter;

impl XClipWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ClipboardWriter for XClipWriter {
    fn write_text(&self, content: &str) -> Result<(), ClipboardError> {
        let mut child = Command::new("xclip")
            .args(["-selection", "clipboard"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ClipboardError::Write(format!("failed to spawn xclip: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content.as_bytes())
                .map_err(|e| ClipboardError::Write(format!("failed to write to xclip: {e}")))?;
            // Drop stdin to close the pipe so xclip can finish.
        }

        let status = child
            .wait()
            .map_err(|e| ClipboardError::Write(format!("failed to wait for xclip: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(ClipboardError::Write(format!(
                "xclip exited with status {status}"
            )))
        }
    }
}
