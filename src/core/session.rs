//! Session management
//!
//! A session pairs a PTY handle with a VT100 tracker and the metadata the
//! multiplexer overlays: pinned prompt, typed-input line buffer, liveness.

use std::path::PathBuf;

use super::pty::{PtyError, PtyHandle};
use super::term::Tracker;

/// Unique identifier for a session. Small positive integer, lowest unused
/// value assigned by the registry.
pub type SessionId = u32;

pub struct Session {
    pub id: SessionId,
    /// Display name, derived from the working directory.
    pub name: String,
    pub cwd: PathBuf,
    /// Last submitted command line, shown in the pin bar.
    pinned_prompt: Option<String>,
    /// Line buffer mirroring what the user has typed since the last submit.
    input_buffer: String,
    alive: bool,
    exit_code: Option<u32>,
    pty: PtyHandle,
    tracker: Tracker,
}

impl Session {
    /// Spawn a new session running `command args...` in `cwd`.
    pub fn spawn(
        id: SessionId,
        cwd: PathBuf,
        command: &str,
        args: &[String],
        rows: u16,
        cols: u16,
    ) -> Result<Self, PtyError> {
        let name = cwd
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| cwd.to_string_lossy().to_string());

        let pty = PtyHandle::open(command, args, &cwd, rows, cols)?;
        let tracker = Tracker::new(rows, cols);

        Ok(Self {
            id,
            name,
            cwd,
            pinned_prompt: None,
            input_buffer: String::new(),
            alive: true,
            exit_code: None,
            pty,
            tracker,
        })
    }

    /// Drain pending raw output chunks without parsing.
    ///
    /// Passthrough mode forwards these verbatim to the real terminal, then
    /// hands each one to [`Session::feed`] to keep the tracker in sync.
    pub fn drain_output(&mut self) -> Vec<Vec<u8>> {
        self.pty.drain_chunks()
    }

    /// Feed raw bytes into the tracker.
    pub fn feed(&mut self, data: &[u8]) {
        self.tracker.feed(data);
    }

    /// Drain and parse pending output. Used for every session that is not
    /// currently being passed through (grid mode, unfocused sessions).
    /// Returns whether any output arrived, so observers know to repaint.
    pub fn pump(&mut self) -> bool {
        let chunks = self.pty.drain_chunks();
        for chunk in &chunks {
            self.tracker.feed(chunk);
        }
        !chunks.is_empty()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn window_title(&self) -> &str {
        self.tracker.screen().title()
    }

    pub fn pinned_prompt(&self) -> Option<&str> {
        self.pinned_prompt.as_deref()
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Write input bytes to the child.
    ///
    /// A write error means the child is gone; the session is marked dead so
    /// the next reap pass removes it, and the error is surfaced.
    pub fn write_input(&mut self, data: &[u8]) -> Result<(), PtyError> {
        match self.pty.write(data) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.alive = false;
                Err(err)
            }
        }
    }

    /// Resize both the PTY and the tracker.
    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<(), PtyError> {
        self.pty.resize(rows, cols)?;
        self.tracker.resize(rows, cols);
        Ok(())
    }

    /// Check for child exit; transitions `alive` exactly once. A stream cut
    /// off mid-escape-sequence is abandoned so the tracker stays readable.
    pub fn check_exit(&mut self) {
        if self.alive {
            if let Some(code) = self.pty.poll_exit() {
                self.alive = false;
                self.exit_code = Some(code);
                self.tracker.recover();
                tracing::info!("session {} exited with code {}", self.id, code);
            }
        }
    }

    /// Mirror a typed character into the input line buffer.
    ///
    /// On carriage return the buffered line becomes the pinned prompt —
    /// unless the guest is on the alternate screen, where keystrokes drive a
    /// full-screen program rather than compose commands.
    pub fn track_input(&mut self, c: char) {
        match c {
            '\r' => {
                let trimmed = self.input_buffer.trim();
                if !trimmed.is_empty() && !self.tracker.screen().alt_screen() {
                    self.pinned_prompt = Some(trimmed.to_string());
                }
                self.input_buffer.clear();
            }
            '\n' => {
                // Shift+Enter: multi-line composition continues
                self.input_buffer.push('\n');
            }
            '\x03' => {
                // Ctrl+C aborts the line
                self.input_buffer.clear();
            }
            '\x15' => {
                // Ctrl+U kills the line
                self.input_buffer.clear();
            }
            '\x7f' | '\x08' => {
                self.input_buffer.pop();
            }
            c if !c.is_control() => {
                self.input_buffer.push(c);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_session() -> Session {
        // A real shell is not needed to test input tracking; `sleep` just
        // keeps a child alive on the slave side.
        let cwd = std::env::current_dir().unwrap();
        Session::spawn(1, cwd, "sleep", &["5".to_string()], 24, 80).expect("spawn sleep")
    }

    fn type_str(session: &mut Session, text: &str) {
        for c in text.chars() {
            session.track_input(c);
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_enter_pins_typed_line() {
        let mut session = dummy_session();
        type_str(&mut session, "ls -la\r");

        assert_eq!(session.pinned_prompt(), Some("ls -la"));
    }

    #[test]
    #[cfg(unix)]
    fn test_backspace_and_ctrl_u() {
        let mut session = dummy_session();
        type_str(&mut session, "gti\x7f\x7fit status\r");
        assert_eq!(session.pinned_prompt(), Some("git status"));

        type_str(&mut session, "wrong\x15right\r");
        assert_eq!(session.pinned_prompt(), Some("right"));
    }

    #[test]
    #[cfg(unix)]
    fn test_empty_submit_keeps_previous_pin() {
        let mut session = dummy_session();
        type_str(&mut session, "make test\r");
        type_str(&mut session, "   \r");

        assert_eq!(session.pinned_prompt(), Some("make test"));
    }

    #[test]
    #[cfg(unix)]
    fn test_no_pin_while_alternate_screen() {
        let mut session = dummy_session();
        session.feed(b"\x1b[?1049h");
        type_str(&mut session, ":wq\r");
        assert_eq!(session.pinned_prompt(), None);

        session.feed(b"\x1b[?1049l");
        type_str(&mut session, "cargo build\r");
        assert_eq!(session.pinned_prompt(), Some("cargo build"));
    }

    #[test]
    #[cfg(unix)]
    fn test_exit_recovers_truncated_stream() {
        use std::time::{Duration, Instant};

        let cwd = std::env::current_dir().unwrap();
        let mut session =
            Session::spawn(1, cwd, "true", &[], 24, 80).expect("spawn true");

        // Stream dies mid-sequence
        session.feed(b"half\x1b[12");

        let start = Instant::now();
        while session.alive() {
            session.check_exit();
            assert!(start.elapsed() < Duration::from_secs(10));
            std::thread::sleep(Duration::from_millis(10));
        }

        // Parser is back in ground state, not eating these bytes as params
        session.feed(b"done");
        assert!(session.tracker().screen().current_line().ends_with("done"));
    }

    #[test]
    #[cfg(unix)]
    fn test_ctrl_c_aborts_line() {
        let mut session = dummy_session();
        type_str(&mut session, "rm -rf /\x03yes\r");

        assert_eq!(session.pinned_prompt(), Some("yes"));
    }
}
