//! VT100/ANSI stream tracking.
//!
//! - **parser**: byte-level escape sequence state machine
//! - **screen**: tracked screen state (text grid, cursor, alt-screen, title)
//!
//! The tracker interprets guest output just far enough to answer what the
//! multiplexer needs: is the guest on the alternate screen, what is the
//! window title, what does the line under the cursor say, and which line was
//! just completed. It never renders anything itself.

pub mod parser;
pub mod screen;

pub use parser::VtParser;
pub use screen::Screen;

/// A VT100 tracker: parser plus tracked screen state, fed raw guest bytes.
///
/// Single-writer: one feeder, strict arrival order. A partial escape
/// sequence spanning two `feed` calls is buffered and resumed, so the final
/// state is independent of how the stream was chunked.
pub struct Tracker {
    screen: Screen,
    parser: VtParser,
}

impl Tracker {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            screen: Screen::new(rows, cols),
            parser: VtParser::new(),
        }
    }

    /// Feed a chunk of guest output.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.parser.feed(b, &mut self.screen);
        }
    }

    /// Drop any unterminated in-flight sequence and return to ground.
    pub fn recover(&mut self) {
        self.parser.reset();
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Resize the tracked screen to match the PTY.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.screen.resize(rows, cols);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] =
        b"\x1b]0;session one\x07$ ls -la\r\ntotal 4\r\n\x1b[1;32mdrwxr-xr-x\x1b[0m .\r\n\x1b[5;3H\x1b[Kdone";

    fn state_digest(t: &Tracker) -> (String, String, (u16, u16), bool, Option<String>) {
        (
            t.screen().title().to_string(),
            t.screen().current_line(),
            t.screen().cursor(),
            t.screen().alt_screen(),
            t.screen().last_line().map(str::to_string),
        )
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let mut whole = Tracker::new(24, 80);
        whole.feed(SAMPLE);
        let expected = state_digest(&whole);

        // Every split point, including mid-escape and mid-OSC
        for split in 0..=SAMPLE.len() {
            let mut t = Tracker::new(24, 80);
            t.feed(&SAMPLE[..split]);
            t.feed(&SAMPLE[split..]);
            assert_eq!(state_digest(&t), expected, "split at {}", split);
        }
    }

    #[test]
    fn test_shell_echo_pins_command() {
        let mut t = Tracker::new(24, 80);
        t.feed(b"$ ");
        t.feed(b"l");
        t.feed(b"s");
        t.feed(b" -la");
        t.feed(b"\r\n");

        assert_eq!(t.screen().last_line(), Some("$ ls -la"));
    }

    #[test]
    fn test_no_capture_between_alt_enter_and_exit() {
        let mut t = Tracker::new(24, 80);
        t.feed(b"\x1b[?1049h");
        t.feed(b"vim buffer line\r\nanother line\r\n");
        t.feed(b"\x1b[?1049l");

        assert!(!t.screen().alt_screen());
        assert_eq!(t.screen().last_line(), None);
    }

    #[test]
    fn test_recover_from_truncated_sequence() {
        let mut t = Tracker::new(24, 80);
        t.feed(b"before\x1b[12");
        // Stream ends mid-sequence; recovery returns to ground
        t.recover();
        t.feed(b"after");

        assert!(t.screen().current_line().ends_with("after"));
    }
}
