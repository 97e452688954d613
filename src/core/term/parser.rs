//! VT sequence parser
//!
//! Parses ANSI/VT escape sequences and updates tracker screen state.

use super::screen::Screen;

/// Parser state machine.
///
/// A sequence cut off at the end of one `feed` call resumes from the same
/// state on the next call; partial UTF-8 runs are buffered the same way, so
/// tracker state never depends on how the byte stream was chunked.
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<u8>,
    current_param: Option<u16>,
    osc_string: String,
    utf8_pending: Vec<u8>,
}

#[derive(Clone, Copy, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    EscapeInOsc, // ESC received within OSC, waiting for backslash
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            osc_string: String::new(),
            utf8_pending: Vec::new(),
        }
    }

    /// Feed a single byte to the parser.
    pub fn feed(&mut self, byte: u8, screen: &mut Screen) {
        // Handle C0 controls anywhere (except in OSC-related states)
        if byte < 0x20
            && self.state != ParserState::OscString
            && self.state != ParserState::EscapeInOsc
        {
            self.utf8_pending.clear();
            match byte {
                0x1B => self.enter_escape(),
                0x07 => {} // BEL - ignore
                0x08 => screen.backspace(),
                0x09 => screen.horizontal_tab(),
                0x0A | 0x0B | 0x0C => screen.linefeed(),
                0x0D => screen.carriage_return(),
                _ => {}
            }
            return;
        }

        match self.state {
            ParserState::Ground => self.ground(byte, screen),
            ParserState::Escape => self.escape(byte, screen),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::CsiEntry => self.csi_entry(byte, screen),
            ParserState::CsiParam => self.csi_param(byte, screen),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, screen),
            ParserState::OscString => self.osc_string_state(byte, screen),
            ParserState::EscapeInOsc => self.escape_in_osc(byte, screen),
        }
    }

    /// Abandon any in-flight sequence and return to ground.
    ///
    /// Real terminal streams are not guaranteed well-formed; this is the
    /// local recovery for a sequence that never terminates.
    pub fn reset(&mut self) {
        self.state = ParserState::Ground;
        self.utf8_pending.clear();
        self.osc_string.clear();
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn ground(&mut self, byte: u8, screen: &mut Screen) {
        if !self.utf8_pending.is_empty() {
            self.utf8_continue(byte, screen);
            return;
        }
        if byte < 0x7F {
            screen.put_char(byte as char);
        } else if byte >= 0xC0 {
            // Lead byte of a multi-byte UTF-8 sequence
            self.utf8_pending.push(byte);
        }
        // Lone continuation bytes and DEL are dropped
    }

    fn utf8_continue(&mut self, byte: u8, screen: &mut Screen) {
        if byte & 0xC0 != 0x80 {
            // Invalid continuation: drop the pending run, reprocess this byte
            self.utf8_pending.clear();
            self.ground(byte, screen);
            return;
        }
        self.utf8_pending.push(byte);
        let lead = self.utf8_pending[0];
        let want = if lead & 0xE0 == 0xC0 {
            2
        } else if lead & 0xF0 == 0xE0 {
            3
        } else {
            4
        };
        if self.utf8_pending.len() == want {
            if let Ok(s) = std::str::from_utf8(&self.utf8_pending) {
                for ch in s.chars() {
                    screen.put_char(ch);
                }
            }
            self.utf8_pending.clear();
        }
    }

    fn escape(&mut self, byte: u8, screen: &mut Screen) {
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
                self.params.clear();
                self.intermediates.clear();
                self.current_param = None;
            }
            b']' => {
                self.state = ParserState::OscString;
                self.osc_string.clear();
            }
            b'7' => {
                // DECSC - Save cursor
                screen.save_cursor();
                self.state = ParserState::Ground;
            }
            b'8' => {
                // DECRC - Restore cursor
                screen.restore_cursor();
                self.state = ParserState::Ground;
            }
            b'D' => {
                // IND - Index
                screen.index();
                self.state = ParserState::Ground;
            }
            b'E' => {
                // NEL - Next line
                screen.carriage_return();
                screen.linefeed();
                self.state = ParserState::Ground;
            }
            b'M' => {
                // RI - Reverse index
                screen.reverse_index();
                self.state = ParserState::Ground;
            }
            b'c' => {
                // RIS - Full reset
                screen.reset();
                self.state = ParserState::Ground;
            }
            0x20..=0x2F => {
                // Intermediate bytes (charset designation etc.)
                self.intermediates.push(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
    }

    fn escape_intermediate(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => {
                self.intermediates.push(byte);
            }
            _ => {
                // Final byte: charset selections and friends, all ignored
                self.state = ParserState::Ground;
            }
        }
    }

    fn csi_entry(&mut self, byte: u8, screen: &mut Screen) {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' => {
                self.params.push(0);
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'!' | b'=' => {
                self.intermediates.push(byte);
            }
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                self.execute_csi(byte, screen);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
    }

    fn csi_param(&mut self, byte: u8, screen: &mut Screen) {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            b';' | b':' => {
                self.params.push(self.current_param.unwrap_or(0));
                self.current_param = None;
            }
            0x20..=0x2F => {
                if let Some(p) = self.current_param.take() {
                    self.params.push(p);
                }
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    self.params.push(p);
                }
                self.execute_csi(byte, screen);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
    }

    fn csi_intermediate(&mut self, byte: u8, screen: &mut Screen) {
        match byte {
            0x20..=0x2F => {
                self.intermediates.push(byte);
            }
            0x40..=0x7E => {
                self.execute_csi(byte, screen);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
    }

    fn osc_string_state(&mut self, byte: u8, screen: &mut Screen) {
        match byte {
            0x07 => {
                // BEL terminates OSC
                self.execute_osc(screen);
                self.state = ParserState::Ground;
            }
            0x1B => {
                // Could be ST (ESC \)
                self.state = ParserState::EscapeInOsc;
            }
            0x9C => {
                // ST (String Terminator)
                self.execute_osc(screen);
                self.state = ParserState::Ground;
            }
            _ => {
                self.osc_string.push(byte as char);
            }
        }
    }

    /// Handle ESC received within an OSC sequence.
    fn escape_in_osc(&mut self, byte: u8, screen: &mut Screen) {
        if byte == b'\\' {
            // ST (ESC \) - String Terminator
            self.execute_osc(screen);
            self.state = ParserState::Ground;
        } else {
            // Not ST: terminate the OSC and treat this as a new escape
            self.execute_osc(screen);
            self.enter_escape();
            self.escape(byte, screen);
        }
    }

    fn execute_csi(&mut self, final_byte: u8, screen: &mut Screen) {
        let is_private = self.intermediates.contains(&b'?');
        let params = &self.params;

        match (is_private, final_byte) {
            // Cursor movement
            (false, b'A') => screen.cursor_up(params.first().copied().unwrap_or(1).max(1)),
            (false, b'B') => screen.cursor_down(params.first().copied().unwrap_or(1).max(1)),
            (false, b'C') => screen.cursor_forward(params.first().copied().unwrap_or(1).max(1)),
            (false, b'D') => screen.cursor_backward(params.first().copied().unwrap_or(1).max(1)),
            (false, b'E') => {
                // CNL - Cursor Next Line
                let n = params.first().copied().unwrap_or(1).max(1);
                screen.cursor_down(n);
                screen.carriage_return();
            }
            (false, b'F') => {
                // CPL - Cursor Previous Line
                let n = params.first().copied().unwrap_or(1).max(1);
                screen.cursor_up(n);
                screen.carriage_return();
            }
            (false, b'G') => {
                // CHA - Cursor Character Absolute
                screen.cursor_column(params.first().copied().unwrap_or(1));
            }
            (false, b'H') | (false, b'f') => {
                // CUP - Cursor Position
                let row = params.first().copied().unwrap_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                screen.cursor_position(row, col);
            }
            (false, b'd') => {
                // VPA - Line Position Absolute
                screen.cursor_line(params.first().copied().unwrap_or(1));
            }

            // Erase
            (false, b'J') => screen.erase_in_display(params.first().copied().unwrap_or(0)),
            (false, b'K') => screen.erase_in_line(params.first().copied().unwrap_or(0)),

            // Scroll region
            (false, b'r') => {
                let top = params.first().copied().unwrap_or(1);
                let bottom = params.get(1).copied().unwrap_or(screen.rows());
                screen.set_scroll_region(top, bottom);
                screen.cursor_position(1, 1);
            }

            // Scroll
            (false, b'S') => screen.scroll_up(params.first().copied().unwrap_or(1).max(1)),
            (false, b'T') => screen.scroll_down(params.first().copied().unwrap_or(1).max(1)),

            // SGR - colors and attributes are not tracked
            (false, b'm') => {}

            // Save/restore cursor (ANSI.SYS style)
            (false, b's') => screen.save_cursor(),
            (false, b'u') => screen.restore_cursor(),

            // Private modes (DEC)
            (true, b'h') => {
                for &p in params {
                    screen.set_private_mode(p, true);
                }
            }
            (true, b'l') => {
                for &p in params {
                    screen.set_private_mode(p, false);
                }
            }

            _ => {
                // Unknown sequence: consumed without desynchronizing
                tracing::trace!(
                    "unhandled CSI: intermediates={:?}, params={:?}, final={:?}",
                    self.intermediates,
                    params,
                    final_byte as char
                );
            }
        }

        self.state = ParserState::Ground;
    }

    fn execute_osc(&mut self, screen: &mut Screen) {
        // Parse OSC: "code;text"
        if let Some(pos) = self.osc_string.find(';') {
            let code = &self.osc_string[..pos];
            let text = &self.osc_string[pos + 1..];

            match code {
                "0" | "1" | "2" => {
                    // Set window title
                    screen.set_title(text);
                }
                _ => {}
            }
        }
        self.osc_string.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut VtParser, screen: &mut Screen, bytes: &[u8]) {
        for &b in bytes {
            parser.feed(b, screen);
        }
    }

    #[test]
    fn test_cursor_movement() {
        let mut screen = Screen::new(24, 80);
        let mut parser = VtParser::new();

        feed(&mut parser, &mut screen, b"\x1b[5;10H");

        assert_eq!(screen.cursor(), (4, 9));
    }

    #[test]
    fn test_relative_cursor_movement() {
        let mut screen = Screen::new(24, 80);
        let mut parser = VtParser::new();

        feed(&mut parser, &mut screen, b"\x1b[10;10H\x1b[2A\x1b[3C\x1b[1B\x1b[4D");

        assert_eq!(screen.cursor(), (8, 8));
    }

    #[test]
    fn test_osc_title_bel() {
        let mut screen = Screen::new(24, 80);
        let mut parser = VtParser::new();

        feed(&mut parser, &mut screen, b"\x1b]0;hello world\x07after");

        assert_eq!(screen.title(), "hello world");
        assert_eq!(screen.current_line(), "after");
    }

    #[test]
    fn test_osc_title_st() {
        let mut screen = Screen::new(24, 80);
        let mut parser = VtParser::new();

        feed(&mut parser, &mut screen, b"\x1b]2;agent\x1b\\");

        assert_eq!(screen.title(), "agent");
    }

    #[test]
    fn test_unknown_csi_does_not_desync() {
        let mut screen = Screen::new(24, 80);
        let mut parser = VtParser::new();

        // DECSCUSR and a made-up sequence, followed by plain text
        feed(&mut parser, &mut screen, b"\x1b[2 q\x1b[99;42yready");

        assert_eq!(screen.current_line(), "ready");
    }

    #[test]
    fn test_erase_in_line() {
        let mut screen = Screen::new(24, 80);
        let mut parser = VtParser::new();

        feed(&mut parser, &mut screen, b"hello world\x1b[6G\x1b[K");

        assert_eq!(screen.current_line(), "hello");
    }

    #[test]
    fn test_alt_screen_round_trip() {
        let mut screen = Screen::new(24, 80);
        let mut parser = VtParser::new();

        assert!(!screen.alt_screen());
        feed(&mut parser, &mut screen, b"\x1b[?1049h");
        assert!(screen.alt_screen());
        feed(&mut parser, &mut screen, b"\x1b[?1049l");
        assert!(!screen.alt_screen());
    }

    #[test]
    fn test_legacy_alt_screen_modes() {
        for seq in [&b"\x1b[?47h"[..], b"\x1b[?1047h"] {
            let mut screen = Screen::new(24, 80);
            let mut parser = VtParser::new();
            feed(&mut parser, &mut screen, seq);
            assert!(screen.alt_screen(), "mode {:?}", seq);
        }
    }

    #[test]
    fn test_utf8_across_feed_boundary() {
        let mut screen = Screen::new(24, 80);
        let mut parser = VtParser::new();

        let bytes = "héllo".as_bytes();
        // Split in the middle of the two-byte 'é'
        feed(&mut parser, &mut screen, &bytes[..2]);
        feed(&mut parser, &mut screen, &bytes[2..]);

        assert_eq!(screen.current_line(), "héllo");
    }
}
