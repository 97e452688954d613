//! Pin and hint bars
//!
//! The bottom rows of the terminal belong to the multiplexer: a pin bar
//! showing the last submitted command and a hint bar with the prefix-key
//! cheat sheet. The guest lives inside a DECSTBM scroll region above them,
//! so its own scrolling can never touch these rows.
//!
//! crossterm has no scroll-region command, so DECSTBM and cursor
//! save/restore are written as raw sequences alongside the styled output.

use std::io::{self, Write};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
};
use unicode_width::UnicodeWidthChar;

/// Rows a pinned prompt may occupy before truncation.
const MAX_PIN_ROWS: u16 = 3;

/// Restrict guest scrolling to rows `top..=bottom`, 1-based.
pub fn set_scroll_region(w: &mut impl Write, top: u16, bottom: u16) -> io::Result<()> {
    write!(w, "\x1b[{};{}r", top, bottom)
}

/// Restore full-screen scrolling.
pub fn reset_scroll_region(w: &mut impl Write) -> io::Result<()> {
    write!(w, "\x1b[r")
}

pub fn save_cursor(w: &mut impl Write) -> io::Result<()> {
    write!(w, "\x1b7")
}

pub fn restore_cursor(w: &mut impl Write) -> io::Result<()> {
    write!(w, "\x1b8")
}

/// Total bar rows for a given pinned prompt: pin rows plus the hint row.
pub fn bar_rows(pinned: Option<&str>, cols: u16) -> u16 {
    pin_rows(pinned, cols) + 1
}

fn pin_rows(pinned: Option<&str>, cols: u16) -> u16 {
    match pinned {
        Some(text) => (wrap_to_width(text, cols.max(1) as usize).len() as u16).min(MAX_PIN_ROWS),
        None => 0,
    }
}

/// Draw the pin bar and hint bar on the bottom `bar_rows` rows.
///
/// Callers bracket this with [`save_cursor`]/[`restore_cursor`] so the
/// guest's cursor position survives the redraw.
pub fn render_bars(
    w: &mut impl Write,
    rows: u16,
    cols: u16,
    pinned: Option<&str>,
    prefix_armed: bool,
    status: Option<&str>,
    title: &str,
) -> io::Result<()> {
    let pin = pin_rows(pinned, cols);
    let hint_row = rows.saturating_sub(1);
    let first_pin_row = hint_row.saturating_sub(pin);

    if let Some(text) = pinned {
        let lines = wrap_to_width(text, cols.max(1) as usize);
        for (i, line) in lines.iter().take(pin as usize).enumerate() {
            queue!(
                w,
                MoveTo(0, first_pin_row + i as u16),
                SetBackgroundColor(Color::DarkBlue),
                SetForegroundColor(Color::White),
            )?;
            if i == 0 {
                write!(w, "\u{2192} {}", line)?;
            } else {
                write!(w, "  {}", line)?;
            }
            write!(w, "\x1b[K")?;
        }
    }

    render_hint_bar(w, hint_row, prefix_armed, status, title)?;
    queue!(w, ResetColor, SetAttribute(Attribute::Reset))?;
    w.flush()
}

fn render_hint_bar(
    w: &mut impl Write,
    row: u16,
    prefix_armed: bool,
    status: Option<&str>,
    title: &str,
) -> io::Result<()> {
    if prefix_armed {
        queue!(
            w,
            MoveTo(0, row),
            SetBackgroundColor(Color::Yellow),
            SetForegroundColor(Color::Black),
        )?;
        write!(w, " ^\\  n new  d close  1-9 jump  o overview  q quit")?;
    } else {
        queue!(
            w,
            MoveTo(0, row),
            SetBackgroundColor(Color::DarkGrey),
            SetForegroundColor(Color::White),
        )?;
        match status {
            Some(msg) => write!(w, " {}", msg)?,
            None if title.is_empty() => write!(w, " ^\\ commands")?,
            None => write!(w, " ^\\ commands  {}", title)?,
        }
    }
    write!(w, "\x1b[K")
}

/// Split `text` into display lines no wider than `width` columns,
/// accounting for double-width characters. The bar prefix takes 2 columns.
fn wrap_to_width(text: &str, width: usize) -> Vec<String> {
    let width = width.saturating_sub(2).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if current_width + w > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(ch);
        current_width += w;
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_rows_without_pin() {
        assert_eq!(bar_rows(None, 80), 1);
    }

    #[test]
    fn test_bar_rows_single_line_pin() {
        assert_eq!(bar_rows(Some("ls -la"), 80), 2);
    }

    #[test]
    fn test_bar_rows_wraps_long_pin() {
        // 200 chars over 78 usable columns -> 3 pin rows
        let long = "x".repeat(200);
        assert_eq!(bar_rows(Some(&long), 80), 4);
    }

    #[test]
    fn test_bar_rows_caps_pin_height() {
        let very_long = "x".repeat(2000);
        assert_eq!(bar_rows(Some(&very_long), 80), 1 + MAX_PIN_ROWS);
    }

    #[test]
    fn test_wrap_counts_wide_chars_as_two() {
        // 10 usable columns; each CJK char takes 2
        let lines = wrap_to_width("ビルドしてテスト", 12);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "ビルドして");
    }

    #[test]
    fn test_scroll_region_sequence() {
        let mut buf = Vec::new();
        set_scroll_region(&mut buf, 1, 22).unwrap();
        assert_eq!(buf, b"\x1b[1;22r");

        buf.clear();
        reset_scroll_region(&mut buf).unwrap();
        assert_eq!(buf, b"\x1b[r");
    }

    #[test]
    fn test_hint_bar_shows_status_message() {
        let mut buf = Vec::new();
        render_bars(&mut buf, 24, 80, None, false, Some("spawn failed"), "").unwrap();
        let out = String::from_utf8_lossy(&buf);
        assert!(out.contains("spawn failed"));
    }

    #[test]
    fn test_armed_hint_shows_commands() {
        let mut buf = Vec::new();
        render_bars(&mut buf, 24, 80, None, true, None, "").unwrap();
        let out = String::from_utf8_lossy(&buf);
        assert!(out.contains("o overview"));
    }

    #[test]
    fn test_idle_hint_shows_window_title() {
        let mut buf = Vec::new();
        render_bars(&mut buf, 24, 80, None, false, None, "agent: build").unwrap();
        let out = String::from_utf8_lossy(&buf);
        assert!(out.contains("agent: build"));

        // a transient status takes the row over
        buf.clear();
        render_bars(&mut buf, 24, 80, None, false, Some("no session 5"), "agent: build").unwrap();
        let out = String::from_utf8_lossy(&buf);
        assert!(out.contains("no session 5"));
        assert!(!out.contains("agent: build"));
    }
}
