//! Tracker screen state
//!
//! A display-equivalent interpretation of the guest byte stream: plain-text
//! cell grid, cursor position, alternate-screen flag, window title, and the
//! prompt-capture candidate. No colors, attributes, or scrollback — the
//! multiplexer passes guest bytes through untouched, so this state only has
//! to answer the questions pinning and the overview preview ask.

use unicode_width::UnicodeWidthChar;

/// Placeholder cell occupied by the right half of a wide character.
const WIDE_CONTINUATION: char = '\0';

/// Terminal screen tracker state.
pub struct Screen {
    rows: u16,
    cols: u16,
    primary: Grid,
    alternate: Grid,
    alt_screen: bool,
    primary_cursor: Cursor,
    alternate_cursor: Cursor,
    title: String,
    /// Most recently completed non-empty line on the primary screen,
    /// trailing whitespace trimmed. Capture is suppressed entirely while
    /// the alternate screen is active.
    last_line: Option<String>,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    scroll_region: (u16, u16),
    auto_wrap: bool,
}

#[derive(Clone, Copy, Default)]
struct Cursor {
    row: u16,
    col: u16,
    saved: Option<(u16, u16)>,
}

struct Grid {
    cells: Vec<Vec<char>>,
}

impl Grid {
    fn new(rows: u16, cols: u16) -> Self {
        Self {
            cells: (0..rows).map(|_| vec![' '; cols as usize]).collect(),
        }
    }

    fn resize(&mut self, rows: u16, cols: u16) {
        while self.cells.len() < rows as usize {
            self.cells.push(vec![' '; cols as usize]);
        }
        self.cells.truncate(rows as usize);
        for row in &mut self.cells {
            row.resize(cols as usize, ' ');
        }
    }

    fn clear_row(&mut self, row: usize) {
        if let Some(r) = self.cells.get_mut(row) {
            r.fill(' ');
        }
    }

    /// Text of a row with continuation cells skipped and the end trimmed.
    fn row_text(&self, row: usize) -> String {
        let mut text: String = self
            .cells
            .get(row)
            .map(|r| r.iter().filter(|&&c| c != WIDE_CONTINUATION).collect())
            .unwrap_or_default();
        text.truncate(text.trim_end().len());
        text
    }
}

impl Screen {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows,
            cols,
            primary: Grid::new(rows, cols),
            alternate: Grid::new(rows, cols),
            alt_screen: false,
            primary_cursor: Cursor::default(),
            alternate_cursor: Cursor::default(),
            title: String::new(),
            last_line: None,
            scroll_region: (0, rows.saturating_sub(1)),
            auto_wrap: true,
        }
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Active cursor position as (row, col), 0-indexed.
    pub fn cursor(&self) -> (u16, u16) {
        let c = self.active_cursor();
        (c.row, c.col)
    }

    pub fn alt_screen(&self) -> bool {
        self.alt_screen
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    /// Text content of the row under the cursor, trailing whitespace trimmed.
    pub fn current_line(&self) -> String {
        let row = self.active_cursor().row as usize;
        self.active_grid().row_text(row)
    }

    /// Text content of an arbitrary row of the active screen.
    pub fn line_text(&self, row: u16) -> String {
        self.active_grid().row_text(row as usize)
    }

    /// The most recent prompt-capture candidate, if any.
    pub fn last_line(&self) -> Option<&str> {
        self.last_line.as_deref()
    }

    fn active_grid(&self) -> &Grid {
        if self.alt_screen {
            &self.alternate
        } else {
            &self.primary
        }
    }

    fn active_grid_mut(&mut self) -> &mut Grid {
        if self.alt_screen {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    fn active_cursor(&self) -> &Cursor {
        if self.alt_screen {
            &self.alternate_cursor
        } else {
            &self.primary_cursor
        }
    }

    fn active_cursor_mut(&mut self) -> &mut Cursor {
        if self.alt_screen {
            &mut self.alternate_cursor
        } else {
            &mut self.primary_cursor
        }
    }

    /// Resize both screens, clamping cursors and resetting the scroll region.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.rows = rows;
        self.cols = cols;
        self.primary.resize(rows, cols);
        self.alternate.resize(rows, cols);
        self.scroll_region = (0, rows.saturating_sub(1));

        let max_row = rows.saturating_sub(1);
        let max_col = cols.saturating_sub(1);
        self.primary_cursor.row = self.primary_cursor.row.min(max_row);
        self.primary_cursor.col = self.primary_cursor.col.min(max_col);
        self.alternate_cursor.row = self.alternate_cursor.row.min(max_row);
        self.alternate_cursor.col = self.alternate_cursor.col.min(max_col);
    }

    /// Full reset (RIS). The window title is session metadata and survives.
    pub fn reset(&mut self) {
        let title = std::mem::take(&mut self.title);
        *self = Screen::new(self.rows, self.cols);
        self.title = title;
    }

    /// Put a character at the current cursor position.
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;
        if width == 0 {
            // Combining characters don't occupy a cell of their own
            return;
        }

        if self.active_cursor().col >= self.cols {
            if self.auto_wrap {
                self.active_cursor_mut().col = 0;
                self.advance_line();
            } else {
                self.active_cursor_mut().col = self.cols.saturating_sub(1);
            }
        }

        let (row, col) = {
            let c = self.active_cursor();
            (c.row as usize, c.col as usize)
        };
        let cols = self.cols as usize;
        if col >= cols {
            return;
        }

        let grid = self.active_grid_mut();
        if let Some(cells) = grid.cells.get_mut(row) {
            // Overwriting half of a wide character blanks its other half
            if cells[col] == WIDE_CONTINUATION && col > 0 {
                cells[col - 1] = ' ';
            }
            if col + 1 < cols && cells[col + 1] == WIDE_CONTINUATION {
                cells[col + 1] = ' ';
            }

            cells[col] = ch;
            if width == 2 && col + 1 < cols {
                cells[col + 1] = WIDE_CONTINUATION;
            }
        }

        self.active_cursor_mut().col += width;
    }

    /// Carriage return - move cursor to column 0.
    pub fn carriage_return(&mut self) {
        self.active_cursor_mut().col = 0;
    }

    /// Line feed: completes the current line (prompt-capture candidate on the
    /// primary screen), then moves down, scrolling at the region bottom.
    pub fn linefeed(&mut self) {
        if !self.alt_screen {
            let line = self.current_line();
            if !line.is_empty() {
                self.last_line = Some(line);
            }
        }
        self.advance_line();
    }

    /// Cursor down one line with scrolling, without completing a line.
    /// Used for wraps and IND, where no command was submitted.
    /// Below the region the cursor just moves toward the screen bottom.
    fn advance_line(&mut self) {
        let row = self.active_cursor().row;
        if row == self.scroll_region.1 {
            self.scroll_up(1);
        } else if row < self.rows.saturating_sub(1) {
            self.active_cursor_mut().row += 1;
        }
    }

    /// Backspace - move cursor left.
    pub fn backspace(&mut self) {
        let cursor = self.active_cursor_mut();
        if cursor.col > 0 {
            cursor.col -= 1;
        }
    }

    /// Horizontal tab - next tab stop (every 8 columns).
    pub fn horizontal_tab(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = ((cursor.col / 8) + 1) * 8;
        if cursor.col >= cols {
            cursor.col = cols.saturating_sub(1);
        }
    }

    /// Scroll the region up by n lines.
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols as usize;
        let grid = self.active_grid_mut();

        for _ in 0..n {
            if (top as usize) < grid.cells.len() && (bottom as usize) < grid.cells.len() {
                grid.cells.remove(top as usize);
                grid.cells.insert(bottom as usize, vec![' '; cols]);
            }
        }
    }

    /// Scroll the region down by n lines.
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols as usize;
        let grid = self.active_grid_mut();

        for _ in 0..n {
            if (bottom as usize) < grid.cells.len() && (top as usize) < grid.cells.len() {
                grid.cells.remove(bottom as usize);
                grid.cells.insert(top as usize, vec![' '; cols]);
            }
        }
    }

    pub fn cursor_up(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        let rows = self.rows;
        let cursor = self.active_cursor_mut();
        cursor.row = (cursor.row + n).min(rows.saturating_sub(1));
    }

    pub fn cursor_forward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = (cursor.col + n).min(cols.saturating_sub(1));
    }

    pub fn cursor_backward(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters).
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        let rows = self.rows;
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.row = row.saturating_sub(1).min(rows.saturating_sub(1));
        cursor.col = col.saturating_sub(1).min(cols.saturating_sub(1));
    }

    /// CHA - set cursor column (1-indexed).
    pub fn cursor_column(&mut self, col: u16) {
        let cols = self.cols;
        self.active_cursor_mut().col = col.saturating_sub(1).min(cols.saturating_sub(1));
    }

    /// VPA - set cursor row (1-indexed).
    pub fn cursor_line(&mut self, row: u16) {
        let rows = self.rows;
        self.active_cursor_mut().row = row.saturating_sub(1).min(rows.saturating_sub(1));
    }

    /// Erase in display.
    pub fn erase_in_display(&mut self, mode: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let rows = self.rows as usize;
        match mode {
            0 => {
                // From cursor to end
                self.erase_in_line(0);
                let grid = self.active_grid_mut();
                for r in (cursor_row + 1)..rows {
                    grid.clear_row(r);
                }
            }
            1 => {
                // From start to cursor
                {
                    let grid = self.active_grid_mut();
                    for r in 0..cursor_row {
                        grid.clear_row(r);
                    }
                }
                self.erase_in_line(1);
            }
            2 | 3 => {
                let grid = self.active_grid_mut();
                for r in 0..rows {
                    grid.clear_row(r);
                }
            }
            _ => {}
        }
    }

    /// Erase in line.
    pub fn erase_in_line(&mut self, mode: u16) {
        let (row, col) = {
            let c = self.active_cursor();
            (c.row as usize, c.col as usize)
        };
        let cols = self.cols as usize;
        let grid = self.active_grid_mut();

        let Some(cells) = grid.cells.get_mut(row) else {
            return;
        };

        match mode {
            0 => {
                for c in cells.iter_mut().take(cols).skip(col) {
                    *c = ' ';
                }
            }
            1 => {
                for c in cells.iter_mut().take((col + 1).min(cols)) {
                    *c = ' ';
                }
            }
            2 => cells.fill(' '),
            _ => {}
        }
    }

    /// Set scroll region (1-indexed parameters).
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let rows = self.rows;
        let top = top.saturating_sub(1).min(rows.saturating_sub(1));
        let bottom = bottom.saturating_sub(1).min(rows.saturating_sub(1));
        if top < bottom {
            self.scroll_region = (top, bottom);
        }
    }

    pub fn save_cursor(&mut self) {
        let (row, col) = {
            let c = self.active_cursor();
            (c.row, c.col)
        };
        self.active_cursor_mut().saved = Some((row, col));
    }

    pub fn restore_cursor(&mut self) {
        if let Some((row, col)) = self.active_cursor().saved {
            let cursor = self.active_cursor_mut();
            cursor.row = row;
            cursor.col = col;
        }
    }

    /// Set a DEC private mode.
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            7 => self.auto_wrap = enable,
            47 | 1047 => {
                if enable {
                    self.alt_screen = true;
                    self.alternate = Grid::new(self.rows, self.cols);
                } else {
                    self.alt_screen = false;
                }
            }
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.save_cursor();
                    self.alt_screen = true;
                    self.alternate = Grid::new(self.rows, self.cols);
                    self.alternate_cursor = Cursor::default();
                } else {
                    self.alt_screen = false;
                    self.restore_cursor();
                }
            }
            _ => {} // Ignore unknown modes
        }
    }

    /// Reverse index - cursor up, scroll if at region top.
    pub fn reverse_index(&mut self) {
        let cursor_row = self.active_cursor().row;
        if cursor_row == self.scroll_region.0 {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Index - cursor down, scroll if at region bottom.
    pub fn index(&mut self) {
        self.advance_line();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_line(screen: &mut Screen, text: &str) {
        for ch in text.chars() {
            screen.put_char(ch);
        }
        screen.carriage_return();
        screen.linefeed();
    }

    #[test]
    fn test_linefeed_captures_completed_line() {
        let mut screen = Screen::new(24, 80);
        type_line(&mut screen, "ls -la");

        assert_eq!(screen.last_line(), Some("ls -la"));
        assert_eq!(screen.cursor(), (1, 0));
    }

    #[test]
    fn test_empty_line_not_captured() {
        let mut screen = Screen::new(24, 80);
        type_line(&mut screen, "   ");

        assert_eq!(screen.last_line(), None);
    }

    #[test]
    fn test_no_capture_on_alternate_screen() {
        let mut screen = Screen::new(24, 80);
        screen.set_private_mode(1049, true);
        type_line(&mut screen, "not a command");
        assert_eq!(screen.last_line(), None);

        screen.set_private_mode(1049, false);
        assert!(!screen.alt_screen());
        type_line(&mut screen, "real command");
        assert_eq!(screen.last_line(), Some("real command"));
    }

    #[test]
    fn test_alt_screen_is_separate_grid() {
        let mut screen = Screen::new(24, 80);
        for ch in "primary".chars() {
            screen.put_char(ch);
        }

        screen.set_private_mode(1049, true);
        assert_eq!(screen.current_line(), "");
        for ch in "editor".chars() {
            screen.put_char(ch);
        }
        assert_eq!(screen.line_text(0), "editor");

        screen.set_private_mode(1049, false);
        assert_eq!(screen.line_text(0), "primary");
    }

    #[test]
    fn test_scroll_at_bottom() {
        let mut screen = Screen::new(3, 10);
        type_line(&mut screen, "one");
        type_line(&mut screen, "two");
        type_line(&mut screen, "three");

        // "one" scrolled off the top
        assert_eq!(screen.line_text(0), "two");
        assert_eq!(screen.line_text(1), "three");
        assert_eq!(screen.cursor().0, 2);
    }

    #[test]
    fn test_linefeed_below_scroll_region_moves_without_scrolling() {
        let mut screen = Screen::new(24, 80);
        screen.set_scroll_region(1, 10);
        for ch in "pinned row".chars() {
            screen.put_char(ch);
        }

        screen.cursor_position(16, 1);
        screen.linefeed();

        // cursor moved down; the region content stayed put
        assert_eq!(screen.cursor().0, 16);
        assert_eq!(screen.line_text(0), "pinned row");

        // at the very bottom of the screen it pins there
        screen.cursor_position(24, 1);
        screen.linefeed();
        assert_eq!(screen.cursor().0, 23);
        assert_eq!(screen.line_text(0), "pinned row");
    }

    #[test]
    fn test_wide_char_occupies_two_cells() {
        let mut screen = Screen::new(24, 80);
        screen.put_char('漢');
        screen.put_char('a');

        assert_eq!(screen.cursor(), (0, 3));
        assert_eq!(screen.current_line(), "漢a");
    }

    #[test]
    fn test_wrap_does_not_capture() {
        let mut screen = Screen::new(24, 4);
        for ch in "abcdef".chars() {
            screen.put_char(ch);
        }

        // The wrapped row moved down but nothing was "completed"
        assert_eq!(screen.last_line(), None);
        assert_eq!(screen.line_text(0), "abcd");
        assert_eq!(screen.line_text(1), "ef");
    }

    #[test]
    fn test_resize_clamps_cursor() {
        let mut screen = Screen::new(24, 80);
        screen.cursor_position(24, 80);
        screen.resize(10, 20);

        let (row, col) = screen.cursor();
        assert!(row < 10 && col < 20);
    }
}
