//! Session overview grid
//!
//! Full-screen view with one tile per session: status dot, title, pinned
//! prompt, and a few preview rows from the tracker. The layout picks the
//! row/column split that wastes the fewest tile slots while keeping every
//! tile at least [`MIN_TILE_COLS`] x [`MIN_TILE_ROWS`]; sessions beyond one
//! screen paginate.

use std::io::{self, Write};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use unicode_width::UnicodeWidthChar;

use crate::core::session::SessionId;

const MIN_TILE_COLS: u16 = 26;
const MIN_TILE_ROWS: u16 = 6;
/// Top row is the header.
const HEADER_ROWS: u16 = 1;

/// Everything a tile displays, snapshotted from a session.
pub struct Tile {
    pub id: SessionId,
    pub name: String,
    pub title: String,
    pub pinned: Option<String>,
    pub alive: bool,
    pub exit_code: Option<u32>,
    /// Bottom rows of the tracker grid, most recent last.
    pub preview: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub grid_rows: u16,
    pub grid_cols: u16,
    pub tile_rows: u16,
    pub tile_cols: u16,
}

impl GridLayout {
    pub fn per_page(&self) -> usize {
        self.grid_rows as usize * self.grid_cols as usize
    }

    /// Rows of guest preview a tile can show after its two header lines.
    pub fn preview_rows(&self) -> usize {
        self.tile_rows.saturating_sub(3) as usize
    }
}

/// Pick the grid shape for `count` tiles on a `rows` x `cols` terminal.
///
/// Among all shapes whose tiles meet the minimum size, the one with the
/// fewest empty slots wins; ties go to the wider tile. When even a 1x1
/// grid cannot fit everything, the largest feasible grid is returned and
/// the caller paginates.
pub fn layout(rows: u16, cols: u16, count: usize) -> GridLayout {
    let usable_rows = rows.saturating_sub(HEADER_ROWS).max(MIN_TILE_ROWS);
    let cols = cols.max(MIN_TILE_COLS);
    let max_grid_cols = (cols / MIN_TILE_COLS).max(1);
    let max_grid_rows = (usable_rows / MIN_TILE_ROWS).max(1);
    let count = count.max(1);

    let mut best: Option<GridLayout> = None;
    for grid_cols in 1..=max_grid_cols {
        let needed_rows = count.div_ceil(grid_cols as usize) as u16;
        let grid_rows = needed_rows.min(max_grid_rows);
        let candidate = GridLayout {
            grid_rows,
            grid_cols,
            tile_rows: usable_rows / grid_rows,
            tile_cols: cols / grid_cols,
        };
        let fits_all = candidate.per_page() >= count;
        let waste = candidate.per_page().saturating_sub(count);

        let better = match best {
            None => true,
            Some(b) => {
                let best_fits = b.per_page() >= count;
                match (fits_all, best_fits) {
                    (true, false) => true,
                    (false, true) => false,
                    // both fit: fewer empty slots, then wider tiles
                    (true, true) => {
                        let best_waste = b.per_page() - count;
                        waste < best_waste
                            || (waste == best_waste && candidate.tile_cols > b.tile_cols)
                    }
                    // neither fits: maximize capacity per page
                    (false, false) => candidate.per_page() > b.per_page(),
                }
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best.unwrap_or(GridLayout {
        grid_rows: 1,
        grid_cols: 1,
        tile_rows: usable_rows,
        tile_cols: cols,
    })
}

pub fn page_count(count: usize, layout: &GridLayout) -> usize {
    count.div_ceil(layout.per_page()).max(1)
}

/// Draw one page of the overview. `selected` highlights the tile focus
/// will jump to on Enter.
pub fn render(
    w: &mut impl Write,
    tiles: &[Tile],
    rows: u16,
    cols: u16,
    page: usize,
    selected: Option<SessionId>,
) -> io::Result<()> {
    let layout = layout(rows, cols, tiles.len());
    let pages = page_count(tiles.len(), &layout);
    let page = page.min(pages - 1);

    queue!(w, Clear(ClearType::All), MoveTo(0, 0))?;
    queue!(
        w,
        SetBackgroundColor(Color::DarkGrey),
        SetForegroundColor(Color::White),
    )?;
    let header = if pages > 1 {
        format!(
            " pinmux  {} sessions  page {}/{}  (1-9 jump, Enter focus, o back)",
            tiles.len(),
            page + 1,
            pages
        )
    } else {
        format!(
            " pinmux  {} sessions  (1-9 jump, Enter focus, o back)",
            tiles.len()
        )
    };
    write!(w, "{}", truncate_to_width(&header, cols as usize))?;
    write!(w, "\x1b[K")?;
    queue!(w, ResetColor)?;

    let start = page * layout.per_page();
    for (slot, tile) in tiles.iter().skip(start).take(layout.per_page()).enumerate() {
        let grid_row = (slot / layout.grid_cols as usize) as u16;
        let grid_col = (slot % layout.grid_cols as usize) as u16;
        let top = HEADER_ROWS + grid_row * layout.tile_rows;
        let left = grid_col * layout.tile_cols;
        let display_index = start + slot + 1;
        draw_tile(
            w,
            tile,
            display_index,
            top,
            left,
            &layout,
            selected == Some(tile.id),
        )?;
    }

    queue!(w, ResetColor, SetAttribute(Attribute::Reset))?;
    w.flush()
}

fn draw_tile(
    w: &mut impl Write,
    tile: &Tile,
    display_index: usize,
    top: u16,
    left: u16,
    layout: &GridLayout,
    selected: bool,
) -> io::Result<()> {
    let inner = layout.tile_cols.saturating_sub(2) as usize;

    // Title line: index, status dot, name, window title
    queue!(w, MoveTo(left, top))?;
    if selected {
        queue!(
            w,
            SetBackgroundColor(Color::Blue),
            SetForegroundColor(Color::White),
        )?;
    } else {
        queue!(w, SetAttribute(Attribute::Bold))?;
    }
    write!(w, " [{}] ", display_index)?;
    if tile.alive {
        queue!(w, SetForegroundColor(Color::Green))?;
        write!(w, "\u{25cf}")?;
    } else {
        queue!(w, SetForegroundColor(Color::Red))?;
        write!(w, "\u{25cf}")?;
    }
    if selected {
        queue!(w, SetForegroundColor(Color::White))?;
    } else {
        queue!(w, ResetColor, SetAttribute(Attribute::Bold))?;
    }
    let mut label = format!(" {}", tile.name);
    if !tile.title.is_empty() {
        label.push_str(&format!("  {}", tile.title));
    }
    if let Some(code) = tile.exit_code {
        label.push_str(&format!("  exit {}", code));
    }
    write!(
        w,
        "{}",
        truncate_to_width(&label, inner.saturating_sub(7 + decimal_width(display_index)))
    )?;
    queue!(w, ResetColor, SetAttribute(Attribute::Reset))?;

    // Pin line
    queue!(w, MoveTo(left, top + 1), SetForegroundColor(Color::Cyan))?;
    if let Some(pinned) = &tile.pinned {
        write!(
            w,
            " \u{2192} {}",
            truncate_to_width(pinned, inner.saturating_sub(3))
        )?;
    }
    queue!(w, ResetColor)?;

    // Preview rows
    queue!(w, SetForegroundColor(Color::DarkGrey))?;
    let preview_rows = layout.preview_rows();
    let skip = tile.preview.len().saturating_sub(preview_rows);
    for (i, line) in tile.preview.iter().skip(skip).enumerate() {
        queue!(w, MoveTo(left, top + 2 + i as u16))?;
        write!(w, " {}", truncate_to_width(line, inner))?;
    }
    queue!(w, ResetColor)
}

fn decimal_width(n: usize) -> usize {
    n.to_string().len()
}

fn truncate_to_width(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out
}
