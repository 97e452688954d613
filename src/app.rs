//! Application loop
//!
//! Owns the registry, the input router, and the real terminal. Runs the
//! passthrough tick for the focused session, the overview grid, and the
//! prefix-key commands. This is the only place that writes to stdout and
//! the only mutator of the registry.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute, queue,
    terminal::{self, Clear, ClearType},
};

use crate::config::Config;
use crate::core::registry::SessionRegistry;
use crate::core::session::{Session, SessionId};
use crate::router::{Action, Command, InputRouter};
use crate::ui::bars;
use crate::ui::keymapper::KeyMapper;
use crate::ui::overview::{self, Tile};

const POLL_TIMEOUT: Duration = Duration::from_millis(10);
const STATUS_LIFETIME: Duration = Duration::from_secs(3);

pub struct App {
    config: Config,
    registry: SessionRegistry,
    router: InputRouter,
    rows: u16,
    cols: u16,
    /// Bottom rows currently reserved for the bars.
    bar_rows: u16,
    overview_open: bool,
    overview_page: usize,
    /// Transient hint-bar message and when it was set.
    status: Option<(String, Instant)>,
    /// Alt-screen state of the focused session at the last tick.
    focused_alt: bool,
    quit: bool,
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let (cols, rows) = terminal::size().context("query terminal size")?;
        Ok(Self {
            config,
            registry: SessionRegistry::new(),
            router: InputRouter::new(),
            rows,
            cols,
            bar_rows: bars::bar_rows(None, cols),
            overview_open: false,
            overview_page: 0,
            status: None,
            focused_alt: false,
            quit: false,
        })
    }

    /// Run until the user quits or the last session exits.
    pub fn run(&mut self, cwd: PathBuf) -> anyhow::Result<()> {
        self.create_session(cwd)
            .context("spawn initial session")?;
        self.enter_passthrough()?;

        while !self.quit {
            if event::poll(POLL_TIMEOUT)? {
                match event::read()? {
                    Event::Key(key_event) => self.handle_key(&key_event)?,
                    Event::Paste(text) => self.handle_paste(&text)?,
                    Event::Resize(cols, rows) => self.on_terminal_resize(rows, cols)?,
                    _ => {}
                }
            }
            self.tick()?;
        }
        Ok(())
    }

    /// Spawn a session running the configured agent command in `cwd` and
    /// focus it.
    pub fn create_session(&mut self, cwd: PathBuf) -> anyhow::Result<SessionId> {
        let (command, args) = self.config.resolve_command();
        let (rows, cols) = self.guest_size();
        let id = self
            .registry
            .create(cwd, &command, &args, rows, cols)
            .with_context(|| format!("spawn {}", command))?;
        Ok(id)
    }

    /// Terminal size handed to guests: everything above the bars.
    fn guest_size(&self) -> (u16, u16) {
        (self.rows.saturating_sub(self.bar_rows).max(1), self.cols)
    }

    fn tick(&mut self) -> anyhow::Result<()> {
        let reaped = self.registry.reap_exited();
        if self.registry.is_empty() {
            self.quit = true;
            return Ok(());
        }
        if !reaped.is_empty() {
            if self.overview_open {
                self.render_overview()?;
            } else {
                // reaping may have moved focus
                self.enter_passthrough()?;
            }
        }

        let focused_id = self.registry.focused_id();
        let mut pumped = false;
        for session in self.registry.iter_mut() {
            if Some(session.id) != focused_id || self.overview_open {
                pumped |= session.pump();
            }
        }

        if self.overview_open {
            // keep tile previews, titles, and status dots live
            if pumped {
                self.render_overview()?;
            }
        } else {
            self.passthrough_tick()?;
        }
        self.expire_status()?;
        Ok(())
    }

    /// Forward pending output of the focused session to the real terminal,
    /// then reconcile bars and scroll region with what the bytes did.
    fn passthrough_tick(&mut self) -> anyhow::Result<()> {
        let pin_before = self.focused_pin();
        let was_alt = self.focused_alt;

        let Some(session) = self.registry.focused_mut() else {
            return Ok(());
        };
        let chunks = session.drain_output();
        if chunks.is_empty() {
            return Ok(());
        }

        let mut stdout = io::stdout();
        for chunk in &chunks {
            stdout.write_all(chunk)?;
            session.feed(chunk);
        }
        stdout.flush()?;

        let is_alt = session.tracker().screen().alt_screen();
        let pin_after = self.focused_pin();

        if is_alt != was_alt {
            self.focused_alt = is_alt;
            let mut stdout = io::stdout();
            if is_alt {
                // full-screen guest: it owns every row
                bars::reset_scroll_region(&mut stdout)?;
            } else {
                self.apply_layout()?;
                return Ok(());
            }
            stdout.flush()?;
        } else if !is_alt && pin_after != pin_before {
            // a new pin can change how many rows the bars need
            self.apply_layout()?;
        } else if !is_alt {
            self.redraw_bars()?;
        }
        Ok(())
    }

    fn focused_pin(&self) -> Option<String> {
        self.registry
            .focused_id()
            .and_then(|id| self.registry.get(id))
            .and_then(|s| s.pinned_prompt().map(str::to_string))
    }

    fn handle_key(&mut self, key_event: &KeyEvent) -> anyhow::Result<()> {
        if key_event.kind == KeyEventKind::Release {
            return Ok(());
        }
        if self.overview_open {
            return self.handle_overview_key(key_event);
        }

        let bytes = KeyMapper::map_key(key_event);
        if bytes.is_empty() {
            return Ok(());
        }

        let was_armed = self.router.prefix_armed();
        match self.router.route(&bytes) {
            Action::Forward(bytes) => self.forward_to_focused(&bytes)?,
            Action::Command(command) => self.execute_command(command)?,
            Action::Ignore => {}
        }
        if self.router.prefix_armed() != was_armed && !self.focused_alt {
            self.redraw_bars()?;
        }
        Ok(())
    }

    fn forward_to_focused(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let Some(session) = self.registry.focused_mut() else {
            return Ok(());
        };
        // Single-character units mirror into the typed-line buffer; longer
        // sequences are keys like arrows that never compose a command.
        if let Ok(text) = std::str::from_utf8(bytes) {
            let mut chars = text.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                session.track_input(c);
            }
        }
        if let Err(err) = session.write_input(bytes) {
            tracing::warn!("write to session failed: {}", err);
        }
        Ok(())
    }

    fn handle_paste(&mut self, text: &str) -> anyhow::Result<()> {
        if self.overview_open {
            return Ok(());
        }
        if let Some(session) = self.registry.focused_mut() {
            if let Err(err) = session.write_input(text.as_bytes()) {
                tracing::warn!("paste to session failed: {}", err);
            }
        }
        Ok(())
    }

    fn execute_command(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::NewSession => {
                let cwd = self
                    .registry
                    .focused_id()
                    .and_then(|id| self.registry.get(id))
                    .map(|s| s.cwd.clone())
                    .or_else(|| std::env::current_dir().ok())
                    .unwrap_or_else(|| PathBuf::from("."));
                match self.create_session(cwd) {
                    Ok(_) => self.enter_passthrough()?,
                    Err(err) => {
                        tracing::warn!("new session failed: {:#}", err);
                        self.set_status(format!("new session failed: {:#}", err))?;
                    }
                }
            }
            Command::DeleteSession => {
                if let Some(id) = self.registry.focused_id() {
                    self.registry.delete(id)?;
                }
                if self.registry.is_empty() {
                    self.quit = true;
                } else {
                    self.enter_passthrough()?;
                }
            }
            Command::Focus(n) => match self.registry.focus_nth(n) {
                Ok(_) => {
                    self.router.reset();
                    self.enter_passthrough()?;
                }
                Err(_) => self.set_status(format!("no session {}", n))?,
            },
            Command::ToggleOverview => {
                self.overview_open = true;
                self.overview_page = 0;
                self.render_overview()?;
            }
            Command::Quit => self.quit = true,
        }
        Ok(())
    }

    fn handle_overview_key(&mut self, key_event: &KeyEvent) -> anyhow::Result<()> {
        match key_event.code {
            KeyCode::Char(d @ '1'..='9') => {
                let n = d as usize - '0' as usize;
                match self.registry.focus_nth(n) {
                    Ok(_) => {
                        self.overview_open = false;
                        self.enter_passthrough()?;
                    }
                    Err(_) => self.render_overview()?,
                }
            }
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char('o') => {
                self.overview_open = false;
                self.enter_passthrough()?;
            }
            KeyCode::Char('n') => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                if let Err(err) = self.create_session(cwd) {
                    tracing::warn!("new session failed: {:#}", err);
                }
                self.render_overview()?;
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.registry.focused_id() {
                    self.registry.delete(id)?;
                }
                if self.registry.is_empty() {
                    self.quit = true;
                } else {
                    self.render_overview()?;
                }
            }
            KeyCode::Left | KeyCode::PageUp => {
                self.overview_page = self.overview_page.saturating_sub(1);
                self.render_overview()?;
            }
            KeyCode::Right | KeyCode::PageDown => {
                self.overview_page += 1;
                self.render_overview()?;
            }
            KeyCode::Char('q') => self.quit = true,
            _ => {}
        }
        Ok(())
    }

    fn render_overview(&mut self) -> anyhow::Result<()> {
        let layout = overview::layout(self.rows, self.cols, self.registry.len().max(1));
        self.overview_page = self
            .overview_page
            .min(overview::page_count(self.registry.len().max(1), &layout) - 1);
        let preview_rows = layout.preview_rows();
        let tiles: Vec<Tile> = self
            .registry
            .iter()
            .map(|session| tile_for(session, preview_rows))
            .collect();
        let mut stdout = io::stdout();
        bars::reset_scroll_region(&mut stdout)?;
        overview::render(
            &mut stdout,
            &tiles,
            self.rows,
            self.cols,
            self.overview_page,
            self.registry.focused_id(),
        )?;
        Ok(())
    }

    /// Repaint the focused session from its tracker and re-establish the
    /// scroll region and bars. Used whenever passthrough (re)starts: focus
    /// switches, overview exit, layout changes.
    fn enter_passthrough(&mut self) -> anyhow::Result<()> {
        self.router.reset();
        self.apply_layout()
    }

    fn apply_layout(&mut self) -> anyhow::Result<()> {
        self.bar_rows = bars::bar_rows(self.focused_pin().as_deref(), self.cols);
        let (guest_rows, guest_cols) = self.guest_size();

        let Some(session) = self.registry.focused_mut() else {
            return Ok(());
        };
        if session.tracker().screen().rows() != guest_rows
            || session.tracker().screen().cols() != guest_cols
        {
            if let Err(err) = session.resize(guest_rows, guest_cols) {
                tracing::warn!("resize session failed: {}", err);
            }
        }
        self.focused_alt = session.tracker().screen().alt_screen();

        let mut stdout = io::stdout();
        queue!(stdout, Clear(ClearType::All))?;
        if self.focused_alt {
            bars::reset_scroll_region(&mut stdout)?;
        } else {
            bars::set_scroll_region(&mut stdout, 1, guest_rows)?;
        }
        self.restore_screen(&mut stdout)?;
        if !self.focused_alt {
            self.redraw_bars_to(&mut stdout)?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Paint the guest area from the tracker grid and park the cursor where
    /// the guest left it.
    fn restore_screen(&mut self, stdout: &mut impl Write) -> anyhow::Result<()> {
        let Some(session) = self.registry.focused_mut() else {
            return Ok(());
        };
        let screen = session.tracker().screen();
        for row in 0..screen.rows() {
            queue!(stdout, MoveTo(0, row))?;
            write!(stdout, "{}", screen.line_text(row))?;
            write!(stdout, "\x1b[K")?;
        }
        let (row, col) = screen.cursor();
        queue!(stdout, MoveTo(col, row))?;
        Ok(())
    }

    fn redraw_bars(&mut self) -> anyhow::Result<()> {
        let mut stdout = io::stdout();
        self.redraw_bars_to(&mut stdout)?;
        stdout.flush()?;
        Ok(())
    }

    fn redraw_bars_to(&mut self, stdout: &mut impl Write) -> anyhow::Result<()> {
        let pinned = self.focused_pin();
        let status = self.status.as_ref().map(|(msg, _)| msg.clone());
        let title = self
            .registry
            .focused_id()
            .and_then(|id| self.registry.get(id))
            .map(|s| s.window_title().to_string())
            .unwrap_or_default();
        bars::save_cursor(stdout)?;
        bars::render_bars(
            stdout,
            self.rows,
            self.cols,
            pinned.as_deref(),
            self.router.prefix_armed(),
            status.as_deref(),
            &title,
        )?;
        bars::restore_cursor(stdout)?;
        Ok(())
    }

    fn set_status(&mut self, message: String) -> anyhow::Result<()> {
        self.status = Some((message, Instant::now()));
        if !self.overview_open && !self.focused_alt {
            self.redraw_bars()?;
        }
        Ok(())
    }

    fn expire_status(&mut self) -> anyhow::Result<()> {
        if let Some((_, since)) = &self.status {
            if since.elapsed() > STATUS_LIFETIME {
                self.status = None;
                if !self.overview_open && !self.focused_alt {
                    self.redraw_bars()?;
                }
            }
        }
        Ok(())
    }

    pub fn on_terminal_resize(&mut self, rows: u16, cols: u16) -> anyhow::Result<()> {
        self.rows = rows;
        self.cols = cols;
        if self.overview_open {
            self.render_overview()
        } else {
            self.enter_passthrough()
        }
    }
}

fn tile_for(session: &Session, preview_rows: usize) -> Tile {
    let screen = session.tracker().screen();
    let first = screen.rows().saturating_sub(preview_rows as u16);
    let preview = (first..screen.rows())
        .map(|row| screen.line_text(row))
        .collect();
    Tile {
        id: session.id,
        name: session.name.clone(),
        title: session.window_title().to_string(),
        pinned: session.pinned_prompt().map(str::to_string),
        alive: session.alive(),
        exit_code: session.exit_code(),
        preview,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    #[cfg(unix)]
    fn test_pumped_output_reaches_overview_tiles() {
        let cwd = std::env::current_dir().unwrap();
        let mut session = Session::spawn(
            1,
            cwd,
            "echo",
            &["fresh output".to_string()],
            24,
            80,
        )
        .expect("spawn echo");

        // A quiet session reports nothing to repaint
        let before = tile_for(&session, 24);
        assert!(!before.preview.iter().any(|l| l.contains("fresh output")));

        let start = Instant::now();
        let mut saw_output = false;
        loop {
            saw_output |= session.pump();
            session.check_exit();
            if !session.alive() {
                saw_output |= session.pump();
                break;
            }
            assert!(start.elapsed() < Duration::from_secs(10));
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(saw_output, "pump never reported child output");

        // The next overview render picks the new content up
        let tile = tile_for(&session, 24);
        assert!(tile.preview.iter().any(|l| l.contains("fresh output")));

        let mut buf = Vec::new();
        overview::render(&mut buf, &[tile], 24, 80, 0, Some(1)).unwrap();
        assert!(String::from_utf8_lossy(&buf).contains("fresh output"));
    }
}

/// Put the real terminal back the way we found it.
pub fn restore_terminal() {
    let mut stdout = io::stdout();
    let _ = bars::reset_scroll_region(&mut stdout);
    let _ = execute!(
        stdout,
        Clear(ClearType::All),
        MoveTo(0, 0),
        crossterm::cursor::Show
    );
    let _ = terminal::disable_raw_mode();
}
