use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossterm::{cursor, queue};
use tq_session::{SessionStatus, TerminalSize, TerminalSurface, WriteTicket, convert_eol};

use crate::keybindings::InputMode;
use crate::renderer;
use crate::status_bar::{StatusLine, render_status_bar};

const CLEAR_SCREEN: &[u8] = b"\x1b[H\x1b[2J";

struct Screen<W> {
    out: W,
    parser: vt100::Parser,
    /// Content area; the status bar sits on the row below it.
    size: TerminalSize,
    title: String,
    read_only: bool,
    input_mode: InputMode,
    status: Option<SessionStatus>,
    disposed: bool,
}

impl<W: Write> Screen<W> {
    fn paint_full(&mut self) -> anyhow::Result<()> {
        renderer::clear_screen(&mut self.out)?;
        renderer::render_full(&mut self.out, self.parser.screen(), 0, self.size.rows)?;
        self.finish_paint()
    }

    fn process(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let before = self.parser.screen().clone();
        self.parser.process(bytes);
        let (row, col) = before.cursor_position();
        queue!(self.out, cursor::MoveTo(col, row))?;
        renderer::render_diff(&mut self.out, &before, self.parser.screen())?;
        self.finish_paint()
    }

    fn finish_paint(&mut self) -> anyhow::Result<()> {
        let line = StatusLine {
            title: &self.title,
            status: self.status.as_ref(),
            read_only: self.read_only,
            input_mode: self.input_mode,
        };
        render_status_bar(&mut self.out, self.size.rows, self.size.columns, &line)?;
        renderer::render_cursor(&mut self.out, self.parser.screen(), 0)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Task output area of a terminal of `window` size: one row less for the
/// status bar, pixel height scaled to match.
pub fn content_size(window: TerminalSize) -> TerminalSize {
    let rows = window.rows.saturating_sub(1).max(1);
    let pixel_height = match window.rows {
        0 => window.pixel_height,
        total => {
            let scaled = u64::from(window.pixel_height) * u64::from(rows) / u64::from(total);
            u32::try_from(scaled).unwrap_or(window.pixel_height)
        }
    };
    TerminalSize {
        pixel_height,
        rows,
        ..window
    }
}

/// Full-screen surface for `tq attach`: task output above, status bar on
/// the last row. Clones share the same screen.
pub struct TuiSurface<W> {
    screen: Arc<Mutex<Screen<W>>>,
}

impl<W> Clone for TuiSurface<W> {
    fn clone(&self) -> Self {
        Self {
            screen: Arc::clone(&self.screen),
        }
    }
}

impl<W: Write + Send> TuiSurface<W> {
    /// `window` is the whole terminal; see [`content_size`].
    pub fn new(out: W, window: TerminalSize, title: impl Into<String>, read_only: bool) -> Self {
        let content = content_size(window);
        Self {
            screen: Arc::new(Mutex::new(Screen {
                out,
                parser: vt100::Parser::new(content.rows, content.columns, 0),
                size: content,
                title: title.into(),
                read_only,
                input_mode: InputMode::Normal,
                status: None,
                disposed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Screen<W>> {
        self.screen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn paint(&self, f: impl FnOnce(&mut Screen<W>) -> anyhow::Result<()>) {
        let mut screen = self.lock();
        if screen.disposed {
            return;
        }
        if let Err(e) = f(&mut *screen) {
            tracing::warn!(error = %e, "terminal render failed");
        }
    }

    /// Draw everything from scratch.
    pub fn redraw(&self) {
        self.paint(Screen::paint_full);
    }

    pub fn set_input_mode(&self, mode: InputMode) {
        self.paint(|screen| {
            if screen.input_mode == mode {
                return Ok(());
            }
            screen.input_mode = mode;
            screen.finish_paint()
        });
    }

    /// Visible task output, rows joined with newlines.
    #[cfg(test)]
    pub fn contents(&self) -> String {
        self.lock().parser.screen().contents()
    }
}

impl<W: Write + Send> TerminalSurface for TuiSurface<W> {
    fn write(&mut self, bytes: &[u8], ticket: Option<WriteTicket>) {
        self.paint(|screen| screen.process(&convert_eol(bytes)));
        drop(ticket);
    }

    fn reset(&mut self) {
        self.paint(|screen| {
            screen.parser = vt100::Parser::new(screen.size.rows, screen.size.columns, 0);
            screen.paint_full()
        });
    }

    fn clear(&mut self) {
        self.paint(|screen| screen.process(CLEAR_SCREEN));
    }

    /// `size` is the content area, already without the status bar row.
    fn resize(&mut self, size: TerminalSize) {
        if size.columns == 0 || size.rows == 0 {
            return;
        }
        self.paint(|screen| {
            screen.size = size;
            screen.parser.screen_mut().set_size(size.rows, size.columns);
            screen.paint_full()
        });
    }

    fn size(&self) -> TerminalSize {
        self.lock().size
    }

    fn dispose(&mut self) {
        self.lock().disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    fn show_status(&mut self, status: &SessionStatus) {
        self.paint(|screen| {
            screen.status = Some(status.clone());
            screen.finish_paint()
        });
    }
}
