use std::io::{self, Write};

use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::{
    cursor, execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use tq_session::TerminalSize;

/// Whole-terminal geometry right now. Falls back to 80x24 without a tty.
pub fn current_size() -> TerminalSize {
    let (columns, rows) = terminal::size().unwrap_or((80, 24));
    window_size(columns, rows)
}

/// `columns` x `rows` plus the window's pixel size, zero when the
/// terminal does not report it.
pub fn window_size(columns: u16, rows: u16) -> TerminalSize {
    let (pixel_width, pixel_height) = terminal::window_size()
        .map(|w| (u32::from(w.width), u32::from(w.height)))
        .unwrap_or((0, 0));
    TerminalSize {
        pixel_width,
        pixel_height,
        columns,
        rows,
    }
}

/// Puts the terminal in raw mode on the alternate screen while it lives.
/// Dropping it (including during a panic unwind) restores the terminal.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn setup() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        let guard = Self { _private: () };
        execute!(io::stdout(), EnterAlternateScreen, EnableBracketedPaste, cursor::Hide)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = execute!(stdout, DisableBracketedPaste, cursor::Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
        let _ = stdout.flush();
    }
}
