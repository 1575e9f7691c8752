use std::borrow::Cow;

use tq_protocol::PtyScreenSize;

use crate::barrier::WriteTicket;
use crate::status::SessionStatus;

/// Geometry of a terminal surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminalSize {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub columns: u16,
    pub rows: u16,
}

impl From<TerminalSize> for PtyScreenSize {
    fn from(size: TerminalSize) -> Self {
        PtyScreenSize {
            x: size.pixel_width,
            y: size.pixel_height,
            cols: size.columns,
            rows: size.rows,
        }
    }
}

/// User activity on a surface, forwarded to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Characters typed in one keystroke event.
    Input(String),
    /// The surface's new geometry, pixels included.
    Resize(TerminalSize),
}

/// Something task output can be rendered into.
///
/// Writes carrying a ticket complete when the ticket is dropped; a surface
/// that renders asynchronously holds on to the ticket until the bytes are
/// on screen.
pub trait TerminalSurface: Send {
    fn write(&mut self, bytes: &[u8], ticket: Option<WriteTicket>);

    /// Drop all content and terminal modes.
    fn reset(&mut self);

    /// Clear the visible screen.
    fn clear(&mut self);

    /// Adopt a new geometry. Zero columns or rows are ignored.
    fn resize(&mut self, size: TerminalSize);

    fn size(&self) -> TerminalSize;

    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;

    fn show_status(&mut self, _status: &SessionStatus) {}
}

/// Treat a bare line feed as carriage return plus line feed.
pub fn convert_eol(bytes: &[u8]) -> Cow<'_, [u8]> {
    if !bytes.contains(&b'\n') {
        return Cow::Borrowed(bytes);
    }
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 8);
    for &b in bytes {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
    Cow::Owned(out)
}

const CLEAR_SCREEN: &[u8] = b"\x1b[H\x1b[2J";

/// Headless surface backed by a vt100 screen.
pub struct VtSurface {
    parser: vt100::Parser,
    size: TerminalSize,
    disposed: bool,
    status: Option<SessionStatus>,
}

impl VtSurface {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            parser: vt100::Parser::new(rows, columns, 0),
            size: TerminalSize {
                columns,
                rows,
                ..TerminalSize::default()
            },
            disposed: false,
            status: None,
        }
    }

    /// Pixel dimensions reported in resize frames.
    pub fn with_pixel_size(mut self, width: u32, height: u32) -> Self {
        self.size.pixel_width = width;
        self.size.pixel_height = height;
        self
    }

    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    /// Visible text, rows joined with newlines.
    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }

    pub fn last_status(&self) -> Option<&SessionStatus> {
        self.status.as_ref()
    }
}

impl TerminalSurface for VtSurface {
    fn write(&mut self, bytes: &[u8], ticket: Option<WriteTicket>) {
        if !self.disposed {
            self.parser.process(&convert_eol(bytes));
        }
        drop(ticket);
    }

    fn reset(&mut self) {
        if self.disposed {
            return;
        }
        self.parser = vt100::Parser::new(self.size.rows, self.size.columns, 0);
    }

    fn clear(&mut self) {
        if !self.disposed {
            self.parser.process(CLEAR_SCREEN);
        }
    }

    fn resize(&mut self, size: TerminalSize) {
        if self.disposed || size.columns == 0 || size.rows == 0 {
            return;
        }
        if (size.columns, size.rows) != (self.size.columns, self.size.rows) {
            self.parser.screen_mut().set_size(size.rows, size.columns);
        }
        self.size = size;
    }

    fn size(&self) -> TerminalSize {
        self.size
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn show_status(&mut self, status: &SessionStatus) {
        self.status = Some(status.clone());
    }
}
