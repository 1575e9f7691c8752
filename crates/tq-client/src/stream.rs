use std::io::Write;

use tq_session::{TerminalSize, TerminalSurface, WriteTicket};

/// Surface that passes task output straight through to a writer. Used by
/// `tq tail`, where the output may be piped to a file.
pub struct RawSurface<W> {
    out: W,
    size: TerminalSize,
    disposed: bool,
}

impl<W: Write + Send> RawSurface<W> {
    pub fn new(out: W, size: TerminalSize) -> Self {
        Self {
            out,
            size,
            disposed: false,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TerminalSurface for RawSurface<W> {
    fn write(&mut self, bytes: &[u8], ticket: Option<WriteTicket>) {
        if self.disposed {
            return;
        }
        if let Err(e) = self.out.write_all(bytes).and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "failed to write task output");
        }
        drop(ticket);
    }

    // Bytes already written cannot be taken back.
    fn reset(&mut self) {}

    fn clear(&mut self) {}

    fn resize(&mut self, size: TerminalSize) {
        if size.columns > 0 && size.rows > 0 {
            self.size = size;
        }
    }

    fn size(&self) -> TerminalSize {
        self.size
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            let _ = self.out.flush();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_bytes_through_untouched() {
        let mut surface = RawSurface::new(Vec::new(), TerminalSize::default());
        surface.write(b"a\nb\x1b[31m", None);
        surface.clear();
        surface.write(b"c", None);
        surface.dispose();
        surface.write(b"dropped", None);
        assert_eq!(surface.into_inner(), b"a\nb\x1b[31mc");
    }
}
