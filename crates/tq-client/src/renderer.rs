use std::io::Write;

use crossterm::style::Attribute;
use crossterm::{cursor, queue, style, terminal};

/// Attributes last emitted to the real terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pen {
    fg: vt100::Color,
    bg: vt100::Color,
    bold: bool,
    dim: bool,
    italic: bool,
    underline: bool,
    inverse: bool,
}

impl Pen {
    const RESET: Pen = Pen {
        fg: vt100::Color::Default,
        bg: vt100::Color::Default,
        bold: false,
        dim: false,
        italic: false,
        underline: false,
        inverse: false,
    };

    fn of(cell: &vt100::Cell) -> Self {
        Self {
            fg: cell.fgcolor(),
            bg: cell.bgcolor(),
            bold: cell.bold(),
            dim: cell.dim(),
            italic: cell.italic(),
            underline: cell.underline(),
            inverse: cell.inverse(),
        }
    }

    /// Emit the SGR changes that turn `self` into `next`.
    fn switch_to(&mut self, out: &mut impl Write, next: Pen) -> std::io::Result<()> {
        if *self == next {
            return Ok(());
        }
        if next.fg != self.fg {
            queue!(out, style::SetForegroundColor(convert_color(next.fg)))?;
        }
        if next.bg != self.bg {
            queue!(out, style::SetBackgroundColor(convert_color(next.bg)))?;
        }
        // SGR 22 clears bold and dim together.
        if (next.bold, next.dim) != (self.bold, self.dim) {
            if (self.bold && !next.bold) || (self.dim && !next.dim) {
                queue!(out, style::SetAttribute(Attribute::NormalIntensity))?;
            }
            if next.bold {
                queue!(out, style::SetAttribute(Attribute::Bold))?;
            }
            if next.dim {
                queue!(out, style::SetAttribute(Attribute::Dim))?;
            }
        }
        if next.italic != self.italic {
            let attr = if next.italic { Attribute::Italic } else { Attribute::NoItalic };
            queue!(out, style::SetAttribute(attr))?;
        }
        if next.underline != self.underline {
            let attr = if next.underline {
                Attribute::Underlined
            } else {
                Attribute::NoUnderline
            };
            queue!(out, style::SetAttribute(attr))?;
        }
        if next.inverse != self.inverse {
            let attr = if next.inverse { Attribute::Reverse } else { Attribute::NoReverse };
            queue!(out, style::SetAttribute(attr))?;
        }
        *self = next;
        Ok(())
    }
}

/// Paint `rows` rows of `screen` starting at terminal row `top`.
pub fn render_full(
    out: &mut impl Write,
    screen: &vt100::Screen,
    top: u16,
    rows: u16,
) -> anyhow::Result<()> {
    let (screen_rows, cols) = screen.size();
    for row in 0..rows.min(screen_rows) {
        queue!(out, cursor::MoveTo(0, top + row), style::SetAttribute(Attribute::Reset))?;
        let mut pen = Pen::RESET;
        for col in 0..cols {
            match screen.cell(row, col) {
                Some(cell) if cell.is_wide_continuation() => {}
                Some(cell) => {
                    pen.switch_to(out, Pen::of(cell))?;
                    let contents = cell.contents();
                    if contents.is_empty() {
                        queue!(out, style::Print(' '))?;
                    } else {
                        queue!(out, style::Print(contents))?;
                    }
                }
                None => queue!(out, style::Print(' '))?,
            }
        }
    }
    queue!(out, style::SetAttribute(Attribute::Reset))?;
    Ok(())
}

/// Write the escape sequences that turn `prev` into `current`.
///
/// Only valid when the screen is painted at the terminal origin.
pub fn render_diff(
    out: &mut impl Write,
    prev: &vt100::Screen,
    current: &vt100::Screen,
) -> anyhow::Result<()> {
    out.write_all(&current.contents_diff(prev))?;
    Ok(())
}

pub fn render_cursor(out: &mut impl Write, screen: &vt100::Screen, top: u16) -> anyhow::Result<()> {
    if screen.hide_cursor() {
        queue!(out, cursor::Hide)?;
    } else {
        let (row, col) = screen.cursor_position();
        queue!(out, cursor::MoveTo(col, top + row), cursor::Show)?;
    }
    Ok(())
}

pub fn clear_screen(out: &mut impl Write) -> anyhow::Result<()> {
    queue!(out, terminal::Clear(terminal::ClearType::All), cursor::MoveTo(0, 0))?;
    Ok(())
}

pub(crate) fn convert_color(color: vt100::Color) -> style::Color {
    match color {
        vt100::Color::Default => style::Color::Reset,
        vt100::Color::Idx(idx) => match idx {
            0 => style::Color::Black,
            1 => style::Color::DarkRed,
            2 => style::Color::DarkGreen,
            3 => style::Color::DarkYellow,
            4 => style::Color::DarkBlue,
            5 => style::Color::DarkMagenta,
            6 => style::Color::DarkCyan,
            7 => style::Color::Grey,
            8 => style::Color::DarkGrey,
            9 => style::Color::Red,
            10 => style::Color::Green,
            11 => style::Color::Yellow,
            12 => style::Color::Blue,
            13 => style::Color::Magenta,
            14 => style::Color::Cyan,
            15 => style::Color::White,
            n => style::Color::AnsiValue(n),
        },
        vt100::Color::Rgb(r, g, b) => style::Color::Rgb { r, g, b },
    }
}
