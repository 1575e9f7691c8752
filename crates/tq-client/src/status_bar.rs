use std::io::Write;

use crossterm::style::Attribute;
use crossterm::{cursor, queue, style};
use tq_session::SessionStatus;

use crate::keybindings::InputMode;

/// What the bottom line of `tq attach` is built from.
#[derive(Debug, Clone, Copy)]
pub struct StatusLine<'a> {
    pub title: &'a str,
    pub status: Option<&'a SessionStatus>,
    pub read_only: bool,
    pub input_mode: InputMode,
}

impl StatusLine<'_> {
    pub fn text(&self) -> String {
        let short_id = |id: &str| id.chars().take(8).collect::<String>();
        let mut parts = Vec::new();

        match self.status {
            Some(status) => {
                parts.push(format!(" {}", short_id(&status.task_id)));
                parts.push(self.title.to_string());
                parts.push(format!("[{}]", status.task_state));
                match status.banner() {
                    Some(banner) if banner.offers_reconnect() => {
                        parts.push(format!("{banner} (C-Space r to reconnect)"));
                    }
                    Some(banner) => parts.push(banner.to_string()),
                    None if status.replaying_history => parts.push("loading history".to_string()),
                    None => {}
                }
                if status.remap_newline {
                    parts.push("[CRLF]".to_string());
                }
            }
            None => parts.push(format!(" {}", self.title)),
        }
        if self.read_only {
            parts.push("[VIEW]".to_string());
        }
        if self.input_mode == InputMode::Prefix {
            parts.push("[PREFIX]".to_string());
        }
        parts.join("  ")
    }
}

/// Paint `line` in reverse video across the whole of `row`.
pub fn render_status_bar(
    out: &mut impl Write,
    row: u16,
    cols: u16,
    line: &StatusLine<'_>,
) -> anyhow::Result<()> {
    let width = cols as usize;
    let text: String = line.text().chars().take(width).collect();
    queue!(
        out,
        cursor::MoveTo(0, row),
        style::SetAttribute(Attribute::Reset),
        style::SetAttribute(Attribute::Reverse),
        style::Print(format!("{text:<width$}")),
        style::SetAttribute(Attribute::Reset),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tq_protocol::TaskState;
    use tq_session::ConnectionState;

    fn status(state: ConnectionState, task_state: TaskState) -> SessionStatus {
        SessionStatus {
            task_id: "0f3c9a1e-77aa-4bd0".to_string(),
            state,
            task_state,
            remap_newline: false,
            replaying_history: false,
        }
    }

    fn line<'a>(status: Option<&'a SessionStatus>) -> StatusLine<'a> {
        StatusLine {
            title: "make test",
            status,
            read_only: false,
            input_mode: InputMode::Normal,
        }
    }

    #[test]
    fn streaming_task() {
        let s = status(ConnectionState::Open, TaskState::Started);
        let text = line(Some(&s)).text();
        assert!(text.starts_with(" 0f3c9a1e  make test  [STARTED]"), "{text}");
        assert!(!text.contains("reconnect"));
    }

    #[test]
    fn lost_connection_offers_reconnect() {
        let s = status(ConnectionState::Errored, TaskState::Started);
        assert!(line(Some(&s)).text().contains("connection lost (C-Space r to reconnect)"));
    }

    #[test]
    fn finished_task_does_not_offer_reconnect() {
        let s = status(ConnectionState::Closed, TaskState::Finished);
        let text = line(Some(&s)).text();
        assert!(text.contains("task finished"));
        assert!(!text.contains("reconnect"));
    }

    #[test]
    fn flags() {
        let mut s = status(ConnectionState::Open, TaskState::Started);
        s.remap_newline = true;
        s.replaying_history = true;
        let text = StatusLine {
            read_only: true,
            input_mode: InputMode::Prefix,
            ..line(Some(&s))
        }
        .text();
        assert!(text.contains("loading history"));
        assert!(text.contains("[CRLF]"));
        assert!(text.contains("[VIEW]"));
        assert!(text.contains("[PREFIX]"));
    }

    #[test]
    fn before_first_status() {
        assert_eq!(line(None).text(), " make test");
    }

    #[test]
    fn bar_is_padded_and_truncated() {
        let mut buf = Vec::new();
        render_status_bar(&mut buf, 4, 20, &line(None)).unwrap();
        let out = String::from_utf8_lossy(&buf);
        assert!(out.contains("\x1b[5;1H"));
        assert!(out.contains(" make test          "));

        let mut buf = Vec::new();
        render_status_bar(&mut buf, 0, 5, &line(None)).unwrap();
        let out = String::from_utf8_lossy(&buf);
        assert!(out.contains(" make"));
        assert!(!out.contains("test"));
    }
}
