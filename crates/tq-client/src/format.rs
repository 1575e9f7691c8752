use std::fmt::Display;
use std::sync::OnceLock;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Local, TimeZone, Utc};
use tq_protocol::Task;

/// Parsed once; every row of `tq list` reuses it.
fn time_format() -> &'static [Item<'static>] {
    static FORMAT: OnceLock<Vec<Item<'static>>> = OnceLock::new();
    FORMAT.get_or_init(|| StrftimeItems::new("%Y-%m-%d %H:%M:%S").collect())
}

/// Local time, or `-` for a missing or zero timestamp.
pub fn format_time(time: Option<&DateTime<Utc>>) -> String {
    format_time_in(time, &Local)
}

fn format_time_in<Tz: TimeZone>(time: Option<&DateTime<Utc>>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    match time {
        // Go-style zero time (year 1) means "never".
        Some(t) if t.year() > 1 => t
            .with_timezone(tz)
            .format_with_items(time_format().iter())
            .to_string(),
        _ => "-".to_string(),
    }
}

/// Wall time between start and finish, if the task has both.
pub fn format_runtime(task: &Task) -> String {
    match (task.started_at, task.finished_at) {
        (Some(start), Some(end)) if start.year() > 1 && end >= start => {
            let secs = (end - start).num_seconds();
            match secs {
                s if s < 60 => format!("{s}s"),
                s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
                s => format!("{}h {}m", s / 3600, (s % 3600) / 60),
            }
        }
        _ => "-".to_string(),
    }
}

/// Cut `text` to `width` characters, marking the cut with `~`.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('~');
    out
}
