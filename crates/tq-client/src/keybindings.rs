use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// How long the prefix waits for its command key.
const PREFIX_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Keys go to the task. Ctrl+Space enters `Prefix`.
    Normal,
    /// Next key is a client command.
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Characters for one input frame.
    Forward(String),
    Detach,
    Reconnect,
    Clear,
    ToggleRemap,
    None,
}

/// Prefix-key state machine for `tq attach`.
///
/// `Ctrl+Space d` detaches, `r` reconnects, `k` clears the screen and `n`
/// toggles newline remapping. `Ctrl+Space Ctrl+Space` sends a literal NUL.
pub struct KeyHandler {
    mode: InputMode,
    prefix_at: Option<Instant>,
    read_only: bool,
}

impl KeyHandler {
    pub fn new(read_only: bool) -> Self {
        Self {
            mode: InputMode::Normal,
            prefix_at: None,
            read_only,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Drop back to `Normal` if the prefix expired. Returns true if it did.
    pub fn expire_prefix(&mut self) -> bool {
        match self.prefix_at {
            Some(at) if self.mode == InputMode::Prefix && at.elapsed() >= PREFIX_TIMEOUT => {
                self.mode = InputMode::Normal;
                self.prefix_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        match self.mode {
            InputMode::Normal => self.normal(key),
            InputMode::Prefix => self.prefixed(key),
        }
    }

    fn normal(&mut self, key: KeyEvent) -> Action {
        if is_ctrl_space(&key) {
            self.mode = InputMode::Prefix;
            self.prefix_at = Some(Instant::now());
            return Action::None;
        }
        if key.code == KeyCode::Char('k') && key.modifiers.contains(KeyModifiers::SUPER) {
            return Action::Clear;
        }
        self.forward(&key)
    }

    fn prefixed(&mut self, key: KeyEvent) -> Action {
        self.mode = InputMode::Normal;
        self.prefix_at = None;

        if is_ctrl_space(&key) {
            return if self.read_only {
                Action::None
            } else {
                Action::Forward("\0".to_string())
            };
        }
        match key.code {
            KeyCode::Char('d') => Action::Detach,
            KeyCode::Char('r') => Action::Reconnect,
            KeyCode::Char('k') => Action::Clear,
            KeyCode::Char('n') => Action::ToggleRemap,
            _ => self.forward(&key),
        }
    }

    fn forward(&self, key: &KeyEvent) -> Action {
        if self.read_only {
            return Action::None;
        }
        let chars = key_to_chars(key);
        if chars.is_empty() {
            Action::None
        } else {
            Action::Forward(chars)
        }
    }
}

fn is_ctrl_space(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char(' ') && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Characters an xterm-compatible terminal would send for `key`.
pub fn key_to_chars(key: &KeyEvent) -> String {
    if let KeyCode::Char(c) = key.code {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_lowercase() {
                return char::from(lower as u8 - b'a' + 1).to_string();
            }
            match c {
                '@' | ' ' => return "\0".to_string(),
                '[' => return "\x1b".to_string(),
                '\\' => return "\x1c".to_string(),
                ']' => return "\x1d".to_string(),
                '^' => return "\x1e".to_string(),
                '_' => return "\x1f".to_string(),
                _ => {}
            }
        }
        if key.modifiers.contains(KeyModifiers::ALT) {
            return format!("\x1b{c}");
        }
        return c.to_string();
    }

    let seq = match key.code {
        KeyCode::Enter => "\r",
        KeyCode::Backspace => "\x7f",
        KeyCode::Tab => "\t",
        KeyCode::BackTab => "\x1b[Z",
        KeyCode::Esc => "\x1b",
        KeyCode::Up => "\x1b[A",
        KeyCode::Down => "\x1b[B",
        KeyCode::Right => "\x1b[C",
        KeyCode::Left => "\x1b[D",
        KeyCode::Home => "\x1b[H",
        KeyCode::End => "\x1b[F",
        KeyCode::PageUp => "\x1b[5~",
        KeyCode::PageDown => "\x1b[6~",
        KeyCode::Insert => "\x1b[2~",
        KeyCode::Delete => "\x1b[3~",
        KeyCode::F(n) => function_key(n),
        KeyCode::Null => "\0",
        _ => "",
    };
    seq.to_string()
}

fn function_key(n: u8) -> &'static str {
    match n {
        1 => "\x1bOP",
        2 => "\x1bOQ",
        3 => "\x1bOR",
        4 => "\x1bOS",
        5 => "\x1b[15~",
        6 => "\x1b[17~",
        7 => "\x1b[18~",
        8 => "\x1b[19~",
        9 => "\x1b[20~",
        10 => "\x1b[21~",
        11 => "\x1b[23~",
        12 => "\x1b[24~",
        _ => "",
    }
}
