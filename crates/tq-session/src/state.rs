use std::fmt;

/// Socket lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Errored,
    Disposed,
}

/// Inputs that move a session between [`ConnectionState`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Connect,
    Opened,
    Closed,
    Failed,
    Reconnect,
    Dispose,
}

impl ConnectionState {
    /// Next state for `transition`, or `None` if the move is not allowed.
    pub fn on(self, transition: Transition) -> Option<ConnectionState> {
        use ConnectionState as S;
        use Transition as T;

        match (self, transition) {
            (S::Idle, T::Connect) => Some(S::Connecting),
            (S::Connecting, T::Opened) => Some(S::Open),
            (S::Connecting | S::Open, T::Closed) => Some(S::Closed),
            (S::Connecting | S::Open, T::Failed) => Some(S::Errored),
            (S::Closed | S::Errored, T::Reconnect) => Some(S::Connecting),
            (S::Disposed, T::Dispose) => None,
            (_, T::Dispose) => Some(S::Disposed),
            _ => None,
        }
    }

    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    /// Closed or errored: the socket is gone but the view is still alive.
    pub fn is_down(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Errored => "errored",
            ConnectionState::Disposed => "disposed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Connect => "connect",
            Transition::Opened => "opened",
            Transition::Closed => "closed",
            Transition::Failed => "failed",
            Transition::Reconnect => "reconnect",
            Transition::Dispose => "dispose",
        };
        f.write_str(name)
    }
}
