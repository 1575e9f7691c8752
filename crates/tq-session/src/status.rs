use std::fmt;

use tq_protocol::{TaskId, TaskState};

use crate::state::ConnectionState;

/// What the status line of a task view shows. Published on a watch channel
/// and pushed to the surface whenever it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub task_id: TaskId,
    pub state: ConnectionState,
    pub task_state: TaskState,
    pub remap_newline: bool,
    pub replaying_history: bool,
}

/// Overlay message for a session that is not streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBanner {
    Connecting,
    /// Socket dropped while the task was still running. Reconnect is offered.
    ConnectionLost,
    /// Socket closed and the task is not running any more.
    Closed(TaskState),
}

impl SessionStatus {
    pub fn banner(&self) -> Option<StatusBanner> {
        match self.state {
            ConnectionState::Connecting => Some(StatusBanner::Connecting),
            ConnectionState::Closed | ConnectionState::Errored => {
                if self.task_state.is_running() {
                    Some(StatusBanner::ConnectionLost)
                } else {
                    Some(StatusBanner::Closed(self.task_state))
                }
            }
            _ => None,
        }
    }

    pub fn can_reconnect(&self) -> bool {
        self.state.is_down()
    }
}

impl StatusBanner {
    /// Whether the banner should advertise the reconnect key.
    pub fn offers_reconnect(self) -> bool {
        self == StatusBanner::ConnectionLost
    }
}

impl fmt::Display for StatusBanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusBanner::Connecting => f.write_str("connecting..."),
            StatusBanner::ConnectionLost => f.write_str("connection lost"),
            StatusBanner::Closed(state) => write!(f, "task {}", state.as_str().to_lowercase()),
        }
    }
}
