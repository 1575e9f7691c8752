use std::io::Write;

use crossterm::event::{Event, EventStream, KeyEventKind};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::{self, Duration};
use tq_api::ApiClient;
use tq_session::{
    ConnectionState, SessionCommand, SessionHandle, SessionStatus, SurfaceEvent, TaskSnapshot,
};

use crate::keybindings::{Action, KeyHandler};
use crate::terminal;
use crate::tui::{TuiSurface, content_size};

/// What the key loop should do after an action.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Detach,
}

/// Turn one key-handler action into session traffic.
pub async fn apply_action(
    handle: &SessionHandle,
    status: &watch::Receiver<SessionStatus>,
    action: Action,
) -> anyhow::Result<Flow> {
    match action {
        Action::Forward(chars) => handle.surface_event(SurfaceEvent::Input(chars)).await?,
        Action::Detach => return Ok(Flow::Detach),
        Action::Reconnect => {
            if status.borrow().can_reconnect() {
                handle.command(SessionCommand::Reconnect).await?;
            }
        }
        Action::Clear => handle.command(SessionCommand::ClearSurface).await?,
        Action::ToggleRemap => {
            let remap = !status.borrow().remap_newline;
            handle.command(SessionCommand::SetRemapNewline(remap)).await?;
        }
        Action::None => {}
    }
    Ok(Flow::Continue)
}

/// Tracks when the socket went down under a running task, so the task is
/// refetched once per lost connection.
#[derive(Debug, Default)]
pub struct RefreshGate {
    armed: bool,
}

impl RefreshGate {
    /// Returns true when `status` calls for a refetch.
    pub fn observe(&mut self, status: &SessionStatus) -> bool {
        match status.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.armed = true;
                false
            }
            ConnectionState::Closed | ConnectionState::Errored
                if self.armed && status.task_state.is_running() =>
            {
                self.armed = false;
                true
            }
            _ => false,
        }
    }
}

/// Refetch the task and hand the result to the session.
pub async fn refresh_task(api: &ApiClient, handle: &SessionHandle, id: &str) {
    match api.task(id).await {
        Ok(task) => {
            tracing::debug!(task_id = id, state = %task.state, "task refreshed");
            let _ = handle
                .command(SessionCommand::TaskUpdated(TaskSnapshot::from(&task)))
                .await;
        }
        Err(e) => tracing::warn!(task_id = id, error = %e, "failed to refresh task"),
    }
}

/// Keyboard and resize events for an attached session.
///
/// Returns on detach, when the terminal stops producing events, or when the
/// session task goes away.
pub async fn run<W: Write + Send>(
    api: &ApiClient,
    handle: &SessionHandle,
    surface: &TuiSurface<W>,
    read_only: bool,
) -> anyhow::Result<()> {
    let mut status = handle.status();
    let task_id = status.borrow().task_id.clone();
    let mut key_handler = KeyHandler::new(read_only);
    let mut refresh = RefreshGate::default();
    let mut input_stream = EventStream::new();
    let mut prefix_timer = time::interval(Duration::from_millis(200));

    surface.redraw();

    loop {
        tokio::select! {
            event = input_stream.next() => match event {
                Some(Ok(Event::Key(key))) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    let action = key_handler.handle_key(key);
                    surface.set_input_mode(key_handler.mode());
                    if apply_action(handle, &status, action).await? == Flow::Detach {
                        return Ok(());
                    }
                }
                Some(Ok(Event::Paste(text))) if !read_only => {
                    handle.surface_event(SurfaceEvent::Input(text)).await?;
                }
                Some(Ok(Event::Resize(columns, rows))) => {
                    let size = content_size(terminal::window_size(columns, rows));
                    handle.surface_event(SurfaceEvent::Resize(size)).await?;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "terminal event error");
                    return Err(e.into());
                }
                None => return Ok(()),
            },
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = status.borrow_and_update().clone();
                if refresh.observe(&current) {
                    refresh_task(api, handle, &task_id).await;
                }
            }
            _ = prefix_timer.tick() => {
                if key_handler.expire_prefix() {
                    surface.set_input_mode(key_handler.mode());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tq_protocol::TaskState;

    fn status(state: ConnectionState, task_state: TaskState) -> SessionStatus {
        SessionStatus {
            task_id: "t".to_string(),
            state,
            task_state,
            remap_newline: false,
            replaying_history: false,
        }
    }

    #[test]
    fn refresh_once_per_lost_connection() {
        let mut gate = RefreshGate::default();
        assert!(!gate.observe(&status(ConnectionState::Connecting, TaskState::Started)));
        assert!(!gate.observe(&status(ConnectionState::Open, TaskState::Started)));
        assert!(gate.observe(&status(ConnectionState::Closed, TaskState::Started)));
        assert!(!gate.observe(&status(ConnectionState::Closed, TaskState::Started)));

        assert!(!gate.observe(&status(ConnectionState::Connecting, TaskState::Started)));
        assert!(gate.observe(&status(ConnectionState::Errored, TaskState::Started)));
    }

    #[test]
    fn no_refresh_for_finished_task() {
        let mut gate = RefreshGate::default();
        gate.observe(&status(ConnectionState::Open, TaskState::Finished));
        assert!(!gate.observe(&status(ConnectionState::Closed, TaskState::Finished)));
    }
}
