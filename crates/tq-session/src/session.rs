use std::future::pending;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use tq_protocol::frame::{self, encode_input, encode_ping, encode_resize};
use tq_protocol::{Task, TaskId, TaskState};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::scheduler::OutputScheduler;
use crate::state::{ConnectionState, Transition};
use crate::status::SessionStatus;
use crate::surface::{SurfaceEvent, TerminalSurface};
use crate::transport::{Connection, Connector, TransportEvent};

/// The parts of a task the session cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub state: TaskState,
    pub is_pty: bool,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            state: task.state,
            is_pty: task.is_pty,
        }
    }
}

/// Requests from the view that owns the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Reconnect,
    SetRemapNewline(bool),
    /// Fresh task data from the REST API. Ignored if the id differs.
    TaskUpdated(TaskSnapshot),
    ClearSurface,
    Dispose,
}

type TaskChangedHook = Box<dyn FnMut(&str) + Send>;

/// Swap carriage return and line feed.
fn remap_newlines(chars: &str) -> String {
    chars
        .chars()
        .map(|c| match c {
            '\r' => '\n',
            '\n' => '\r',
            other => other,
        })
        .collect()
}

/// Live-log session for one task.
///
/// Owns the socket, the output scheduler and the surface. All methods are
/// synchronous; [`run`](Self::run) drives them from socket, surface and
/// command events.
pub struct SessionController<S: TerminalSurface, C: Connector> {
    task: TaskSnapshot,
    state: ConnectionState,
    surface: S,
    connector: C,
    scheduler: OutputScheduler,
    connection: Option<Connection>,
    ping_deadline: Option<Instant>,
    config: SessionConfig,
    remap_newline: bool,
    refresh_on_teardown: bool,
    on_task_changed: Option<TaskChangedHook>,
    status: watch::Sender<SessionStatus>,
}

impl<S: TerminalSurface, C: Connector> SessionController<S, C> {
    pub fn new(task: TaskSnapshot, surface: S, connector: C, config: SessionConfig) -> Self {
        let status = SessionStatus {
            task_id: task.id.clone(),
            state: ConnectionState::Idle,
            task_state: task.state,
            remap_newline: config.remap_newline,
            replaying_history: false,
        };
        let (status, _) = watch::channel(status);
        Self {
            remap_newline: config.remap_newline,
            task,
            state: ConnectionState::Idle,
            surface,
            connector,
            scheduler: OutputScheduler::new(),
            connection: None,
            ping_deadline: None,
            config,
            refresh_on_teardown: false,
            on_task_changed: None,
            status,
        }
    }

    /// Called once at teardown if the socket went away while the task was
    /// running, so the owner can refetch the task.
    pub fn on_task_changed(mut self, hook: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_task_changed = Some(Box::new(hook));
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn task(&self) -> &TaskSnapshot {
        &self.task
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn remap_newline(&self) -> bool {
        self.remap_newline
    }

    pub fn is_replaying_history(&self) -> bool {
        self.scheduler.is_replaying_history()
    }

    fn transition(&mut self, via: Transition) -> Result<ConnectionState> {
        let from = self.state;
        let to = from
            .on(via)
            .ok_or(SessionError::IllegalTransition { from, via })?;
        debug!(task_id = %self.task.id, %from, %via, %to, "session transition");
        self.state = to;
        self.publish();
        Ok(to)
    }

    /// Open the socket. Only valid from `Idle`.
    pub fn connect(&mut self) -> Result<()> {
        self.transition(Transition::Connect)?;
        info!(task_id = %self.task.id, "connecting to task log");
        self.connection = Some(self.connector.connect(&self.task.id));
        Ok(())
    }

    /// Start over on a fresh socket after a close or error. The surface and
    /// queues are emptied first; the server replays history again.
    pub fn reconnect(&mut self) -> Result<()> {
        self.transition(Transition::Reconnect)?;
        info!(task_id = %self.task.id, "reconnecting to task log");
        self.surface.reset();
        self.scheduler.reset();
        self.ping_deadline = None;
        self.connection = Some(self.connector.connect(&self.task.id));
        self.publish();
        Ok(())
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if let Err(e) = self.transition(Transition::Opened) {
                    debug!(error = %e, "ignoring open event");
                    return;
                }
                self.ping_deadline = Some(Instant::now() + self.config.ping_interval);
                self.send_resize();
            }
            TransportEvent::Frame(raw) => {
                if !self.state.is_open() {
                    debug!(state = %self.state, "dropping frame outside open state");
                    return;
                }
                match frame::decode(raw) {
                    Ok(frame) => {
                        self.scheduler
                            .enqueue(frame.kind, frame.payload, &mut self.surface);
                        self.publish();
                    }
                    Err(e) => debug!(error = %e, "dropping inbound frame"),
                }
            }
            TransportEvent::Closed { reason } => {
                info!(task_id = %self.task.id, ?reason, "task log closed");
                self.teardown(Transition::Closed);
            }
            TransportEvent::Failed(error) => {
                warn!(task_id = %self.task.id, %error, "task log connection failed");
                self.teardown(Transition::Failed);
            }
        }
    }

    fn teardown(&mut self, via: Transition) {
        if let Err(e) = self.transition(via) {
            debug!(error = %e, "ignoring socket teardown");
            return;
        }
        self.ping_deadline = None;
        self.connection = None;
        if self.task.state.is_running() {
            self.refresh_on_teardown = true;
        }
    }

    pub fn handle_surface_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Input(chars) => {
                self.send_input(&chars);
            }
            SurfaceEvent::Resize(size) => {
                self.surface.resize(size);
                self.send_resize();
            }
        }
    }

    pub fn handle_command(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::Reconnect => self.reconnect()?,
            SessionCommand::SetRemapNewline(remap) => {
                self.remap_newline = remap;
                self.publish();
            }
            SessionCommand::TaskUpdated(task) => {
                if task.id != self.task.id {
                    debug!(expected = %self.task.id, got = %task.id, "ignoring update for other task");
                    return Ok(());
                }
                let started = !self.task.state.is_running() && task.state.is_running();
                self.task = task;
                self.publish();
                if started {
                    self.send_resize();
                }
            }
            SessionCommand::ClearSurface => self.surface.clear(),
            SessionCommand::Dispose => self.dispose(),
        }
        Ok(())
    }

    /// Forward one keystroke event. Returns whether a frame was queued.
    pub fn send_input(&mut self, chars: &str) -> bool {
        if !self.state.is_open()
            || self.scheduler.is_replaying_history()
            || !self.task.state.is_running()
        {
            return false;
        }
        let frame = if self.remap_newline {
            encode_input(&remap_newlines(chars))
        } else {
            encode_input(chars)
        };
        self.send(frame)
    }

    /// Tell the server the surface size. Only a running pty task on an open
    /// socket has a terminal to resize.
    pub fn send_resize(&mut self) -> bool {
        if !self.state.is_open() || !self.task.is_pty || !self.task.state.is_running() {
            return false;
        }
        match encode_resize(&self.surface.size().into()) {
            Ok(frame) => self.send(frame),
            Err(e) => {
                warn!(error = %e, "failed to encode resize");
                false
            }
        }
    }

    pub fn send_ping(&mut self) -> bool {
        if !self.state.is_open() {
            return false;
        }
        self.send(encode_ping())
    }

    /// Ping timer fired.
    pub fn on_ping_due(&mut self) {
        if self.send_ping() {
            debug!(task_id = %self.task.id, "ping");
        }
        self.ping_deadline = self
            .state
            .is_open()
            .then(|| Instant::now() + self.config.ping_interval);
    }

    fn send(&self, frame: String) -> bool {
        let Some(connection) = &self.connection else {
            return false;
        };
        match connection.send(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(task_id = %self.task.id, error = %e, "dropping outbound frame");
                false
            }
        }
    }

    /// History writes completed.
    pub fn finish_history(&mut self) {
        if self.scheduler.finish_history(&mut self.surface) {
            debug!(task_id = %self.task.id, "history replay finished");
            self.publish();
        }
    }

    /// Close the socket, stop timers and release the surface. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == ConnectionState::Disposed {
            return;
        }
        if self.state.is_open() && self.task.state.is_running() {
            self.refresh_on_teardown = true;
        }
        let _ = self.transition(Transition::Dispose);
        self.ping_deadline = None;
        self.connection = None;
        self.scheduler.dispose();
        self.surface.dispose();

        if self.refresh_on_teardown {
            self.refresh_on_teardown = false;
            if let Some(mut hook) = self.on_task_changed.take() {
                hook(&self.task.id);
            }
        }
    }

    fn publish(&mut self) {
        let status = SessionStatus {
            task_id: self.task.id.clone(),
            state: self.state,
            task_state: self.task.state,
            remap_newline: self.remap_newline,
            replaying_history: self.scheduler.is_replaying_history(),
        };
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status.clone();
            true
        });
        if changed && !self.surface.is_disposed() {
            self.surface.show_status(&status);
        }
    }

    /// Drive the session until disposed or the command channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut surface_events: mpsc::Receiver<SurfaceEvent>,
    ) {
        if self.state == ConnectionState::Idle {
            if let Err(e) = self.connect() {
                warn!(error = %e, "failed to start session");
            }
        }

        let mut surface_open = true;
        while self.state != ConnectionState::Disposed {
            let draining = self.scheduler.is_draining();
            let drained = self.scheduler.drained();
            let ping_deadline = self.ping_deadline;

            tokio::select! {
                event = next_transport_event(&mut self.connection) => {
                    let event = event.unwrap_or(TransportEvent::Closed { reason: None });
                    self.handle_transport_event(event);
                }
                _ = drained, if draining => {
                    self.finish_history();
                }
                _ = sleep_until_opt(ping_deadline) => {
                    self.on_ping_due();
                }
                event = surface_events.recv(), if surface_open => match event {
                    Some(event) => self.handle_surface_event(event),
                    None => surface_open = false,
                },
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.handle_command(command) {
                            warn!(error = %e, "session command rejected");
                        }
                    }
                    None => self.dispose(),
                },
            }
        }
        debug!(task_id = %self.task.id, "session loop finished");
    }
}

impl<S: TerminalSurface, C: Connector> Drop for SessionController<S, C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn next_transport_event(connection: &mut Option<Connection>) -> Option<TransportEvent> {
    match connection {
        Some(connection) => connection.next_event().await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Owner's end of a spawned session.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    surface_events: mpsc::Sender<SurfaceEvent>,
    status: watch::Receiver<SessionStatus>,
    join: JoinHandle<()>,
}

impl SessionHandle {
    pub async fn command(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    pub async fn surface_event(&self, event: SurfaceEvent) -> Result<()> {
        self.surface_events
            .send(event)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    pub fn surface_events(&self) -> mpsc::Sender<SurfaceEvent> {
        self.surface_events.clone()
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Dispose the session and wait for its task to exit.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Dispose).await;
        let _ = self.join.await;
    }
}

/// Run `controller` on its own tokio task.
pub fn spawn<S, C>(controller: SessionController<S, C>, capacity: usize) -> SessionHandle
where
    S: TerminalSurface + 'static,
    C: Connector + 'static,
{
    let capacity = capacity.max(1);
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (ev_tx, ev_rx) = mpsc::channel(capacity);
    let status = controller.subscribe();
    let join = tokio::spawn(controller.run(cmd_rx, ev_rx));
    SessionHandle {
        commands: cmd_tx,
        surface_events: ev_tx,
        status,
        join,
    }
}
