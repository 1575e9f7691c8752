#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tq_protocol::TaskState;
use tq_session::{
    Connection, Connector, SessionStatus, TaskSnapshot, TerminalSize, TerminalSurface,
    TransportPeer, WriteTicket,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    Write { bytes: Vec<u8>, ticketed: bool },
    Reset,
    Clear,
    Resize(u16, u16),
    Dispose,
}

#[derive(Default)]
pub struct SurfaceLog {
    pub ops: Vec<SurfaceOp>,
    pub held: VecDeque<WriteTicket>,
    pub statuses: Vec<SessionStatus>,
    pub hold_tickets: bool,
    pub disposed: bool,
}

impl SurfaceLog {
    pub fn written(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::Write { bytes, .. } => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }
}

/// Surface whose log stays readable after the session takes ownership.
#[derive(Clone)]
pub struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
    size: TerminalSize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            size: TerminalSize {
                pixel_width: 800,
                pixel_height: 480,
                columns: 80,
                rows: 24,
            },
        }
    }

    /// Keep tickets until [`release`](Self::release) is called.
    pub fn holding_tickets() -> Self {
        let surface = Self::new();
        surface.log().hold_tickets = true;
        surface
    }

    pub fn log(&self) -> MutexGuard<'_, SurfaceLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn release(&self) {
        self.log().held.clear();
    }
}

impl TerminalSurface for RecordingSurface {
    fn write(&mut self, bytes: &[u8], ticket: Option<WriteTicket>) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        assert!(!log.disposed, "write after dispose");
        log.ops.push(SurfaceOp::Write {
            bytes: bytes.to_vec(),
            ticketed: ticket.is_some(),
        });
        if let Some(ticket) = ticket {
            if log.hold_tickets {
                log.held.push_back(ticket);
            }
        }
    }

    fn reset(&mut self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).ops.push(SurfaceOp::Reset);
    }

    fn clear(&mut self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).ops.push(SurfaceOp::Clear);
    }

    fn resize(&mut self, size: TerminalSize) {
        self.size = size;
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ops
            .push(SurfaceOp::Resize(size.columns, size.rows));
    }

    fn size(&self) -> TerminalSize {
        self.size
    }

    fn dispose(&mut self) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.disposed = true;
        log.ops.push(SurfaceOp::Dispose);
    }

    fn is_disposed(&self) -> bool {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).disposed
    }

    fn show_status(&mut self, status: &SessionStatus) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).statuses.push(status.clone());
    }
}

/// Hands the socket side of every connection to the test.
pub struct MockConnector {
    peers: mpsc::UnboundedSender<(String, TransportPeer)>,
    capacity: usize,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, TransportPeer)>) {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::UnboundedReceiver<(String, TransportPeer)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: tx,
                capacity,
            },
            rx,
        )
    }
}

impl Connector for MockConnector {
    fn connect(&self, task_id: &str) -> Connection {
        let (connection, peer) = Connection::channel(self.capacity);
        let _ = self.peers.send((task_id.to_string(), peer));
        connection
    }
}

pub fn task(state: TaskState, is_pty: bool) -> TaskSnapshot {
    TaskSnapshot {
        id: "task-1".to_string(),
        state,
        is_pty,
    }
}

/// Every outbound frame queued on `peer` so far.
pub fn drain_outbound(peer: &mut TransportPeer) -> Vec<String> {
    let mut frames = Vec::new();
    while let Ok(frame) = peer.outbound.try_recv() {
        frames.push(frame);
    }
    frames
}
