use std::collections::VecDeque;
use std::future::Future;

use bytes::Bytes;
use tq_protocol::frame::OutputKind;
use tracing::debug;

use crate::barrier::CountingBarrier;
use crate::surface::TerminalSurface;

/// Orders task output into a surface.
///
/// History payloads are written with a completion ticket each. While any
/// history write is outstanding, live payloads are only queued. Once the
/// barrier settles and [`finish_history`](Self::finish_history) is called,
/// the live queue is flushed oldest first and later live output is written
/// straight through.
#[derive(Debug, Default)]
pub struct OutputScheduler {
    history: VecDeque<Bytes>,
    live: VecDeque<Bytes>,
    barrier: CountingBarrier,
    draining: bool,
    disposed: bool,
}

impl OutputScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue<S>(&mut self, kind: OutputKind, payload: Bytes, surface: &mut S)
    where
        S: TerminalSurface + ?Sized,
    {
        if self.disposed || payload.is_empty() {
            return;
        }
        match kind {
            OutputKind::History => self.history.push_back(payload),
            OutputKind::Actual => self.live.push_back(payload),
        }
        self.pump(surface);
    }

    fn pump<S>(&mut self, surface: &mut S)
    where
        S: TerminalSurface + ?Sized,
    {
        if self.draining || self.disposed || surface.is_disposed() {
            return;
        }

        if !self.history.is_empty() {
            self.draining = true;
            debug!(chunks = self.history.len(), "replaying history");
            while let Some(payload) = self.history.pop_front() {
                surface.write(&payload, Some(self.barrier.ticket()));
            }
            return;
        }

        while let Some(payload) = self.live.pop_front() {
            surface.write(&payload, None);
        }
    }

    /// Leave history mode if every history write has completed, then flush
    /// whatever queued up meanwhile. Returns whether the drain finished.
    pub fn finish_history<S>(&mut self, surface: &mut S) -> bool
    where
        S: TerminalSurface + ?Sized,
    {
        if !self.draining || !self.barrier.is_settled() {
            return false;
        }
        self.draining = false;
        self.pump(surface);
        true
    }

    /// History writes are outstanding.
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// History is outstanding or still queued.
    pub fn is_replaying_history(&self) -> bool {
        self.draining || !self.history.is_empty()
    }

    /// Resolves once all outstanding history writes complete.
    pub fn drained(&self) -> impl Future<Output = ()> + Send + 'static {
        self.barrier.wait()
    }

    pub fn queued(&self) -> (usize, usize) {
        (self.history.len(), self.live.len())
    }

    /// Empty both queues and start a fresh barrier. Tickets handed out
    /// before the reset settle against the old barrier.
    pub fn reset(&mut self) {
        self.history.clear();
        self.live.clear();
        self.barrier = CountingBarrier::new();
        self.draining = false;
    }

    pub fn dispose(&mut self) {
        self.history.clear();
        self.live.clear();
        self.draining = false;
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
