use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

/// Add/done/wait counter.
///
/// Every [`add`](Self::add) must be matched by a [`done`](Self::done);
/// [`wait`](Self::wait) resolves once the count is back at zero. Clones share
/// the same counter.
#[derive(Debug, Clone)]
pub struct CountingBarrier {
    count: Arc<watch::Sender<usize>>,
}

impl CountingBarrier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    pub fn add(&self, n: usize) {
        self.count.send_modify(|count| *count = count.saturating_add(n));
    }

    pub fn done(&self) {
        self.count.send_modify(|count| {
            if *count == 0 {
                warn!("barrier done() without matching add()");
            } else {
                *count -= 1;
            }
        });
    }

    /// Outstanding units.
    pub fn pending(&self) -> usize {
        *self.count.borrow()
    }

    pub fn is_settled(&self) -> bool {
        self.pending() == 0
    }

    /// Add one unit and hand out a ticket that marks it done when dropped.
    pub fn ticket(&self) -> WriteTicket {
        self.add(1);
        WriteTicket {
            barrier: self.clone(),
        }
    }

    /// Resolves when the count reaches zero. Ready immediately if nothing is
    /// outstanding. The future owns its receiver, so it can be recreated on
    /// every `select!` iteration.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.count.subscribe();
        async move {
            let _ = rx.wait_for(|count| *count == 0).await;
        }
    }
}

impl Default for CountingBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion handle for one surface write.
///
/// Dropping the ticket (or calling [`complete`](Self::complete)) marks the
/// write done on the barrier that issued it.
#[must_use = "dropping a ticket completes the write immediately"]
#[derive(Debug)]
pub struct WriteTicket {
    barrier: CountingBarrier,
}

impl WriteTicket {
    pub fn complete(self) {}
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        self.barrier.done();
    }
}
