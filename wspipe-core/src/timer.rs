//! Per-pipeline timers
//!
//! Stages schedule timers through their context. Each timer is a spawned
//! tokio task that sleeps and then reports back on a channel owned by the
//! pipeline; the pipeline delivers the expiry to the stage from whichever task
//! drives it. Cancelling aborts the task, and an expiry that races a cancel is
//! discarded on delivery.

use crate::stage::StageId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// An expired timer waiting to be delivered to its stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub(crate) stage: StageId,
    /// The timer that expired
    pub timer: TimerId,
}

pub(crate) struct Timers {
    tx: mpsc::UnboundedSender<TimerFired>,
    rx: mpsc::UnboundedReceiver<TimerFired>,
    pending: HashMap<TimerId, (StageId, JoinHandle<()>)>,
}

impl Timers {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn schedule(&mut self, stage: StageId, timer: TimerId, delay: Duration) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                crate::log_warn!("no tokio runtime, {} for {} not scheduled", timer, stage);
                return;
            }
        };

        let tx = self.tx.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { stage, timer });
        });
        self.pending.insert(timer, (stage, task));
    }

    pub(crate) fn cancel(&mut self, timer: TimerId) {
        if let Some((_, task)) = self.pending.remove(&timer) {
            task.abort();
        }
    }

    pub(crate) fn cancel_stage(&mut self, stage: StageId) {
        self.pending.retain(|_, (owner, task)| {
            if *owner == stage {
                task.abort();
                false
            } else {
                true
            }
        });
    }

    /// Claim an expiry for delivery; false if it was cancelled meanwhile
    pub(crate) fn claim(&mut self, fired: &TimerFired) -> bool {
        self.pending.remove(&fired.timer).is_some()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) async fn next(&mut self) -> TimerFired {
        match self.rx.recv().await {
            Some(fired) => fired,
            // the sender half lives in `self`, so the channel never closes
            None => std::future::pending().await,
        }
    }

    pub(crate) fn try_next(&mut self) -> Option<TimerFired> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        for (_, (_, task)) in self.pending.drain() {
            task.abort();
        }
    }
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("pending", &self.pending.len())
            .finish()
    }
}
