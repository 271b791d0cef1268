//! Background dispatch of relay work.
//!
//! Each inbound message becomes one detached tokio task. The webhook handler drops the
//! returned [`DispatchHandle`]; tests and shutdown use it (or [`Dispatcher::drain`]) to observe
//! completion. There is no concurrency limit and no per-sender ordering.

use crate::channels::InboundMessage;
use crate::relay::Relay;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// How one relay unit of work ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Reply accepted by the provider. `fallback` is true when the reply is the apology.
    Delivered { reply: String, fallback: bool },
    /// Reply could not be sent; it was logged and dropped.
    SendFailed { reply: String, error: String },
}

/// Handle to one dispatched unit of work.
pub struct DispatchHandle {
    pub id: String,
    join: JoinHandle<DispatchOutcome>,
}

impl DispatchHandle {
    /// Wait for the task. None when the task panicked or was aborted.
    pub async fn outcome(self) -> Option<DispatchOutcome> {
        match self.join.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::warn!("dispatch {}: task did not complete: {}", self.id, e);
                None
            }
        }
    }
}

struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the task ends, including on panic.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Spawns relay tasks and tracks how many are running.
#[derive(Clone)]
pub struct Dispatcher {
    relay: Arc<Relay>,
    in_flight: Arc<InFlight>,
}

impl Dispatcher {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            in_flight: Arc::new(InFlight {
                count: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Start relaying `msg` in the background and return immediately.
    pub fn dispatch(&self, msg: InboundMessage) -> DispatchHandle {
        let id = format!("task-{}", uuid::Uuid::new_v4());
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(self.in_flight.clone());
        let relay = self.relay.clone();
        let task_id = id.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            let outcome = relay.process(msg).await;
            log::debug!("dispatch {}: {:?}", task_id, outcome);
            outcome
        });
        DispatchHandle { id, join }
    }

    /// Number of units still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until no units are running.
    pub async fn drain(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
