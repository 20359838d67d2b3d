//! Aggregation timers: one single-shot, cancellable timer per RREQ
//! origin at the wave's destination (spec §3 "Aggregation timers", §4.2).
//!
//! Modeled as a `JoinHandle` per origin rather than the original's
//! `threading.Timer`, per Design Notes §9 — cancellation is `abort()`,
//! rearming always cancels the previous handle first.

use crate::config::WAIT_TIME;
use crate::identity::NodeId;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Per-node registry of in-flight aggregation timers, keyed by RREQ origin.
#[derive(Default)]
pub struct AggregationTimers {
    handles: HashMap<NodeId, JoinHandle<()>>,
}

impl AggregationTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any existing timer for `origin` and arm a fresh one. When it
    /// fires (after `WAIT_TIME` with no further rearm), `origin` is sent on
    /// `fire_tx` — the mailbox loop treats that as "emit the RREP for this
    /// origin now", keeping all state mutation inside the single mailbox
    /// task rather than the timer callback.
    pub fn rearm(&mut self, origin: NodeId, fire_tx: mpsc::Sender<NodeId>) {
        if let Some(previous) = self.handles.remove(&origin) {
            previous.abort();
        }
        let fired_origin = origin.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(WAIT_TIME).await;
            // Mailbox gone just means the node shut down; nothing to do.
            let _ = fire_tx.send(fired_origin).await;
        });
        self.handles.insert(origin, handle);
    }

    /// Drop the bookkeeping entry once a timer has fired and been handled.
    /// The task itself has already completed by the time this is called.
    pub fn clear(&mut self, origin: &NodeId) {
        self.handles.remove(origin);
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

impl Drop for AggregationTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
