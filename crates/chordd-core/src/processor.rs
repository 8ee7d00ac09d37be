#![forbid(unsafe_code)]

//! The sequence processor: a per-device state machine that walks the key
//! tree as timestamped presses arrive and fires the action of whichever
//! node a sequence completes at.
//!
//! [`Sequencer`] is the pure machine. It owns nothing but a cursor into the
//! shared [`KeyTree`] and the time of the last accepted key, which makes it
//! directly drivable from tests with synthetic timestamps. [`Processor`]
//! wraps one `Sequencer` in a background thread that multiplexes inbound
//! presses against the pending timeout, so key handling and passive expiry
//! are mutually exclusive by construction.
//!
//! Expiry resolution is two-phase: decide that the pending hop is dead,
//! then walk toward the root for the nearest `stay` ancestor whose own
//! window still covers the moment of the decision. Only if none is alive
//! does the cursor reset to idle. The same walk runs again after every
//! fire, keyed to the fired node's own timestamp, which is what keeps a
//! `stay` group armed for repeated sub-sequences.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::shutdown::{ShutdownSource, ShutdownToken};
use crate::tree::{KeyTree, NodeId};

/// Upper bound on a single idle wait. Purely a liveness bound for the loop;
/// it carries no matching semantics.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// What the dispatcher receives when a node fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Free-form kind tag from the configuration (`""`, `"url"`, ...).
    pub kind: String,
    /// The payload, e.g. a URL to GET.
    pub action: String,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    node: NodeId,
    /// Timestamp of the key that moved the cursor here. Expiry windows for
    /// this node and for every `stay` ancestor are measured from it.
    last_key: Instant,
}

/// The key-sequence state machine for one device.
pub struct Sequencer {
    tree: Arc<KeyTree>,
    pending: Option<Pending>,
    actions: mpsc::Sender<Action>,
}

impl Sequencer {
    #[must_use]
    pub fn new(tree: Arc<KeyTree>, actions: mpsc::Sender<Action>) -> Self {
        Self {
            tree,
            pending: None,
            actions,
        }
    }

    /// Feed one key press observed at `when`.
    ///
    /// Expiry of the pending hop is resolved first, against the same
    /// `when`, so the subsequent lookup starts from the revised position.
    /// An unknown key changes nothing, including the timeout window.
    pub fn accept(&mut self, name: &str, when: Instant) {
        self.resolve_expired(when);

        let from = self.pending.map(|p| p.node);
        let Some(hit) = self.tree.lookup(from, name) else {
            debug!(key = name, "no mapping for key at current position");
            return;
        };

        self.pending = Some(Pending {
            node: hit,
            last_key: when,
        });
        if self.tree.is_terminal(hit) {
            self.fire(hit, when);
        } else {
            debug!(key = name, "descending");
        }
    }

    /// The instant at which the pending hop expires, while one is pending.
    /// Drives the owning loop's timed wait.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
            .map(|p| p.last_key + self.tree.effective_timeout(p.node))
    }

    /// Passive expiry: no further key arrived inside the pending window.
    ///
    /// Fires the current node as if it had been a terminal match. For a
    /// pass-through node nothing is emitted, but the rest resolution still
    /// runs, which is indistinguishable from a silent timeout.
    pub fn expire(&mut self, now: Instant) {
        let Some(pending) = self.pending else {
            return;
        };
        if now <= pending.last_key + self.tree.effective_timeout(pending.node) {
            return;
        }
        self.fire(pending.node, pending.last_key);
    }

    /// Where the machine currently rests: `None` when idle.
    #[must_use]
    pub fn resting_node(&self) -> Option<NodeId> {
        self.pending.map(|p| p.node)
    }

    /// Emit the node's action, if any, then settle on the next resting
    /// position. Emission always strictly precedes the position change.
    fn fire(&mut self, node: NodeId, last_key: Instant) {
        if self.tree.has_action(node) {
            let fired = self.tree.fired(node);
            info!(kind = %fired.kind, action = %fired.action, "firing");
            if self.actions.send(fired).is_err() {
                warn!("dispatcher is gone, action dropped");
            }
        }
        self.pending = self.rest_after(node, last_key, last_key);
    }

    fn resolve_expired(&mut self, when: Instant) {
        let Some(pending) = self.pending else {
            return;
        };
        if when <= pending.last_key + self.tree.effective_timeout(pending.node) {
            return;
        }
        self.pending = self.rest_after(pending.node, pending.last_key, when);
    }

    /// Walk from `node` toward the root, excluding `node` itself, and rest
    /// at the first `stay` ancestor whose own window, measured from
    /// `last_key`, still covers `when`. No such ancestor means idle.
    fn rest_after(&self, node: NodeId, last_key: Instant, when: Instant) -> Option<Pending> {
        let mut cursor = self.tree.parent(node);
        while let Some(ancestor) = cursor {
            if self.tree.stay(ancestor)
                && when <= last_key + self.tree.effective_timeout(ancestor)
            {
                return Some(Pending {
                    node: ancestor,
                    last_key,
                });
            }
            cursor = self.tree.parent(ancestor);
        }
        None
    }
}

enum Inbound {
    Key { name: String, when: Instant },
    Wake,
}

/// Handle to a running per-device processor loop.
///
/// The loop blocks on whichever comes first: a submitted key or the pending
/// deadline. After [`shutdown`](Self::shutdown) no queued or newly submitted
/// key is processed and nothing fires.
pub struct Processor {
    inbound: mpsc::Sender<Inbound>,
    shutdown: ShutdownSource,
    thread: Option<thread::JoinHandle<()>>,
}

impl Processor {
    /// Spawn the loop for one device. Every processor shares the tree and
    /// the dispatcher's inbound side.
    #[must_use]
    pub fn spawn(tree: Arc<KeyTree>, actions: mpsc::Sender<Action>) -> Self {
        let (inbound, rx) = mpsc::channel();
        let shutdown = ShutdownSource::new();
        let token = shutdown.token();
        let thread = thread::spawn(move || run_loop(Sequencer::new(tree, actions), &rx, &token));
        Self {
            inbound,
            shutdown,
            thread: Some(thread),
        }
    }

    /// Submit one key press. Never blocks; presses submitted after shutdown
    /// are dropped with a warning.
    pub fn submit(&self, name: impl Into<String>, when: Instant) {
        let name = name.into();
        if self.shutdown.is_requested() {
            warn!(key = %name, "processor is shut down, key dropped");
            return;
        }
        if self
            .inbound
            .send(Inbound::Key { name, when })
            .is_err()
        {
            warn!("processor loop is gone, key dropped");
        }
    }

    /// Request the loop to stop. Idempotent. Queued keys are discarded.
    pub fn shutdown(&self) {
        self.shutdown.request();
        let _ = self.inbound.send(Inbound::Wake);
    }

    /// Wait for the loop to exit. Call after [`shutdown`](Self::shutdown).
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("processor thread panicked");
        }
    }
}

fn run_loop(mut sequencer: Sequencer, rx: &mpsc::Receiver<Inbound>, shutdown: &ShutdownToken) {
    loop {
        if shutdown.is_requested() {
            debug!("processor loop stopping");
            return;
        }
        let wait = match sequencer.deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => IDLE_WAIT,
        };
        match rx.recv_timeout(wait) {
            Ok(Inbound::Key { name, when }) => {
                if shutdown.is_requested() {
                    return;
                }
                sequencer.accept(&name, when);
            }
            Ok(Inbound::Wake) => {}
            Err(RecvTimeoutError::Timeout) => sequencer.expire(Instant::now()),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeSpec;
    use std::collections::BTreeMap;

    fn tree() -> Arc<KeyTree> {
        let roots: BTreeMap<String, NodeSpec> = serde_json::from_value(serde_json::json!({
            "KEY_A": { "action": "action://a" },
            "KEY_G": {
                "stay": true,
                "timeout": 10.0,
                "children": { "KEY_A": { "action": "action://g-a" } }
            }
        }))
        .unwrap();
        Arc::new(KeyTree::build(&roots, Duration::from_secs(1)).unwrap())
    }

    #[test]
    fn terminal_match_fires_and_goes_idle() {
        let (tx, rx) = mpsc::channel();
        let mut seq = Sequencer::new(tree(), tx);
        seq.accept("KEY_A", Instant::now());
        assert_eq!(rx.try_recv().unwrap().action, "action://a");
        assert!(seq.resting_node().is_none());
        assert!(seq.deadline().is_none());
    }

    #[test]
    fn unknown_key_changes_nothing() {
        let (tx, rx) = mpsc::channel();
        let mut seq = Sequencer::new(tree(), tx);
        let start = Instant::now();
        seq.accept("KEY_G", start);
        let deadline = seq.deadline();
        seq.accept("KEY_Z", start + Duration::from_millis(100));
        assert_eq!(seq.deadline(), deadline);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn fire_under_stay_parent_rests_there() {
        let (tx, rx) = mpsc::channel();
        let mut seq = Sequencer::new(tree(), tx);
        let start = Instant::now();
        seq.accept("KEY_G", start);
        let group = seq.resting_node().unwrap();
        seq.accept("KEY_A", start + Duration::from_secs(1));
        assert_eq!(rx.try_recv().unwrap().action, "action://g-a");
        // The sub-sequence can repeat without retyping the prefix.
        assert_eq!(seq.resting_node(), Some(group));
        seq.accept("KEY_A", start + Duration::from_secs(2));
        assert_eq!(rx.try_recv().unwrap().action, "action://g-a");
    }

    #[test]
    fn expire_before_deadline_is_a_no_op() {
        let (tx, rx) = mpsc::channel();
        let mut seq = Sequencer::new(tree(), tx);
        let start = Instant::now();
        seq.accept("KEY_G", start);
        seq.expire(start + Duration::from_secs(5));
        assert!(seq.resting_node().is_some());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn expire_past_deadline_resets_to_idle() {
        let (tx, rx) = mpsc::channel();
        let mut seq = Sequencer::new(tree(), tx);
        let start = Instant::now();
        seq.accept("KEY_G", start);
        seq.expire(start + Duration::from_secs(11));
        assert!(seq.resting_node().is_none());
        // KEY_G carries no action of its own.
        assert!(rx.try_recv().is_err());
    }
}
