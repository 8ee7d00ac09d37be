//! End-to-end checks of the processor loop thread: passive expiry with no
//! further input, keyed completion, and shutdown behaviour.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use chordd_core::tree::{KeyTree, NodeSpec};
use chordd_core::{Action, Processor};

fn fixture(default_timeout: Duration) -> Arc<KeyTree> {
    let roots: BTreeMap<String, NodeSpec> = serde_json::from_value(serde_json::json!({
        "KEY_X": {
            "action": "action://x",
            "children": { "KEY_Y": { "action": "action://x-y" } }
        }
    }))
    .unwrap();
    Arc::new(KeyTree::build(&roots, default_timeout).unwrap())
}

#[test]
fn passive_expiry_fires_without_further_input() {
    let (tx, rx) = mpsc::channel::<Action>();
    let processor = Processor::spawn(fixture(Duration::from_millis(50)), tx);

    processor.submit("KEY_X", Instant::now());

    let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(fired.action, "action://x");

    processor.shutdown();
    processor.join();
}

#[test]
fn keyed_completion_fires_immediately() {
    let (tx, rx) = mpsc::channel::<Action>();
    let processor = Processor::spawn(fixture(Duration::from_millis(200)), tx);

    let start = Instant::now();
    processor.submit("KEY_X", start);
    processor.submit("KEY_Y", start + Duration::from_millis(10));

    let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(fired.action, "action://x-y");

    processor.shutdown();
    processor.join();
}

#[test]
fn nothing_fires_after_shutdown() {
    let (tx, rx) = mpsc::channel::<Action>();
    let processor = Processor::spawn(fixture(Duration::from_millis(50)), tx);

    processor.shutdown();
    processor.submit("KEY_X", Instant::now());
    processor.submit("KEY_Y", Instant::now());

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    processor.join();
}

#[test]
fn shutdown_is_idempotent() {
    let (tx, _rx) = mpsc::channel::<Action>();
    let processor = Processor::spawn(fixture(Duration::from_millis(50)), tx);
    processor.shutdown();
    processor.shutdown();
    processor.join();
}
