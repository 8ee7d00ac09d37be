#![forbid(unsafe_code)]

//! Executes fired actions, decoupled from every sequence processor.
//!
//! A single consumer thread drains the shared action channel and hands each
//! action to a detached worker, so a stalled request never delays the next
//! one and never back-pressures a processor. Delivery is best-effort by
//! contract: failures are logged and dropped, nothing propagates upstream.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use chordd_core::Action;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Per-request bound. Requests that outlive it are abandoned and logged;
/// the processor side never waits on them to begin with.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the running dispatcher thread.
///
/// The loop exits once every sender clone has been dropped;
/// [`join`](Self::join) then reaps the consumer. Workers already in flight
/// are detached and race process exit.
pub struct Dispatcher {
    thread: Option<thread::JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the consumer over the shared action channel.
    pub fn spawn(actions: mpsc::Receiver<Action>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let thread = thread::spawn(move || {
            for action in actions.iter() {
                run_action(&client, action);
            }
            debug!("action channel closed, dispatcher stopping");
        });
        Ok(Self {
            thread: Some(thread),
        })
    }

    /// Wait for the consumer to finish. Meaningful once all processors have
    /// shut down and dropped their senders.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("dispatcher thread panicked");
        }
    }
}

fn run_action(client: &Client, action: Action) {
    match action.kind.as_str() {
        "" | "url" => {
            let client = client.clone();
            thread::spawn(move || invoke_url(&client, &action.action));
        }
        other => error!(kind = other, "unknown action kind, dropping"),
    }
}

fn invoke_url(client: &Client, url: &str) {
    info!(url, "invoking url");
    match client.get(url).send() {
        Ok(response) if response.status().is_success() => {
            debug!(url, status = %response.status(), "url request complete");
        }
        Ok(response) => {
            error!(url, status = %response.status(), "url returned error status");
        }
        Err(err) => {
            error!(url, error = %err, "url request failed");
        }
    }
}
