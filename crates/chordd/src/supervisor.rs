#![forbid(unsafe_code)]

//! Per-device supervision: open the source, pump key presses into the
//! device's processor, and reopen on failure.
//!
//! Read and open failures are terminal for the current device handle only.
//! The supervisor retries with exponential backoff until shutdown, so a
//! device that is unplugged resumes when it reappears under the same path.

use std::time::Duration;

use tracing::{info, warn};

use chordd_core::{KeySource, Processor, ShutdownToken};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Drive one device until shutdown. Blocks the calling thread.
///
/// `open` is invoked for the initial open and after every failure. Only key
/// presses (including autorepeat) reach the processor; releases stop here.
pub fn supervise<S, F>(open: F, processor: &Processor, shutdown: &ShutdownToken)
where
    S: KeySource,
    F: Fn() -> Result<S, S::Error>,
{
    let mut backoff = INITIAL_BACKOFF;
    while !shutdown.is_requested() {
        let mut source = match open() {
            Ok(source) => source,
            Err(error) => {
                warn!(%error, "failed to open device");
                if shutdown.wait_timeout(backoff) {
                    return;
                }
                backoff = grow(backoff);
                continue;
            }
        };
        info!("device ready");
        backoff = INITIAL_BACKOFF;

        loop {
            if shutdown.is_requested() {
                return;
            }
            match source.read() {
                Ok(input) if input.down => processor.submit(input.name, input.when),
                Ok(_) => {}
                Err(error) => {
                    warn!(%error, "device read failed, reopening");
                    break;
                }
            }
        }

        if shutdown.wait_timeout(backoff) {
            return;
        }
        backoff = grow(backoff);
    }
}

fn grow(backoff: Duration) -> Duration {
    (backoff * 2).min(MAX_BACKOFF)
}
