#![forbid(unsafe_code)]

//! Process wiring: configuration, one processor and supervisor per device,
//! a single shared dispatcher, and signal-driven shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{error, info};

use chordd_core::{KeyTree, Processor, ShutdownSource};
use chordd_dispatch::Dispatcher;
use chordd_evdev::{EvdevKeySource, list_key_devices};

use crate::cli::RunArgs;
use crate::config;
use crate::error::{DaemonError, Result};
use crate::supervisor::supervise;

pub fn run_daemon(args: &RunArgs) -> Result<()> {
    if !args.timeout.is_finite() || args.timeout <= 0.0 {
        return Err(DaemonError::invalid(format!(
            "--timeout must be positive, got {}",
            args.timeout
        )));
    }
    let default_timeout = Duration::from_secs_f64(args.timeout);

    let config = config::load(&args.config)?;
    let tree = Arc::new(KeyTree::build(&config.keys, default_timeout)?);

    let devices = if args.devices.is_empty() {
        list_key_devices()
    } else {
        args.devices.clone()
    };
    if devices.is_empty() {
        return Err(DaemonError::NoDevices);
    }

    let (actions_tx, actions_rx) = mpsc::channel();
    let dispatcher = Dispatcher::spawn(actions_rx)?;

    let shutdown = ShutdownSource::new();
    let mut processors = Vec::with_capacity(devices.len());
    for device in devices {
        info!(device = %device.display(), "watching device");
        let processor = Arc::new(Processor::spawn(Arc::clone(&tree), actions_tx.clone()));
        spawn_supervisor(device, Arc::clone(&processor), &shutdown);
        processors.push(processor);
    }
    // The dispatcher must only see the processors' clones, so its loop ends
    // once they are gone.
    drop(actions_tx);

    wait_for_signal()?;

    shutdown.request();
    for processor in &processors {
        processor.shutdown();
    }
    for processor in processors {
        // A supervisor stuck in a blocking device read still holds its
        // clone; the loop thread has already acknowledged shutdown, so the
        // handle is safe to leave for process exit.
        if let Ok(processor) = Arc::try_unwrap(processor) {
            processor.join();
        }
    }
    dispatcher.join();
    info!("shut down");
    Ok(())
}

/// Supervisor threads are detached: one blocked in a device read has no way
/// to observe shutdown until that read returns, and the process exit that
/// follows [`run_daemon`] reclaims it either way.
fn spawn_supervisor(device: PathBuf, processor: Arc<Processor>, shutdown: &ShutdownSource) {
    let token = shutdown.token();
    thread::spawn(move || {
        supervise(|| EvdevKeySource::open(&device), &processor, &token);
    });
}

fn wait_for_signal() -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "signal received, shutting down");
    }
    Ok(())
}

pub fn run_list_devices() -> Result<()> {
    let devices = list_key_devices();
    if devices.is_empty() {
        error!("no key-capable input devices found");
    }
    for device in devices {
        println!("{}", device.display());
    }
    Ok(())
}
