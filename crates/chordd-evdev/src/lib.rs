#![forbid(unsafe_code)]

//! Linux evdev backend: reads key transitions straight from
//! `/dev/input/event*` nodes and names them with the kernel's `KEY_*`
//! vocabulary, which is also the vocabulary of the configuration forest.
//!
//! Reading raw devices normally requires membership in the `input` group
//! (or root); an open failure here is almost always a permission problem.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use evdev::{Device, EventType, InputEventKind};
use tracing::debug;

use chordd_core::{KeyInput, KeySource};

/// A [`KeySource`] over one opened evdev device.
///
/// `fetch` returns events in batches; surplus ones are queued so `read`
/// hands them out one at a time. The device node is released on drop.
pub struct EvdevKeySource {
    device: Device,
    queue: VecDeque<KeyInput>,
}

impl EvdevKeySource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = Device::open(path)?;
        debug!(
            path = %path.display(),
            name = device.name().unwrap_or("unnamed"),
            "opened input device"
        );
        Ok(Self {
            device,
            queue: VecDeque::new(),
        })
    }
}

impl KeySource for EvdevKeySource {
    type Error = io::Error;

    /// Block until the next key transition. Non-key events (sync markers,
    /// LED and misc reports) are skipped; autorepeat counts as a press.
    fn read(&mut self) -> Result<KeyInput, io::Error> {
        loop {
            if let Some(input) = self.queue.pop_front() {
                return Ok(input);
            }
            for event in self.device.fetch_events()? {
                if let InputEventKind::Key(key) = event.kind() {
                    self.queue.push_back(KeyInput {
                        name: format!("{key:?}"),
                        down: event.value() != 0,
                        when: Instant::now(),
                    });
                }
            }
        }
    }
}

/// All input devices that report key events, in stable path order.
///
/// Used when the caller did not name devices explicitly. Nodes that cannot
/// be opened (permissions, vanished device) are silently skipped during
/// enumeration.
#[must_use]
pub fn list_key_devices() -> Vec<PathBuf> {
    let mut devices: Vec<PathBuf> = evdev::enumerate()
        .filter(|(_, device)| device.supported_events().contains(EventType::KEY))
        .map(|(path, _)| path)
        .collect();
    devices.sort();
    devices
}
