#![forbid(unsafe_code)]

//! The seam between physical input devices and the sequence processor.

use std::fmt;
use std::time::Instant;

/// One key transition as reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    /// Canonical key name (`KEY_A`, `KEY_LEFTSHIFT`, ...), the vocabulary
    /// the configuration forest is keyed by.
    pub name: String,
    /// `true` for press and autorepeat, `false` for release. Only presses
    /// are forwarded to a processor.
    pub down: bool,
    /// When the transition was observed.
    pub when: Instant,
}

/// A blocking producer of key transitions.
///
/// Implementations wrap one physical device. Releasing the device happens
/// on drop. Read errors are terminal for the current handle; the supervising
/// loop decides whether to reopen.
pub trait KeySource {
    type Error: fmt::Debug + fmt::Display;

    /// Block until the next key transition is available.
    fn read(&mut self) -> Result<KeyInput, Self::Error>;
}
