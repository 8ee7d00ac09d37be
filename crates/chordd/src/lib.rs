#![forbid(unsafe_code)]

//! The chordd daemon: walks a configured key tree as presses arrive on
//! evdev devices and fires the action of every completed sequence.
//!
//! One sequence processor runs per device; all of them feed one dispatcher.
//! The timing semantics live in `chordd-core`, device access in
//! `chordd-evdev`, and action execution in `chordd-dispatch`. This crate
//! only wires them together behind a CLI.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod supervisor;

pub use cli::{Cli, run, run_from_env};
pub use error::{DaemonError, Result};
