#![forbid(unsafe_code)]

//! Core of chordd: the key tree and the timed key-sequence state machine.
//!
//! This crate is deliberately free of device and network I/O. It consumes
//! timestamped key names through [`Processor::submit`] (or [`Sequencer`]
//! directly) and emits completed [`Action`]s on a channel; reading devices
//! and executing actions live in `chordd-evdev` and `chordd-dispatch`.

pub mod processor;
pub mod shutdown;
pub mod source;
pub mod tree;

pub use processor::{Action, Processor, Sequencer};
pub use shutdown::{ShutdownSource, ShutdownToken};
pub use source::{KeyInput, KeySource};
pub use tree::{KeyTree, NodeId, NodeSpec, TreeError};
