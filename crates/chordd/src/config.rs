#![forbid(unsafe_code)]

//! On-disk configuration: a JSON document whose `keys` member is the
//! key-sequence forest. Parsing happens once at startup, before any device
//! is opened; a malformed file aborts the run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use chordd_core::NodeSpec;
use crate::error::{DaemonError, Result};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Top-level key map. Duplicate keys within one object collapse to the
    /// last occurrence at parse time.
    #[serde(default)]
    pub keys: BTreeMap<String, NodeSpec>,
}

pub fn load(path: &Path) -> Result<Config> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| DaemonError::Config {
        path: path.to_path_buf(),
        source,
    })
}
