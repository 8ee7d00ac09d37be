#![forbid(unsafe_code)]

//! The key tree: a forest of named nodes built once from configuration.
//!
//! Each node may carry an action payload, a timeout override for its subtree,
//! a `stay` flag, and named children. Nodes live in a flat arena owned by
//! [`KeyTree`]; parent back-links are plain arena indices, so the structure
//! stays acyclic in ownership terms even though it can be walked both ways.
//!
//! The tree is immutable after [`KeyTree::build`] and is shared read-only
//! between every sequence processor via `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::processor::Action;

/// Index of a node in the [`KeyTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// One node of the configuration forest, as it appears on disk.
///
/// All fields are optional in the serialized form. A `timeout` of `0` means
/// "inherit from the nearest ancestor override, or the global default".
/// An empty `action` makes the node a pass-through: reaching it moves the
/// cursor but emits nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    /// Action kind, interpreted only by the dispatcher (`""` or `"url"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Action payload handed to the dispatcher when the node fires.
    pub action: String,
    /// Timeout override in seconds for matching this node's descendants.
    pub timeout: f64,
    /// On expiry inside this subtree, rest here instead of going idle,
    /// provided this node's own window has not elapsed.
    pub stay: bool,
    /// Child nodes keyed by key name.
    pub children: BTreeMap<String, NodeSpec>,
}

/// Rejected configuration shapes. Construction fails fast; there is no
/// partially built tree.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("default timeout must be positive")]
    ZeroDefaultTimeout,

    #[error("timeout for key {key:?} must be finite and non-negative, got {timeout}")]
    InvalidTimeout { key: String, timeout: f64 },
}

#[derive(Debug)]
struct Node {
    kind: String,
    action: String,
    timeout: Option<Duration>,
    stay: bool,
    children: HashMap<String, NodeId>,
    parent: Option<NodeId>,
}

/// The immutable forest plus the top-level key map and the default timeout.
#[derive(Debug)]
pub struct KeyTree {
    nodes: Vec<Node>,
    roots: HashMap<String, NodeId>,
    default_timeout: Duration,
}

impl KeyTree {
    /// Build the arena from a parsed configuration forest.
    ///
    /// Walks the parsed forest once, interning every node and wiring parent
    /// links as it descends. Duplicate sibling keys cannot reach this point:
    /// the map type dedupes them at parse time, last value wins.
    pub fn build(
        roots: &BTreeMap<String, NodeSpec>,
        default_timeout: Duration,
    ) -> Result<Self, TreeError> {
        if default_timeout.is_zero() {
            return Err(TreeError::ZeroDefaultTimeout);
        }

        let mut tree = Self {
            nodes: Vec::new(),
            roots: HashMap::new(),
            default_timeout,
        };
        for (key, spec) in roots {
            let id = tree.intern(key, spec, None)?;
            tree.roots.insert(key.clone(), id);
        }
        Ok(tree)
    }

    fn intern(
        &mut self,
        key: &str,
        spec: &NodeSpec,
        parent: Option<NodeId>,
    ) -> Result<NodeId, TreeError> {
        let timeout = match spec.timeout {
            t if !t.is_finite() || t < 0.0 => {
                return Err(TreeError::InvalidTimeout {
                    key: key.to_string(),
                    timeout: spec.timeout,
                });
            }
            0.0 => None,
            t => Some(Duration::from_secs_f64(t)),
        };

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind: spec.kind.clone(),
            action: spec.action.clone(),
            timeout,
            stay: spec.stay,
            children: HashMap::new(),
            parent,
        });
        for (child_key, child_spec) in &spec.children {
            let child_id = self.intern(child_key, child_spec, Some(id))?;
            self.node_mut(id).children.insert(child_key.clone(), child_id);
        }
        Ok(id)
    }

    /// Resolve `key` from the children of `from`, or from the top-level map
    /// when idle. A key absent at the current position is additionally tried
    /// against the top-level map, so global chords stay reachable
    /// mid-sequence. Unknown keys are `None`, never an error.
    pub fn lookup(&self, from: Option<NodeId>, key: &str) -> Option<NodeId> {
        let direct = match from {
            Some(id) => self.node(id).children.get(key),
            None => self.roots.get(key),
        };
        direct.or_else(|| self.roots.get(key)).copied()
    }

    /// The timeout governing the hop out of `id`: the nearest override
    /// walking toward the root, else the global default. An override is
    /// sticky for the whole subtree below it until a nearer one appears.
    pub fn effective_timeout(&self, id: NodeId) -> Duration {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(timeout) = self.node(current).timeout {
                return timeout;
            }
            cursor = self.node(current).parent;
        }
        self.default_timeout
    }

    /// The globally configured fallback timeout.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn stay(&self, id: NodeId) -> bool {
        self.node(id).stay
    }

    /// A node with no children completes a sequence the moment it matches.
    pub fn is_terminal(&self, id: NodeId) -> bool {
        self.node(id).children.is_empty()
    }

    /// Whether the node emits anything when fired.
    pub fn has_action(&self, id: NodeId) -> bool {
        !self.node(id).action.is_empty()
    }

    /// The dispatcher-facing projection of a node.
    pub fn fired(&self, id: NodeId) -> Action {
        let node = self.node(id);
        Action {
            kind: node.kind.clone(),
            action: node.action.clone(),
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(json: serde_json::Value) -> BTreeMap<String, NodeSpec> {
        serde_json::from_value(json).unwrap()
    }

    fn sample() -> KeyTree {
        let roots = spec(serde_json::json!({
            "KEY_A": { "action": "action://a" },
            "KEY_C": {
                "children": {
                    "KEY_A": { "action": "action://c-a" },
                    "KEY_T": {
                        "timeout": 10.0,
                        "children": { "KEY_A": { "action": "action://c-t-a" } }
                    }
                }
            }
        }));
        KeyTree::build(&roots, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn lookup_from_root() {
        let tree = sample();
        assert!(tree.lookup(None, "KEY_A").is_some());
        assert!(tree.lookup(None, "KEY_Z").is_none());
    }

    #[test]
    fn lookup_descends_into_children() {
        let tree = sample();
        let c = tree.lookup(None, "KEY_C").unwrap();
        let c_a = tree.lookup(Some(c), "KEY_A").unwrap();
        assert!(tree.is_terminal(c_a));
        assert_eq!(tree.fired(c_a).action, "action://c-a");
    }

    #[test]
    fn lookup_falls_back_to_root_map() {
        let tree = sample();
        let c = tree.lookup(None, "KEY_C").unwrap();
        let t = tree.lookup(Some(c), "KEY_T").unwrap();
        // KEY_C is not a child of KEY_C/KEY_T, so the top-level entry matches.
        let again = tree.lookup(Some(t), "KEY_C").unwrap();
        assert_eq!(again, c);
    }

    #[test]
    fn parent_links_mirror_children() {
        let tree = sample();
        let c = tree.lookup(None, "KEY_C").unwrap();
        let t = tree.lookup(Some(c), "KEY_T").unwrap();
        let t_a = tree.lookup(Some(t), "KEY_A").unwrap();
        assert_eq!(tree.parent(t_a), Some(t));
        assert_eq!(tree.parent(t), Some(c));
        assert_eq!(tree.parent(c), None);
    }

    #[test]
    fn effective_timeout_inherits_down() {
        let tree = sample();
        let c = tree.lookup(None, "KEY_C").unwrap();
        let t = tree.lookup(Some(c), "KEY_T").unwrap();
        let t_a = tree.lookup(Some(t), "KEY_A").unwrap();
        assert_eq!(tree.effective_timeout(c), Duration::from_secs(1));
        assert_eq!(tree.effective_timeout(t), Duration::from_secs(10));
        // The child has no override of its own and inherits the nearest one.
        assert_eq!(tree.effective_timeout(t_a), Duration::from_secs(10));
    }

    #[test]
    fn empty_action_is_pass_through() {
        let tree = sample();
        let c = tree.lookup(None, "KEY_C").unwrap();
        assert!(!tree.has_action(c));
        assert_eq!(tree.fired(c).action, "");
    }

    #[test]
    fn zero_default_timeout_is_rejected() {
        let roots = spec(serde_json::json!({ "KEY_A": { "action": "action://a" } }));
        assert!(matches!(
            KeyTree::build(&roots, Duration::ZERO),
            Err(TreeError::ZeroDefaultTimeout)
        ));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let roots = spec(serde_json::json!({
            "KEY_A": { "action": "action://a", "timeout": -1.0 }
        }));
        let err = KeyTree::build(&roots, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TreeError::InvalidTimeout { .. }));
    }

    #[test]
    fn node_spec_defaults_apply() {
        let parsed: NodeSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.kind, "");
        assert_eq!(parsed.action, "");
        assert_eq!(parsed.timeout, 0.0);
        assert!(!parsed.stay);
        assert!(parsed.children.is_empty());
    }

    #[test]
    fn type_field_maps_to_kind() {
        let parsed: NodeSpec =
            serde_json::from_str(r#"{ "type": "url", "action": "http://host/x" }"#).unwrap();
        assert_eq!(parsed.kind, "url");
    }
}
