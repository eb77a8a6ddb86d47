//! Nodes
//!
//! The device model is a strict tree:
//! IED → LDevice → LogicalNode → DataObject[.SubDataObject]* → DataAttribute.

use serde::{Deserialize, Serialize};

use crate::Signal;

/// Description carried by placeholder nodes produced when discovery fails
pub const ERROR_NODE_DESCRIPTION: &str = "Discovery error";

/// A grouping node of the device model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub signals: Vec<Signal>,
}

impl Node {
    /// Create an empty node
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            children: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Placeholder node returned instead of failing discovery
    pub fn error(name: impl Into<String>) -> Self {
        Self::new(name, ERROR_NODE_DESCRIPTION)
    }

    /// Whether this node is a discovery error placeholder
    pub fn is_error(&self) -> bool {
        self.description == ERROR_NODE_DESCRIPTION
    }

    /// Whether the node has neither children nor signals
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.signals.is_empty()
    }

    pub fn find_child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Visit every signal in the subtree, depth first, in document order
    pub fn walk_signals<'a>(&'a self, f: &mut impl FnMut(&'a Signal)) {
        for signal in &self.signals {
            f(signal);
        }
        for child in &self.children {
            child.walk_signals(f);
        }
    }

    /// Mutable variant of [`walk_signals`](Self::walk_signals)
    pub fn walk_signals_mut(&mut self, f: &mut impl FnMut(&mut Signal)) {
        for signal in &mut self.signals {
            f(signal);
        }
        for child in &mut self.children {
            child.walk_signals_mut(f);
        }
    }

    /// All signals of the subtree in document order
    pub fn all_signals(&self) -> Vec<&Signal> {
        let mut out = Vec::new();
        self.walk_signals(&mut |s| out.push(s));
        out
    }

    /// First signal whose address matches
    pub fn find_signal(&self, address: &str) -> Option<&Signal> {
        self.signals
            .iter()
            .find(|s| s.address == address)
            .or_else(|| self.children.iter().find_map(|c| c.find_signal(address)))
    }

    /// Signal by unique address ("Device::path[#n]")
    pub fn find_unique(&self, unique_address: &str) -> Option<&Signal> {
        self.signals
            .iter()
            .find(|s| s.unique_address == unique_address)
            .or_else(|| {
                self.children
                    .iter()
                    .find_map(|c| c.find_unique(unique_address))
            })
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len() + self.children.iter().map(Node::signal_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Node {
        let mut ied = Node::new("IED1", "IED");
        let mut ld = Node::new("IED1LD1", "Logical Device");
        let mut ln = Node::new("XCBR1", "XCBR Node");
        let mut pos = Node::new("Pos", "Data Object");
        pos.signals.push(Signal::new("stVal", "LD1/XCBR1.Pos.stVal"));
        pos.signals.push(Signal::new("q", "LD1/XCBR1.Pos.q"));
        ln.children.push(pos);
        ln.signals.push(Signal::new("NamPlt", "LD1/XCBR1.NamPlt"));
        ld.children.push(ln);
        ied.children.push(ld);
        ied
    }

    #[test]
    fn test_walk_order() {
        let tree = sample_tree();
        let addresses: Vec<&str> = tree
            .all_signals()
            .iter()
            .map(|s| s.address.as_str())
            .collect();
        assert_eq!(
            addresses,
            vec!["LD1/XCBR1.NamPlt", "LD1/XCBR1.Pos.stVal", "LD1/XCBR1.Pos.q"]
        );
        assert_eq!(tree.signal_count(), 3);
    }

    #[test]
    fn test_find_signal() {
        let mut tree = sample_tree();
        assert!(tree.find_signal("LD1/XCBR1.Pos.q").is_some());
        assert!(tree.find_signal("LD1/XCBR1.Pos.ctlVal").is_none());

        tree.walk_signals_mut(&mut |s| s.unique_address = format!("IED1::{}", s.address));
        assert_eq!(
            tree.find_unique("IED1::LD1/XCBR1.Pos.stVal").map(|s| s.name.as_str()),
            Some("stVal")
        );
    }

    #[test]
    fn test_error_node() {
        let node = Node::error("Error_No_SCD");
        assert!(node.is_error());
        assert!(node.is_empty());
        assert!(!sample_tree().is_error());
    }
}
