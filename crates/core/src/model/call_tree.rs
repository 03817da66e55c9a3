use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value attached to a call node through a `<parameter>` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// One node of the dynamic call tree. Identifies a call path, not a source
/// location; the callee is resolved through `callee_region_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallNode {
    pub id: u64,
    pub callee_region_id: u64,
    /// Children in declaration order.
    pub children: Vec<CallNode>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl CallNode {
    pub fn new(id: u64, callee_region_id: u64) -> Self {
        Self {
            id,
            callee_region_id,
            children: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<CallNode>) -> Self {
        self.children = children;
        self
    }

    /// Pre-order walk starting at (and including) this node.
    pub fn walk(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }

    /// Pre-order walk over every node below this one.
    pub fn descendants(&self) -> PreOrder<'_> {
        PreOrder {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Number of nodes in this subtree, including this node.
    pub fn subtree_len(&self) -> usize {
        self.walk().count()
    }
}

/// Iterative pre-order traversal. Call trees mirror real program stacks, but
/// nothing bounds their depth, so the walk never recurses.
pub struct PreOrder<'a> {
    stack: Vec<&'a CallNode>,
}

impl<'a> PreOrder<'a> {
    /// Pre-order walk over a forest of roots, roots visited in order.
    pub fn forest(roots: &'a [CallNode]) -> Self {
        Self {
            stack: roots.iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a CallNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A static source-code entity (function, loop, ...) referenced by call nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: u64,
    pub begin: i64,
    pub end: i64,
    pub name: String,
    pub mangled_name: String,
    pub paradigm: String,
    pub role: String,
    pub url: String,
    pub description: String,
    /// Module (file) the region belongs to, if declared.
    pub module: Option<String>,
}
