use std::collections::HashMap;

use super::call_tree::CallNode;
use super::metric::MetricType;

/// Dense mapping from tree position (0-based) to call node id.
///
/// Index files store tree positions rather than call node ids, and the
/// position order depends on the metric's orientation: exclusive metrics use
/// the [`deep`](Self::deep) order, inclusive metrics the [`wide`](Self::wide)
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeEnumeration {
    cnodes: Vec<u64>,
}

impl TreeEnumeration {
    /// Pre-order numbering: a node is numbered before its children, children
    /// in declaration order.
    pub fn deep(roots: &[CallNode]) -> Self {
        let mut cnodes = Vec::new();
        let mut stack: Vec<&CallNode> = roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            cnodes.push(node.id);
            stack.extend(node.children.iter().rev());
        }
        Self { cnodes }
    }

    /// Block numbering used by CUBE writers for inclusive metrics.
    ///
    /// Roots take the first positions. Nodes are then popped from a stack;
    /// all direct children of the popped node receive consecutive positions
    /// as one block, and are pushed in reverse so the first child is expanded
    /// next. This is not a level-order traversal: a first child's block
    /// precedes the blocks of its later siblings' children.
    pub fn wide(roots: &[CallNode]) -> Self {
        let mut cnodes: Vec<u64> = roots.iter().map(|r| r.id).collect();
        let mut stack: Vec<&CallNode> = roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            cnodes.extend(node.children.iter().map(|c| c.id));
            stack.extend(node.children.iter().rev());
        }
        Self { cnodes }
    }

    pub fn for_metric_type(roots: &[CallNode], metric_type: MetricType) -> Self {
        match metric_type {
            MetricType::Exclusive => Self::deep(roots),
            MetricType::Inclusive => Self::wide(roots),
        }
    }

    /// Call node id at the given tree position.
    pub fn cnode_at(&self, position: usize) -> Option<u64> {
        self.cnodes.get(position).copied()
    }

    /// Inverse mapping: call node id → tree position.
    pub fn positions(&self) -> HashMap<u64, usize> {
        self.cnodes
            .iter()
            .enumerate()
            .map(|(pos, &cid)| (cid, pos))
            .collect()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.cnodes
    }

    pub fn len(&self) -> usize {
        self.cnodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cnodes.is_empty()
    }
}
