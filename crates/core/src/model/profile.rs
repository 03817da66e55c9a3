use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use super::call_tree::{CallNode, PreOrder, Region};
use super::enumeration::TreeEnumeration;
use super::metric::Metric;
use super::system_tree::{Location, SystemTreeNode};

/// Everything the anchor describes: metric tree, regions, call tree and
/// system tree. Built once, immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub attrs: BTreeMap<String, String>,
    metrics: Vec<Metric>,
    regions: Vec<Region>,
    cnodes: Vec<CallNode>,
    system_tree_nodes: Vec<SystemTreeNode>,
    #[serde(skip)]
    cnode_paths: HashMap<u64, Vec<usize>>,
    #[serde(skip)]
    region_index: HashMap<u64, usize>,
}

impl Profile {
    /// Assemble a profile and attach the deep/wide tree enumerations to every
    /// metric according to its orientation.
    pub fn new(
        attrs: BTreeMap<String, String>,
        mut metrics: Vec<Metric>,
        regions: Vec<Region>,
        cnodes: Vec<CallNode>,
        system_tree_nodes: Vec<SystemTreeNode>,
    ) -> Self {
        let deep = Arc::new(TreeEnumeration::deep(&cnodes));
        let wide = Arc::new(TreeEnumeration::wide(&cnodes));
        Metric::assign_enumerations(&mut metrics, &deep, &wide);

        let region_index = regions
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id, i))
            .collect();

        let mut cnode_paths = HashMap::new();
        let mut stack: Vec<(&CallNode, Vec<usize>)> = cnodes
            .iter()
            .enumerate()
            .rev()
            .map(|(i, c)| (c, vec![i]))
            .collect();
        while let Some((node, path)) = stack.pop() {
            for (i, child) in node.children.iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(i);
                stack.push((child, child_path));
            }
            cnode_paths.insert(node.id, path);
        }

        Self {
            attrs,
            metrics,
            regions,
            cnodes,
            system_tree_nodes,
            cnode_paths,
            region_index,
        }
    }

    /// Top-level metrics.
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// All metrics, pre-order over the metric tree.
    pub fn all_metrics(&self) -> Vec<&Metric> {
        self.metrics.iter().flat_map(Metric::walk).collect()
    }

    pub fn metric_by_name(&self, name: &str) -> Option<&Metric> {
        self.metrics
            .iter()
            .flat_map(Metric::walk)
            .find(|m| m.name == name)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, cnode: &CallNode) -> Option<&Region> {
        self.region_by_id(cnode.callee_region_id)
    }

    pub fn region_by_id(&self, id: u64) -> Option<&Region> {
        self.region_index.get(&id).and_then(|&i| self.regions.get(i))
    }

    pub fn region_by_name(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn root_cnodes(&self) -> &[CallNode] {
        &self.cnodes
    }

    pub fn cnode(&self, id: u64) -> Option<&CallNode> {
        let (first, rest) = self.cnode_paths.get(&id)?.split_first()?;
        let mut node = self.cnodes.get(*first)?;
        for &i in rest {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    /// All call nodes, pre-order.
    pub fn all_cnodes(&self) -> PreOrder<'_> {
        PreOrder::forest(&self.cnodes)
    }

    pub fn cnodes_for_region(&self, region_id: u64) -> Vec<&CallNode> {
        self.all_cnodes()
            .filter(|c| c.callee_region_id == region_id)
            .collect()
    }

    pub fn system_tree_nodes(&self) -> &[SystemTreeNode] {
        &self.system_tree_nodes
    }

    /// Locations below the first top-level system tree node.
    pub fn locations(&self) -> Vec<&Location> {
        self.system_tree_nodes
            .first()
            .map(SystemTreeNode::all_locations)
            .unwrap_or_default()
    }

    /// Profile-wide location count; every metric row has this length.
    pub fn num_locations(&self) -> usize {
        self.locations().len()
    }

    /// Indented rendering of the call tree, one `-` per depth level.
    pub fn calltree(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<(&CallNode, usize)> = self.cnodes.iter().rev().map(|c| (c, 0)).collect();
        while let Some((node, depth)) = stack.pop() {
            let name = self.region(node).map_or("<unknown>", |r| r.name.as_str());
            out.push_str(&"-".repeat(depth));
            out.push_str(name);
            out.push('\n');
            stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
        }
        out
    }
}
