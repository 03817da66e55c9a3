use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A measured thread or process: the innermost dimension of every value row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: u64,
    pub name: String,
    pub rank: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationGroup {
    pub id: u64,
    pub name: String,
    pub rank: String,
    pub kind: String,
    pub groups: Vec<LocationGroup>,
    pub locations: Vec<Location>,
}

impl LocationGroup {
    /// Own locations first, then those of nested groups in order.
    pub fn all_locations(&self) -> Vec<&Location> {
        let mut out: Vec<&Location> = self.locations.iter().collect();
        for group in &self.groups {
            out.extend(group.all_locations());
        }
        out
    }
}

/// Machine / node level of the system tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemTreeNode {
    pub id: u64,
    pub class: String,
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<SystemTreeNode>,
    pub location_groups: Vec<LocationGroup>,
}

impl SystemTreeNode {
    pub fn all_location_groups(&self) -> Vec<&LocationGroup> {
        let mut out: Vec<&LocationGroup> = self.location_groups.iter().collect();
        for child in &self.children {
            out.extend(child.all_location_groups());
        }
        out
    }

    pub fn all_locations(&self) -> Vec<&Location> {
        self.all_location_groups()
            .into_iter()
            .flat_map(LocationGroup::all_locations)
            .collect()
    }
}
