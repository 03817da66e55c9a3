use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::enumeration::TreeEnumeration;

/// Whether stored values at a call node include the contributions of its
/// descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    Inclusive,
    Exclusive,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inclusive => "INCLUSIVE",
            Self::Exclusive => "EXCLUSIVE",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCLUSIVE" => Ok(Self::Inclusive),
            "EXCLUSIVE" => Ok(Self::Exclusive),
            other => Err(other.to_string()),
        }
    }
}

/// A measured quantity declared in the anchor. Metrics form their own tree,
/// independent of the call tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub id: u64,
    /// Unique name (`uniq_name`).
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub metric_type: MetricType,
    /// Binary value format, possibly parameterized (e.g. `NDOUBLES(10)`).
    pub data_type: String,
    pub units: String,
    pub url: String,
    pub children: Vec<Metric>,
    /// Tree position → call node id, shared by all metrics of one orientation.
    #[serde(skip)]
    pub tree_enumeration: Arc<TreeEnumeration>,
}

impl Metric {
    pub fn new(id: u64, name: impl Into<String>, metric_type: MetricType, data_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            display_name: name.clone(),
            name,
            description: String::new(),
            metric_type,
            data_type: data_type.into(),
            units: String::new(),
            url: String::new(),
            children: Vec::new(),
            tree_enumeration: Arc::default(),
        }
    }

    /// Call node id for a tree position read from this metric's index file.
    pub fn tree_index_to_cid(&self, position: usize) -> Option<u64> {
        self.tree_enumeration.cnode_at(position)
    }

    /// Pre-order walk over this metric and all nested metrics.
    pub fn walk(&self) -> impl Iterator<Item = &Metric> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let metric = stack.pop()?;
            stack.extend(metric.children.iter().rev());
            Some(metric)
        })
    }

    /// Attach the enumeration matching each metric's orientation, recursively.
    pub(crate) fn assign_enumerations(
        metrics: &mut [Metric],
        deep: &Arc<TreeEnumeration>,
        wide: &Arc<TreeEnumeration>,
    ) {
        for metric in metrics {
            metric.tree_enumeration = match metric.metric_type {
                MetricType::Exclusive => Arc::clone(deep),
                MetricType::Inclusive => Arc::clone(wide),
            };
            Self::assign_enumerations(&mut metric.children, deep, wide);
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id {}, {}, {})", self.name, self.id, self.metric_type, self.data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_type_round_trips_through_str() {
        assert_eq!("INCLUSIVE".parse::<MetricType>(), Ok(MetricType::Inclusive));
        assert_eq!("EXCLUSIVE".parse::<MetricType>(), Ok(MetricType::Exclusive));
        assert!("PREDERIVED_INCLUSIVE".parse::<MetricType>().is_err());
    }

    #[test]
    fn walk_visits_nested_metrics() {
        let mut time = Metric::new(1, "time", MetricType::Inclusive, "DOUBLE");
        let mut execution = Metric::new(2, "execution", MetricType::Inclusive, "DOUBLE");
        execution.children.push(Metric::new(3, "mpi", MetricType::Inclusive, "DOUBLE"));
        time.children.push(execution);
        time.children.push(Metric::new(4, "overhead", MetricType::Inclusive, "DOUBLE"));

        let names: Vec<&str> = time.walk().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["time", "execution", "mpi", "overhead"]);
    }
}
