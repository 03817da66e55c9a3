pub mod call_tree;
pub mod enumeration;
pub mod metric;
pub mod profile;
pub mod system_tree;

pub use call_tree::{CallNode, ParameterValue, PreOrder, Region};
pub use enumeration::TreeEnumeration;
pub use metric::{Metric, MetricType};
pub use profile::Profile;
pub use system_tree::{Location, LocationGroup, SystemTreeNode};
