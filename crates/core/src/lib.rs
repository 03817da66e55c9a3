//! Reader for CUBE4 `.cubex` performance profiles.
//!
//! A profile is a tar archive holding `anchor.xml` (metric tree, regions,
//! call tree, system tree) and, per metric, a binary index and data member.
//! [`CubexArchive`] opens the archive; [`MetricValues`] answers per call node
//! queries with inclusive/exclusive conversion.

pub mod archive;
pub mod error;
pub mod metric_values;
pub mod model;
pub mod parsers;
pub mod values;

pub use archive::{ArchiveOptions, CubexArchive};
pub use error::{CubexError, Result};
pub use metric_values::{Conversion, MetricValues, extract_metric_values};
pub use model::{CallNode, Metric, MetricType, Profile, Region};
pub use values::{CubeValue, ValueKind, ValueOps};
