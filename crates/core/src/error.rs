use thiserror::Error;

use crate::parsers::ParseError;
use crate::parsers::index::IndexParseError;

#[derive(Debug, Error)]
pub enum CubexError {
    /// The archive has no index/data pair for this metric. Common and
    /// recoverable: not every run records every metric.
    #[error("the archive does not contain an index and/or data for metric `{metric}`")]
    MissingMetric { metric: String },
    /// The index header is fine but its node count disagrees with its size.
    #[error("corrupt index for metric `{metric}`: {source}")]
    CorruptIndex {
        metric: String,
        #[source]
        source: IndexParseError,
    },
    #[error("unsupported format `{format}` of metric `{metric}`")]
    UnsupportedMetricFormat { format: String, metric: String },
    /// A member of the metric is not in the expected binary format.
    #[error("invalid {source} for metric `{metric}`")]
    Format {
        metric: String,
        #[source]
        source: ParseError,
    },
    #[error("metric `{metric}` index names tree position {position}, which has no call node")]
    UnresolvedTreePosition { metric: String, position: i32 },
    #[error(
        "metric `{metric}` has {values} values for {positions} indexed call nodes, not a whole number of rows"
    )]
    RowMismatch {
        metric: String,
        values: usize,
        positions: usize,
    },
    #[error("metric `{metric}` has {found} locations, the profile has {expected}")]
    LocationCountMismatch {
        metric: String,
        expected: usize,
        found: usize,
    },
    #[error("convert_to_exclusive and convert_to_inclusive must not both be set")]
    InvalidConversionInstruction,
    #[error("unknown call node {0}")]
    UnknownCallNode(u64),
    #[error("location {location} out of range for {num_locations} locations")]
    LocationOutOfRange { location: usize, num_locations: usize },
    #[error("archive member `{member}`: {source}")]
    Member {
        member: String,
        #[source]
        source: std::io::Error,
    },
    #[error("missing archive member `{0}`")]
    MissingMember(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CubexError {
    pub fn is_missing_metric(&self) -> bool {
        matches!(self, Self::MissingMetric { .. })
    }

    pub fn is_corrupt_index(&self) -> bool {
        matches!(self, Self::CorruptIndex { .. })
    }
}

pub type Result<T> = std::result::Result<T, CubexError>;
