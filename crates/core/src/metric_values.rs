//! Per-metric value table and inclusive/exclusive conversion.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{CubexError, Result};
use crate::model::{CallNode, Metric, MetricType};
use crate::parsers::ParseError;
use crate::parsers::data::{DataParseError, parse_data};
use crate::parsers::index::{IndexParseError, parse_index};
use crate::values::{self, CubeValue, ValueKind, ValueOps};

/// Orientation requested for the values of a call node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Conversion {
    /// Values as stored.
    #[default]
    None,
    ToExclusive,
    ToInclusive,
}

impl Conversion {
    /// Map the two-flag form used by CUBE tooling. Setting both is an error.
    pub fn from_flags(to_exclusive: bool, to_inclusive: bool) -> Result<Self> {
        match (to_exclusive, to_inclusive) {
            (true, true) => Err(CubexError::InvalidConversionInstruction),
            (true, false) => Ok(Self::ToExclusive),
            (false, true) => Ok(Self::ToInclusive),
            (false, false) => Ok(Self::None),
        }
    }
}

/// Values of one metric: a row of `num_locations` values for every call
/// node listed in the metric's index.
#[derive(Debug, Clone, Serialize)]
pub struct MetricValues {
    metric_id: u64,
    metric_name: String,
    metric_type: MetricType,
    kind: ValueKind,
    num_locations: usize,
    /// Call node id → row number.
    cnode_indices: HashMap<u64, usize>,
    values: Vec<CubeValue>,
}

impl MetricValues {
    /// `cnode_ids` lists the call nodes in the order their rows appear in
    /// `values`.
    pub fn new(metric: &Metric, kind: ValueKind, cnode_ids: &[u64], values: Vec<CubeValue>) -> Result<Self> {
        let row_mismatch = || CubexError::RowMismatch {
            metric: metric.name.clone(),
            values: values.len(),
            positions: cnode_ids.len(),
        };
        if cnode_ids.is_empty() || values.len() % cnode_ids.len() != 0 {
            return Err(row_mismatch());
        }
        let num_locations = values.len() / cnode_ids.len();

        let mut cnode_indices = HashMap::with_capacity(cnode_ids.len());
        for (row, &cid) in cnode_ids.iter().enumerate() {
            cnode_indices.entry(cid).or_insert(row);
        }
        Ok(Self {
            metric_id: metric.id,
            metric_name: metric.name.clone(),
            metric_type: metric.metric_type,
            kind,
            num_locations,
            cnode_indices,
            values,
        })
    }

    pub fn metric_id(&self) -> u64 {
        self.metric_id
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn num_locations(&self) -> usize {
        self.num_locations
    }

    /// Call node id → row number, for the call nodes that carry data.
    pub fn cnode_indices(&self) -> &HashMap<u64, usize> {
        &self.cnode_indices
    }

    pub fn has_data(&self, cnode_id: u64) -> bool {
        self.cnode_indices.contains_key(&cnode_id)
    }

    fn stored_row(&self, cnode_id: u64) -> Option<&[CubeValue]> {
        let row = *self.cnode_indices.get(&cnode_id)?;
        let start = row * self.num_locations;
        self.values.get(start..start + self.num_locations)
    }

    /// Per-location values of `cnode`, always `num_locations` long.
    ///
    /// A call node without data reads as a row of zeros. When converting,
    /// such a node contributes nothing: the walk starts from the kind's
    /// neutral element, so a MIN rollup over children {4, 7} is 4, not 0.
    /// The returned row is a copy; converting never touches the stored
    /// values.
    pub fn cnode_values(&self, cnode: &CallNode, conversion: Conversion) -> Vec<CubeValue> {
        let own = self.stored_row(cnode.id);
        let (others, op): (Vec<&[CubeValue]>, fn(&CubeValue, &CubeValue) -> CubeValue) =
            match (conversion, self.metric_type) {
                (Conversion::ToInclusive, MetricType::Exclusive) => (
                    cnode.descendants().filter_map(|d| self.stored_row(d.id)).collect(),
                    CubeValue::add,
                ),
                (Conversion::ToExclusive, MetricType::Inclusive) => (
                    cnode.children.iter().filter_map(|c| self.stored_row(c.id)).collect(),
                    CubeValue::sub,
                ),
                _ => (Vec::new(), CubeValue::add),
            };

        let mut row = match own {
            Some(row) => row.to_vec(),
            None if others.is_empty() => return vec![self.kind.zero(); self.num_locations],
            None => vec![self.kind.neutral(); self.num_locations],
        };
        for other in others {
            for (acc, v) in row.iter_mut().zip(other) {
                *acc = op(acc, v);
            }
        }
        row
    }

    pub fn location_value(&self, cnode: &CallNode, location: usize, conversion: Conversion) -> Result<CubeValue> {
        if location >= self.num_locations {
            return Err(CubexError::LocationOutOfRange {
                location,
                num_locations: self.num_locations,
            });
        }
        let mut row = self.cnode_values(cnode, conversion);
        Ok(row.swap_remove(location))
    }

    /// Sum over all locations.
    pub fn value(&self, cnode: &CallNode, conversion: Conversion) -> CubeValue {
        values::sum(self.kind, &self.cnode_values(cnode, conversion))
    }

    /// Scalar sum over all locations divided by the location count.
    pub fn mean(&self, cnode: &CallNode, conversion: Conversion) -> f64 {
        if self.num_locations == 0 {
            return 0.0;
        }
        self.value(cnode, conversion).to_scalar() / self.num_locations as f64
    }
}

/// Build the value table of `metric` from its index and data members.
pub fn extract_metric_values(
    metric: &Metric,
    index: &[u8],
    data: &[u8],
    allow_full_uint64_values: bool,
) -> Result<MetricValues> {
    let malformed = |source: ParseError| CubexError::Format {
        metric: metric.name.clone(),
        source,
    };
    let index = parse_index(index).map_err(|source| match source {
        IndexParseError::Corrupt { .. } | IndexParseError::Empty => CubexError::CorruptIndex {
            metric: metric.name.clone(),
            source,
        },
        source => malformed(source.into()),
    })?;

    let unsupported = |format: String| CubexError::UnsupportedMetricFormat {
        format,
        metric: metric.name.clone(),
    };
    let kind = ValueKind::parse(&metric.data_type).map_err(|e| unsupported(e.data_type))?;
    let values = parse_data(data, &metric.data_type, index.byte_order, allow_full_uint64_values).map_err(
        |source| match source {
            DataParseError::Unsupported(e) => unsupported(e.data_type),
            source => malformed(source.into()),
        },
    )?;

    let cnode_ids = index
        .tree_positions
        .iter()
        .map(|&position| {
            usize::try_from(position)
                .ok()
                .and_then(|p| metric.tree_index_to_cid(p))
                .ok_or_else(|| CubexError::UnresolvedTreePosition {
                    metric: metric.name.clone(),
                    position,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        "metric {}: {} call nodes with data, {} values",
        metric.name,
        cnode_ids.len(),
        values.len()
    );
    MetricValues::new(metric, kind, &cnode_ids, values)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::TreeEnumeration;
    use crate::parsers::index::INDEX_HEADER;
    use crate::values::{Int, IntType, TauAtomic};

    const VISITS: [u64; 18] = [1, 1, 1, 1, 2, 3, 2, 2, 4, 6, 3, 3, 6, 9, 4, 4, 8, 12];
    const VISITS_INCLUSIVE: [u64; 18] = [72, 71, 7, 1, 2, 3, 14, 2, 4, 6, 21, 3, 6, 9, 28, 4, 8, 12];

    /// root(0) → main(1) → four children, each with three leaves; ids are
    /// assigned in pre-order.
    fn tree() -> CallNode {
        let mut next = 2;
        let mut kernels = Vec::new();
        for _ in 0..4 {
            let id = next;
            let leaves = (1..=3).map(|i| CallNode::new(id + i, id + i)).collect();
            kernels.push(CallNode::new(id, id).with_children(leaves));
            next += 4;
        }
        CallNode::new(0, 0).with_children(vec![CallNode::new(1, 1).with_children(kernels)])
    }

    fn find(root: &CallNode, id: u64) -> &CallNode {
        root.walk().find(|c| c.id == id).unwrap()
    }

    fn uints(values: &[u64]) -> Vec<CubeValue> {
        values
            .iter()
            .map(|&v| CubeValue::Int(Int::new(v.into(), IntType::U64)))
            .collect()
    }

    fn table(metric_type: MetricType, ids: &[u64], values: Vec<CubeValue>, kind: ValueKind) -> MetricValues {
        let metric = Metric::new(0, "m", metric_type, "UINT64");
        MetricValues::new(&metric, kind, ids, values).unwrap()
    }

    fn u64_table(metric_type: MetricType, values: &[u64]) -> MetricValues {
        let ids: Vec<u64> = (0..values.len() as u64).collect();
        table(metric_type, &ids, uints(values), ValueKind::Int(IntType::U64))
    }

    #[test]
    fn rows_by_call_node() {
        let root = tree();
        let visits = u64_table(MetricType::Exclusive, &VISITS);
        assert_eq!(visits.num_locations(), 1);
        assert_eq!(visits.cnode_values(find(&root, 5), Conversion::None), uints(&[3]));
        assert_eq!(visits.cnode_values(find(&root, 5), Conversion::ToExclusive), uints(&[3]));
    }

    #[test]
    fn exclusive_to_inclusive_sums_subtrees() {
        let root = tree();
        let visits = u64_table(MetricType::Exclusive, &VISITS);
        for (id, &expected) in VISITS_INCLUSIVE.iter().enumerate() {
            let node = find(&root, id as u64);
            assert_eq!(visits.cnode_values(node, Conversion::ToInclusive), uints(&[expected]));
        }
    }

    #[test]
    fn inclusive_to_exclusive_subtracts_children() {
        let root = tree();
        let visits = u64_table(MetricType::Inclusive, &VISITS_INCLUSIVE);
        for (id, &expected) in VISITS.iter().enumerate() {
            let node = find(&root, id as u64);
            assert_eq!(visits.cnode_values(node, Conversion::ToExclusive), uints(&[expected]));
        }
    }

    #[test]
    fn round_trip_through_inclusive() {
        let root = tree();
        let exclusive = u64_table(MetricType::Exclusive, &VISITS);
        let ids: Vec<u64> = root.walk().map(|c| c.id).collect();
        let inclusive_rows: Vec<CubeValue> = ids
            .iter()
            .flat_map(|&id| exclusive.cnode_values(find(&root, id), Conversion::ToInclusive))
            .collect();
        let inclusive = table(MetricType::Inclusive, &ids, inclusive_rows, ValueKind::Int(IntType::U64));
        for &id in &ids {
            let node = find(&root, id);
            assert_eq!(
                inclusive.cnode_values(node, Conversion::ToExclusive),
                exclusive.cnode_values(node, Conversion::None)
            );
        }
    }

    #[test]
    fn sparse_rows_default_to_zero() {
        let root = tree();
        let values = vec![CubeValue::Double(1.5), CubeValue::Double(2.5)];
        let sparse = table(MetricType::Exclusive, &[3, 9], values, ValueKind::Double);
        assert_eq!(sparse.num_locations(), 1);
        assert!(!sparse.has_data(2));
        assert_eq!(sparse.cnode_values(find(&root, 2), Conversion::None), vec![CubeValue::Double(0.0)]);
        assert_eq!(
            sparse.cnode_values(find(&root, 1), Conversion::ToInclusive),
            vec![CubeValue::Double(4.0)]
        );
    }

    #[test]
    fn subtraction_clamps_instead_of_wrapping() {
        let noisy = CallNode::new(0, 0).with_children(vec![CallNode::new(1, 1), CallNode::new(2, 2)]);
        let values = u64_table(MetricType::Inclusive, &[5, 3, 4]);
        assert_eq!(values.cnode_values(&noisy, Conversion::ToExclusive), uints(&[0]));
    }

    #[test]
    fn min_metrics_roll_up_with_min() {
        let root = CallNode::new(0, 0).with_children(vec![CallNode::new(1, 1)]);
        let rows = vec![CubeValue::Min(4.0), CubeValue::Min(1.0)];
        let min_time = table(MetricType::Exclusive, &[0, 1], rows, ValueKind::MinDouble);
        assert_eq!(
            min_time.cnode_values(&root, Conversion::ToInclusive),
            vec![CubeValue::Min(1.0)]
        );
    }

    #[test]
    fn rollup_skips_parents_without_data() {
        let root = CallNode::new(0, 0).with_children(vec![CallNode::new(1, 1), CallNode::new(2, 2)]);
        let rows = vec![CubeValue::Min(4.0), CubeValue::Min(7.0)];
        let min_time = table(MetricType::Exclusive, &[1, 2], rows, ValueKind::MinDouble);
        assert_eq!(min_time.cnode_values(&root, Conversion::None), vec![CubeValue::Min(0.0)]);
        assert_eq!(
            min_time.cnode_values(&root, Conversion::ToInclusive),
            vec![CubeValue::Min(4.0)]
        );

        let sample = |n, min, max| {
            CubeValue::TauAtomic(TauAtomic {
                n,
                min,
                max,
                sum: f64::from(n) * min,
                sum2: 0.0,
            })
        };
        let rows = vec![sample(2, 3.0, 5.0), sample(1, 6.0, 9.0)];
        let stats = table(MetricType::Exclusive, &[1, 2], rows, ValueKind::TauAtomic);
        assert_eq!(
            stats.cnode_values(&root, Conversion::ToInclusive),
            vec![CubeValue::TauAtomic(TauAtomic {
                n: 3,
                min: 3.0,
                max: 9.0,
                sum: 12.0,
                sum2: 0.0,
            })]
        );

        let leaf = CallNode::new(5, 5);
        assert_eq!(
            stats.cnode_values(&leaf, Conversion::ToInclusive),
            vec![CubeValue::TauAtomic(TauAtomic::default())]
        );
    }

    #[test]
    fn value_mean_and_location_value() {
        let root = CallNode::new(0, 0);
        let rows = vec![CubeValue::Double(1.0), CubeValue::Double(2.0), CubeValue::Double(6.0)];
        let time = table(MetricType::Inclusive, &[0], rows, ValueKind::Double);
        assert_eq!(time.num_locations(), 3);
        assert_eq!(time.value(&root, Conversion::None), CubeValue::Double(9.0));
        assert_eq!(time.mean(&root, Conversion::None), 3.0);
        assert_eq!(
            time.location_value(&root, 2, Conversion::None).unwrap(),
            CubeValue::Double(6.0)
        );
        assert!(matches!(
            time.location_value(&root, 3, Conversion::None),
            Err(CubexError::LocationOutOfRange { .. })
        ));
    }

    #[test]
    fn conversion_flags() {
        assert_eq!(Conversion::from_flags(false, false).unwrap(), Conversion::None);
        assert_eq!(Conversion::from_flags(true, false).unwrap(), Conversion::ToExclusive);
        assert_eq!(Conversion::from_flags(false, true).unwrap(), Conversion::ToInclusive);
        assert!(matches!(
            Conversion::from_flags(true, true),
            Err(CubexError::InvalidConversionInstruction)
        ));
    }

    #[test]
    fn rejects_ragged_rows() {
        let metric = Metric::new(0, "m", MetricType::Exclusive, "DOUBLE");
        let values = vec![CubeValue::Double(0.0); 3];
        assert!(matches!(
            MetricValues::new(&metric, ValueKind::Double, &[0, 1], values),
            Err(CubexError::RowMismatch { .. })
        ));
    }

    fn index(positions: &[i32]) -> Vec<u8> {
        let mut out = INDEX_HEADER.to_vec();
        out.extend_from_slice(&1i32.to_le_bytes());
        out.extend_from_slice(&0i16.to_le_bytes());
        out.push(0);
        out.extend_from_slice(&(positions.len() as i32).to_le_bytes());
        positions.iter().for_each(|p| out.extend_from_slice(&p.to_le_bytes()));
        out
    }

    fn metric_on(root: &CallNode, metric_type: MetricType, data_type: &str) -> Metric {
        let mut metric = Metric::new(7, "bytes_sent", metric_type, data_type);
        metric.tree_enumeration = Arc::new(TreeEnumeration::for_metric_type(
            std::slice::from_ref(root),
            metric_type,
        ));
        metric
    }

    #[test]
    fn extraction_resolves_positions_through_enumeration() {
        let root = tree();
        let metric = metric_on(&root, MetricType::Inclusive, "DOUBLE");
        // Wide positions 2 and 3 are call nodes 2 and 6.
        let mut data = crate::parsers::data::DATA_HEADER.to_vec();
        data.extend_from_slice(&1.0f64.to_le_bytes());
        data.extend_from_slice(&2.0f64.to_le_bytes());
        let values = extract_metric_values(&metric, &index(&[2, 3]), &data, false).unwrap();
        assert!(values.has_data(2) && values.has_data(6));
        assert_eq!(values.cnode_values(find(&root, 6), Conversion::None), vec![CubeValue::Double(2.0)]);
    }

    #[test]
    fn extraction_errors_are_distinguishable() {
        let root = tree();
        let metric = metric_on(&root, MetricType::Exclusive, "HISTOGRAM(3)");
        let data = crate::parsers::data::DATA_HEADER.to_vec();
        assert!(matches!(
            extract_metric_values(&metric, &index(&[0]), &data, false),
            Err(CubexError::UnsupportedMetricFormat { .. })
        ));

        let metric = metric_on(&root, MetricType::Exclusive, "DOUBLE");
        let mut bad_index = index(&[0, 1]);
        bad_index.pop();
        let err = extract_metric_values(&metric, &bad_index, &data, false).unwrap_err();
        assert!(err.is_corrupt_index());

        assert!(matches!(
            extract_metric_values(&metric, &index(&[99]), &data, false),
            Err(CubexError::UnresolvedTreePosition { position: 99, .. })
        ));
    }

    #[test]
    fn index_header_mismatch_is_a_format_error() {
        let root = tree();
        let metric = metric_on(&root, MetricType::Exclusive, "DOUBLE");
        let data = crate::parsers::data::DATA_HEADER.to_vec();

        let mut wrong_magic = index(&[0]);
        wrong_magic[0] = b'X';
        let err = extract_metric_values(&metric, &wrong_magic, &data, false).unwrap_err();
        assert!(!err.is_corrupt_index());
        assert!(matches!(
            err,
            CubexError::Format {
                source: ParseError::Index(IndexParseError::Header),
                ..
            }
        ));

        let truncated = &index(&[0])[..INDEX_HEADER.len() + 2];
        let err = extract_metric_values(&metric, truncated, &data, false).unwrap_err();
        assert!(matches!(
            err,
            CubexError::Format {
                source: ParseError::Index(IndexParseError::Truncated(_)),
                ..
            }
        ));

        assert!(matches!(
            extract_metric_values(&metric, &index(&[]), &data, false),
            Err(CubexError::CorruptIndex {
                source: IndexParseError::Empty,
                ..
            })
        ));
    }

    #[test]
    fn bad_data_header_is_a_format_error() {
        let root = tree();
        let metric = metric_on(&root, MetricType::Exclusive, "DOUBLE");
        let err = extract_metric_values(&metric, &index(&[0]), b"XUBEX.DATA", false).unwrap_err();
        assert!(matches!(
            err,
            CubexError::Format {
                source: ParseError::Data(DataParseError::Header),
                ..
            }
        ));
    }
}
