use serde::Serialize;
use thiserror::Error;

use super::{Complex, CubeValue, Int, Rate, TauAtomic};
use crate::parsers::cursor::{ByteOrder, array};

/// Largest `u64` that survives a round trip through `f64`. Cube tools cast
/// UINT64 values through `double`, which is undefined for anything larger;
/// those values are read as zero unless full-range values are requested.
pub const UINT64_DOUBLE_LIMIT: u64 = 0xFFFF_FFFF_FFFF_FBFF;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported metric data type `{data_type}`")]
pub struct UnsupportedFormat {
    pub data_type: String,
}

/// Declared width and signedness of an integer metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IntType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    /// Result of a sum that left its declared range.
    Wide,
}

impl IntType {
    pub fn min(self) -> i128 {
        match self {
            Self::I8 => i8::MIN.into(),
            Self::I16 => i16::MIN.into(),
            Self::I32 => i32::MIN.into(),
            Self::I64 => i64::MIN.into(),
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => 0,
            Self::Wide => i128::MIN,
        }
    }

    pub fn max(self) -> i128 {
        match self {
            Self::I8 => i8::MAX.into(),
            Self::I16 => i16::MAX.into(),
            Self::I32 => i32::MAX.into(),
            Self::I64 => i64::MAX.into(),
            Self::U8 => u8::MAX.into(),
            Self::U16 => u16::MAX.into(),
            Self::U32 => u32::MAX.into(),
            Self::U64 => u64::MAX.into(),
            Self::Wide => i128::MAX,
        }
    }

    pub fn contains(self, value: i128) -> bool {
        (self.min()..=self.max()).contains(&value)
    }

    /// Two's-complement wrap into the declared width.
    pub fn wrap(self, value: i128) -> i128 {
        match self {
            Self::I8 => (value as i8).into(),
            Self::I16 => (value as i16).into(),
            Self::I32 => (value as i32).into(),
            Self::I64 => (value as i64).into(),
            Self::U8 => (value as u8).into(),
            Self::U16 => (value as u16).into(),
            Self::U32 => (value as u32).into(),
            Self::U64 => (value as u64).into(),
            Self::Wide => value,
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 => 4,
            Self::I64 | Self::U64 => 8,
            Self::Wide => 16,
        }
    }

    fn decode(self, bytes: &[u8], order: ByteOrder) -> i128 {
        match self {
            Self::I8 => (bytes[0] as i8).into(),
            Self::U8 => bytes[0].into(),
            Self::I16 => (order.u16(array(bytes)) as i16).into(),
            Self::U16 => order.u16(array(bytes)).into(),
            Self::I32 => (order.u32(array(bytes)) as i32).into(),
            Self::U32 => order.u32(array(bytes)).into(),
            Self::I64 => (order.u64(array(bytes)) as i64).into(),
            Self::U64 => order.u64(array(bytes)).into(),
            Self::Wide => match order {
                ByteOrder::Little => i128::from_le_bytes(array(bytes)),
                ByteOrder::Big => i128::from_be_bytes(array(bytes)),
            },
        }
    }
}

/// Binary layout and value semantics of a metric's data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueKind {
    Int(IntType),
    Double,
    MinDouble,
    MaxDouble,
    Complex,
    Rate,
    TauAtomic,
    NDoubles(usize),
}

impl ValueKind {
    /// Resolve a declared data type such as `UINT64` or `NDOUBLES(10)`.
    pub fn parse(data_type: &str) -> Result<Self, UnsupportedFormat> {
        let unsupported = || UnsupportedFormat {
            data_type: data_type.to_string(),
        };
        let trimmed = data_type.trim();
        let (base, params): (&str, Vec<&str>) = match trimmed.split_once('(') {
            Some((base, rest)) => {
                let inner = rest.trim_end().strip_suffix(')').ok_or_else(unsupported)?;
                (base.trim_end(), inner.split(',').map(str::trim).collect())
            }
            None => (trimmed, Vec::new()),
        };
        Self::from_base(base, &params).ok_or_else(unsupported)
    }

    fn from_base(base: &str, params: &[&str]) -> Option<Self> {
        let kind = match base {
            "CHAR" | "UINT8" => Self::Int(IntType::U8),
            "INT8" => Self::Int(IntType::I8),
            "INT16" | "SHORT INT" | "SIGNED SHORT INT" => Self::Int(IntType::I16),
            "UINT16" | "UNSIGNED SHORT INT" => Self::Int(IntType::U16),
            "INT" | "INT32" | "SIGNED INT" => Self::Int(IntType::I32),
            "UINT32" | "UNSIGNED INT" => Self::Int(IntType::U32),
            "INT64" | "INTEGER" | "SIGNED INTEGER" => Self::Int(IntType::I64),
            "UINT64" | "UNSIGNED INTEGER" => Self::Int(IntType::U64),
            // FLOAT is stored as a 64-bit double.
            "DOUBLE" | "FLOAT" => Self::Double,
            "MINDOUBLE" => Self::MinDouble,
            "MAXDOUBLE" => Self::MaxDouble,
            "COMPLEX" => Self::Complex,
            "RATE" => Self::Rate,
            "TAU_ATOMIC" => Self::TauAtomic,
            "NDOUBLES" => {
                let &[n] = params else {
                    return None;
                };
                let n: usize = n.parse().ok().filter(|&n| n > 0)?;
                return Some(Self::NDoubles(n));
            }
            _ => return None,
        };
        params.is_empty().then_some(kind)
    }

    /// Size in bytes of one stored element.
    pub fn element_size(&self) -> usize {
        match *self {
            Self::Int(ty) => ty.size(),
            Self::Double | Self::MinDouble | Self::MaxDouble => 8,
            Self::Complex | Self::Rate => 16,
            // Packed: u32 count followed by four doubles.
            Self::TauAtomic => 4 + 4 * 8,
            Self::NDoubles(n) => 8 * n,
        }
    }

    pub fn int_type(&self) -> Option<IntType> {
        match *self {
            Self::Int(ty) => Some(ty),
            _ => None,
        }
    }

    /// Decode one element of exactly [`element_size`](Self::element_size)
    /// bytes.
    pub(crate) fn decode(&self, bytes: &[u8], order: ByteOrder, allow_full_uint64_values: bool) -> CubeValue {
        let f64_at = |offset: usize| order.f64(array(&bytes[offset..]));
        match *self {
            Self::Int(ty) => {
                let mut value = ty.decode(bytes, order);
                if ty == IntType::U64 && !allow_full_uint64_values && value > i128::from(UINT64_DOUBLE_LIMIT) {
                    value = 0;
                }
                CubeValue::Int(Int::new(value, ty))
            }
            Self::Double => CubeValue::Double(f64_at(0)),
            Self::MinDouble => CubeValue::Min(f64_at(0)),
            Self::MaxDouble => CubeValue::Max(f64_at(0)),
            Self::Complex => CubeValue::Complex(Complex {
                re: f64_at(0),
                im: f64_at(8),
            }),
            Self::Rate => CubeValue::Rate(Rate {
                main: f64_at(0),
                time: f64_at(8),
            }),
            Self::TauAtomic => CubeValue::TauAtomic(TauAtomic {
                n: order.u32(array(bytes)),
                min: f64_at(4),
                max: f64_at(12),
                sum: f64_at(20),
                sum2: f64_at(28),
            }),
            Self::NDoubles(n) => CubeValue::NDoubles((0..n).map(|i| f64_at(i * 8)).collect()),
        }
    }

    /// All-zero value, used for call nodes a sparse metric has no data for.
    pub fn zero(&self) -> CubeValue {
        match *self {
            Self::Int(ty) => CubeValue::Int(Int::new(0, ty)),
            Self::Double => CubeValue::Double(0.0),
            Self::MinDouble => CubeValue::Min(0.0),
            Self::MaxDouble => CubeValue::Max(0.0),
            Self::Complex => CubeValue::Complex(Complex::default()),
            Self::Rate => CubeValue::Rate(Rate::default()),
            Self::TauAtomic => CubeValue::TauAtomic(TauAtomic::default()),
            Self::NDoubles(n) => CubeValue::NDoubles(vec![0.0; n]),
        }
    }

    /// Identity element of `add` for this kind.
    pub fn neutral(&self) -> CubeValue {
        match *self {
            Self::MinDouble => CubeValue::Min(f64::INFINITY),
            Self::MaxDouble => CubeValue::Max(f64::NEG_INFINITY),
            Self::TauAtomic => CubeValue::TauAtomic(TauAtomic::NEUTRAL),
            _ => self.zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_aliases() {
        assert_eq!(ValueKind::parse("UINT64"), Ok(ValueKind::Int(IntType::U64)));
        assert_eq!(ValueKind::parse("UNSIGNED INTEGER"), Ok(ValueKind::Int(IntType::U64)));
        assert_eq!(ValueKind::parse("SHORT INT"), Ok(ValueKind::Int(IntType::I16)));
        assert_eq!(ValueKind::parse("CHAR"), Ok(ValueKind::Int(IntType::U8)));
        assert_eq!(ValueKind::parse("FLOAT"), Ok(ValueKind::Double));
        assert_eq!(ValueKind::parse("MINDOUBLE"), Ok(ValueKind::MinDouble));
    }

    #[test]
    fn parses_parameter_list() {
        assert_eq!(ValueKind::parse("NDOUBLES(10)"), Ok(ValueKind::NDoubles(10)));
        assert_eq!(ValueKind::parse("NDOUBLES ( 3 ) "), Ok(ValueKind::NDoubles(3)));
        assert_eq!(ValueKind::NDoubles(3).element_size(), 24);
    }

    #[test]
    fn rejects_unknown_and_malformed_types() {
        for bad in ["HISTOGRAM(5)", "SCALE_FUNC", "NDOUBLES", "NDOUBLES(0)", "NDOUBLES(x)", "NDOUBLES(2,3)", "DOUBLE(2)", "NDOUBLES(4"] {
            let err = ValueKind::parse(bad).unwrap_err();
            assert_eq!(err.data_type, bad);
        }
    }

    #[test]
    fn element_sizes() {
        assert_eq!(ValueKind::TauAtomic.element_size(), 36);
        assert_eq!(ValueKind::Complex.element_size(), 16);
        assert_eq!(ValueKind::Int(IntType::I16).element_size(), 2);
    }

    #[test]
    fn uint64_beyond_double_range_reads_as_zero_unless_allowed() {
        let bytes = u64::MAX.to_le_bytes();
        let kind = ValueKind::Int(IntType::U64);
        assert_eq!(kind.decode(&bytes, ByteOrder::Little, false).as_int(), Some(0));
        assert_eq!(
            kind.decode(&bytes, ByteOrder::Little, true).as_int(),
            Some(i128::from(u64::MAX))
        );

        let limit = UINT64_DOUBLE_LIMIT.to_le_bytes();
        assert_eq!(
            kind.decode(&limit, ByteOrder::Little, false).as_int(),
            Some(i128::from(UINT64_DOUBLE_LIMIT))
        );
    }

    #[test]
    fn decodes_tau_atomic_packed_layout() {
        let mut bytes = 4u32.to_be_bytes().to_vec();
        for v in [1.0f64, 3.0, 8.0, 18.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let value = ValueKind::TauAtomic.decode(&bytes, ByteOrder::Big, false);
        assert_eq!(
            value,
            CubeValue::TauAtomic(TauAtomic {
                n: 4,
                min: 1.0,
                max: 3.0,
                sum: 8.0,
                sum2: 18.0
            })
        );
    }

    #[test]
    fn signed_decoding_and_wrapping() {
        let kind = ValueKind::Int(IntType::I16);
        let bytes = (-2i16).to_le_bytes();
        assert_eq!(kind.decode(&bytes, ByteOrder::Little, false).as_int(), Some(-2));
        assert_eq!(IntType::U8.wrap(256 + 7), 7);
        assert_eq!(IntType::I8.wrap(128), -128);
        assert!(IntType::U32.contains(u32::MAX.into()));
        assert!(!IntType::U32.contains(-1));
    }
}
