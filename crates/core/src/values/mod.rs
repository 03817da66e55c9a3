//! Typed metric values and the arithmetic used to roll them up the call tree.

pub mod kind;
pub mod overflow;

use serde::{Serialize, Serializer};

pub use kind::{IntType, UINT64_DOUBLE_LIMIT, UnsupportedFormat, ValueKind};

/// Operations every value kind supports during inclusive/exclusive
/// conversion and aggregation.
pub trait ValueOps: Sized {
    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn neutral(&self) -> Self;
    fn to_scalar(&self) -> f64;
}

/// An integer of a declared width, stored wide enough for every width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Int {
    value: i128,
    ty: IntType,
}

impl Int {
    pub fn new(value: i128, ty: IntType) -> Self {
        Self { value, ty }
    }

    pub fn value(self) -> i128 {
        self.value
    }

    pub fn ty(self) -> IntType {
        self.ty
    }
}

impl Serialize for Int {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i128(self.value)
    }
}

impl ValueOps for Int {
    fn add(&self, other: &Self) -> Self {
        Self::new(self.ty.wrap(self.value.wrapping_add(other.value)), self.ty)
    }

    fn sub(&self, other: &Self) -> Self {
        let subtrahend = overflow::clamp_subtrahend(self.value, other.value, self.ty);
        Self::new(self.value.wrapping_sub(subtrahend), self.ty)
    }

    fn neutral(&self) -> Self {
        Self::new(0, self.ty)
    }

    fn to_scalar(&self) -> f64 {
        self.value as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl ValueOps for Complex {
    fn add(&self, other: &Self) -> Self {
        Self {
            re: self.re + other.re,
            im: self.im + other.im,
        }
    }

    fn sub(&self, other: &Self) -> Self {
        Self {
            re: self.re - other.re,
            im: self.im - other.im,
        }
    }

    fn neutral(&self) -> Self {
        Self::default()
    }

    fn to_scalar(&self) -> f64 {
        self.re
    }
}

/// A ratio kept as numerator and denominator so that it can be summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Rate {
    pub main: f64,
    pub time: f64,
}

impl ValueOps for Rate {
    fn add(&self, other: &Self) -> Self {
        Self {
            main: self.main + other.main,
            time: self.time + other.time,
        }
    }

    fn sub(&self, other: &Self) -> Self {
        Self {
            main: self.main - other.main,
            time: self.time - other.time,
        }
    }

    fn neutral(&self) -> Self {
        Self::default()
    }

    /// `main / time`; a zero denominator saturates to `±f64::MAX`.
    fn to_scalar(&self) -> f64 {
        if self.time == 0.0 {
            if self.main < 0.0 { -f64::MAX } else { f64::MAX }
        } else {
            self.main / self.time
        }
    }
}

/// Running statistic over a set of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TauAtomic {
    pub n: u32,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub sum2: f64,
}

impl TauAtomic {
    pub const NEUTRAL: Self = Self {
        n: 0,
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        sum: 0.0,
        sum2: 0.0,
    };
}

impl ValueOps for TauAtomic {
    fn add(&self, other: &Self) -> Self {
        Self {
            n: self.n.saturating_add(other.n),
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum + other.sum,
            sum2: self.sum2 + other.sum2,
        }
    }

    // min/max cannot be un-merged; they move the same way as MIN/MAX values.
    // The sample count clamps to the u32 range in both directions.
    fn sub(&self, other: &Self) -> Self {
        Self {
            n: self.n.saturating_sub(other.n),
            min: self.min.max(other.min),
            max: self.max.min(other.max),
            sum: self.sum - other.sum,
            sum2: self.sum2 - other.sum2,
        }
    }

    fn neutral(&self) -> Self {
        Self::NEUTRAL
    }

    /// Mean of the samples, 0 for an empty statistic.
    fn to_scalar(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.sum / f64::from(self.n) }
    }
}

/// One decoded metric value.
///
/// `Min` keeps the smaller operand on add and the larger on subtract;
/// subtracting undoes an inclusive rollup, so it moves opposite to add.
/// `Max` is the dual.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CubeValue {
    Int(Int),
    Double(f64),
    Min(f64),
    Max(f64),
    Complex(Complex),
    TauAtomic(TauAtomic),
    Rate(Rate),
    NDoubles(Vec<f64>),
}

impl CubeValue {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(i) => Some(i.value()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Double(v) | Self::Min(v) | Self::Max(v) => Some(v),
            _ => None,
        }
    }
}

fn zip_with(a: &[f64], b: &[f64], op: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(&x, &y)| op(x, y)).collect()
}

impl ValueOps for CubeValue {
    /// Mismatched kinds leave `self` unchanged.
    fn add(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.add(b)),
            (Self::Double(a), Self::Double(b)) => Self::Double(a + b),
            (Self::Min(a), Self::Min(b)) => Self::Min(a.min(*b)),
            (Self::Max(a), Self::Max(b)) => Self::Max(a.max(*b)),
            (Self::Complex(a), Self::Complex(b)) => Self::Complex(a.add(b)),
            (Self::TauAtomic(a), Self::TauAtomic(b)) => Self::TauAtomic(a.add(b)),
            (Self::Rate(a), Self::Rate(b)) => Self::Rate(a.add(b)),
            (Self::NDoubles(a), Self::NDoubles(b)) => Self::NDoubles(zip_with(a, b, |x, y| x + y)),
            _ => self.clone(),
        }
    }

    fn sub(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.sub(b)),
            (Self::Double(a), Self::Double(b)) => Self::Double(a - b),
            (Self::Min(a), Self::Min(b)) => Self::Min(a.max(*b)),
            (Self::Max(a), Self::Max(b)) => Self::Max(a.min(*b)),
            (Self::Complex(a), Self::Complex(b)) => Self::Complex(a.sub(b)),
            (Self::TauAtomic(a), Self::TauAtomic(b)) => Self::TauAtomic(a.sub(b)),
            (Self::Rate(a), Self::Rate(b)) => Self::Rate(a.sub(b)),
            (Self::NDoubles(a), Self::NDoubles(b)) => Self::NDoubles(zip_with(a, b, |x, y| x - y)),
            _ => self.clone(),
        }
    }

    fn neutral(&self) -> Self {
        match self {
            Self::Int(i) => Self::Int(i.neutral()),
            Self::Double(_) => Self::Double(0.0),
            Self::Min(_) => Self::Min(f64::INFINITY),
            Self::Max(_) => Self::Max(f64::NEG_INFINITY),
            Self::Complex(c) => Self::Complex(c.neutral()),
            Self::TauAtomic(t) => Self::TauAtomic(t.neutral()),
            Self::Rate(r) => Self::Rate(r.neutral()),
            Self::NDoubles(v) => Self::NDoubles(vec![0.0; v.len()]),
        }
    }

    fn to_scalar(&self) -> f64 {
        match self {
            Self::Int(i) => i.to_scalar(),
            Self::Double(v) | Self::Min(v) | Self::Max(v) => *v,
            Self::Complex(c) => c.to_scalar(),
            Self::TauAtomic(t) => t.to_scalar(),
            Self::Rate(r) => r.to_scalar(),
            Self::NDoubles(v) => v.iter().sum(),
        }
    }
}

/// Sum one row of values of `kind` into a single value.
///
/// Integer rows go through the widening summation; everything else folds
/// `add` starting from the kind's neutral element.
pub fn sum(kind: ValueKind, row: &[CubeValue]) -> CubeValue {
    if let Some(ty) = kind.int_type() {
        let ints: Vec<i128> = row.iter().filter_map(CubeValue::as_int).collect();
        return CubeValue::Int(overflow::sum_ints(&ints, ty));
    }
    row.iter().fold(kind.neutral(), |acc, v| acc.add(v))
}
