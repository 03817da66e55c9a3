use thiserror::Error;

use super::cursor::{BinaryCursor, ByteOrder, UnexpectedEof};

pub const INDEX_HEADER: &[u8] = b"CUBEX.INDEX";

#[derive(Debug, Error)]
pub enum IndexParseError {
    #[error("missing CUBEX.INDEX header")]
    Header,
    #[error("truncated index: {0}")]
    Truncated(#[from] UnexpectedEof),
    #[error("index declares {declared} positions but carries {actual_bytes} bytes of them")]
    Corrupt { declared: i32, actual_bytes: usize },
    #[error("index declares no positions")]
    Empty,
}

/// Decoded `<metric id>.index` member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexParseResult {
    /// Byte order of the writer; the matching data member uses it too.
    pub byte_order: ByteOrder,
    /// Enumeration positions of the call nodes that carry data, in data order.
    pub tree_positions: Vec<i32>,
}

/// Parse an index member.
///
/// Byte order is sniffed from a sentinel `1` written right after the header:
/// if it does not read as 1 little-endian, the file is big-endian.
pub fn parse_index(data: &[u8]) -> Result<IndexParseResult, IndexParseError> {
    let mut cursor = BinaryCursor::new(data);
    if cursor.take(INDEX_HEADER.len()).ok() != Some(INDEX_HEADER) {
        return Err(IndexParseError::Header);
    }

    let byte_order = match cursor.read_i32(ByteOrder::Little)? {
        1 => ByteOrder::Little,
        _ => ByteOrder::Big,
    };
    let _version = cursor.read_i16(byte_order)?;
    let _index_type = cursor.read_u8()?;
    let declared = cursor.read_i32(byte_order)?;

    let actual_bytes = cursor.remaining();
    let expected_bytes = usize::try_from(declared).ok().and_then(|n| n.checked_mul(4));
    if expected_bytes != Some(actual_bytes) {
        return Err(IndexParseError::Corrupt { declared, actual_bytes });
    }
    if declared == 0 {
        return Err(IndexParseError::Empty);
    }

    let tree_positions = (0..declared)
        .map(|_| cursor.read_i32(byte_order))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        "index: {} positions, {:?} byte order",
        tree_positions.len(),
        byte_order
    );
    Ok(IndexParseResult {
        byte_order,
        tree_positions,
    })
}
