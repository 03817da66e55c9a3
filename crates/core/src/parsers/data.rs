use std::borrow::Cow;
use std::io::Read;

use flate2::read::ZlibDecoder;
use thiserror::Error;

use super::cursor::{BinaryCursor, ByteOrder, UnexpectedEof};
use crate::values::{CubeValue, UnsupportedFormat, ValueKind};

pub const DATA_HEADER: &[u8] = b"CUBEX.DATA";
pub const ZDATA_HEADER: &[u8] = b"ZCUBEX.DATA";

#[derive(Debug, Error)]
pub enum DataParseError {
    #[error("missing CUBEX.DATA header")]
    Header,
    #[error("truncated data: {0}")]
    Truncated(#[from] UnexpectedEof),
    #[error("invalid block table: {0}")]
    BlockTable(String),
    #[error("failed to inflate block: {0}")]
    Inflate(#[source] std::io::Error),
    #[error(transparent)]
    Unsupported(#[from] UnsupportedFormat),
    #[error("payload of {len} bytes is not a multiple of the {element_size}-byte element")]
    Misaligned { len: usize, element_size: usize },
}

/// One entry of a compressed member's block table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    uncompressed_offset: i64,
    compressed_offset: i64,
    compressed_size: i64,
}

/// Parse a data member into a flat list of values, `num_locations` per
/// indexed call node.
pub fn parse_data(
    data: &[u8],
    data_type: &str,
    byte_order: ByteOrder,
    allow_full_uint64_values: bool,
) -> Result<Vec<CubeValue>, DataParseError> {
    let payload = read_payload(data, byte_order)?;
    let kind = ValueKind::parse(data_type)?;
    let element_size = kind.element_size();
    if payload.len() % element_size != 0 {
        return Err(DataParseError::Misaligned {
            len: payload.len(),
            element_size,
        });
    }
    Ok(payload
        .chunks_exact(element_size)
        .map(|chunk| kind.decode(chunk, byte_order, allow_full_uint64_values))
        .collect())
}

/// Strip the header and, for `ZCUBEX.DATA`, inflate the blocks.
fn read_payload(data: &[u8], byte_order: ByteOrder) -> Result<Cow<'_, [u8]>, DataParseError> {
    let mut cursor = BinaryCursor::new(data);
    let short = cursor.take(DATA_HEADER.len()).map_err(|_| DataParseError::Header)?;
    if short == DATA_HEADER {
        return Ok(Cow::Borrowed(cursor.rest()));
    }
    let extra = cursor.read_u8().map_err(|_| DataParseError::Header)?;
    if short != &ZDATA_HEADER[..DATA_HEADER.len()] || extra != ZDATA_HEADER[DATA_HEADER.len()] {
        return Err(DataParseError::Header);
    }

    let count = cursor.read_i64(byte_order)?;
    let count = usize::try_from(count)
        .map_err(|_| DataParseError::BlockTable(format!("negative block count {count}")))?;
    let blocks = (0..count)
        .map(|_| {
            Ok(Block {
                uncompressed_offset: cursor.read_i64(byte_order)?,
                compressed_offset: cursor.read_i64(byte_order)?,
                compressed_size: cursor.read_i64(byte_order)?,
            })
        })
        .collect::<Result<Vec<_>, UnexpectedEof>>()?;

    let mut payload = Vec::new();
    for block in blocks.iter().filter(|b| b.compressed_size != 0) {
        let size = usize::try_from(block.compressed_size).map_err(|_| {
            DataParseError::BlockTable(format!(
                "block at {} has negative size {}",
                block.compressed_offset, block.compressed_size
            ))
        })?;
        let before = payload.len();
        ZlibDecoder::new(cursor.take(size)?)
            .read_to_end(&mut payload)
            .map_err(DataParseError::Inflate)?;
        if usize::try_from(block.uncompressed_offset).ok() != Some(before) {
            tracing::debug!(
                "block declares uncompressed offset {}, payload is at {}",
                block.uncompressed_offset,
                before
            );
        }
    }
    tracing::debug!("inflated {} blocks into {} bytes", blocks.len(), payload.len());
    Ok(Cow::Owned(payload))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    use super::*;
    use crate::values::{Int, IntType};

    fn deflate(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn doubles(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn compressed(chunks: &[&[u8]]) -> Vec<u8> {
        let mut out = ZDATA_HEADER.to_vec();
        out.extend_from_slice(&(chunks.len() as i64).to_le_bytes());
        let deflated: Vec<Vec<u8>> = chunks
            .iter()
            .map(|c| if c.is_empty() { Vec::new() } else { deflate(c) })
            .collect();
        let (mut raw_off, mut z_off) = (0i64, 0i64);
        for (chunk, z) in chunks.iter().zip(&deflated) {
            for field in [raw_off, z_off, z.len() as i64] {
                out.extend_from_slice(&field.to_le_bytes());
            }
            raw_off += chunk.len() as i64;
            z_off += z.len() as i64;
        }
        deflated.iter().for_each(|z| out.extend_from_slice(z));
        out
    }

    #[test]
    fn uncompressed_doubles() {
        let mut bytes = DATA_HEADER.to_vec();
        bytes.extend(doubles(&[1.5, 2.5]));
        let values = parse_data(&bytes, "DOUBLE", ByteOrder::Little, false).unwrap();
        assert_eq!(values, vec![CubeValue::Double(1.5), CubeValue::Double(2.5)]);
    }

    #[test]
    fn compressed_blocks_concatenate_and_skip_empty() {
        let first = doubles(&[1.0, 2.0]);
        let second = doubles(&[3.0]);
        let bytes = compressed(&[&first[..], &[], &second[..]]);
        let values = parse_data(&bytes, "MAXDOUBLE", ByteOrder::Little, false).unwrap();
        assert_eq!(
            values,
            vec![CubeValue::Max(1.0), CubeValue::Max(2.0), CubeValue::Max(3.0)]
        );
    }

    #[test]
    fn big_endian_integers() {
        let mut bytes = DATA_HEADER.to_vec();
        bytes.extend_from_slice(&7u32.to_be_bytes());
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        let values = parse_data(&bytes, "UINT32", ByteOrder::Big, false).unwrap();
        assert_eq!(
            values,
            vec![
                CubeValue::Int(Int::new(7, IntType::U32)),
                CubeValue::Int(Int::new(u32::MAX.into(), IntType::U32)),
            ]
        );
    }

    #[test]
    fn rejects_bad_headers() {
        let bad_headers: [&[u8]; 4] = [b"CUBEX.DAT", b"XCUBEX.DATA", b"ZCUBEX.DATX", b"CUBEX.INDEX"];
        for bad in bad_headers {
            assert!(matches!(
                parse_data(bad, "DOUBLE", ByteOrder::Little, false),
                Err(DataParseError::Header)
            ));
        }
    }

    #[test]
    fn rejects_misaligned_payload() {
        let mut bytes = DATA_HEADER.to_vec();
        bytes.extend_from_slice(&[0; 12]);
        assert!(matches!(
            parse_data(&bytes, "DOUBLE", ByteOrder::Little, false),
            Err(DataParseError::Misaligned {
                len: 12,
                element_size: 8
            })
        ));
    }

    #[test]
    fn short_elements_never_reach_the_decoder() {
        for data_type in ["TAU_ATOMIC", "COMPLEX", "NDOUBLES(3)", "INT16"] {
            let element_size = ValueKind::parse(data_type).unwrap().element_size();
            let mut bytes = DATA_HEADER.to_vec();
            bytes.extend(std::iter::repeat_n(0u8, element_size - 1));
            assert!(
                matches!(
                    parse_data(&bytes, data_type, ByteOrder::Big, false),
                    Err(DataParseError::Misaligned { .. })
                ),
                "{data_type}"
            );
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = DATA_HEADER.to_vec();
        let err = parse_data(&bytes, "HISTOGRAM(4)", ByteOrder::Little, false).unwrap_err();
        assert!(matches!(err, DataParseError::Unsupported(ref u) if u.data_type == "HISTOGRAM(4)"));
    }

    #[test]
    fn ndoubles_group_elements() {
        let mut bytes = DATA_HEADER.to_vec();
        bytes.extend(doubles(&[1.0, 2.0, 3.0, 4.0]));
        let values = parse_data(&bytes, "NDOUBLES(2)", ByteOrder::Little, false).unwrap();
        assert_eq!(
            values,
            vec![CubeValue::NDoubles(vec![1.0, 2.0]), CubeValue::NDoubles(vec![3.0, 4.0])]
        );
    }
}
