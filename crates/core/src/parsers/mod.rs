pub mod anchor;
pub mod cursor;
pub mod data;
pub mod index;

use std::io::Read;

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::model::Profile;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("index: {0}")]
    Index(#[from] index::IndexParseError),
    #[error("data: {0}")]
    Data(#[from] data::DataParseError),
    #[error("anchor: {0}")]
    Anchor(#[from] anchor::AnchorParseError),
    #[error("failed to inflate gzip anchor: {0}")]
    Gzip(#[source] std::io::Error),
}

/// Parse `anchor.xml`, plain or gzip-compressed.
///
/// Anything that does not start with an XML declaration is assumed to be
/// gzip; some writers compress the anchor without renaming it.
pub fn parse_anchor_auto(data: &[u8]) -> Result<Profile, ParseError> {
    if data.starts_with(b"<?xml") {
        return Ok(anchor::parse_anchor(data)?);
    }

    let mut xml = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut xml)
        .map_err(ParseError::Gzip)?;
    tracing::debug!("inflated gzip anchor: {} -> {} bytes", data.len(), xml.len());
    Ok(anchor::parse_anchor(&xml)?)
}
