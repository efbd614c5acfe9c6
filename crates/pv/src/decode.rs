//! Compressed JSON payloads.
//!
//! Block server PVs publish JSON as zlib-deflated bytes rendered as ASCII hex.
//! Decoding runs hex → inflate → UTF-8 → JSON.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::de::DeserializeOwned;

use crate::DecodeError;

/// Decode a raw PV value into the inflated UTF-8 text.
pub fn dehex_and_decompress(raw: &str) -> Result<String, DecodeError> {
    let trimmed = raw.trim().trim_end_matches('\0');
    let bytes = hex::decode(trimmed)?;
    let mut inflated = Vec::new();
    ZlibDecoder::new(bytes.as_slice())
        .read_to_end(&mut inflated)
        .map_err(DecodeError::Inflate)?;
    Ok(String::from_utf8(inflated)?)
}

/// Decode a raw PV value into a typed JSON document.
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    let text = dehex_and_decompress(raw)?;
    Ok(serde_json::from_str(&text)?)
}

/// Encode a JSON document the way the block server publishes it.
///
/// Used to build snapshot files and fixtures.
pub fn compress_and_hex(value: &serde_json::Value) -> Result<String, DecodeError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(value.to_string().as_bytes())
        .map_err(DecodeError::Deflate)?;
    let bytes = encoder.finish().map_err(DecodeError::Deflate)?;
    Ok(hex::encode_upper(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_published_payload() {
        let raw = compress_and_hex(&json!({"SIMPLE": {}, "INSTETC_01": {}})).unwrap();
        let value: serde_json::Value = decode_json(&raw).unwrap();
        assert!(value.get("SIMPLE").is_some());
        assert!(value.get("INSTETC_01").is_some());
    }

    #[test]
    fn tolerates_trailing_whitespace_and_nul() {
        let raw = format!("{}\0\n", compress_and_hex(&json!(["a"])).unwrap());
        let value: Vec<String> = decode_json(&raw).unwrap();
        assert_eq!(value, vec!["a".to_string()]);
    }

    #[test]
    fn rejects_non_hex() {
        assert!(matches!(
            dehex_and_decompress("not hex"),
            Err(DecodeError::Hex(_))
        ));
    }

    #[test]
    fn rejects_uncompressed_bytes() {
        let raw = hex::encode(b"[1,2,3]");
        assert!(matches!(
            dehex_and_decompress(&raw),
            Err(DecodeError::Inflate(_))
        ));
    }

    #[test]
    fn rejects_wrong_json_shape() {
        let raw = compress_and_hex(&json!({"not": "a list"})).unwrap();
        assert!(matches!(
            decode_json::<Vec<String>>(&raw),
            Err(DecodeError::Json(_))
        ));
    }
}
