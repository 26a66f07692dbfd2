//! Payload compression.
//!
//! Large encoded payloads are zstd-compressed and kept as a base64 string so
//! the stored form stays text and persists unchanged.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use tracing::warn;

use crate::cache::Payload;
use crate::error::{CacheError, Result};

/// Default compression level (3 is a good balance of speed/ratio)
const COMPRESSION_LEVEL: i32 = 3;

/// Compresses text to base64-encoded zstd bytes.
pub fn compress(data: &str) -> Result<String> {
    let bytes = zstd::encode_all(data.as_bytes(), COMPRESSION_LEVEL)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    Ok(BASE64_STANDARD.encode(bytes))
}

/// Reverses [`compress`].
pub fn decompress(data: &str) -> Result<String> {
    let bytes = BASE64_STANDARD
        .decode(data)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    let raw = zstd::decode_all(bytes.as_slice())
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    String::from_utf8(raw).map_err(|e| CacheError::Compression(e.to_string()))
}

/// Builds the stored payload for an encoded value.
///
/// `force` overrides the size threshold. A compressed form that is not
/// smaller than the raw payload is discarded, as is one that fails to build.
pub fn pack(encoded: String, force: Option<bool>, threshold: usize) -> Payload {
    let wanted = force.unwrap_or(encoded.len() >= threshold);
    if !wanted {
        return Payload::raw(encoded);
    }

    match compress(&encoded) {
        Ok(compressed) if compressed.len() < encoded.len() => Payload {
            data: compressed,
            compressed: true,
        },
        Ok(_) => Payload::raw(encoded),
        Err(e) => {
            warn!("Compression failed, storing raw payload: {}", e);
            Payload::raw(encoded)
        }
    }
}

/// Returns the encoded value held by a payload.
pub fn unpack(payload: &Payload) -> Result<String> {
    if payload.compressed {
        decompress(&payload.data)
    } else {
        Ok(payload.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_roundtrip() {
        let text = r#"{"prices":[1,2,3,4,5,6,7,8,9,10]}"#.repeat(20);
        let packed = compress(&text).unwrap();
        assert_eq!(decompress(&packed).unwrap(), text);
    }

    #[test]
    fn test_pack_below_threshold_stays_raw() {
        let payload = pack("\"small\"".to_string(), None, 1024);
        assert!(!payload.compressed);
        assert_eq!(payload.data, "\"small\"");
    }

    #[test]
    fn test_pack_above_threshold_compresses() {
        let text = "a".repeat(4096);
        let payload = pack(text.clone(), None, 1024);

        assert!(payload.compressed);
        assert!(payload.size_bytes() < text.len());
        assert_eq!(unpack(&payload).unwrap(), text);
    }

    #[test]
    fn test_pack_force_off() {
        let text = "a".repeat(4096);
        let payload = pack(text, Some(false), 1024);
        assert!(!payload.compressed);
    }

    #[test]
    fn test_pack_keeps_raw_when_not_smaller() {
        let payload = pack("ab".to_string(), Some(true), 0);
        assert!(!payload.compressed);
        assert_eq!(payload.data, "ab");
    }

    #[test]
    fn test_decompress_garbage_fails() {
        assert!(matches!(
            decompress("not base64 at all!"),
            Err(CacheError::Compression(_))
        ));
    }
}
