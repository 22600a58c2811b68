//! `Content-Encoding` handling for captured bodies.

use std::io::Read;

use siege_core::error::DecodeError;
use tracing::warn;

/// Undo a body's `Content-Encoding`.
///
/// `compress` and `br` are reported as unsupported; encodings we have never
/// heard of are logged and passed through untouched, since the bytes may
/// still be useful downstream.
pub fn decode_body(encoding: &str, body: &[u8]) -> Result<Vec<u8>, DecodeError> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "" | "identity" => Ok(body.to_vec()),
        "gzip" => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|e| DecodeError::Malformed {
                    encoding: "gzip".to_string(),
                    message: e.to_string(),
                })?;
            Ok(out)
        }
        "deflate" => {
            let mut out = Vec::new();
            flate2::read::ZlibDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|e| DecodeError::Malformed {
                    encoding: "deflate".to_string(),
                    message: e.to_string(),
                })?;
            Ok(out)
        }
        "compress" | "br" => Err(DecodeError::Unsupported(encoding.to_string())),
        other => {
            warn!(encoding = other, "unknown content encoding, passing body through");
            Ok(body.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_identity_passthrough() {
        assert_eq!(decode_body("", b"abc").unwrap(), b"abc");
        assert_eq!(decode_body("identity", b"abc").unwrap(), b"abc");
    }

    #[test]
    fn test_gzip_roundtrip() {
        let body = gzip(br#"{"ok":true}"#);
        assert_eq!(decode_body("gzip", &body).unwrap(), br#"{"ok":true}"#);
    }

    #[test]
    fn test_deflate_roundtrip() {
        let body = deflate(b"payload");
        assert_eq!(decode_body("deflate", &body).unwrap(), b"payload");
    }

    #[test]
    fn test_unsupported_encodings() {
        assert!(matches!(
            decode_body("br", b"x"),
            Err(DecodeError::Unsupported(_))
        ));
        assert!(matches!(
            decode_body("compress", b"x"),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unknown_encoding_passes_through() {
        assert_eq!(decode_body("snappy", b"raw").unwrap(), b"raw");
    }

    #[test]
    fn test_malformed_gzip_is_an_error() {
        assert!(matches!(
            decode_body("gzip", b"definitely not gzip"),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
