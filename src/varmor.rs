//! Versioned armoring for sealed property values
//!
//! Sealed values are binary; property files are text. Each sealed value
//! is stored as base64url with a version prefix:
//! - Free of whitespace (including newlines)
//! - Safe to embed in URLs
//! - Safe to pass unescaped in a POSIX shell

use crate::error::{ErrorCategory, ErrorKind, PropsError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Magic prefix for all sealprops versions
const MAGIC_PREFIX: &str = "sealprops";

/// Version 1 magic marker
const V1_MAGIC: &str = "sealprops1:";

/// Wrap bytes in armor, returning the armored string
///
/// Format: sealprops1:{base64url-no-padding}
pub fn wrap(body: &[u8]) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(body);
    format!("{}{}", V1_MAGIC, encoded)
}

/// Unwrap an armored string, returning the original bytes
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    if armored.len() < V1_MAGIC.len() {
        return Err(PropsError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "value shorter than magic marker; not a sealed value",
        ));
    }

    if let Some(encoded) = armored.strip_prefix(V1_MAGIC) {
        URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
            PropsError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArmoringDecode,
                "base64 decoding failed",
                e,
            )
        })
    } else if armored.starts_with(MAGIC_PREFIX) {
        Err(PropsError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringFromFuture,
            "value claims to be sealed by sealprops, but not a version we support",
        ))
    } else {
        Err(PropsError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "value unrecognized as sealed data (is the file plaintext?)",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytes() {
        let armored = wrap(b"");
        assert_eq!(armored, "sealprops1:");
        assert_eq!(unwrap(&armored).unwrap(), b"");
    }

    #[test]
    fn test_known_encoding() {
        let armored = wrap(&[0xfb, 0xff, 0x00, 0x01]);
        assert_eq!(armored, "sealprops1:-_8AAQ");
        assert_eq!(unwrap(&armored).unwrap(), vec![0xfb, 0xff, 0x00, 0x01]);
    }

    #[test]
    fn test_truncated_input() {
        let err = unwrap("seal").expect_err("expected truncated input error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringInvalid));
    }

    #[test]
    fn test_wrong_version() {
        let err = unwrap("sealprops999:abc").expect_err("expected unsupported version error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringFromFuture));
    }

    #[test]
    fn test_plaintext_value() {
        let err = unwrap("jdbc:postgresql://localhost/app").expect_err("expected non-sealed error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringInvalid));
    }

    #[test]
    fn test_bad_base64() {
        let err = unwrap("sealprops1:bad$$").expect_err("expected base64 decode error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringDecode));

        // The decoder's own text shows up once, as the source.
        let cause = err.source_error().unwrap().to_string();
        assert_eq!(err.chain(), format!("base64 decoding failed: {}", cause));
    }

    #[test]
    fn test_url_safe_without_whitespace() {
        let armored = wrap(&[0xFFu8; 100]);

        assert!(!armored.contains('+'));
        assert!(!armored.contains('/'));
        assert!(!armored.contains('='));
        assert!(!armored.contains(char::is_whitespace));
    }
}
