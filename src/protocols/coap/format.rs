//! CoAP Content-Format numbers and their media types

use crate::content::normalize_media_type;

/// Registered content formats (RFC 7252 §12.3 and RFC 7049)
const FORMATS: &[(u16, &str)] = &[
    (0, "text/plain"),
    (40, "application/link-format"),
    (41, "application/xml"),
    (42, "application/octet-stream"),
    (47, "application/exi"),
    (50, "application/json"),
    (60, "application/cbor"),
];

/// Media type for a Content-Format number
#[must_use]
pub fn media_type_for(format: u16) -> Option<&'static str> {
    FORMATS
        .iter()
        .find(|(code, _)| *code == format)
        .map(|(_, media_type)| *media_type)
}

/// Content-Format number for a media type (parameters and case ignored)
#[must_use]
pub fn format_for(media_type: &str) -> Option<u16> {
    let normalized = normalize_media_type(media_type);
    FORMATS
        .iter()
        .find(|(_, m)| *m == normalized)
        .map(|(code, _)| *code)
}

/// Encode an option value as a minimal big-endian uint
#[must_use]
pub fn encode_uint(value: u16) -> Vec<u8> {
    match value {
        0 => Vec::new(),
        1..=0xff => vec![value.to_be_bytes()[1]],
        _ => value.to_be_bytes().to_vec(),
    }
}

/// Decode a uint option value; `None` if it does not fit in 16 bits
#[must_use]
pub fn decode_uint(bytes: &[u8]) -> Option<u16> {
    if bytes.len() > 2 {
        return None;
    }
    Some(bytes.iter().fold(0u16, |acc, b| (acc << 8) | u16::from(*b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_and_cbor_formats() {
        assert_eq!(format_for("application/json"), Some(50));
        assert_eq!(format_for("Text/Plain; charset=utf-8"), Some(0));
        assert_eq!(media_type_for(60), Some("application/cbor"));
        assert_eq!(media_type_for(9999), None);
        assert_eq!(format_for("image/png"), None);
    }

    #[test]
    fn uint_options_are_minimal() {
        assert!(encode_uint(0).is_empty());
        assert_eq!(encode_uint(50), vec![50]);
        assert_eq!(encode_uint(0x0102), vec![1, 2]);
        assert_eq!(decode_uint(&[]), Some(0));
        assert_eq!(decode_uint(&[1, 2]), Some(0x0102));
        assert_eq!(decode_uint(&[1, 2, 3]), None);
    }
}
