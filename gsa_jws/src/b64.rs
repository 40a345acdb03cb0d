//! URL-safe base64 as used by compact JWTs
//!
//! Encoding uses the `-`/`_` alphabet with trailing `=` padding stripped.
//! Decoding restores the padding before decoding, so both padded and
//! unpadded input are accepted.

use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    DecodeError, Engine,
};

/// Encodes `data` as unpadded base64url
#[must_use]
pub fn encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decodes base64url data, restoring stripped padding first
///
/// # Errors
///
/// The input is not valid base64url.
pub fn decode(data: impl AsRef<str>) -> Result<Vec<u8>, DecodeError> {
    let data = data.as_ref().trim_end_matches('=');
    let mut padded = String::with_capacity(data.len() + 3);
    padded.push_str(data);
    for _ in 0..(4 - data.len() % 4) % 4 {
        padded.push('=');
    }
    URL_SAFE.decode(padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_padding_and_swaps_alphabet() {
        // standard base64 of these bytes is "+/+/" with no padding
        assert_eq!(encode([0xfb, 0xff, 0xbf]), "-_-_");
        // "ab" would be "YWI=" in standard base64
        assert_eq!(encode(b"ab"), "YWI");
        assert_eq!(encode(b"a"), "YQ");
    }

    #[test]
    fn decodes_with_or_without_padding() {
        assert_eq!(decode("YWI").unwrap(), b"ab");
        assert_eq!(decode("YWI=").unwrap(), b"ab");
        assert_eq!(decode("YQ").unwrap(), b"a");
        assert_eq!(decode("-_-_").unwrap(), vec![0xfb, 0xff, 0xbf]);
    }

    #[test]
    fn rejects_standard_alphabet() {
        assert!(decode("+/+/").is_err());
    }
}
