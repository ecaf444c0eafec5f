//! Revision text digests in the MediaWiki `<sha1>` format.

use sha1::{Digest, Sha1};

/// Width of a base-36 encoded 160-bit digest.
const BASE36_SHA1_LEN: usize = 31;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// SHA-1 of `text`, base-36 encoded and zero-padded to 31 characters.
pub fn revision_sha1(text: &str) -> String {
    let digest = Sha1::digest(text.as_bytes());
    to_base36(&digest, BASE36_SHA1_LEN)
}

/// Big-endian bytes to lowercase base 36, left-padded with `0` to `width`.
fn to_base36(bytes: &[u8], width: usize) -> String {
    let mut value = bytes.to_vec();
    let mut out = Vec::with_capacity(width);

    while value.iter().any(|&b| b != 0) {
        let mut rem: u32 = 0;
        for byte in value.iter_mut() {
            let acc = (rem << 8) | u32::from(*byte);
            *byte = (acc / 36) as u8;
            rem = acc % 36;
        }
        out.push(ALPHABET[rem as usize]);
    }

    while out.len() < width {
        out.push(b'0');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
