use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Length-prefix a labelled frame so adjacent fields can never alias.
pub(crate) fn write_framed(hasher: &mut Sha256, label: &[u8], bytes: &[u8]) {
    let label_len = u32::try_from(label.len()).unwrap_or(u32::MAX);
    hasher.update(label_len.to_be_bytes());
    hasher.update(label);

    let bytes_len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    hasher.update(bytes_len.to_be_bytes());
    hasher.update(bytes);
}

/// SHA-256 over a sequence of labelled frames, rendered as lowercase hex
/// and truncated to `hex_len` characters.
pub(crate) fn framed_digest_hex(domain: &[u8], frames: &[(&[u8], &[u8])], hex_len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for (label, bytes) in frames {
        write_framed(&mut hasher, label, bytes);
    }

    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out.truncate(hex_len);

    out
}

///
/// TESTS
///
