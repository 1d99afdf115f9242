use blake2::{Blake2b512, Digest};

/// A deterministic hex digest of the given bytes. Used to fingerprint normalized receipt
/// images when no transaction id could be parsed.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Blake2b512::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = content_hash(b"payment proof");
        let b = content_hash(b"payment proof");
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_distinguishes_inputs() {
        assert_ne!(content_hash(b"receipt one"), content_hash(b"receipt two"));
        assert_ne!(content_hash(b""), content_hash(b" "));
    }
}
