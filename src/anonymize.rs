use sha2::{Digest, Sha256};

/// One-way digest of a peer id: SHA-256 over the UTF-8 bytes, lowercase hex (64 chars).
pub fn anonymize_peer_id(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_fixed_length() {
        let first = anonymize_peer_id("peerA");
        let second = anonymize_peer_id("peerA");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert!(!first.contains("peerA"));
    }

    #[test]
    fn distinct_peers_get_distinct_digests() {
        assert_ne!(anonymize_peer_id("peerA"), anonymize_peer_id("peerB"));
    }

    #[test]
    fn empty_input_hashes_to_known_digest() {
        assert_eq!(
            anonymize_peer_id(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
