// Endpoint hashing
//
// The SHA-256 hex digest of a push endpoint is the subscriber uniqueness key.

use sha2::{Digest, Sha256};

pub fn hash_endpoint(endpoint: &str) -> String {
    hex::encode(Sha256::digest(endpoint.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let a = hash_endpoint("https://fcm.googleapis.com/fcm/send/abc");
        let b = hash_endpoint("https://fcm.googleapis.com/fcm/send/abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_endpoint("https://fcm.googleapis.com/fcm/send/abd"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_endpoint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
