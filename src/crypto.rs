use sha2::{Digest, Sha256};

const FINGERPRINT_LEN: usize = 12;

// Hash a device token so it can be correlated across log lines without
// exposing the token itself
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_fingerprint() {
        let fp1 = token_fingerprint("abc123");
        let fp2 = token_fingerprint("abc123");
        let fp3 = token_fingerprint("abc124");

        assert_eq!(fp1, fp2);
        assert_ne!(fp1, fp3);
        assert_eq!(fp1.len(), FINGERPRINT_LEN);
        assert!(!fp1.contains("abc123"));
        assert!(fp1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
