use rand::RngCore;

/// Mint a cryptographically random 128-bit token, hex-encoded. Used as the
/// ownership token for a lock lease; never reused across acquisitions.
pub fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_32_hex_chars() {
        let t = random_token();
        assert_eq!(t.len(), 32);
        assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_not_trivially_repeated() {
        let a = random_token();
        let b = random_token();
        assert_ne!(a, b);
    }
}
