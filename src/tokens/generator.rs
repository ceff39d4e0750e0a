use rand::RngCore;

/// Generate a secure random hex string of `n_bytes` of entropy
/// (hex encoded = 2 * n_bytes characters).
pub fn generate_hex(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex_length() {
        let token = generate_hex(32);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_hex_randomness() {
        let a = generate_hex(32);
        let b = generate_hex(32);
        assert_ne!(a, b);
    }
}
