pub mod actor;
pub mod ip;
pub mod url_validator;

pub use actor::ActorIdentity;

const BASE62: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const MAX_CODE_LEN: usize = 64;

pub fn generate_random_code(length: usize) -> String {
    std::iter::repeat_with(|| BASE62[rand::random_range(0..BASE62.len())] as char)
        .take(length)
        .collect()
}

/// `[A-Za-z0-9_-]{1,64}`
pub fn is_valid_short_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_base62() {
        for _ in 0..50 {
            let code = generate_random_code(7);
            assert_eq!(code.len(), 7);
            assert!(code.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_short_code_validation() {
        assert!(is_valid_short_code("abc123"));
        assert!(is_valid_short_code("promo_2026-spring"));
        assert!(!is_valid_short_code(""));
        assert!(!is_valid_short_code("a/b"));
        assert!(!is_valid_short_code("../etc"));
        assert!(!is_valid_short_code(&"x".repeat(65)));
    }
}
