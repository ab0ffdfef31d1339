//! Public-facing key minting: project keys, image access keys, API keys.
//! Uniqueness is enforced by the store's unique indexes; callers retry with a
//! fresh key on a duplicate-key write error.

use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const ACCESS_KEY_LEN: usize = 12;
pub const API_KEY_PREFIX: &str = "med_ai_";
const API_KEY_RANDOM_LEN: usize = 24;

pub fn generate_key(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// 12-char key used for both project keys and image access keys.
pub fn generate_access_key() -> String {
    generate_key(ACCESS_KEY_LEN)
}

pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, generate_key(API_KEY_RANDOM_LEN))
}

static ACCESS_KEY_RE: OnceLock<Regex> = OnceLock::new();

pub fn is_valid_access_key(key: &str) -> bool {
    ACCESS_KEY_RE
        .get_or_init(|| Regex::new("^[A-Za-z0-9]{12}$").expect("access key regex"))
        .is_match(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_keys_are_twelve_alphanumerics() {
        for _ in 0..50 {
            let key = generate_access_key();
            assert_eq!(key.len(), ACCESS_KEY_LEN);
            assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(is_valid_access_key(&key));
        }
    }

    #[test]
    fn api_keys_carry_the_prefix() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + 24);
        assert!(key[API_KEY_PREFIX.len()..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn access_key_validation_rejects_bad_shapes() {
        assert!(is_valid_access_key("Abc123Xyz789"));
        assert!(!is_valid_access_key(""));
        assert!(!is_valid_access_key("short"));
        assert!(!is_valid_access_key("thirteenchars"));
        assert!(!is_valid_access_key("has-dash-12!"));
        assert!(!is_valid_access_key("Abc123Xyz78 "));
    }
}
