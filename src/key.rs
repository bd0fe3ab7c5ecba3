use std::fmt::Write;

use sha2::{Digest, Sha256};

/// Computes the cache key for a URL.
///
/// The key is the lowercase hex SHA-256 of the URL string. It depends on
/// nothing but the URL, so every process mapping the same URL arrives at the
/// same cache entry.
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = hasher.finalize();

    let mut key = String::with_capacity(64);
    for b in hash {
        key.write_fmt(format_args!("{b:02x}")).unwrap();
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_sha256_of_url() {
        assert_eq!(
            cache_key("https://example.com/a%20b.png"),
            "ab91a383141a9078a51d8d75ade167583fbac1366c83198457322020ebe6c5d8"
        );
        assert_eq!(
            cache_key("https://x/a"),
            "13a94853b4559cff9061a7936b84135453e9405c0ec8c420f41f1478bc988acd"
        );
    }

    #[test]
    fn test_key_depends_only_on_url() {
        assert_eq!(cache_key("local://sub/d"), cache_key("local://sub/d"));
        assert_ne!(cache_key("https://x/a"), cache_key("https://x/b"));
    }

    #[test]
    fn test_key_is_a_valid_flat_filename() {
        let key = cache_key("https://x/a?q=../../etc/passwd");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
