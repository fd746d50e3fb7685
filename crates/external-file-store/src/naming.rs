//! Content-addressed naming for stored artifacts

use crate::error::{Result, StoreError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Query-string parameter carrying the content hash for explicitly named artifacts.
pub const UNIQUE_QUERY_KEY: &str = "h";

/// Bytes of the digest kept in a name. Collision resistance against an
/// adversary is not a goal here, only distinct names for distinct content.
const HASH_BYTES: usize = 16;

/// Hash `contents` into a URL and filename safe token.
///
/// The digest is base64 encoded and every character outside `[A-Za-z0-9_.]`
/// is removed.
pub fn content_hash(contents: &[u8]) -> String {
    let digest = Sha256::digest(contents);
    BASE64
        .encode(&digest[..HASH_BYTES])
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect()
}

/// Derives artifact keys from content and caller preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingStrategy {
    extension: Option<String>,
    make_unique: bool,
}

impl NamingStrategy {
    pub fn new(extension: Option<&str>, make_unique: bool) -> Self {
        let extension = extension
            .map(|e| e.trim().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty());
        Self {
            extension,
            make_unique,
        }
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn make_unique(&self) -> bool {
        self.make_unique
    }

    /// Produce the key for `contents`, optionally based on `base_name`.
    ///
    /// Without a base name the hash is the name. With a base name and
    /// uniqueness requested the hash is appended as `?h=<hash>` so two
    /// payloads with the same explicit name stay distinguishable to caches.
    pub fn key_for(&self, base_name: Option<&str>, contents: &[u8]) -> Result<String> {
        let base_name = base_name.map(str::trim).filter(|n| !n.is_empty());

        let hash = if base_name.is_none() || self.make_unique {
            if contents.is_empty() && base_name.is_none() {
                return Err(StoreError::InvalidName(
                    "cannot derive a name from empty content without a base name".to_string(),
                ));
            }
            Some(content_hash(contents))
        } else {
            None
        };

        let mut key = match base_name {
            Some(name) => name.to_string(),
            None => hash.clone().unwrap_or_default(),
        };

        if let Some(extension) = &self.extension {
            key.push('.');
            key.push_str(extension);
        }

        if let (Some(_), Some(hash)) = (base_name, &hash) {
            key.push('?');
            key.push_str(UNIQUE_QUERY_KEY);
            key.push('=');
            key.push_str(hash);
        }

        Ok(key)
    }
}

impl Default for NamingStrategy {
    fn default() -> Self {
        Self::new(Some("js"), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_pure_function_of_content() {
        assert_eq!(content_hash(b"var a = 1;"), content_hash(b"var a = 1;"));
        assert_ne!(content_hash(b"var a = 1;"), content_hash(b"var a = 2;"));
    }

    #[test]
    fn test_hash_alphabet() {
        for input in [&b"a"[..], b"hello world", b"\x00\xff\xfe", b"longer payload ..."] {
            let hash = content_hash(input);
            assert!(!hash.is_empty());
            assert!(hash
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.'));
        }
    }

    #[test]
    fn test_hash_named_key_with_extension() {
        let naming = NamingStrategy::new(Some("js"), true);
        let key = naming.key_for(None, b"alert(1);").unwrap();
        assert_eq!(key, format!("{}.js", content_hash(b"alert(1);")));
        assert!(!key.contains('?'));
    }

    #[test]
    fn test_same_content_same_key() {
        let naming = NamingStrategy::new(Some("js"), false);
        let first = naming.key_for(None, b"same").unwrap();
        let second = naming.key_for(None, b"same").unwrap();
        assert_eq!(first, second);
        assert_ne!(first, naming.key_for(None, b"different").unwrap());
    }

    #[test]
    fn test_explicit_name_with_uniqueness_appends_query() {
        let naming = NamingStrategy::new(Some("js"), true);
        let a = naming.key_for(Some("bundle"), b"one").unwrap();
        let b = naming.key_for(Some("bundle"), b"two").unwrap();
        assert_eq!(a, format!("bundle.js?h={}", content_hash(b"one")));
        assert_ne!(a, b);
    }

    #[test]
    fn test_explicit_name_without_uniqueness() {
        let naming = NamingStrategy::new(Some(".css"), false);
        assert_eq!(naming.key_for(Some("site"), b"body{}").unwrap(), "site.css");
    }

    #[test]
    fn test_no_extension() {
        let naming = NamingStrategy::new(None, false);
        assert_eq!(naming.key_for(Some("plain"), b"x").unwrap(), "plain");
        assert_eq!(naming.key_for(None, b"x").unwrap(), content_hash(b"x"));
    }

    #[test]
    fn test_blank_base_name_is_treated_as_absent() {
        let naming = NamingStrategy::new(Some("js"), true);
        let key = naming.key_for(Some("   "), b"x").unwrap();
        assert_eq!(key, format!("{}.js", content_hash(b"x")));
    }

    #[test]
    fn test_empty_content_without_name_fails() {
        let naming = NamingStrategy::default();
        let err = naming.key_for(None, b"").unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
    }

    #[test]
    fn test_empty_content_with_name_is_allowed() {
        let naming = NamingStrategy::new(Some("js"), false);
        assert_eq!(naming.key_for(Some("empty"), b"").unwrap(), "empty.js");
    }
}
