//! Cache keys and their physical encodings.

use crate::config::KeyConfig;
use crate::error::{CacheError, Result};
use sha2::{Digest, Sha256};

/// Fully-qualified key of one cache entry: namespace, name and optional tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    name: String,
    tags: Vec<String>,
}

impl CacheKey {
    /// Build a key, validating the namespace.
    pub fn new(namespace: &str, name: &str) -> Result<Self> {
        validate_namespace(namespace)?;
        Ok(Self::from_parts(namespace, name, &[]))
    }

    /// Build a key with extra disambiguating tags.
    pub fn with_tags(namespace: &str, name: &str, tags: &[&str]) -> Result<Self> {
        validate_namespace(namespace)?;
        Ok(Self::from_parts(namespace, name, tags))
    }

    /// Pools validate their namespace once; keys built from them skip the check.
    pub(crate) fn from_parts(namespace: &str, name: &str, tags: &[&str]) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Name handed to drivers. Untagged keys use the name with `\` and `#`
    /// escaped; tagged keys append `#` and a digest of the tags. Only tagged
    /// names contain an unescaped `#`, so the two forms never collide.
    pub fn storage_name(&self) -> String {
        let name = escape_name(&self.name);
        if self.tags.is_empty() {
            return name;
        }
        let mut hasher = Sha256::new();
        for tag in &self.tags {
            update_framed(&mut hasher, tag);
        }
        let digest = hex::encode(hasher.finalize());
        format!("{}#{}", name, &digest[..KeyConfig::TAG_HASH_LEN])
    }

    /// Stable identity of this key used to coalesce queued operations.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        update_framed(&mut hasher, &self.namespace);
        update_framed(&mut hasher, &self.name);
        for tag in &self.tags {
            update_framed(&mut hasher, tag);
        }
        hex::encode(hasher.finalize())
    }
}

/// Length-prefix every part so that ("ab", "c") and ("a", "bc") hash differently.
fn update_framed(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}

/// Check that a namespace can be used as a key prefix.
///
/// Namespaces are non-empty, bounded, and limited to ASCII alphanumerics,
/// `_`, `-` and `.`, which keeps the `:` separator used in physical keys
/// unambiguous.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::invalid_namespace(namespace, "must not be empty"));
    }
    if namespace.len() > KeyConfig::NAMESPACE_MAX_LEN {
        return Err(CacheError::invalid_namespace(
            namespace,
            format!("longer than {} characters", KeyConfig::NAMESPACE_MAX_LEN),
        ));
    }
    if let Some(bad) = namespace
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(CacheError::invalid_namespace(
            namespace,
            format!("invalid character {:?}", bad),
        ));
    }
    Ok(())
}

fn escape_name(name: &str) -> String {
    if !name.contains(['\\', '#']) {
        return name.to_string();
    }
    name.replace('\\', "\\\\").replace('#', "\\#")
}

/// Fold a namespace and name into a key the transient store accepts.
///
/// The result is a short readable prefix taken from the namespace followed by
/// a truncated SHA-256 of the full pair, and never exceeds
/// [`KeyConfig::TRANSIENT_KEY_MAX_LEN`].
pub fn fold_transient_key(namespace: &str, name: &str) -> String {
    let readable: String = namespace
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(KeyConfig::TRANSIENT_READABLE_LEN)
        .collect();

    let mut hasher = Sha256::new();
    update_framed(&mut hasher, namespace);
    update_framed(&mut hasher, name);
    let digest = hex::encode(hasher.finalize());

    format!(
        "{}{}_{}",
        KeyConfig::TRANSIENT_KEY_PREFIX,
        readable,
        &digest[..KeyConfig::TRANSIENT_HASH_LEN]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_namespaces() {
        assert!(CacheKey::new("", "k").is_err());
        assert!(CacheKey::new("has space", "k").is_err());
        assert!(CacheKey::new("has:colon", "k").is_err());
        assert!(CacheKey::new(&"n".repeat(65), "k").is_err());
        assert!(CacheKey::new("relations.v2-site_map", "k").is_ok());
    }

    #[test]
    fn test_untagged_storage_name_is_plain() {
        let key = CacheKey::new("ns", "post:12").unwrap();
        assert_eq!(key.storage_name(), "post:12");
    }

    #[test]
    fn test_tags_change_storage_name() {
        let plain = CacheKey::new("ns", "k").unwrap();
        let tagged = CacheKey::with_tags("ns", "k", &["en"]).unwrap();
        let other = CacheKey::with_tags("ns", "k", &["de"]).unwrap();

        assert!(tagged.storage_name().starts_with("k#"));
        assert_ne!(plain.storage_name(), tagged.storage_name());
        assert_ne!(tagged.storage_name(), other.storage_name());
    }

    #[test]
    fn test_untagged_name_cannot_mimic_tagged_key() {
        let tagged = CacheKey::with_tags("ns", "k", &["en"]).unwrap();
        let mimic = CacheKey::new("ns", &tagged.storage_name()).unwrap();
        assert_ne!(mimic.storage_name(), tagged.storage_name());

        let backslash = CacheKey::new("ns", "a\\#b").unwrap();
        let hash = CacheKey::new("ns", "a#b").unwrap();
        assert_ne!(backslash.storage_name(), hash.storage_name());
        assert_eq!(hash.storage_name(), "a\\#b");
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = CacheKey::with_tags("ns", "k", &["x", "y"]).unwrap();
        let b = CacheKey::with_tags("ns", "k", &["x", "y"]).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_framing() {
        let a = CacheKey::with_tags("ns", "ab", &["c"]).unwrap();
        let b = CacheKey::with_tags("ns", "a", &["bc"]).unwrap();
        let c = CacheKey::new("ns", "abc").unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_folded_key_is_bounded() {
        let long_ns = "multilingual_relationships_for_content";
        let long_name = "x".repeat(500);
        let folded = fold_transient_key(long_ns, &long_name);

        assert!(folded.len() <= KeyConfig::TRANSIENT_KEY_MAX_LEN);
        assert!(folded.starts_with("cp_multilin_"));
    }

    #[test]
    fn test_folded_key_keeps_pairs_apart() {
        assert_ne!(
            fold_transient_key("ns", "a"),
            fold_transient_key("ns", "b")
        );
        assert_ne!(
            fold_transient_key("ab", "c"),
            fold_transient_key("a", "bc")
        );
        assert_eq!(
            fold_transient_key("ns", "a"),
            fold_transient_key("ns", "a")
        );
    }
}
