//! Handler Base Module
//!
//! Key normalization, group signatures and TTL resolution shared by every
//! driver.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::cache::MAX_KEY_LENGTH;
use crate::config::{whole_seconds, CacheConfig};
use crate::error::{CacheError, Result};

/// Characters no driver accepts in a key.
pub const RESERVED_CHARACTERS: &str = "{}()/\\@:";

/// Extra characters the filesystem driver rejects because they break paths.
pub const PATH_BREAKING_CHARACTERS: &str = "/\\<>?:|*\"";

/// Current generation of one configured group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupToken {
    pub name: String,
    pub generation: u64,
}

impl GroupToken {
    pub fn new(name: impl Into<String>, generation: u64) -> Self {
        Self {
            name: name.into(),
            generation,
        }
    }
}

// == Key Validation ==
/// Validates a caller key and returns its storage form.
///
/// Whitespace runs collapse to a single `_`. Empty keys, keys longer than
/// `MAX_KEY_LENGTH`, control characters and any character from
/// `RESERVED_CHARACTERS` or `extra_reserved` are rejected.
pub fn validate_key(key: &str, extra_reserved: &str) -> Result<String> {
    if key.is_empty() {
        return Err(CacheError::Validation("Cache key cannot be empty".into()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::Validation(format!(
            "Cache key exceeds maximum length of {MAX_KEY_LENGTH} bytes"
        )));
    }

    let mut sanitized = String::with_capacity(key.len());
    let mut in_whitespace = false;
    for c in key.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                sanitized.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        if c.is_control() || RESERVED_CHARACTERS.contains(c) || extra_reserved.contains(c) {
            return Err(CacheError::Validation(format!(
                "Cache key '{key}' contains reserved character '{}'",
                c.escape_default()
            )));
        }
        sanitized.push(c);
    }

    Ok(sanitized)
}

/// Rejects negative increment/decrement offsets.
pub fn validate_offset(offset: i64) -> Result<()> {
    if offset < 0 {
        return Err(CacheError::Validation(format!(
            "Offset must be zero or positive, got {offset}"
        )));
    }
    Ok(())
}

// == Handler Base ==
/// State every driver embeds: prefix, groups, default TTL and key rules.
#[derive(Debug, Clone)]
pub struct HandlerBase {
    driver: &'static str,
    prefix: String,
    groups: Vec<String>,
    default_ttl: u64,
    extra_reserved: &'static str,
}

impl HandlerBase {
    pub fn new(driver: &'static str, config: &CacheConfig) -> Self {
        Self {
            driver,
            prefix: config.prefix.clone(),
            groups: config.groups.clone(),
            default_ttl: config.duration,
            extra_reserved: "",
        }
    }

    /// Adds driver-specific forbidden key characters.
    pub fn with_reserved(mut self, extra_reserved: &'static str) -> Self {
        self.extra_reserved = extra_reserved;
        self
    }

    pub fn driver(&self) -> &'static str {
        self.driver
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Only configured groups own a generation token. Any other name would
    /// address an ordinary data key.
    pub fn is_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn sanitize_key(&self, key: &str) -> Result<String> {
        validate_key(key, self.extra_reserved)
    }

    /// Validates a group name passed to `clear_group`.
    pub fn sanitize_group(&self, group: &str) -> Result<String> {
        validate_key(group, self.extra_reserved)
    }

    /// Storage key: `prefix + signature + sanitized key`.
    pub fn compose(&self, signature: &str, sanitized_key: &str) -> String {
        let mut key =
            String::with_capacity(self.prefix.len() + signature.len() + sanitized_key.len());
        key.push_str(&self.prefix);
        key.push_str(signature);
        key.push_str(sanitized_key);
        key
    }

    /// Key holding the generation token of `group`.
    pub fn generation_key(&self, group: &str) -> String {
        format!("{}{}", self.prefix, group)
    }

    /// Generation keys for every configured group, in configuration order.
    pub fn generation_keys(&self) -> Vec<String> {
        self.groups.iter().map(|g| self.generation_key(g)).collect()
    }

    /// Concatenates the tokens into the signature woven into data keys.
    ///
    /// Empty when no groups are configured.
    pub fn signature(tokens: &[GroupToken]) -> String {
        tokens
            .iter()
            .map(|t| format!("{}.{}.", t.name, t.generation))
            .collect()
    }

    // == TTL Resolution ==
    /// `None` uses the configured duration; explicit values are taken in
    /// whole seconds, rounding up. Zero means the entry never expires.
    pub fn resolve_ttl(&self, ttl: Option<Duration>) -> u64 {
        match ttl {
            None => self.default_ttl,
            Some(duration) => whole_seconds(duration),
        }
    }
}

// == Value Encoding ==
/// Text form used by byte-oriented substrates.
pub fn encode_value(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn decode_value(raw: &str) -> Result<Value> {
    Ok(serde_json::from_str(raw)?)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn base(groups: &[&str]) -> HandlerBase {
        let config = CacheConfig {
            prefix: "t_".into(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            duration: 120,
            ..CacheConfig::default()
        };
        HandlerBase::new("memory", &config)
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(validate_key("", ""), Err(CacheError::Validation(_))));
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(validate_key("has space", "").unwrap(), "has_space");
        assert_eq!(validate_key("a \t\n b", "").unwrap(), "a_b");
        assert_eq!(validate_key(" lead", "").unwrap(), "_lead");
    }

    #[test]
    fn test_reserved_characters_rejected() {
        for key in ["a{b", "a}b", "a(b", "a)b", "a/b", "a\\b", "a@b", "a:b"] {
            assert!(
                matches!(validate_key(key, ""), Err(CacheError::Validation(_))),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn test_path_breaking_characters_only_when_requested() {
        assert!(validate_key("a?b", "").is_ok());
        assert!(validate_key("a?b", PATH_BREAKING_CHARACTERS).is_err());
        assert!(validate_key("a|b", PATH_BREAKING_CHARACTERS).is_err());
        assert!(validate_key("a\"b", PATH_BREAKING_CHARACTERS).is_err());
    }

    #[test]
    fn test_key_too_long() {
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            validate_key(&long_key, ""),
            Err(CacheError::Validation(_))
        ));
    }

    #[test]
    fn test_unicode_allowed() {
        assert_eq!(validate_key("café-ключ", "").unwrap(), "café-ключ");
    }

    #[test]
    fn test_offset_validation() {
        assert!(validate_offset(0).is_ok());
        assert!(validate_offset(5).is_ok());
        assert!(matches!(validate_offset(-1), Err(CacheError::Validation(_))));
    }

    #[test]
    fn test_is_group_matches_configured_names_only() {
        let base = base(&["users", "posts"]);
        assert!(base.is_group("users"));
        assert!(!base.is_group("hits"));
        assert!(!base.is_group("user"));
    }

    #[test]
    fn test_compose_without_groups() {
        let base = base(&[]);
        assert_eq!(HandlerBase::signature(&[]), "");
        assert_eq!(base.compose("", "42"), "t_42");
    }

    #[test]
    fn test_compose_with_group_signature() {
        let base = base(&["users"]);
        let signature = HandlerBase::signature(&[GroupToken::new("users", 1)]);
        assert_eq!(base.compose(&signature, "42"), "t_users.1.42");

        let bumped = HandlerBase::signature(&[GroupToken::new("users", 2)]);
        assert_ne!(base.compose(&bumped, "42"), base.compose(&signature, "42"));
    }

    #[test]
    fn test_generation_keys() {
        let base = base(&["users", "posts"]);
        assert_eq!(base.generation_keys(), vec!["t_users", "t_posts"]);
    }

    #[test]
    fn test_resolve_ttl() {
        let base = base(&[]);
        assert_eq!(base.resolve_ttl(None), 120);
        assert_eq!(base.resolve_ttl(Some(Duration::from_secs(60))), 60);
        assert_eq!(base.resolve_ttl(Some(Duration::from_millis(1500))), 2);
        assert_eq!(base.resolve_ttl(Some(Duration::ZERO)), 0);
    }

    #[test]
    fn test_value_encoding() {
        let value = serde_json::json!({"name": "Ada"});
        let raw = encode_value(&value).unwrap();
        assert_eq!(decode_value(&raw).unwrap(), value);
        assert!(decode_value("{not json").is_err());
    }
}
