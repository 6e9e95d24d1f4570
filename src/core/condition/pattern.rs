//! Pattern compilation for `Like` / `RegEx` conditions
//!
//! Supports:
//! - `*` wildcards in Like patterns (any run of characters), `\*` for a literal star
//! - Bare regular expressions, or delimiter-wrapped ones with flags (`/^abc$/i`)
//!
//! Compiled expressions are kept in a small LRU so repeated queries do not
//! recompile the same pattern. Only compilation is cached, never outcomes.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;

use crate::error::{PolicyError, Result};

/// Default number of compiled patterns kept around
pub const DEFAULT_PATTERN_CACHE: usize = 256;

const DELIMITERS: &[char] = &['/', '#', '~', '@', '%', '!'];

/// Translate a Like pattern into a fully-anchored, multiline regex source
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("(?m)^");
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => literal.push(escaped),
                None => literal.push('\\'),
            },
            '*' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(".*");
            }
            _ => literal.push(c),
        }
    }

    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

/// Regex source for a RegEx condition value.
///
/// A value wrapped in delimiters (`/body/flags`) is unwrapped and its flags
/// become inline flags; anything else is taken as the bare body.
pub fn regex_source(pattern: &str) -> String {
    match unwrap_delimited(pattern) {
        Some((body, flags)) if flags.is_empty() => body.to_string(),
        Some((body, flags)) => format!("(?{flags}){body}"),
        None => pattern.to_string(),
    }
}

fn unwrap_delimited(pattern: &str) -> Option<(&str, String)> {
    let delim = pattern.chars().next().filter(|c| DELIMITERS.contains(c))?;
    let end = pattern.rfind(delim)?;
    if end == 0 {
        return None;
    }

    let body = &pattern[delim.len_utf8()..end];
    let mut flags = String::new();
    for flag in pattern[end + delim.len_utf8()..].chars() {
        match flag {
            'i' | 'm' | 's' | 'x' | 'U' => {
                if !flags.contains(flag) {
                    flags.push(flag);
                }
            }
            // Unicode is always on
            'u' => {}
            _ => return None,
        }
    }
    Some((body, flags))
}

/// Bounded cache of compiled patterns
pub struct PatternCache {
    cache: Mutex<LruCache<String, Regex>>,
}

impl PatternCache {
    /// Create a cache holding at most `capacity` compiled patterns
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        PatternCache {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Compiled form of a Like pattern
    pub fn like(&self, pattern: &str) -> Result<Regex> {
        self.compile(pattern, like_to_regex(pattern))
    }

    /// Compiled form of a RegEx condition value
    pub fn regex(&self, pattern: &str) -> Result<Regex> {
        self.compile(pattern, regex_source(pattern))
    }

    fn compile(&self, original: &str, source: String) -> Result<Regex> {
        if let Some(re) = self.cache.lock().get(&source) {
            return Ok(re.clone());
        }

        let re = Regex::new(&source).map_err(|source| PolicyError::InvalidPattern {
            pattern: original.to_string(),
            source,
        })?;
        self.cache.lock().put(source, re.clone());
        Ok(re)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE)
    }
}

impl std::fmt::Debug for PatternCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("PatternCache")
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_translation() {
        assert_eq!(like_to_regex("a*c"), "(?m)^a.*c$");
        assert_eq!(like_to_regex("v1.0"), r"(?m)^v1\.0$");
        assert_eq!(like_to_regex(r"a\*b"), r"(?m)^a\*b$");
    }

    #[test]
    fn test_like_matching() {
        let cache = PatternCache::default();
        let re = cache.like("a*c").unwrap();
        assert!(re.is_match("abc"));
        assert!(re.is_match("ac"));
        assert!(!re.is_match("abx"));

        let escaped = cache.like(r"price\*").unwrap();
        assert!(escaped.is_match("price*"));
        assert!(!escaped.is_match("prices"));
    }

    #[test]
    fn test_like_is_case_sensitive() {
        let cache = PatternCache::default();
        let re = cache.like("Admin*").unwrap();
        assert!(re.is_match("Administrator"));
        assert!(!re.is_match("administrator"));
    }

    #[test]
    fn test_regex_source_wrapping() {
        assert_eq!(regex_source("^[0-9]+$"), "^[0-9]+$");
        assert_eq!(regex_source("/^abc$/"), "^abc$");
        assert_eq!(regex_source("/^abc$/i"), "(?i)^abc$");
        assert_eq!(regex_source("#a/b#mu"), "(?m)a/b");
        // trailing text is not a flag set, so the value is a bare pattern
        assert_eq!(regex_source("/a/b"), "/a/b");
    }

    #[test]
    fn test_regex_matching() {
        let cache = PatternCache::default();
        let re = cache.regex("^[0-9]+$").unwrap();
        assert!(re.is_match("42"));
        assert!(!re.is_match("4a"));

        let insensitive = cache.regex("/^admin$/i").unwrap();
        assert!(insensitive.is_match("ADMIN"));
    }

    #[test]
    fn test_malformed_pattern_is_an_error() {
        let cache = PatternCache::default();
        let err = cache.regex("([0-9]").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPattern { .. }));
    }

    #[test]
    fn test_cache_reuse_and_eviction() {
        let cache = PatternCache::new(2);
        cache.regex("^a$").unwrap();
        cache.regex("^a$").unwrap();
        assert_eq!(cache.len(), 1);

        cache.regex("^b$").unwrap();
        cache.regex("^c$").unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
