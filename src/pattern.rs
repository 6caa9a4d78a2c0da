//! Glob patterns for keys and event types.
//!
//! The only special character is `*` which stands for any sequence of characters, including an empty one. Everything
//! else, `.` included, is matched literally. A pattern always has to match the whole string.

use crate::error::CacheError;
use moka::sync::Cache;
use regex::Regex;
use std::fmt::Debug;
use std::fmt::Display;

pub const WILDCARD: char = '*';

#[derive(Clone)]
enum Matcher {
    Exact,
    Regex(Regex),
}

/// A compiled glob pattern.
#[derive(Clone)]
pub struct GlobPattern {
    source:  String,
    matcher: Matcher,
}

impl GlobPattern {
    pub fn new<S: Into<String>>(pattern: S) -> Result<Self, CacheError> {
        let source = pattern.into();
        if source.is_empty() {
            return Err(CacheError::invalid_pattern(&source, "pattern is empty"));
        }

        let matcher = if source.contains(WILDCARD) {
            let body = source.split(WILDCARD).map(regex::escape).collect::<Vec<_>>().join(".*");
            Matcher::Regex(Regex::new(&format!("(?s)^{body}$"))?)
        }
        else {
            Matcher::Exact
        };

        Ok(Self { source, matcher })
    }

    #[inline]
    pub fn is_match(&self, subject: &str) -> bool {
        match self.matcher {
            Matcher::Exact => self.source == subject,
            Matcher::Regex(ref re) => re.is_match(subject),
        }
    }

    #[inline]
    pub fn has_wildcards(&self) -> bool {
        matches!(self.matcher, Matcher::Regex(_))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The literal pieces of the pattern, i.e. what is left after splitting by wildcards. Any string matching the
    /// pattern contains every fragment.
    pub fn fragments(&self) -> Vec<String> {
        fragments_of(&self.source)
    }
}

pub(crate) fn fragments_of(pattern: &str) -> Vec<String> {
    let mut fragments: Vec<String> = pattern
        .split(WILDCARD)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    fragments.dedup();
    fragments
}

impl Debug for GlobPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

impl Display for GlobPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Memoizes compiled patterns so that repeated invalidations by the same pattern don't recompile it.
pub(crate) struct PatternCache {
    compiled: Cache<String, GlobPattern>,
}

impl PatternCache {
    pub(crate) fn new(capacity: u64) -> Self {
        Self {
            compiled: Cache::builder().name("glob-patterns").max_capacity(capacity).build(),
        }
    }

    pub(crate) fn get(&self, pattern: &str) -> Result<GlobPattern, CacheError> {
        if let Some(compiled) = self.compiled.get(pattern) {
            return Ok(compiled);
        }

        let compiled = GlobPattern::new(pattern)?;
        self.compiled.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact() {
        let p = GlobPattern::new("user.updated").unwrap();
        assert!(!p.has_wildcards());
        assert!(p.is_match("user.updated"));
        assert!(!p.is_match("user.updated.v2"));
        assert!(!p.is_match("userxupdated"));
    }

    #[test]
    fn test_wildcards() {
        let p = GlobPattern::new("repo:user:*").unwrap();
        assert!(p.is_match("repo:user:123"));
        assert!(p.is_match("repo:user:"));
        assert!(!p.is_match("repo:order:789"));
        assert!(!p.is_match("xrepo:user:1"));

        let p = GlobPattern::new("user.*").unwrap();
        assert!(p.is_match("user.updated"));
        assert!(!p.is_match("userXupdated"));
        assert!(!p.is_match("order.created"));

        let p = GlobPattern::new("*.created").unwrap();
        assert!(p.is_match("order.created"));
        assert!(!p.is_match("order.created.late"));

        let p = GlobPattern::new("a*b*c").unwrap();
        assert!(p.is_match("abc"));
        assert!(p.is_match("a-xx-b-yy-c"));
        assert!(!p.is_match("a-c-b"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let p = GlobPattern::new("cache[1]+(x)?*").unwrap();
        assert!(p.is_match("cache[1]+(x)?tail"));
        assert!(!p.is_match("cache1x"));
    }

    #[test]
    fn test_empty_pattern() {
        assert!(matches!(GlobPattern::new(""), Err(CacheError::InvalidPattern { .. })));
    }

    #[test]
    fn test_fragments() {
        assert_eq!(fragments_of("user.*"), vec!["user.".to_string()]);
        assert_eq!(fragments_of("*.created"), vec![".created".to_string()]);
        assert_eq!(fragments_of("a*b*c"), vec!["a", "b", "c"]);
        assert!(fragments_of("**").is_empty());
        assert_eq!(fragments_of("order.created"), vec!["order.created".to_string()]);
    }

    #[test]
    fn test_pattern_cache() {
        let cache = PatternCache::new(8);
        let first = cache.get("repo:*").unwrap();
        let second = cache.get("repo:*").unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert!(cache.get("").is_err());
    }
}
