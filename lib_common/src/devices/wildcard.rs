//! # Wildcard Filters
//!
//! Device ids and resource paths of interest are configured as comma separated
//! pattern lists such as `/3303/*,/3304/0/5700`. A pattern may end with a single
//! `*` meaning "any suffix"; there is no mid-string wildcard.

/// Matches `candidate` against one `pattern`.
///
/// - An empty candidate never matches, there is nothing to compare.
/// - An empty pattern or `*` matches everything else.
/// - A trailing `*` matches on prefix.
/// - Anything else requires exact equality.
pub fn matches(pattern: &str, candidate: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}

/// True when `candidate` matches at least one of `patterns`.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], candidate: &str) -> bool {
    patterns
        .iter()
        .fold(false, |acc, pattern| acc || matches(pattern.as_ref(), candidate))
}

/// # Pattern Set
///
/// An ordered list of patterns evaluated with OR semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternSet {
    patterns: Vec<String>,
}

impl PatternSet {
    /// Builds a set from individual patterns.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a comma separated list, e.g. the `RESOURCE` setting.
    /// Surrounding whitespace on each item is dropped.
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(',').map(|p| p.trim().to_string()))
    }

    /// OR over every pattern in the set.
    pub fn matches(&self, candidate: &str) -> bool {
        matches_any(&self.patterns, candidate)
    }

    /// The raw patterns, in configuration order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_everything_patterns() {
        for candidate in ["dev1", "/3303/0/5700", "x"] {
            assert!(matches("", candidate));
            assert!(matches("*", candidate));
        }
    }

    #[test]
    fn test_empty_candidate_never_matches() {
        assert!(!matches("/3303/0/5700", ""));
        assert!(!matches("/3303/*", ""));
        assert!(!matches("*", ""));
    }

    #[test]
    fn test_trailing_wildcard_is_prefix_match() {
        assert!(matches("/3303/*", "/3303/0/5700"));
        assert!(!matches("/3304/*", "/3303/0/5700"));
        assert!(!matches("/3303/*", "/3304/0/5700"));
        // Only a trailing star is special.
        assert!(!matches("/3303/*/5700", "/3303/0/5700"));
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("/3303/0/5700", "/3303/0/5700"));
        assert!(!matches("/3303/0/5700", "/3303/0/5701"));
    }

    #[test]
    fn test_matches_any_is_or() {
        let patterns = ["/3304/*", "/3303/0/5700"];
        assert!(matches_any(&patterns, "/3303/0/5700"));
        assert!(matches_any(&patterns, "/3304/1/5700"));
        assert!(!matches_any(&patterns, "/3306/0/5850"));
        let none: [&str; 0] = [];
        assert!(!matches_any(&none, "/3303/0/5700"));
    }

    #[test]
    fn test_pattern_set_from_csv() {
        let set = PatternSet::from_csv("/3303/*, 016f*");
        assert_eq!(set.patterns(), &["/3303/*".to_string(), "016f*".to_string()]);
        assert!(set.matches("016f00aa"));
        assert!(set.matches("/3303/0/5700"));
        assert!(!set.matches("/3304/0/5700"));
    }
}
