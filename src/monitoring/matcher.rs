//! Whitespace-insensitive substring matching of log lines

use crate::config::Pattern;

/// Collapse every whitespace run to a single space and trim both ends
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True iff the normalized search string occurs in the normalized line.
/// Case-sensitive.
pub fn matches(line: &str, pattern: &Pattern) -> bool {
    PatternMatcher::for_pattern(pattern).matches(line)
}

/// Matcher with the search string normalized once up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatcher {
    needle: String,
}

impl PatternMatcher {
    pub fn new(search_string: &str) -> Self {
        Self {
            needle: normalize(search_string),
        }
    }

    pub fn for_pattern(pattern: &Pattern) -> Self {
        Self::new(&pattern.search_string)
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn matches(&self, line: &str) -> bool {
        normalize(line).contains(self.needle.as_str())
    }
}
