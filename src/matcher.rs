//! Predicates over single lines of container output.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

/// Line predicate used to gate readiness on container output.
///
/// Matchers are stateless and look at one line at a time; nothing carries
/// over between lines.
#[derive(Clone)]
pub enum Matcher {
    /// Line contains the pattern.
    Substring(String),
    /// Line equals the pattern once surrounding whitespace is trimmed.
    Exact(String),
    /// Line matches the regular expression.
    Regex(Regex),
    /// Arbitrary predicate.
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Matcher {
    pub fn substring(pattern: impl Into<String>) -> Self {
        Matcher::Substring(pattern.into())
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Matcher::Exact(pattern.into())
    }

    pub fn regex(re: Regex) -> Self {
        Matcher::Regex(re)
    }

    pub fn from_fn(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Custom(Arc::new(f))
    }

    fn kind(&self) -> &'static str {
        match self {
            Matcher::Substring(_) => "substring",
            Matcher::Exact(_) => "exact",
            Matcher::Regex(_) => "regexp",
            Matcher::Custom(_) => "custom",
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        let ok = match self {
            Matcher::Substring(pattern) => line.contains(pattern.as_str()),
            Matcher::Exact(pattern) => line.trim() == pattern.as_str(),
            Matcher::Regex(re) => re.is_match(line),
            Matcher::Custom(f) => f(line),
        };

        tracing::trace!(kind = self.kind(), pattern = %self, line, result = ok, "matching string");
        ok
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Substring(p) | Matcher::Exact(p) => f.write_str(p),
            Matcher::Regex(re) => f.write_str(re.as_str()),
            Matcher::Custom(_) => f.write_str("<fn>"),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matcher::{}({})", self.kind(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_matcher() {
        let m = Matcher::substring("blah");

        assert!(!m.matches("someunexpected"));
        assert!(m.matches("test blah test"));
        assert!(m.matches("blah"));
    }

    #[test]
    fn test_exact_matcher() {
        let m = Matcher::exact("blah");

        assert!(!m.matches("asdasdasda"));
        assert!(!m.matches("test blah test"));
        assert!(m.matches("blah"));
        assert!(m.matches("  blah\t"));
    }

    #[test]
    fn test_regex_matcher() {
        let m = Matcher::regex(Regex::new("^blah$").unwrap());

        assert!(!m.matches("blah "));
        assert!(!m.matches(" blah"));
        assert!(m.matches("blah"));
    }

    #[test]
    fn test_custom_matcher() {
        let m = Matcher::from_fn(|l| l.len() == 3);
        assert!(m.matches("abc"));
        assert!(!m.matches("abcd"));
        assert_eq!(format!("{m:?}"), "Matcher::custom(<fn>)");
    }
}
