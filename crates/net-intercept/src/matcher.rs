//! Route matchers: which outbound calls a registration applies to.

use std::fmt;

use glob::{MatchOptions, Pattern};
use regex::Regex;
use trellis_core_types::{EngineError, EngineResult, HttpMethod, OutboundRequest};
use url::Url;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodPattern {
    Any,
    Only(HttpMethod),
}

impl MethodPattern {
    /// `*` or `ANY` match every method; anything else must name one.
    pub fn parse(raw: &str) -> EngineResult<Self> {
        match raw.trim() {
            "*" => Ok(MethodPattern::Any),
            other if other.eq_ignore_ascii_case("any") => Ok(MethodPattern::Any),
            other => other.parse().map(MethodPattern::Only),
        }
    }

    pub fn matches(&self, method: HttpMethod) -> bool {
        match self {
            MethodPattern::Any => true,
            MethodPattern::Only(expected) => *expected == method,
        }
    }
}

impl fmt::Display for MethodPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodPattern::Any => f.write_str("*"),
            MethodPattern::Only(method) => write!(f, "{method}"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum UrlPattern {
    /// Full URL, or path (plus optional query) when it starts with `/`
    Exact(String),
    /// `*` stays within one path segment, `**` spans segments
    Glob(Pattern),
    Regex(Regex),
}

impl UrlPattern {
    /// Strings containing `*`, `?` or `[` are globs, anything else is exact.
    pub fn parse(raw: &str) -> EngineResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EngineError::RegistrationConflict(
                "URL pattern must not be empty".to_string(),
            ));
        }
        if raw.contains(['*', '?', '[']) {
            Pattern::new(raw).map(UrlPattern::Glob).map_err(|err| {
                EngineError::RegistrationConflict(format!("bad URL glob `{raw}`: {err}"))
            })
        } else {
            Ok(UrlPattern::Exact(raw.to_string()))
        }
    }

    pub fn regex(raw: &str) -> EngineResult<Self> {
        Regex::new(raw)
            .map(UrlPattern::Regex)
            .map_err(|err| EngineError::RegistrationConflict(format!("bad URL regex: {err}")))
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Exact(expected) => {
                if expected == url {
                    return true;
                }
                expected.starts_with('/')
                    && path_forms(url)
                        .iter()
                        .any(|candidate| candidate == expected)
            }
            UrlPattern::Glob(pattern) => {
                pattern.matches_with(url, GLOB_OPTIONS)
                    || (pattern.as_str().starts_with('/')
                        && path_forms(url)
                            .iter()
                            .any(|candidate| pattern.matches_with(candidate, GLOB_OPTIONS)))
            }
            UrlPattern::Regex(regex) => regex.is_match(url),
        }
    }
}

/// `/path` and `/path?query` for absolute URLs.
fn path_forms(url: &str) -> Vec<String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path().to_string();
            match parsed.query() {
                Some(query) => vec![path.clone(), format!("{path}?{query}")],
                None => vec![path],
            }
        }
        Err(_) => Vec::new(),
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlPattern::Exact(url) => f.write_str(url),
            UrlPattern::Glob(pattern) => f.write_str(pattern.as_str()),
            UrlPattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// URL half of a registration as written in a test, compiled on register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UrlSource {
    /// Exact URL, path or glob, see [`UrlPattern::parse`]
    Pattern(String),
    Regex(String),
}

impl UrlSource {
    pub fn compile(&self) -> EngineResult<UrlPattern> {
        match self {
            UrlSource::Pattern(raw) => UrlPattern::parse(raw),
            UrlSource::Regex(raw) => UrlPattern::regex(raw),
        }
    }
}

impl From<&str> for UrlSource {
    fn from(raw: &str) -> Self {
        UrlSource::Pattern(raw.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(raw: String) -> Self {
        UrlSource::Pattern(raw)
    }
}

impl fmt::Display for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlSource::Pattern(raw) => f.write_str(raw),
            UrlSource::Regex(raw) => write!(f, "/{raw}/"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouteMatcher {
    pub method: MethodPattern,
    pub url: UrlPattern,
}

impl RouteMatcher {
    pub fn new(method: MethodPattern, url: UrlPattern) -> Self {
        Self { method, url }
    }

    pub fn parse(method: &str, url: &UrlSource) -> EngineResult<Self> {
        Ok(Self::new(MethodPattern::parse(method)?, url.compile()?))
    }

    pub fn matches(&self, request: &OutboundRequest) -> bool {
        self.method.matches(request.method) && self.url.matches(&request.url)
    }
}

impl fmt::Display for RouteMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGES: &str = "http://localhost:3000/posts/1/messages";

    #[test]
    fn exact_matches_full_url_or_path() {
        let full = UrlPattern::parse(MESSAGES).unwrap();
        assert!(full.matches(MESSAGES));
        assert!(!full.matches("http://localhost:3000/posts/2/messages"));

        let path = UrlPattern::parse("/posts/1/messages").unwrap();
        assert!(path.matches(MESSAGES));
        assert!(path.matches("http://localhost:3000/posts/1/messages"));
        assert!(!path.matches("http://localhost:3000/posts/1/messages/extra"));
    }

    #[test]
    fn globs_respect_segments() {
        let single = UrlPattern::parse("/posts/*/messages").unwrap();
        assert!(single.matches(MESSAGES));
        assert!(!single.matches("http://localhost:3000/posts/1/2/messages"));

        let deep = UrlPattern::parse("http://localhost:3000/posts/**").unwrap();
        assert!(deep.matches(MESSAGES));
    }

    #[test]
    fn malformed_patterns_are_conflicts() {
        assert!(matches!(
            UrlPattern::parse("  "),
            Err(EngineError::RegistrationConflict(_))
        ));
        assert!(matches!(
            UrlPattern::parse("/posts/[1"),
            Err(EngineError::RegistrationConflict(_))
        ));
        assert!(matches!(
            UrlPattern::regex("posts/(\\d+"),
            Err(EngineError::RegistrationConflict(_))
        ));
        assert!(matches!(
            MethodPattern::parse("FETCH"),
            Err(EngineError::RegistrationConflict(_))
        ));
    }

    #[test]
    fn method_and_url_must_both_match() {
        let matcher = RouteMatcher::parse("GET", &"/posts/1/messages".into()).unwrap();
        assert!(matcher.matches(&OutboundRequest::get(MESSAGES)));
        assert!(!matcher.matches(&OutboundRequest::new(HttpMethod::Post, MESSAGES)));

        let any = RouteMatcher::parse(
            "*",
            &UrlSource::Regex(r"/posts/\d+/messages$".to_string()),
        )
        .unwrap();
        assert!(any.matches(&OutboundRequest::new(HttpMethod::Delete, MESSAGES)));
        assert_eq!(any.to_string(), "* //posts/\\d+/messages$/");
    }
}
