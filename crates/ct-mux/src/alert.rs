//! Host-scoped keyword alerts on merged output
//!
//! Advisory only: matches are logged and forwarded, output is never altered.

use ct_core::HostName;
use regex::bytes::RegexSet;

/// Keywords that flag a chunk of output as worth surfacing
pub const ALERT_KEYWORDS: &[&str] = &[
    "error",
    "fail",
    "closed",
    "command not found",
    "permission denied",
    "no such file or directory",
    "unrecognized command",
    "invalid argument",
];

/// A keyword match in output from one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAlert {
    /// Source index within the multiplexer
    pub index: usize,
    /// Host that produced the output
    pub host: HostName,
    /// Keyword that matched
    pub keyword: &'static str,
}

/// Case-insensitive matcher over [`ALERT_KEYWORDS`]
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    set: RegexSet,
}

impl KeywordMatcher {
    /// Build the matcher
    pub fn new() -> Self {
        let patterns = ALERT_KEYWORDS
            .iter()
            .map(|keyword| format!("(?i){}", regex::escape(keyword)));
        let set = RegexSet::new(patterns).expect("alert keyword patterns are valid");
        Self { set }
    }

    /// Keywords found in `data`, in declaration order
    pub fn matches(&self, data: &[u8]) -> Vec<&'static str> {
        self.set
            .matches(data)
            .into_iter()
            .map(|i| ALERT_KEYWORDS[i])
            .collect()
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new()
    }
}
