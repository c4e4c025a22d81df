//! Path exclusion for manifest building.
//!
//! A path is excluded when any of these hold:
//! - one of its components starts with `.` (dotfiles and dot-directories)
//! - it lives under the engine's own state directory
//! - it matches a user pattern
//!
//! User pattern grammar:
//! - `*` matches any run of characters except `/`
//! - `**` matches any run including `/`; `**/` may also match nothing
//! - `?` matches one character except `/`
//! - a trailing `/` makes the pattern a directory prefix
//! - a pattern without wildcards matches that exact path or anything below it

use regex::Regex;
use thiserror::Error;

/// Directory (relative to the vault root) holding the engine's own state.
pub const STATE_DIR: &str = ".vaultsync";

/// A user pattern that could not be compiled.
#[derive(Debug, Error)]
#[error("invalid exclude pattern {pattern:?}: {reason}")]
pub struct PatternError {
    /// The offending pattern.
    pub pattern: String,
    /// Why it was rejected.
    pub reason: String,
}

#[derive(Debug, Clone)]
enum Rule {
    /// Directory prefix, stored without the trailing slash.
    Prefix(String),
    Glob(Regex),
}

impl Rule {
    fn matches(&self, path: &str) -> bool {
        match self {
            Rule::Prefix(dir) => {
                path == dir
                    || (path.starts_with(dir.as_str())
                        && path.as_bytes().get(dir.len()) == Some(&b'/'))
            }
            Rule::Glob(re) => re.is_match(path),
        }
    }
}

/// Compiled exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<Rule>,
}

impl PathFilter {
    /// Compile user patterns. Empty and whitespace-only patterns are ignored.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            rules.push(compile(pattern)?);
        }
        Ok(Self { rules })
    }

    /// Whether `path` (vault-relative, `/`-separated) is left out of the manifest.
    pub fn is_excluded(&self, path: &str) -> bool {
        is_hidden(path) || self.rules.iter().any(|rule| rule.matches(path))
    }

    /// Number of user rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no user rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Dotfiles and dot-directories. Covers [`STATE_DIR`].
fn is_hidden(path: &str) -> bool {
    path.split('/').any(|component| component.starts_with('.'))
}

fn compile(pattern: &str) -> Result<Rule, PatternError> {
    let pattern = pattern.trim_start_matches("./").trim_start_matches('/');
    let has_wildcard = pattern.contains(['*', '?']);

    if !has_wildcard {
        let dir = pattern.trim_end_matches('/');
        if dir.is_empty() {
            return Err(PatternError {
                pattern: pattern.to_string(),
                reason: "pattern would exclude the whole vault".into(),
            });
        }
        return Ok(Rule::Prefix(dir.to_string()));
    }

    let (body, dir_prefix) = match pattern.strip_suffix('/') {
        Some(body) => (body, true),
        None => (pattern, false),
    };

    let mut re = String::with_capacity(body.len() * 2 + 8);
    re.push('^');
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    re.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                re.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                re.push_str("[^/]");
                i += 1;
            }
            c => {
                re.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    if dir_prefix {
        re.push_str("(?:/.*)?");
    }
    re.push('$');

    Regex::new(&re)
        .map(Rule::Glob)
        .map_err(|e| PatternError {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
