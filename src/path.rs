//! Path and pattern utilities for the monitor-element namespace.
//!
//! Paths are forward-slash-separated strings over a restricted alphabet.
//! The empty string is the root directory. Normalization only strips
//! trailing slashes; there is no `.`/`..` resolution, path components are
//! plain names. Directory enumeration relies on total lexicographic order
//! of paths, so every helper here is careful to preserve it.

use crate::error::{DqmError, DqmResult};

/// Characters allowed in monitor-element paths.
pub const SAFE_CHARS: &str =
    "/ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-+=_()# ";

/// Strip any trailing slashes. The all-slash path normalizes to the root.
#[must_use]
pub fn clean_trailing_slashes(path: &str) -> &str {
    path.trim_end_matches('/')
}

/// True iff `path` equals `ofdir` or lies anywhere below it.
///
/// The empty directory is an ancestor of everything.
#[must_use]
pub fn is_subdirectory(ofdir: &str, path: &str) -> bool {
    ofdir.is_empty()
        || (path.starts_with(ofdir)
            && (path.len() == ofdir.len() || path.as_bytes()[ofdir.len()] == b'/'))
}

/// Validate a full path against the safe alphabet.
pub fn validate_path(full: &str) -> DqmResult<()> {
    if full.chars().all(|c| SAFE_CHARS.contains(c)) {
        Ok(())
    } else {
        Err(DqmError::IllegalName { name: full.into() })
    }
}

/// Split a full path into its directory part and leaf name.
///
/// A path without a slash is a root-level leaf: the directory part is empty.
#[must_use]
pub fn split_path(full: &str) -> (&str, &str) {
    match full.rfind('/') {
        Some(pos) => (&full[..pos], &full[pos + 1..]),
        None => ("", full),
    }
}

/// Join a directory and a leaf name. The root directory contributes no slash.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else {
        let mut full = String::with_capacity(dir.len() + name.len() + 1);
        full.push_str(dir);
        full.push('/');
        full.push_str(name);
        full
    }
}

/// A compiled wildcard pattern over full monitor-element paths.
///
/// `?` matches exactly one character and `*` any run of characters; neither
/// wildcard crosses a `/`, so `A/*` reaches the direct children of `A` only.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
}

impl GlobPattern {
    /// Compile `pattern`, rejecting characters outside the safe alphabet
    /// plus the two wildcards.
    pub fn compile(pattern: &str) -> DqmResult<Self> {
        if pattern.is_empty() {
            return Err(DqmError::BadPattern {
                pattern: pattern.into(),
                detail: "empty pattern".into(),
            });
        }
        if let Some(bad) = pattern
            .chars()
            .find(|&c| c != '?' && c != '*' && !SAFE_CHARS.contains(c))
        {
            return Err(DqmError::BadPattern {
                pattern: pattern.into(),
                detail: format!("character '{bad}' is not allowed"),
            });
        }
        Ok(Self {
            pattern: pattern.to_owned(),
        })
    }

    /// The original pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Match the pattern against a full path.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        glob_match(self.pattern.as_bytes(), path.as_bytes())
    }
}

/// Backtracking matcher. A `*` only ever consumes non-separator bytes, so
/// the candidate resume point never skips past a `/`.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == text[t] || (pattern[p] == b'?' && text[t] != b'/'))
        {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star
            && text[st] != b'/'
        {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
