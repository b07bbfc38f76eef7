//! VCS reference probe: detects likely version-control references (commit hashes,
//! revision numbers) embedded in free-form text such as commit messages.
//!
//! The git-hash pattern started life as an unused `hash_re: Regex` field on an early,
//! never-wired-up filter scaffold; this module finishes the job and adds svn/cvs probes.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VcsKind {
    Git,
    Svn,
    Cvs,
}

/// A compiled reference-detection pattern for one VCS kind.
pub struct VcsProbe {
    kind: VcsKind,
    pattern: &'static Regex,
}

impl VcsProbe {
    pub fn kind(&self) -> VcsKind {
        self.kind
    }

    /// Whether `text` contains something that looks like a reference to a commit/
    /// revision in this VCS.
    pub fn has_reference(&self, text: &[u8]) -> bool {
        match std::str::from_utf8(text) {
            Ok(s) => self.pattern.is_match(s),
            Err(_) => false,
        }
    }
}

fn git_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bcommit\s+[0-9a-f]{6,40}\b").unwrap())
}

fn svn_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\br[0-9]{2,}\b").unwrap())
}

fn cvs_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[0-9]+(?:\.[0-9]+)+\b").unwrap())
}

/// Looks up the reference-detection probe for a named VCS (`"git"`, `"svn"`, `"cvs"`).
pub fn find_vcs(name: &str) -> Option<VcsProbe> {
    match name.to_ascii_lowercase().as_str() {
        "git" => Some(VcsProbe { kind: VcsKind::Git, pattern: git_pattern() }),
        "svn" | "subversion" => Some(VcsProbe { kind: VcsKind::Svn, pattern: svn_pattern() }),
        "cvs" => Some(VcsProbe { kind: VcsKind::Cvs, pattern: cvs_pattern() }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_probe_detects_commit_hash() {
        let probe = find_vcs("git").unwrap();
        assert!(probe.has_reference(b"fixes bug from commit abc1234"));
        assert!(!probe.has_reference(b"no reference here"));
    }

    #[test]
    fn svn_probe_detects_revision() {
        let probe = find_vcs("svn").unwrap();
        assert!(probe.has_reference(b"merged in r4821"));
        assert!(!probe.has_reference(b"no revision here"));
    }

    #[test]
    fn cvs_probe_detects_dotted_revision() {
        let probe = find_vcs("cvs").unwrap();
        assert!(probe.has_reference(b"bumped to 1.4.2"));
        assert!(probe.has_reference(b"bumped to 1.4"));
        assert!(!probe.has_reference(b"no revision here"));
    }

    #[test]
    fn unknown_vcs_returns_none() {
        assert!(find_vcs("mercurial-but-not-really").is_none());
    }
}
