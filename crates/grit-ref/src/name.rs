use std::fmt;

use bstr::{BStr, BString, ByteSlice};

use crate::error::RefError;

/// A validated reference name.
///
/// Enforces the rules of `git-check-ref-format(1)`:
/// - no `..` anywhere, no `@{`, not the single character `@`
/// - no ASCII control characters, space, `~`, `^`, `:`, `?`, `*`, `[`, `\`
/// - no leading or trailing `/`, no `//`, every segment non-empty
/// - no segment starting or ending with `.`, no `.lock` segment suffix
/// - at least one `/` unless it is one of the well-known top-level refs
///   (`HEAD`, `FETCH_HEAD`, `ORIG_HEAD`, `MERGE_HEAD`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(BString);

const FORBIDDEN_CHARS: &[u8] = b" ~^:?*[\\";

/// Top-level refs valid without a `/`.
const WELL_KNOWN: &[&str] = &["HEAD", "FETCH_HEAD", "ORIG_HEAD", "MERGE_HEAD"];

impl RefName {
    /// Validate and wrap a ref name.
    pub fn new(name: impl Into<BString>) -> Result<Self, RefError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// The conventional branch ref for a short branch name.
    pub fn branch(short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/heads/{short}"))
    }

    /// The conventional tag ref for a short tag name.
    pub fn tag(short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/tags/{short}"))
    }

    /// The conventional remote-tracking ref.
    pub fn remote(remote: &str, short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/remotes/{remote}/{short}"))
    }

    pub const HEAD: &'static str = "HEAD";

    /// The short name: `main` for `refs/heads/main`, etc.
    pub fn short_name(&self) -> &BStr {
        let s = self.0.as_bstr();
        for prefix in [
            b"refs/heads/".as_slice(),
            b"refs/tags/",
            b"refs/remotes/",
        ] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return rest.as_bstr();
            }
        }
        s
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(b"refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with(b"refs/tags/")
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with(b"refs/remotes/")
    }

    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }

    /// Ref names that git accepts are ASCII in practice.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid-utf8>")
    }
}

impl AsRef<BStr> for RefName {
    fn as_ref(&self) -> &BStr {
        self.0.as_bstr()
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RefName {
    type Err = RefError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

fn validate(name: &[u8]) -> Result<(), RefError> {
    let reject = |why: &str| {
        Err(RefError::InvalidName(format!(
            "'{}': {why}",
            String::from_utf8_lossy(name)
        )))
    };

    if name.is_empty() {
        return reject("empty name");
    }
    if name == b"@" {
        return reject("'@' alone is reserved");
    }
    if name.contains(&0) {
        return reject("contains NUL");
    }
    for &b in name {
        if b < 0x20 || b == 0x7f {
            return reject("contains a control character");
        }
        if FORBIDDEN_CHARS.contains(&b) {
            return reject("contains a forbidden character");
        }
    }
    if name.find(b"..").is_some() {
        return reject("contains '..'");
    }
    if name.find(b"@{").is_some() {
        return reject("contains '@{'");
    }
    if name.starts_with(b"/") || name.ends_with(b"/") {
        return reject("leading or trailing '/'");
    }
    if name.ends_with(b".") {
        return reject("trailing '.'");
    }

    let mut has_slash = false;
    for segment in name.split(|&b| b == b'/') {
        if segment.is_empty() {
            return reject("empty path segment");
        }
        if segment.starts_with(b".") {
            return reject("segment starts with '.'");
        }
        if segment.ends_with(b".lock") {
            return reject("segment ends with '.lock'");
        }
    }
    if name.contains(&b'/') {
        has_slash = true;
    }

    if !has_slash {
        let as_str = std::str::from_utf8(name).unwrap_or("");
        if !WELL_KNOWN.contains(&as_str) {
            return reject("single-level names are reserved for well-known refs");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conventional_names() {
        for name in [
            "HEAD",
            "FETCH_HEAD",
            "ORIG_HEAD",
            "MERGE_HEAD",
            "refs/heads/main",
            "refs/heads/feature/nested-topic",
            "refs/tags/v1.0.0",
            "refs/remotes/origin/master",
        ] {
            assert!(RefName::new(name).is_ok(), "rejected {name}");
        }
    }

    #[test]
    fn rejects_rule_violations() {
        for name in [
            "",
            "@",
            "refs/heads/a..b",
            "refs/heads/main.lock",
            "refs/heads/ma in",
            "refs/heads/ma~in",
            "refs/heads/ma^in",
            "refs/heads/ma:in",
            "refs/heads/ma?in",
            "refs/heads/ma*in",
            "refs/heads/ma[in",
            "refs/heads/ma\\in",
            "refs/heads/main/",
            "/refs/heads/main",
            "refs//heads/main",
            "refs/heads/main.",
            "refs/heads/.hidden",
            "refs/heads/a@{b}",
            "master",
            "refs/heads/ctrl\x07char",
        ] {
            assert!(RefName::new(name).is_err(), "accepted {name:?}");
        }
    }

    #[test]
    fn constructors_build_namespaced_refs() {
        assert_eq!(
            RefName::branch("main").unwrap().as_str(),
            "refs/heads/main"
        );
        assert_eq!(RefName::tag("v1").unwrap().as_str(), "refs/tags/v1");
        assert_eq!(
            RefName::remote("origin", "main").unwrap().as_str(),
            "refs/remotes/origin/main"
        );
    }

    #[test]
    fn short_names() {
        assert_eq!(
            RefName::new("refs/heads/main").unwrap().short_name(),
            "main"
        );
        assert_eq!(RefName::new("refs/tags/v1").unwrap().short_name(), "v1");
        assert_eq!(
            RefName::new("refs/remotes/origin/dev")
                .unwrap()
                .short_name(),
            "origin/dev"
        );
        assert_eq!(RefName::new("HEAD").unwrap().short_name(), "HEAD");
    }

    #[test]
    fn namespace_predicates() {
        assert!(RefName::new("refs/heads/x").unwrap().is_branch());
        assert!(RefName::new("refs/tags/x").unwrap().is_tag());
        assert!(RefName::new("refs/remotes/o/x").unwrap().is_remote());
        assert!(!RefName::new("HEAD").unwrap().is_branch());
    }
}
