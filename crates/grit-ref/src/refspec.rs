//! Refspecs: `[+]<src>:<dst>` mapping rules with a single `*` wildcard.

use std::fmt;
use std::str::FromStr;

use crate::error::RefError;

/// A fetch or push refspec.
///
/// `+refs/heads/*:refs/remotes/origin/*` — the optional leading `+`
/// forces non-fast-forward updates; the `*` wildcard, when present,
/// must appear exactly once on each side or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    force: bool,
    src: String,
    dst: String,
}

impl RefSpec {
    /// Parse and validate a refspec.
    pub fn parse(spec: &str) -> Result<Self, RefError> {
        let (force, rest) = match spec.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };

        let colon = rest
            .find(':')
            .ok_or_else(|| RefError::InvalidRefSpec(format!("missing ':' in '{spec}'")))?;
        let (src, dst) = (&rest[..colon], &rest[colon + 1..]);

        let src_wild = src.matches('*').count();
        let dst_wild = dst.matches('*').count();
        if src_wild > 1 || dst_wild > 1 {
            return Err(RefError::InvalidRefSpec(format!(
                "more than one '*' in '{spec}'"
            )));
        }
        if src_wild != dst_wild {
            return Err(RefError::InvalidRefSpec(format!(
                "'*' must appear on both sides or neither in '{spec}'"
            )));
        }
        if dst.is_empty() {
            return Err(RefError::InvalidRefSpec(format!(
                "empty destination in '{spec}'"
            )));
        }

        Ok(Self {
            force,
            src: src.to_string(),
            dst: dst.to_string(),
        })
    }

    pub fn is_force(&self) -> bool {
        self.force
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn dst(&self) -> &str {
        &self.dst
    }

    pub fn is_wildcard(&self) -> bool {
        self.src.contains('*')
    }

    /// Does `name` match the source side?
    pub fn matches(&self, name: &str) -> bool {
        match self.src.split_once('*') {
            Some((prefix, suffix)) => {
                name.len() >= prefix.len() + suffix.len()
                    && name.starts_with(prefix)
                    && name.ends_with(suffix)
            }
            None => self.src == name,
        }
    }

    /// Map a matching source name onto the destination side.
    ///
    /// `None` when `name` does not match.
    pub fn destination(&self, name: &str) -> Option<String> {
        if !self.matches(name) {
            return None;
        }
        match self.src.split_once('*') {
            Some((prefix, suffix)) => {
                let middle = &name[prefix.len()..name.len() - suffix.len()];
                Some(self.dst.replacen('*', middle, 1))
            }
            None => Some(self.dst.clone()),
        }
    }

    /// Map a destination name back to its source (used by push status).
    pub fn source_for(&self, dst_name: &str) -> Option<String> {
        match self.dst.split_once('*') {
            Some((prefix, suffix)) => {
                if dst_name.len() >= prefix.len() + suffix.len()
                    && dst_name.starts_with(prefix)
                    && dst_name.ends_with(suffix)
                {
                    let middle = &dst_name[prefix.len()..dst_name.len() - suffix.len()];
                    Some(self.src.replacen('*', middle, 1))
                } else {
                    None
                }
            }
            None => (self.dst == dst_name).then(|| self.src.clone()),
        }
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.force {
            write!(f, "+")?;
        }
        write!(f, "{}:{}", self.src, self.dst)
    }
}

impl FromStr for RefSpec {
    type Err = RefError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_match_and_destination() {
        let spec = RefSpec::parse("+refs/heads/*:refs/remotes/origin/*").unwrap();
        assert!(spec.is_force());
        assert!(spec.is_wildcard());
        assert!(spec.matches("refs/heads/master"));
        assert_eq!(
            spec.destination("refs/heads/master").unwrap(),
            "refs/remotes/origin/master"
        );
        assert!(!spec.matches("refs/tags/v1"));
        assert_eq!(spec.destination("refs/tags/v1"), None);
    }

    #[test]
    fn exact_match() {
        let spec = RefSpec::parse("refs/heads/main:refs/heads/main").unwrap();
        assert!(!spec.is_force());
        assert!(spec.matches("refs/heads/main"));
        assert!(!spec.matches("refs/heads/main2"));
        assert_eq!(
            spec.destination("refs/heads/main").unwrap(),
            "refs/heads/main"
        );
    }

    #[test]
    fn wildcard_with_suffix() {
        let spec = RefSpec::parse("refs/heads/*-stable:refs/stable/*-stable").unwrap();
        assert!(spec.matches("refs/heads/v2-stable"));
        assert_eq!(
            spec.destination("refs/heads/v2-stable").unwrap(),
            "refs/stable/v2-stable"
        );
        assert!(!spec.matches("refs/heads/v2"));
    }

    #[test]
    fn reverse_mapping() {
        let spec = RefSpec::parse("refs/heads/*:refs/remotes/origin/*").unwrap();
        assert_eq!(
            spec.source_for("refs/remotes/origin/dev").unwrap(),
            "refs/heads/dev"
        );
        assert_eq!(spec.source_for("refs/tags/v1"), None);
    }

    #[test]
    fn invalid_specs_rejected() {
        for bad in [
            "refs/heads/main",                  // no colon
            "refs/heads/*:refs/heads/main",     // asymmetric wildcard
            "refs/heads/main:refs/heads/*",     // asymmetric wildcard
            "refs/**:refs/x/**",                // double wildcard
            "refs/heads/main:",                 // empty destination
        ] {
            assert!(RefSpec::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn display_roundtrip() {
        for spec in ["+refs/heads/*:refs/remotes/origin/*", "refs/heads/a:refs/heads/b"] {
            assert_eq!(RefSpec::parse(spec).unwrap().to_string(), spec);
        }
    }
}
