//! Git URL parsing.
//!
//! Accepted forms:
//! - `ssh://[user@]host[:port]/path`
//! - `git://host[:port]/path`
//! - `http[s]://[user@]host[:port]/path`
//! - `file:///path`
//! - `/local/path`, `./relative/path`
//! - `user@host:path` (SCP-like SSH shorthand)

use crate::{GitUrl, Scheme, TransportError};

impl GitUrl {
    /// Parse a git URL in any accepted form.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(TransportError::InvalidUrl("empty URL".into()));
        }

        for (prefix, scheme) in [
            ("ssh://", Scheme::Ssh),
            ("git://", Scheme::Git),
            ("http://", Scheme::Http),
            ("https://", Scheme::Https),
        ] {
            if let Some(rest) = url.strip_prefix(prefix) {
                return parse_authority_form(scheme, rest);
            }
        }

        if let Some(rest) = url.strip_prefix("file://") {
            return Ok(GitUrl {
                scheme: Scheme::File,
                host: None,
                port: None,
                user: None,
                path: rest.to_string(),
            });
        }

        // Absolute and relative local paths.
        if url.starts_with('/') || url.starts_with('.') {
            return Ok(GitUrl {
                scheme: Scheme::Local,
                host: None,
                port: None,
                user: None,
                path: url.to_string(),
            });
        }

        // SCP-like shorthand: [user@]host:path.
        if let Some(colon) = url.find(':') {
            let host_part = &url[..colon];
            let path = &url[colon + 1..];

            let (user, host) = match host_part.split_once('@') {
                Some((user, host)) => (Some(user.to_string()), host.to_string()),
                None => (None, host_part.to_string()),
            };
            if host.is_empty() {
                return Err(TransportError::InvalidUrl(format!(
                    "empty host in '{url}'"
                )));
            }

            return Ok(GitUrl {
                scheme: Scheme::Ssh,
                host: Some(host),
                port: None,
                user,
                path: path.to_string(),
            });
        }

        Err(TransportError::InvalidUrl(format!(
            "could not parse URL: {url}"
        )))
    }
}

/// Parse `[user@]host[:port]/path` after the scheme.
fn parse_authority_form(scheme: Scheme, rest: &str) -> Result<GitUrl, TransportError> {
    let (authority, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], &rest[slash..]),
        None => (rest, "/"),
    };

    let (user, host_port) = match authority.split_once('@') {
        Some((user, host_port)) => (Some(user.to_string()), host_port),
        None => (None, authority),
    };

    let (host, port) = match host_port.split_once(':') {
        Some((host, port_str)) => {
            let port: u16 = port_str.parse().map_err(|_| {
                TransportError::InvalidUrl(format!("invalid port: '{port_str}'"))
            })?;
            (host, Some(port))
        }
        None => (host_port, None),
    };

    if host.is_empty() {
        return Err(TransportError::InvalidUrl("missing host".into()));
    }

    Ok(GitUrl {
        scheme,
        host: Some(host.to_string()),
        port,
        user,
        path: path.to_string(),
    })
}

impl std::fmt::Display for GitUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scheme {
            Scheme::Local => write!(f, "{}", self.path),
            Scheme::File => write!(f, "file://{}", self.path),
            Scheme::Ssh if self.port.is_none() && !self.path.starts_with('/') => {
                // SCP-like shorthand round-trips as shorthand.
                match &self.user {
                    Some(user) => write!(
                        f,
                        "{}@{}:{}",
                        user,
                        self.host.as_deref().unwrap_or(""),
                        self.path
                    ),
                    None => write!(
                        f,
                        "{}:{}",
                        self.host.as_deref().unwrap_or(""),
                        self.path
                    ),
                }
            }
            _ => {
                write!(f, "{}://", self.scheme)?;
                if let Some(ref user) = self.user {
                    write!(f, "{}@", user)?;
                }
                if let Some(ref host) = self.host {
                    write!(f, "{}", host)?;
                }
                if let Some(port) = self.port {
                    write!(f, ":{}", port)?;
                }
                write!(f, "{}", self.path)
            }
        }
    }
}

impl std::str::FromStr for GitUrl {
    type Err = TransportError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_with_everything() {
        let url = GitUrl::parse("https://user@example.com:8443/org/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::Https);
        assert_eq!(url.user.as_deref(), Some("user"));
        assert_eq!(url.host.as_deref(), Some("example.com"));
        assert_eq!(url.port, Some(8443));
        assert_eq!(url.path, "/org/repo.git");
    }

    #[test]
    fn git_daemon_url() {
        let url = GitUrl::parse("git://example.com/basic.git").unwrap();
        assert_eq!(url.scheme, Scheme::Git);
        assert_eq!(url.host.as_deref(), Some("example.com"));
        assert_eq!(url.port, None);
        assert_eq!(url.path, "/basic.git");
    }

    #[test]
    fn scp_like_shorthand() {
        let url = GitUrl::parse("git@github.com:org/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::Ssh);
        assert_eq!(url.user.as_deref(), Some("git"));
        assert_eq!(url.host.as_deref(), Some("github.com"));
        assert_eq!(url.path, "org/repo.git");
        assert_eq!(url.to_string(), "git@github.com:org/repo.git");
    }

    #[test]
    fn file_and_local_paths() {
        let url = GitUrl::parse("file:///srv/git/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::File);
        assert_eq!(url.path, "/srv/git/repo.git");

        let url = GitUrl::parse("/srv/git/repo.git").unwrap();
        assert_eq!(url.scheme, Scheme::Local);

        let url = GitUrl::parse("./relative/repo").unwrap();
        assert_eq!(url.scheme, Scheme::Local);
    }

    #[test]
    fn rejects_garbage() {
        assert!(GitUrl::parse("").is_err());
        assert!(GitUrl::parse("justaword").is_err());
        assert!(GitUrl::parse("https://user@example.com:notaport/x").is_err());
        assert!(GitUrl::parse("@:path").is_err());
    }

    #[test]
    fn display_roundtrip() {
        for s in [
            "https://example.com/org/repo.git",
            "ssh://user@host:2222/repo.git",
            "git://example.com/basic.git",
            "file:///srv/repo.git",
        ] {
            assert_eq!(GitUrl::parse(s).unwrap().to_string(), s);
        }
    }
}
