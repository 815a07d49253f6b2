//! Capability parsing and negotiation.
//!
//! In v1 the server's capabilities ride on the first advertised ref
//! line after a NUL byte. The client may only request capabilities the
//! server advertised.

use crate::ProtocolError;

/// The server's advertised capability set.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: Vec<CapabilityEntry>,
}

/// One capability, optionally `name=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityEntry {
    pub name: String,
    pub value: Option<String>,
}

impl Capabilities {
    /// Parse the space-separated capability string of a v1 banner line.
    pub fn parse(caps_str: &str) -> Self {
        let entries = caps_str
            .split_whitespace()
            .map(|cap| match cap.split_once('=') {
                Some((name, value)) => CapabilityEntry {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                },
                None => CapabilityEntry {
                    name: cap.to_string(),
                    value: None,
                },
            })
            .collect();
        Self { entries }
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// First value of a capability (`agent=git/2.39.0`).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    /// All values of a repeatable capability (`symref=`).
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.name == name)
            .filter_map(|e| e.value.as_deref())
            .collect()
    }

    /// The `symref=FROM:TO` mappings, `HEAD:refs/heads/main` style.
    pub fn symrefs(&self) -> Vec<(String, String)> {
        self.get_all("symref")
            .into_iter()
            .filter_map(|v| {
                v.split_once(':')
                    .map(|(from, to)| (from.to_string(), to.to_string()))
            })
            .collect()
    }

    /// Fail unless every requested capability was advertised
    /// (`agent=` is always fine to send).
    pub fn require(&self, requested: &[String]) -> Result<(), ProtocolError> {
        for cap in requested {
            let name = cap.split('=').next().unwrap_or(cap);
            if name == "agent" {
                continue;
            }
            if !self.has(name) {
                return Err(ProtocolError::UnknownCapability(name.to_string()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match &e.value {
                Some(v) => write!(f, "{}={}", e.name, v)?,
                None => write!(f, "{}", e.name)?,
            }
        }
        Ok(())
    }
}

/// Side-band flavor in use for a pack stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebandMode {
    /// Raw pack bytes, no multiplexing.
    None,
    /// `side-band`: up to 1000-byte frames.
    Band,
    /// `side-band-64k`: up to 65519-byte frames.
    Band64k,
}

/// Pick the richest side-band mode the server offers.
pub fn select_sideband(caps: &Capabilities) -> SidebandMode {
    if caps.has("side-band-64k") {
        SidebandMode::Band64k
    } else if caps.has("side-band") {
        SidebandMode::Band
    } else {
        SidebandMode::None
    }
}

const AGENT: &str = "agent=grit/0.1";

/// The capability list a fetch requests, given the server's set.
pub fn negotiate_fetch(server: &Capabilities, thin_pack: bool) -> Vec<String> {
    let mut client = Vec::new();

    if server.has("multi_ack_detailed") {
        client.push("multi_ack_detailed".into());
    } else if server.has("multi_ack") {
        client.push("multi_ack".into());
    }
    if server.has("side-band-64k") {
        client.push("side-band-64k".into());
    } else if server.has("side-band") {
        client.push("side-band".into());
    }
    if server.has("ofs-delta") {
        client.push("ofs-delta".into());
    }
    if thin_pack && server.has("thin-pack") {
        client.push("thin-pack".into());
    }
    client.push(AGENT.into());
    client
}

/// The capability list a push requests, given the server's set.
pub fn negotiate_push(server: &Capabilities) -> Vec<String> {
    let mut client = Vec::new();
    if server.has("report-status") {
        client.push("report-status".into());
    }
    if server.has("ofs-delta") {
        client.push("ofs-delta".into());
    }
    client.push(AGENT.into());
    client
}
