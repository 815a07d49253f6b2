use crate::ObjectId;

/// The repository's object hash function.
///
/// Selected at repository-open time from `extensions.objectformat`; every
/// id-producing or id-consuming code path is parametric in this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashFormat {
    /// SHA-1, 20-byte digests (the default object format).
    #[default]
    Sha1,
    /// SHA-256, 32-byte digests (`extensions.objectformat = sha256`).
    Sha256,
}

impl HashFormat {
    /// Digest width in bytes.
    pub const fn raw_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Width of the hex representation.
    pub const fn hex_len(&self) -> usize {
        self.raw_len() * 2
    }

    /// The all-zeros sentinel id for this format.
    pub const fn zero(&self) -> ObjectId {
        match self {
            Self::Sha1 => ObjectId::ZERO_SHA1,
            Self::Sha256 => ObjectId::ZERO_SHA256,
        }
    }

    /// Look up by the `extensions.objectformat` config value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Look up by raw digest width.
    pub fn from_raw_len(len: usize) -> Option<Self> {
        match len {
            20 => Some(Self::Sha1),
            32 => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Look up by hex width.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }

    /// The config-file name of this format.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

impl std::fmt::Display for HashFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
