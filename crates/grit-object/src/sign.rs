//! Pluggable signing and verification.
//!
//! The codec treats signature blocks as opaque bytes; producing and
//! checking them is delegated to caller-supplied implementations of
//! these traits (gpg, ssh-keygen, an HSM, a test stub). Verification is
//! on demand only — nothing is verified implicitly on read.

use crate::commit::Commit;
use crate::tag::Tag;

/// How far a verified signature can be trusted, mirroring gpg's levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrustLevel {
    Undefined,
    Never,
    Marginal,
    Full,
    Ultimate,
}

/// Outcome of verifying a detached signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    pub key_id: String,
    pub signer: String,
    pub trust: TrustLevel,
}

/// Produces detached signatures over object payloads.
pub trait Signer {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sign `payload` (the unsigned object encoding), returning the
    /// armored signature bytes to embed under `gpgsig`.
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, Self::Error>;
}

/// Checks detached signatures over object payloads.
pub trait Verifier {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Verify `signature` against `payload` (the unsigned object
    /// encoding).
    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<Verification, Self::Error>;
}

/// Verify a commit's embedded signature with the given verifier.
///
/// Returns `None` when the commit is unsigned.
pub fn verify_commit<V: Verifier>(
    commit: &Commit,
    verifier: &V,
) -> Option<Result<Verification, V::Error>> {
    let sig = commit.signature.as_ref()?;
    Some(verifier.verify(&commit.serialize_unsigned(), &sig.data))
}

/// Verify a tag's trailing signature with the given verifier.
pub fn verify_tag<V: Verifier>(
    tag: &Tag,
    verifier: &V,
) -> Option<Result<Verification, V::Error>> {
    let sig = tag.signature.as_ref()?;
    Some(verifier.verify(&tag.serialize_unsigned(), sig))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{CommitSignature, SignatureFormat};
    use bstr::BString;
    use grit_hash::ObjectId;
    use grit_utils::{Identity, When};

    #[derive(Debug, thiserror::Error)]
    #[error("stub failure")]
    struct StubError;

    /// Accepts a signature iff it equals the reversed payload length tag.
    struct StubVerifier;

    impl Verifier for StubVerifier {
        type Error = StubError;
        fn verify(
            &self,
            payload: &[u8],
            signature: &[u8],
        ) -> Result<Verification, Self::Error> {
            Ok(Verification {
                valid: signature == format!("sig:{}", payload.len()).as_bytes(),
                key_id: "STUB".into(),
                signer: "stub".into(),
                trust: TrustLevel::Full,
            })
        }
    }

    fn unsigned_commit() -> Commit {
        Commit {
            tree: ObjectId::ZERO_SHA1,
            parents: Vec::new(),
            author: Identity::new("A", "a@b.c", When::new(1, 0)),
            committer: Identity::new("A", "a@b.c", When::new(1, 0)),
            encoding: None,
            extra_headers: Vec::new(),
            signature: None,
            message: BString::from("msg\n"),
        }
    }

    #[test]
    fn unsigned_commit_yields_none() {
        assert!(verify_commit(&unsigned_commit(), &StubVerifier).is_none());
    }

    #[test]
    fn verification_runs_over_unsigned_payload() {
        let mut commit = unsigned_commit();
        let payload_len = commit.serialize_unsigned().len();
        commit.signature = Some(CommitSignature {
            format: SignatureFormat::Gpg,
            data: BString::from(format!("sig:{payload_len}")),
        });

        let result = verify_commit(&commit, &StubVerifier).unwrap().unwrap();
        assert!(result.valid);
        assert_eq!(result.trust, TrustLevel::Full);
    }

    #[test]
    fn tampered_payload_fails() {
        let mut commit = unsigned_commit();
        let payload_len = commit.serialize_unsigned().len();
        commit.signature = Some(CommitSignature {
            format: SignatureFormat::Gpg,
            data: BString::from(format!("sig:{payload_len}")),
        });
        commit.message = BString::from("tampered message\n");

        let result = verify_commit(&commit, &StubVerifier).unwrap().unwrap();
        assert!(!result.valid);
    }
}
