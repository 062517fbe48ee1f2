//! Integrity hash normalization.
//!
//! Every artifact hash is stored in one canonical `algorithm:hex` form,
//! whatever encoding the ecosystem's lockfile uses:
//! - npm: Subresource Integrity strings, `sha512-<base64>` (possibly several
//!   space-separated entries)
//! - poetry: already `sha256:<hex>`

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{AuditError, Result};

/// Digest algorithms accepted in lockfiles, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A digest in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalHash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest.
    pub hex: String,
}

impl std::fmt::Display for CanonicalHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Normalize an npm `integrity` value.
///
/// When several digests are listed, the strongest algorithm wins.
pub fn normalize_sri(integrity: &str) -> Result<CanonicalHash> {
    let mut best: Option<CanonicalHash> = None;

    for token in integrity.split_whitespace() {
        let hash = normalize_sri_token(token)?;
        if best.as_ref().map_or(true, |b| hash.algorithm > b.algorithm) {
            best = Some(hash);
        }
    }

    best.ok_or_else(|| AuditError::UnsupportedEncoding(format!("empty integrity '{integrity}'")))
}

fn normalize_sri_token(token: &str) -> Result<CanonicalHash> {
    // Options after '?' are reserved by the SRI grammar and carry no digest.
    let token = token.split('?').next().unwrap_or(token);

    let (alg, b64) = token
        .split_once('-')
        .ok_or_else(|| AuditError::UnsupportedEncoding(format!("'{token}' is not <alg>-<base64>")))?;

    let algorithm = HashAlgorithm::from_name(alg)
        .ok_or_else(|| AuditError::UnsupportedEncoding(format!("unknown algorithm '{alg}'")))?;

    let digest = STANDARD
        .decode(b64)
        .map_err(|e| AuditError::UnsupportedEncoding(format!("bad base64 in '{token}': {e}")))?;
    if digest.is_empty() {
        return Err(AuditError::UnsupportedEncoding(format!("empty digest in '{token}'")));
    }

    Ok(CanonicalHash {
        algorithm,
        hex: hex::encode(digest),
    })
}

/// Parse a hash already written as `algorithm:hex`.
pub fn parse_canonical(hash: &str) -> Result<CanonicalHash> {
    let (alg, digest) = hash
        .split_once(':')
        .ok_or_else(|| AuditError::UnsupportedEncoding(format!("'{hash}' is not <alg>:<hex>")))?;

    let algorithm = HashAlgorithm::from_name(alg)
        .ok_or_else(|| AuditError::UnsupportedEncoding(format!("unknown algorithm '{alg}'")))?;

    if digest.is_empty() || hex::decode(digest).is_err() {
        return Err(AuditError::UnsupportedEncoding(format!(
            "'{digest}' is not a hex digest"
        )));
    }

    Ok(CanonicalHash {
        algorithm,
        hex: digest.to_lowercase(),
    })
}
