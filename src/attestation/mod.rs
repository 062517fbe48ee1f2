//! Provenance verification for resolved artifacts.
//!
//! A verifier fetches whatever evidence an ecosystem publishes for an
//! artifact, hands it to the [`EvidenceOracle`] and turns the verdicts into
//! [`Attestation`] records. Missing or rejected evidence is data, not an
//! error: only bad input (wrong hash algorithm, unparsable artifact name) and
//! infrastructure failures surface as `Err`.

pub mod cache;
pub mod claims;
pub mod npm;
pub mod oracle;
pub mod pypi;
pub mod source;

#[cfg(test)]
pub(crate) mod fakes;

use crate::error::Result;
use crate::model::{Attestation, Ecosystem};

pub use cache::{CacheKey, VerificationCache};
pub use npm::NpmVerifier;
pub use oracle::{CommandOracle, EvidenceBundle, EvidenceOracle, Verdict, VerifiedEvidence};
pub use pypi::PypiVerifier;
pub use source::{AttestationSource, EvidenceLocator, HttpAttestationSource};

/// One artifact to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactRequest<'a> {
    /// Package the artifact belongs to.
    pub package: &'a str,
    pub version: &'a str,
    /// npm locator (`pkg:npm/<name>@<version>`) or PyPI distribution filename.
    pub artifact: &'a str,
    /// Canonical `algorithm:hex` digest.
    pub hash: &'a str,
    /// Source repository the artifact must have been built from, if known.
    pub expected_repo_url: Option<&'a str>,
}

/// Verifies artifacts of one ecosystem.
pub trait AttestationVerifier: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    /// Attestations for the artifact in discovery order.
    ///
    /// Missing evidence yields exactly `[Attestation::missing()]`; any
    /// rejected piece of evidence yields exactly one verification failure.
    fn verify(&self, request: &ArtifactRequest<'_>) -> Result<Vec<Attestation>>;
}

/// Verify through `cache`, computing at most once per distinct request.
pub fn verify_cached(
    cache: &VerificationCache,
    verifier: &dyn AttestationVerifier,
    request: &ArtifactRequest<'_>,
) -> Result<Vec<Attestation>> {
    let key = CacheKey::new(verifier.ecosystem(), request);
    cache.get_or_compute(key, || verifier.verify(request))
}
