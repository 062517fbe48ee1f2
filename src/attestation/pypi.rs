use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::claims::{extract_claims, FULCIO_CLAIMS, MISSING_ISSUER};
use super::oracle::{EvidenceBundle, EvidenceOracle, Publisher, Subject, Verdict};
use super::source::{AttestationSource, EvidenceLocator};
use super::{ArtifactRequest, AttestationVerifier};
use crate::error::{AuditError, Result};
use crate::model::{Attestation, Ecosystem};

const SUPPORTED_REPO_HOSTS: &[&str] = &["github.com", "gitlab.com"];

static WHEEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>[^-]+)-(?P<version>[^-]+)(?:-(?P<build>\d[^-]*))?-(?P<python>[^-]+)-(?P<abi>[^-]+)-(?P<platform>[^-]+)\.whl$",
    )
    .unwrap()
});

static SDIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>.+)-(?P<version>[^-]+)\.(?:tar\.gz|zip)$").unwrap()
});

static NAME_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.]+").unwrap());

/// A distribution filename split into project name and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistFilename {
    /// Canonical project name (lowercase, separator runs folded to `-`).
    pub name: String,
    pub version: String,
}

/// Parse a wheel or sdist filename.
pub fn parse_dist_filename(filename: &str) -> Result<DistFilename> {
    let captures = WHEEL_RE
        .captures(filename)
        .or_else(|| SDIST_RE.captures(filename))
        .ok_or_else(|| {
            AuditError::InvalidArtifact(format!("{filename}: not a wheel or sdist filename"))
        })?;

    Ok(DistFilename {
        name: NAME_SEPARATORS
            .replace_all(&captures["name"], "-")
            .to_lowercase(),
        version: captures["version"].to_string(),
    })
}

/// PyPI integrity API provenance document.
#[derive(Debug, Deserialize)]
struct Provenance {
    attestation_bundles: Vec<AttestationBundle>,
}

#[derive(Debug, Deserialize)]
struct AttestationBundle {
    publisher: Publisher,
    attestations: Vec<serde_json::Value>,
}

/// Verifies PyPI distributions against the integrity API.
pub struct PypiVerifier {
    source: Arc<dyn AttestationSource>,
    oracle: Arc<dyn EvidenceOracle>,
}

impl PypiVerifier {
    pub fn new(source: Arc<dyn AttestationSource>, oracle: Arc<dyn EvidenceOracle>) -> Self {
        Self { source, oracle }
    }
}

impl AttestationVerifier for PypiVerifier {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn verify(&self, request: &ArtifactRequest<'_>) -> Result<Vec<Attestation>> {
        if !request.hash.starts_with("sha256:") {
            return Err(AuditError::UnsupportedEncoding(format!(
                "{}: PyPI distributions must carry a sha256 digest, got {}",
                request.artifact, request.hash
            )));
        }

        let dist = parse_dist_filename(request.artifact)?;
        let locator = EvidenceLocator::Pypi {
            name: &dist.name,
            version: &dist.version,
            filename: request.artifact,
        };
        let Some(document) = self.source.fetch(&locator)? else {
            tracing::debug!(artifact = %request.artifact, "no provenance published");
            return Ok(vec![Attestation::missing()]);
        };

        let provenance: Provenance = match serde_json::from_value(document) {
            Ok(p) => p,
            Err(e) => {
                return Ok(vec![Attestation::verification_failed(format!(
                    "Invalid provenance: {e}"
                ))])
            }
        };

        let mut attestations = Vec::new();
        for bundle in &provenance.attestation_bundles {
            if bundle.publisher.host().is_none() {
                return Ok(vec![Attestation::verification_failed(format!(
                    "Unsupported publisher: {}",
                    bundle.publisher.kind
                ))]);
            }
            if let Some(expected) = request.expected_repo_url {
                if let Err(reason) = check_repository_identity(expected, &bundle.publisher) {
                    tracing::debug!(artifact = %request.artifact, %reason, "repository identity mismatch");
                    return Ok(vec![Attestation::verification_failed(reason)]);
                }
            }

            for evidence in &bundle.attestations {
                let verification = EvidenceBundle {
                    ecosystem: Ecosystem::Pypi,
                    evidence,
                    subject: Subject {
                        name: request.artifact,
                        digest: request.hash,
                    },
                    publisher: Some(&bundle.publisher),
                };
                match self.oracle.verify(&verification)? {
                    Verdict::Verified(verified) => {
                        let claims = extract_claims(&verified.certificate_claims, FULCIO_CLAIMS);
                        if claims.issuer.is_none() {
                            return Ok(vec![Attestation::verification_failed(MISSING_ISSUER)]);
                        }
                        attestations.push(Attestation::from_claims(claims, verified.statement));
                    }
                    Verdict::Rejected(reason) => {
                        return Ok(vec![Attestation::verification_failed(format!(
                            "Verification failed: {reason}"
                        ))]);
                    }
                }
            }
        }

        Ok(attestations)
    }
}

/// Check that `publisher` is the repository at `expected`.
///
/// `expected` must be an `https` URL on a supported host; the publisher's
/// host must match and its `owner/repo` must equal the URL path. A trailing
/// `/` or `.git` on the URL is ignored.
pub fn check_repository_identity(
    expected: &str,
    publisher: &Publisher,
) -> std::result::Result<(), String> {
    let url = Url::parse(expected).map_err(|e| format!("Invalid repository URL {expected}: {e}"))?;
    if url.scheme() != "https" {
        return Err(format!("Repository URL must use https: {expected}"));
    }
    let host = url
        .host_str()
        .filter(|h| SUPPORTED_REPO_HOSTS.contains(h))
        .ok_or_else(|| format!("Unsupported repository host: {expected}"))?;

    let actual_host = publisher
        .host()
        .ok_or_else(|| format!("Unsupported publisher: {}", publisher.kind))?;
    if actual_host != host {
        return Err(format!(
            "Provenance was published from {actual_host}, expected a {host} repository"
        ));
    }

    let path = url.path().trim_start_matches('/').trim_end_matches('/');
    let expected_repo = path.strip_suffix(".git").unwrap_or(path);
    let actual_repo = publisher.repository.as_deref().unwrap_or_default();
    if actual_repo != expected_repo {
        return Err(format!(
            "Provenance was published from {actual_repo}, expected {expected_repo}"
        ));
    }

    Ok(())
}
