use std::sync::Arc;

use super::claims::{extract_claims, FULCIO_CLAIMS, MISSING_ISSUER};
use super::oracle::{EvidenceBundle, EvidenceOracle, Subject, Verdict};
use super::source::{AttestationSource, EvidenceLocator};
use super::{ArtifactRequest, AttestationVerifier};
use crate::error::{AuditError, Result};
use crate::model::{Attestation, Ecosystem};

/// SLSA provenance predicate published by `npm publish --provenance`.
pub const SLSA_PROVENANCE_V1: &str = "https://slsa.dev/provenance/v1";

/// Verifies npm tarballs against the registry's attestations endpoint.
///
/// Only SLSA provenance statements are considered; publish attestations and
/// other predicates are ignored. The expected repository is not checked for
/// npm.
pub struct NpmVerifier {
    source: Arc<dyn AttestationSource>,
    oracle: Arc<dyn EvidenceOracle>,
}

impl NpmVerifier {
    pub fn new(source: Arc<dyn AttestationSource>, oracle: Arc<dyn EvidenceOracle>) -> Self {
        Self { source, oracle }
    }
}

impl AttestationVerifier for NpmVerifier {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn verify(&self, request: &ArtifactRequest<'_>) -> Result<Vec<Attestation>> {
        if !request.hash.starts_with("sha512:") {
            return Err(AuditError::UnsupportedEncoding(format!(
                "{}: npm artifacts must carry a sha512 digest, got {}",
                request.artifact, request.hash
            )));
        }

        let locator = EvidenceLocator::Npm {
            name: request.package,
            version: request.version,
        };
        let Some(document) = self.source.fetch(&locator)? else {
            tracing::debug!(artifact = %request.artifact, "no attestations published");
            return Ok(vec![Attestation::missing()]);
        };

        let Some(entries) = document.get("attestations").and_then(|a| a.as_array()) else {
            return Ok(vec![Attestation::verification_failed(
                "attestations response has no \"attestations\" list",
            )]);
        };

        let mut attestations = Vec::new();
        for entry in entries {
            let predicate = entry.get("predicateType").and_then(|p| p.as_str());
            if predicate != Some(SLSA_PROVENANCE_V1) {
                continue;
            }
            let Some(evidence) = entry.get("bundle") else {
                return Ok(vec![Attestation::verification_failed(
                    "provenance attestation has no bundle",
                )]);
            };

            let bundle = EvidenceBundle {
                ecosystem: Ecosystem::Npm,
                evidence,
                subject: Subject {
                    name: request.artifact,
                    digest: request.hash,
                },
                publisher: None,
            };
            match self.oracle.verify(&bundle)? {
                Verdict::Verified(verified) => {
                    let claims = extract_claims(&verified.certificate_claims, FULCIO_CLAIMS);
                    if claims.issuer.is_none() {
                        return Ok(vec![Attestation::verification_failed(MISSING_ISSUER)]);
                    }
                    attestations.push(Attestation::from_claims(claims, None));
                }
                Verdict::Rejected(reason) => {
                    tracing::debug!(artifact = %request.artifact, %reason, "sigstore bundle rejected");
                    return Ok(vec![Attestation::verification_failed(format!(
                        "Invalid Sigstore bundle: {reason}"
                    ))]);
                }
            }
        }

        Ok(attestations)
    }
}
