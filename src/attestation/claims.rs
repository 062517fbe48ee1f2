//! Signer-certificate claims.
//!
//! Sigstore's Fulcio CA embeds build facts in the signing certificate as
//! X.509 extensions under `1.3.6.1.4.1.57264.1`. The verification oracle
//! hands them back as an `OID -> value` map; this table decides which of
//! them land in which `Claims` field.

use std::collections::BTreeMap;

use crate::model::Claims;

/// A named slot in `Claims`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimField {
    Issuer,
    RunnerEnv,
    RepoUrl,
    RepoDigest,
    RepoRef,
    BuildConfigUrl,
    BuildConfigDigest,
    BuildTrigger,
    RunUrl,
}

impl ClaimField {
    fn slot<'a>(&self, claims: &'a mut Claims) -> &'a mut Option<String> {
        match self {
            Self::Issuer => &mut claims.issuer,
            Self::RunnerEnv => &mut claims.runner_env,
            Self::RepoUrl => &mut claims.repo_url,
            Self::RepoDigest => &mut claims.repo_digest,
            Self::RepoRef => &mut claims.repo_ref,
            Self::BuildConfigUrl => &mut claims.build_config_url,
            Self::BuildConfigDigest => &mut claims.build_config_digest,
            Self::BuildTrigger => &mut claims.build_trigger,
            Self::RunUrl => &mut claims.run_url,
        }
    }
}

/// Fulcio extension OIDs read from npm and PyPI signer certificates.
///
/// `.1.8` through `.1.21` are DER UTF8Strings; the oracle decodes them.
pub const FULCIO_CLAIMS: &[(&str, ClaimField)] = &[
    ("1.3.6.1.4.1.57264.1.8", ClaimField::Issuer),
    ("1.3.6.1.4.1.57264.1.11", ClaimField::RunnerEnv),
    ("1.3.6.1.4.1.57264.1.12", ClaimField::RepoUrl),
    ("1.3.6.1.4.1.57264.1.13", ClaimField::RepoDigest),
    ("1.3.6.1.4.1.57264.1.14", ClaimField::RepoRef),
    ("1.3.6.1.4.1.57264.1.18", ClaimField::BuildConfigUrl),
    ("1.3.6.1.4.1.57264.1.19", ClaimField::BuildConfigDigest),
    ("1.3.6.1.4.1.57264.1.20", ClaimField::BuildTrigger),
    ("1.3.6.1.4.1.57264.1.21", ClaimField::RunUrl),
];

/// Failure recorded for verified evidence whose certificate names no issuer.
pub const MISSING_ISSUER: &str = "verified evidence carries no issuer claim";

/// Fill a `Claims` record from certificate extensions using `table`.
///
/// Extensions not in the table are ignored; table entries with no matching
/// extension stay `None`.
pub fn extract_claims(
    certificate_claims: &BTreeMap<String, String>,
    table: &[(&str, ClaimField)],
) -> Claims {
    let mut claims = Claims::default();
    for (oid, field) in table {
        if let Some(value) = certificate_claims.get(*oid) {
            *field.slot(&mut claims) = Some(value.clone());
        }
    }
    claims
}
