//! In-memory collaborators for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::claims::FULCIO_CLAIMS;
use super::oracle::{EvidenceBundle, EvidenceOracle, Verdict, VerifiedEvidence};
use super::source::{AttestationSource, EvidenceLocator};
use crate::error::{AuditError, Result};

/// Serves evidence keyed by `name@version` (npm) or filename (pypi).
#[derive(Default)]
pub struct FakeSource {
    documents: HashMap<String, serde_json::Value>,
    unreachable: bool,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn with(mut self, key: &str, document: serde_json::Value) -> Self {
        self.documents.insert(key.to_string(), document);
        self
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl AttestationSource for FakeSource {
    fn fetch(&self, locator: &EvidenceLocator<'_>) -> Result<Option<serde_json::Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(AuditError::transport("connection refused"));
        }
        let key = match locator {
            EvidenceLocator::Npm { name, version } => format!("{name}@{version}"),
            EvidenceLocator::Pypi { filename, .. } => filename.to_string(),
        };
        Ok(self.documents.get(&key).cloned())
    }
}

/// Trusts evidence unless it carries a `reject` reason.
///
/// Claims come from the evidence itself: every Fulcio claim name present as
/// a top-level string field (`issuer`, `repo_url`, ...) is echoed back under
/// its OID, and a `statement` field is returned as the statement.
pub struct FakeOracle;

const CLAIM_NAMES: &[&str] = &[
    "issuer",
    "runner_env",
    "repo_url",
    "repo_digest",
    "repo_ref",
    "build_config_url",
    "build_config_digest",
    "build_trigger",
    "run_url",
];

impl EvidenceOracle for FakeOracle {
    fn verify(&self, bundle: &EvidenceBundle<'_>) -> Result<Verdict> {
        if let Some(reason) = bundle.evidence.get("reject").and_then(|r| r.as_str()) {
            return Ok(Verdict::Rejected(reason.to_string()));
        }

        let mut certificate_claims = BTreeMap::new();
        for (name, (oid, _)) in CLAIM_NAMES.iter().zip(FULCIO_CLAIMS) {
            if let Some(value) = bundle.evidence.get(*name).and_then(|v| v.as_str()) {
                certificate_claims.insert(oid.to_string(), value.to_string());
            }
        }

        Ok(Verdict::Verified(VerifiedEvidence {
            certificate_claims,
            statement: bundle.evidence.get("statement").cloned(),
        }))
    }
}
