//! The signature/provenance verification oracle.
//!
//! Certificate-chain validation, signature checks and transparency-log
//! inclusion proofs are done by an external verifier. This crate hands it
//! the raw evidence plus the artifact it must cover and trusts its verdict.

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::model::Ecosystem;

/// The artifact a piece of evidence must cover.
#[derive(Debug, Clone, Serialize)]
pub struct Subject<'a> {
    /// Artifact locator or distribution filename.
    pub name: &'a str,
    /// Canonical `algorithm:hex` digest.
    pub digest: &'a str,
}

/// Trusted-publisher identity a PyPI attestation bundle was produced by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    /// `GitHub`, `GitLab`, `Google`, ...
    pub kind: String,
    /// `owner/repo` for source-hosted publishers.
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Publisher {
    /// Source-hosting provider behind this publisher, if supported.
    pub fn host(&self) -> Option<&'static str> {
        match self.kind.as_str() {
            "GitHub" => Some("github.com"),
            "GitLab" => Some("gitlab.com"),
            _ => None,
        }
    }
}

/// One verification request.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceBundle<'a> {
    pub ecosystem: Ecosystem,
    /// Raw evidence: a Sigstore bundle (npm) or a PyPI attestation object.
    pub evidence: &'a serde_json::Value,
    pub subject: Subject<'a>,
    /// Identity policy the signer must satisfy (PyPI only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<&'a Publisher>,
}

/// Claim material released by the oracle for verified evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifiedEvidence {
    /// Signer certificate extensions, dotted OID -> decoded value.
    #[serde(default)]
    pub certificate_claims: BTreeMap<String, String>,
    /// The verified in-toto statement, when the oracle exposes it.
    #[serde(default)]
    pub statement: Option<serde_json::Value>,
}

/// Oracle verdict. A rejection is a finding, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Verified(VerifiedEvidence),
    Rejected(String),
}

/// External verifier of provenance evidence.
pub trait EvidenceOracle: Send + Sync {
    /// Verify one bundle. `Err` is reserved for failures to reach a verdict
    /// at all (the verifier could not run).
    fn verify(&self, bundle: &EvidenceBundle<'_>) -> Result<Verdict>;
}

/// Runs a verifier program per bundle: bundle JSON on stdin, exit status 0
/// with `VerifiedEvidence` JSON on stdout means verified, any other exit
/// status rejects with stderr as the reason.
#[derive(Debug, Clone, Default)]
pub struct CommandOracle {
    command: Option<Vec<String>>,
}

impl CommandOracle {
    /// `command` is the program followed by its arguments. `None` or an
    /// empty list rejects every bundle.
    pub fn new(command: Option<Vec<String>>) -> Self {
        let command = command.filter(|c| !c.is_empty());
        if command.is_none() {
            tracing::warn!("no verification oracle configured, all provenance evidence will be rejected");
        }
        Self { command }
    }
}

impl EvidenceOracle for CommandOracle {
    fn verify(&self, bundle: &EvidenceBundle<'_>) -> Result<Verdict> {
        let Some((program, args)) = self.command.as_ref().and_then(|c| c.split_first()) else {
            return Ok(Verdict::Rejected("no verification oracle configured".into()));
        };

        let input = serde_json::to_vec(bundle)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AuditError::transport(format!("failed to start oracle {program}: {e}")))?;

        // The oracle may answer without draining stdin; its exit status decides.
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                let input = &input;
                scope.spawn(move || {
                    if let Err(e) = stdin.write_all(input) {
                        tracing::debug!(error = %e, "oracle closed stdin before reading the bundle");
                    }
                });
            }
            child.wait_with_output()
        })?;

        if !output.status.success() {
            let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if reason.is_empty() {
                format!("oracle exited with {}", output.status)
            } else {
                reason
            };
            return Ok(Verdict::Rejected(reason));
        }

        match serde_json::from_slice::<VerifiedEvidence>(&output.stdout) {
            Ok(verified) => Ok(Verdict::Verified(verified)),
            Err(e) => Ok(Verdict::Rejected(format!("unreadable oracle output: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_for<'a>(evidence: &'a serde_json::Value) -> EvidenceBundle<'a> {
        EvidenceBundle {
            ecosystem: Ecosystem::Npm,
            evidence,
            subject: Subject {
                name: "pkg:npm/left-pad@1.3.0",
                digest: "sha512:00",
            },
            publisher: None,
        }
    }

    #[test]
    fn unconfigured_oracle_rejects() {
        let evidence = serde_json::json!({});
        let verdict = CommandOracle::new(None).verify(&bundle_for(&evidence)).unwrap();
        assert_eq!(verdict, Verdict::Rejected("no verification oracle configured".into()));

        let verdict = CommandOracle::new(Some(vec![]))
            .verify(&bundle_for(&evidence))
            .unwrap();
        assert!(matches!(verdict, Verdict::Rejected(_)));
    }

    #[cfg(unix)]
    #[test]
    fn command_output_becomes_verified_evidence() {
        let script = r#"cat > /dev/null; printf '{"certificate_claims": {"1.3.6.1.4.1.57264.1.8": "https://token.actions.githubusercontent.com"}}'"#;
        let oracle = CommandOracle::new(Some(vec!["sh".into(), "-c".into(), script.into()]));
        let evidence = serde_json::json!({"mediaType": "application/vnd.dev.sigstore.bundle+json;version=0.2"});
        match oracle.verify(&bundle_for(&evidence)).unwrap() {
            Verdict::Verified(v) => {
                assert_eq!(
                    v.certificate_claims["1.3.6.1.4.1.57264.1.8"],
                    "https://token.actions.githubusercontent.com"
                );
                assert!(v.statement.is_none());
            }
            other => panic!("expected verified evidence, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_rejects_with_stderr() {
        let script = "cat > /dev/null; echo 'certificate chain invalid' >&2; exit 1";
        let oracle = CommandOracle::new(Some(vec!["sh".into(), "-c".into(), script.into()]));
        let evidence = serde_json::json!({});
        assert_eq!(
            oracle.verify(&bundle_for(&evidence)).unwrap(),
            Verdict::Rejected("certificate chain invalid".into())
        );
    }

    #[cfg(unix)]
    #[test]
    fn early_exit_without_reading_stdin_still_rejects() {
        let oracle = CommandOracle::new(Some(vec![
            "sh".into(),
            "-c".into(),
            "echo 'bad bundle' >&2; exit 1".into(),
        ]));
        let evidence = serde_json::json!({"padding": "x".repeat(1 << 20)});
        assert_eq!(
            oracle.verify(&bundle_for(&evidence)).unwrap(),
            Verdict::Rejected("bad bundle".into())
        );
    }

    #[test]
    fn publisher_hosts() {
        let github: Publisher =
            serde_json::from_str(r#"{"kind": "GitHub", "repository": "octo/server", "workflow": "release.yml"}"#)
                .unwrap();
        assert_eq!(github.host(), Some("github.com"));
        assert_eq!(github.extra["workflow"], "release.yml");

        let google: Publisher = serde_json::from_str(r#"{"kind": "Google", "email": "a@b.iam"}"#).unwrap();
        assert_eq!(google.host(), None);
        assert!(google.repository.is_none());
    }
}
