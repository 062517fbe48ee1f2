use serde::{Deserialize, Serialize};

/// Why an artifact carries no trustworthy provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCode {
    /// The attestation source has no evidence for the artifact.
    Missing,
    /// Evidence exists but could not be parsed or verified.
    Verification,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Verification => write!(f, "verification"),
        }
    }
}

/// Build facts taken from the signer certificate of verified evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Claims {
    pub issuer: Option<String>,
    pub runner_env: Option<String>,
    pub repo_url: Option<String>,
    pub repo_digest: Option<String>,
    pub repo_ref: Option<String>,
    pub build_config_url: Option<String>,
    pub build_config_digest: Option<String>,
    pub build_trigger: Option<String>,
    pub run_url: Option<String>,
}

impl Claims {
    pub fn is_empty(&self) -> bool {
        self == &Claims::default()
    }
}

/// One provenance finding for an artifact.
///
/// Either an error record (`error_code` set, no claims) or a claim record
/// (no `error_code`). Constructors and deserialization both keep the two
/// shapes apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AttestationRecord")]
pub struct Attestation {
    #[serde(flatten)]
    claims: Claims,
    statement: Option<serde_json::Value>,
    error_code: Option<ErrorCode>,
    error_msg: Option<String>,
}

impl Attestation {
    /// No evidence was published for the artifact.
    pub fn missing() -> Self {
        Self {
            claims: Claims::default(),
            statement: None,
            error_code: Some(ErrorCode::Missing),
            error_msg: None,
        }
    }

    /// Evidence was found but failed parsing or verification.
    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self {
            claims: Claims::default(),
            statement: None,
            error_code: Some(ErrorCode::Verification),
            error_msg: Some(message.into()),
        }
    }

    /// A verified statement and the claims of its signer.
    pub fn from_claims(claims: Claims, statement: Option<serde_json::Value>) -> Self {
        Self {
            claims,
            statement,
            error_code: None,
            error_msg: None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }

    pub fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn issuer(&self) -> Option<&str> {
        self.claims.issuer.as_deref()
    }

    pub fn statement(&self) -> Option<&serde_json::Value> {
        self.statement.as_ref()
    }
}

/// Wire shape of an attestation, checked before it becomes an `Attestation`.
#[derive(Deserialize)]
struct AttestationRecord {
    #[serde(flatten)]
    claims: Claims,
    #[serde(default)]
    statement: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<ErrorCode>,
    #[serde(default)]
    error_msg: Option<String>,
}

impl TryFrom<AttestationRecord> for Attestation {
    type Error = String;

    fn try_from(record: AttestationRecord) -> Result<Self, Self::Error> {
        match record.error_code {
            Some(code) if !record.claims.is_empty() || record.statement.is_some() => Err(format!(
                "attestation with error_code '{code}' must not carry claims"
            )),
            Some(code) => Ok(Self {
                claims: Claims::default(),
                statement: None,
                error_code: Some(code),
                error_msg: record.error_msg,
            }),
            None if record.error_msg.is_some() => {
                Err("attestation has error_msg without error_code".into())
            }
            None => Ok(Self::from_claims(record.claims, record.statement)),
        }
    }
}
