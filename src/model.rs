//! Registry snapshot types and decoded API replies.
//!
//! A snapshot is a transient view of the remote certificate registry: it is
//! fetched per call and never cached.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CertError, Result};

// ── Certificates ──────────────────────────────────────────────────────────────

/// Distinguished-name fields DSM reports for issuer and subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    #[serde(default)]
    pub common_name:  String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub country:      Option<String>,
    /// Only present on the subject.
    #[serde(default)]
    pub sub_alt_name: Vec<String>,
}

/// One service a certificate currently serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub display_name: String,
    #[serde(default)]
    pub display_name_i18n: Option<String>,
    #[serde(default, rename = "isPkg")]
    pub is_pkg:     bool,
    #[serde(default)]
    pub owner:      Option<String>,
    #[serde(default)]
    pub service:    Option<String>,
    #[serde(default)]
    pub subscriber: Option<String>,
}

/// An installed certificate as seen in one registry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    #[serde(default)]
    pub desc:       String,
    #[serde(default)]
    pub is_default: bool,
    /// Services in registry order.
    #[serde(default)]
    pub services:   Vec<ServiceBinding>,
    #[serde(default)]
    pub issuer:     Option<DistinguishedName>,
    #[serde(default)]
    pub subject:    Option<DistinguishedName>,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub valid_till: Option<String>,
    #[serde(default)]
    pub is_broken:  bool,
    #[serde(default)]
    pub renewable:  bool,
    #[serde(default)]
    pub key_types:  Option<String>,
}

impl Certificate {
    /// Returns `true` if this certificate serves `service_name`.
    pub fn serves(&self, service_name: &str) -> bool {
        self.services.iter().any(|s| s.display_name == service_name)
    }

    /// Subject common name, if the appliance reported one.
    pub fn common_name(&self) -> &str {
        self.subject.as_ref().map(|s| s.common_name.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
struct CertificateList {
    #[serde(default)]
    certificates: Vec<Certificate>,
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// HTTP status plus the decoded JSON envelope of one API call.
///
/// Non-JSON bodies are kept as a JSON string so failures still carry them.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body:   Value,
}

impl ApiReply {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Decode a raw HTTP body into a reply.
    pub fn from_bytes(status: u16, raw: &[u8]) -> Self {
        let body = serde_json::from_slice(raw)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()));
        Self { status, body }
    }

    /// HTTP 200 and `"success": true` in the envelope.
    pub fn succeeded(&self) -> bool {
        self.status == 200 && self.body.get("success").and_then(Value::as_bool) == Some(true)
    }

    /// Turn an unsuccessful reply into `CertError::Remote`.
    pub fn checked(self) -> Result<Self> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(CertError::Remote { status: self.status, body: self.body })
        }
    }

    pub fn data(&self) -> Option<&Value> {
        self.body.get("data")
    }

    /// DSM error code from `{"error": {"code": N}}`.
    pub fn error_code(&self) -> Option<i64> {
        self.body.get("error")?.get("code")?.as_i64()
    }

    /// Parse the certificate list out of a `list` reply.
    pub fn certificates(&self) -> Result<Vec<Certificate>> {
        let data = self
            .data()
            .ok_or_else(|| CertError::Decode("list reply has no data".into()))?;
        let list: CertificateList = serde_json::from_value(data.clone())?;
        Ok(list.certificates)
    }
}

/// HTTP status plus the undecoded body, used for binary downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: u16,
    pub body:   Vec<u8>,
}
