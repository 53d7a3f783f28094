//! Session/transport seam.
//!
//! Everything the certificate operations need from an authenticated DSM
//! session goes through [`Transport`]: endpoint lookup, the session id, the
//! appliance major version, and four request shapes.  Base URL, the
//! `X-SYNO-TOKEN` header and TLS verification policy stay inside the
//! implementation ([`crate::session::HttpSession`] in production).

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ApiReply, RawReply};

/// Ordered name/value pairs sent as a query string or form body.
pub type Params = Vec<(String, String)>;

/// Content type DSM expects on every uploaded key/certificate part.
pub const X509_CONTENT_TYPE: &str = "application/x-x509-ca-cert";

/// Path and minimum protocol version of one remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub path:        String,
    pub min_version: u32,
}

impl ApiEndpoint {
    pub fn new(path: impl Into<String>, min_version: u32) -> Self {
        Self { path: path.into(), min_version }
    }
}

/// One binary part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Multipart field name (`key`, `cert`, `inter_cert`).
    pub field:        String,
    pub file_name:    String,
    pub content_type: String,
    pub data:         Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Path and minimum version for a named API, e.g. `SYNO.Core.Certificate`.
    fn resolve_endpoint(&self, api_name: &str) -> Result<ApiEndpoint>;

    /// Opaque session id, sent as `_sid`.
    fn session_id(&self) -> &str;

    /// DSM major version (6, 7, ...).
    fn dsm_major_version(&self) -> u32;

    /// Generic authenticated call: `api` and `_sid` are added by the
    /// implementation, `params` are sent form-encoded.
    async fn dispatch(&self, api_name: &str, endpoint: &ApiEndpoint, params: Params) -> Result<ApiReply>;

    /// POST with `query` in the URL and `form` as the urlencoded body.
    async fn post_form(&self, endpoint: &ApiEndpoint, query: Params, form: Params) -> Result<ApiReply>;

    /// Multipart POST with `query` in the URL, scalar `fields` then `files`.
    async fn post_multipart(
        &self,
        endpoint: &ApiEndpoint,
        query:    Params,
        fields:   Params,
        files:    Vec<FilePart>,
    ) -> Result<ApiReply>;

    /// GET returning the raw body.
    async fn download(&self, endpoint: &ApiEndpoint, query: Params) -> Result<RawReply>;
}

/// Build a [`Params`] list from borrowed pairs.
pub fn params<const N: usize>(pairs: [(&str, &str); N]) -> Params {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
