//! Certificate Transfer Operations — import and export on
//! `SYNO.Core.Certificate`.
//!
//! Upload reads each key/certificate file fully into memory before the
//! request is built, so every file handle is closed by the time the network
//! call starts, whatever its outcome.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{CertError, Result};
use crate::model::ApiReply;
use crate::transport::{params, FilePart, Transport, X509_CONTENT_TYPE};

pub const CERT_API: &str = "SYNO.Core.Certificate";

/// Key material and metadata for one import call.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub key_path:       PathBuf,
    pub cert_path:      PathBuf,
    /// Intermediate / CA chain, optional.
    pub ca_path:        Option<PathBuf>,
    pub set_as_default: bool,
    /// Existing certificate to replace; `None` creates a new one.
    pub cert_id:        Option<String>,
    pub desc:           Option<String>,
}

impl UploadRequest {
    pub fn new(key_path: impl Into<PathBuf>, cert_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path:       key_path.into(),
            cert_path:      cert_path.into(),
            ca_path:        None,
            set_as_default: true,
            cert_id:        None,
            desc:           None,
        }
    }

    pub fn ca(mut self, ca_path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }

    pub fn replace(mut self, cert_id: impl Into<String>) -> Self {
        self.cert_id = Some(cert_id.into());
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn as_default(mut self, set_as_default: bool) -> Self {
        self.set_as_default = set_as_default;
        self
    }
}

/// Result of an export call.
#[derive(Debug)]
pub enum ExportOutcome {
    /// Archive bytes, positioned at the start.
    Archive(Cursor<Vec<u8>>),
    /// Non-200 answer in lenient mode.
    Missing { status: u16 },
}

impl ExportOutcome {
    pub fn into_archive(self) -> Option<Cursor<Vec<u8>>> {
        match self {
            ExportOutcome::Archive(c) => Some(c),
            ExportOutcome::Missing { .. } => None,
        }
    }
}

pub struct CertificateTransfer<'t, T: Transport + ?Sized> {
    transport:     &'t T,
    strict_export: bool,
}

impl<'t, T: Transport + ?Sized> CertificateTransfer<'t, T> {
    pub fn new(transport: &'t T) -> Self {
        Self { transport, strict_export: false }
    }

    /// In strict mode a failed export is a `Remote` error instead of
    /// `ExportOutcome::Missing`.
    pub fn strict_export(mut self, strict: bool) -> Self {
        self.strict_export = strict;
        self
    }

    /// Import a key, certificate and optional chain.
    ///
    /// On success the reply carries HTTP 200 and the decoded envelope; any
    /// other status or `success: false` is `CertError::Remote`.
    pub async fn upload(&self, req: &UploadRequest) -> Result<ApiReply> {
        let mut files = vec![
            read_part("key", &req.key_path).await?,
            read_part("cert", &req.cert_path).await?,
        ];
        if let Some(ca) = &req.ca_path {
            files.push(read_part("inter_cert", ca).await?);
        }

        let endpoint = self.transport.resolve_endpoint(CERT_API)?;
        let version = endpoint.min_version.to_string();
        let query = params([
            ("api", CERT_API),
            ("version", version.as_str()),
            ("method", "import"),
            ("_sid", self.transport.session_id()),
        ]);

        if let Some(id) = &req.cert_id {
            info!("replacing existing certificate {id}");
        }
        let fields = params([
            ("id", req.cert_id.as_deref().unwrap_or("")),
            ("desc", req.desc.as_deref().unwrap_or("")),
            ("as_default", if req.set_as_default { "true" } else { "" }),
        ]);

        debug!("{CERT_API} import: {} part(s)", files.len());
        let reply = self
            .transport
            .post_multipart(&endpoint, query, fields, files)
            .await?
            .checked()?;
        info!("certificate upload successful");
        Ok(reply)
    }

    /// Download the certificate archive for `cert_id`.
    pub async fn export(&self, cert_id: &str) -> Result<ExportOutcome> {
        if cert_id.is_empty() {
            return Err(CertError::InvalidArgument("certificate id is empty".into()));
        }
        let endpoint = self.transport.resolve_endpoint(CERT_API)?;
        let version = endpoint.min_version.to_string();
        let query = params([
            ("api", CERT_API),
            ("version", version.as_str()),
            ("method", "export"),
            ("file", "\"archive\""),
            ("_sid", self.transport.session_id()),
            ("id", cert_id),
        ]);

        let raw = self.transport.download(&endpoint, query).await?;
        if raw.status != 200 {
            warn!("export of {cert_id} answered HTTP {}", raw.status);
            if self.strict_export {
                let reply = ApiReply::from_bytes(raw.status, &raw.body);
                return Err(CertError::Remote { status: reply.status, body: reply.body });
            }
            return Ok(ExportOutcome::Missing { status: raw.status });
        }

        // DSM answers a bad id with a 200 JSON error envelope.
        if self.strict_export {
            let reply = ApiReply::from_bytes(raw.status, &raw.body);
            if reply.body.get("success").and_then(|v| v.as_bool()) == Some(false) {
                return Err(CertError::Remote { status: reply.status, body: reply.body });
            }
        }

        debug!("exported {} byte(s) for {cert_id}", raw.body.len());
        Ok(ExportOutcome::Archive(Cursor::new(raw.body)))
    }
}

async fn read_part(field: &str, path: &Path) -> Result<FilePart> {
    let abs = std::path::absolute(path)
        .map_err(|source| CertError::Io { path: path.to_path_buf(), source })?;
    let data = tokio::fs::read(&abs)
        .await
        .map_err(|source| CertError::Io { path: abs.clone(), source })?;
    let file_name = abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| abs.display().to_string());
    Ok(FilePart {
        field: field.to_string(),
        file_name,
        content_type: X509_CONTENT_TYPE.to_string(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_request_defaults() {
        let req = UploadRequest::new("server.key", "server.crt");
        assert!(req.set_as_default);
        assert!(req.ca_path.is_none());
        assert!(req.cert_id.is_none());

        let req = req.ca("ca.crt").replace("abc").desc("nas").as_default(false);
        assert_eq!(req.ca_path.as_deref(), Some(Path::new("ca.crt")));
        assert_eq!(req.cert_id.as_deref(), Some("abc"));
        assert_eq!(req.desc.as_deref(), Some("nas"));
        assert!(!req.set_as_default);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_part("key", &dir.path().join("nope.key")).await.unwrap_err();
        match err {
            CertError::Io { path, .. } => assert!(path.ends_with("nope.key")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn part_is_tagged_x509() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.crt");
        std::fs::write(&path, b"-----BEGIN CERTIFICATE-----").unwrap();
        let part = read_part("cert", &path).await.unwrap();
        assert_eq!(part.field, "cert");
        assert_eq!(part.file_name, "server.crt");
        assert_eq!(part.content_type, X509_CONTENT_TYPE);
        assert_eq!(part.data, b"-----BEGIN CERTIFICATE-----");
    }
}
