//! Certificate Registry Accessor — `SYNO.Core.Certificate.CRT`.
//!
//! `list`, `set` and `delete` all go through one multiplexed call with a
//! fixed request version of 1.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};

use crate::error::{CertError, Result};
use crate::model::{ApiReply, Certificate};
use crate::transport::{params, Transport};

pub const CRT_API: &str = "SYNO.Core.Certificate.CRT";

/// Method selector accepted by the registry endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrtMethod {
    List,
    Set,
    Delete,
}

impl CrtMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CrtMethod::List   => "list",
            CrtMethod::Set    => "set",
            CrtMethod::Delete => "delete",
        }
    }
}

impl FromStr for CrtMethod {
    type Err = CertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "list"   => Ok(CrtMethod::List),
            "set"    => Ok(CrtMethod::Set),
            "delete" => Ok(CrtMethod::Delete),
            other    => Err(CertError::UnsupportedOperation(format!(
                "certificate method {other:?}"
            ))),
        }
    }
}

impl fmt::Display for CrtMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One or more certificate ids.  A single id becomes a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertIds(pub Vec<String>);

impl CertIds {
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// JSON array encoded as a string, the form the endpoint expects.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl From<&str> for CertIds {
    fn from(id: &str) -> Self { CertIds(vec![id.to_string()]) }
}

impl From<String> for CertIds {
    fn from(id: String) -> Self { CertIds(vec![id]) }
}

impl From<Vec<String>> for CertIds {
    fn from(ids: Vec<String>) -> Self { CertIds(ids) }
}

impl From<&[&str]> for CertIds {
    fn from(ids: &[&str]) -> Self {
        CertIds(ids.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CertIds {
    fn from(ids: [&str; N]) -> Self { CertIds::from(&ids[..]) }
}

/// Arguments for one multiplexed registry call.
#[derive(Debug, Clone, Default)]
pub struct CrtArgs<'a> {
    pub cert_id: Option<&'a str>,
    pub ids:     Option<&'a CertIds>,
}

/// Stateless accessor over a [`Transport`].
pub struct CertificateRegistry<'t, T: Transport + ?Sized> {
    transport: &'t T,
}

impl<'t, T: Transport + ?Sized> CertificateRegistry<'t, T> {
    pub fn new(transport: &'t T) -> Self {
        Self { transport }
    }

    /// Fetch the current snapshot of every installed certificate.
    pub async fn list(&self) -> Result<Vec<Certificate>> {
        let reply = self.call("list", CrtArgs::default()).await?;
        let certs = reply.certificates()?;
        debug!("registry lists {} certificate(s)", certs.len());
        Ok(certs)
    }

    /// Mark `cert_id` as the default certificate.
    pub async fn set_default(&self, cert_id: &str) -> Result<ApiReply> {
        if cert_id.is_empty() {
            return Err(CertError::InvalidArgument("certificate id is empty".into()));
        }
        let reply = self.call("set", CrtArgs { cert_id: Some(cert_id), ids: None }).await?;
        info!("certificate {cert_id} set as default");
        Ok(reply)
    }

    /// Delete one or more certificates.  An empty id list is rejected
    /// without a round trip.
    pub async fn delete(&self, ids: impl Into<CertIds>) -> Result<ApiReply> {
        let ids = ids.into();
        if ids.is_empty() {
            return Err(CertError::InvalidArgument("no certificate ids to delete".into()));
        }
        let reply = self.call("delete", CrtArgs { cert_id: None, ids: Some(&ids) }).await?;
        info!("deleted certificate(s) {:?}", ids.0);
        Ok(reply)
    }

    /// The multiplexed call.  `method` must be `list`, `set` or `delete`.
    pub async fn call(&self, method: &str, args: CrtArgs<'_>) -> Result<ApiReply> {
        let method: CrtMethod = method.parse()?;
        let endpoint = self.transport.resolve_endpoint(CRT_API)?;

        let mut req = params([("version", "1"), ("method", method.as_str())]);
        match (method, args.cert_id, args.ids) {
            (CrtMethod::Set, Some(id), _) if !id.is_empty() => {
                req.push(("as_default".into(), "true".into()));
                req.push(("desc".into(), "\"\"".into()));
                req.push(("id".into(), format!("\"{id}\"")));
            }
            (CrtMethod::Delete, _, Some(ids)) if !ids.is_empty() => {
                req.push(("ids".into(), ids.to_json()?));
            }
            _ => {}
        }

        debug!("{CRT_API} {method} → {}", endpoint.path);
        self.transport
            .dispatch(CRT_API, &endpoint, req)
            .await?
            .checked()
    }
}

/// The certificate flagged as default in a snapshot.
pub fn find_default(certs: &[Certificate]) -> Option<&Certificate> {
    certs.iter().find(|c| c.is_default)
}
