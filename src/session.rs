//! reqwest-backed DSM web API session.
//!
//! Holds the base URL, session id, `X-SYNO-TOKEN` and TLS policy.  Login and
//! two-factor handling are not done here: the sid/token pair comes from the
//! configuration.
//!
//! DSM appliances usually present a self-signed certificate, so verification
//! is off unless `cert_verify` is set, matching `verify=False` in the stock
//! DSM API clients.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use crate::binding::SERVICE_API;
use crate::config::ClientConfig;
use crate::error::{CertError, Result};
use crate::model::{ApiReply, RawReply};
use crate::registry::CRT_API;
use crate::transfer::CERT_API;
use crate::transport::{ApiEndpoint, FilePart, Params, Transport};

/// Built-in endpoint table for the certificate APIs.
pub fn default_endpoints() -> HashMap<String, ApiEndpoint> {
    [CRT_API, CERT_API, SERVICE_API]
        .into_iter()
        .map(|api| (api.to_string(), ApiEndpoint::new("entry.cgi", 1)))
        .collect()
}

pub struct HttpSession {
    http:        Client,
    base_url:    Url,
    sid:         String,
    syno_token:  Option<String>,
    dsm_version: u32,
    cert_verify: bool,
    endpoints:   HashMap<String, ApiEndpoint>,
}

impl HttpSession {
    pub fn from_config(cfg: &ClientConfig) -> Result<Self> {
        let http = build_http_client(cfg.cert_verify, Duration::from_secs(cfg.timeout))?;
        let mut endpoints = default_endpoints();
        endpoints.extend(cfg.endpoints.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Self {
            http,
            base_url:    Url::parse(&cfg.base_url())?,
            sid:         cfg.sid.clone(),
            syno_token:  cfg.syno_token.clone(),
            dsm_version: cfg.dsm_version,
            cert_verify: cfg.cert_verify,
            endpoints,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tls_verification_enabled(&self) -> bool {
        self.cert_verify
    }

    fn url(&self, endpoint: &ApiEndpoint, query: &Params) -> Result<Url> {
        let mut url = self.base_url.join(&endpoint.path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.syno_token {
            Some(token) => rb.header("X-SYNO-TOKEN", token),
            None => rb,
        }
    }
}

/// Build the HTTP client used for all DSM API calls.
pub fn build_http_client(cert_verify: bool, timeout: Duration) -> Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(!cert_verify)
        .danger_accept_invalid_hostnames(!cert_verify)
        .timeout(timeout)
        .build()
        .map_err(CertError::Http)
}

async fn decode(resp: Response) -> Result<ApiReply> {
    let status = resp.status().as_u16();
    let raw = resp.bytes().await?;
    debug!("← HTTP {status}, {} byte(s)", raw.len());
    Ok(ApiReply::from_bytes(status, &raw))
}

#[async_trait]
impl Transport for HttpSession {
    fn resolve_endpoint(&self, api_name: &str) -> Result<ApiEndpoint> {
        self.endpoints
            .get(api_name)
            .cloned()
            .ok_or_else(|| CertError::Config(format!("no endpoint known for {api_name}")))
    }

    fn session_id(&self) -> &str {
        &self.sid
    }

    fn dsm_major_version(&self) -> u32 {
        self.dsm_version
    }

    async fn dispatch(&self, api_name: &str, endpoint: &ApiEndpoint, params: Params) -> Result<ApiReply> {
        let url = self.url(endpoint, &vec![("_sid".to_string(), self.sid.clone())])?;
        let mut form: Params = vec![("api".to_string(), api_name.to_string())];
        form.extend(params);
        debug!("→ POST {} api={api_name}", endpoint.path);
        let resp = self.authed(self.http.post(url)).form(&form).send().await?;
        decode(resp).await
    }

    async fn post_form(&self, endpoint: &ApiEndpoint, query: Params, form: Params) -> Result<ApiReply> {
        let url = self.url(endpoint, &query)?;
        debug!("→ POST {} (form)", endpoint.path);
        let resp = self.authed(self.http.post(url)).form(&form).send().await?;
        decode(resp).await
    }

    async fn post_multipart(
        &self,
        endpoint: &ApiEndpoint,
        query:    Params,
        fields:   Params,
        files:    Vec<FilePart>,
    ) -> Result<ApiReply> {
        let url = self.url(endpoint, &query)?;
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        for file in files {
            let part = Part::bytes(file.data)
                .file_name(file.file_name)
                .mime_str(&file.content_type)?;
            form = form.part(file.field, part);
        }
        debug!("→ POST {} (multipart)", endpoint.path);
        let resp = self.authed(self.http.post(url)).multipart(form).send().await?;
        decode(resp).await
    }

    async fn download(&self, endpoint: &ApiEndpoint, query: Params) -> Result<RawReply> {
        let url = self.url(endpoint, &query)?;
        debug!("→ GET {}", endpoint.path);
        let resp = self.authed(self.http.get(url)).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(RawReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> HttpSession {
        let cfg = ClientConfig {
            host: "nas.local".into(),
            sid: "s1d".into(),
            ..Default::default()
        };
        HttpSession::from_config(&cfg).unwrap()
    }

    #[test]
    fn urls_carry_query_in_order() {
        let s = session();
        let ep = ApiEndpoint::new("entry.cgi", 1);
        let q = vec![
            ("api".to_string(), CERT_API.to_string()),
            ("file".to_string(), "\"archive\"".to_string()),
            ("_sid".to_string(), "s1d".to_string()),
        ];
        let url = s.url(&ep, &q).unwrap();
        assert_eq!(
            url.as_str(),
            "http://nas.local:5000/webapi/entry.cgi?api=SYNO.Core.Certificate&file=%22archive%22&_sid=s1d"
        );
    }

    #[test]
    fn endpoint_table() {
        let s = session();
        assert_eq!(s.resolve_endpoint(CRT_API).unwrap(), ApiEndpoint::new("entry.cgi", 1));
        assert!(matches!(s.resolve_endpoint("SYNO.FileStation.List"), Err(CertError::Config(_))));
        assert!(!s.tls_verification_enabled());
        assert_eq!(s.dsm_major_version(), 7);
    }

    #[test]
    fn config_overrides_endpoint() {
        let mut cfg = ClientConfig { host: "nas".into(), sid: "x".into(), ..Default::default() };
        cfg.endpoints.insert(SERVICE_API.into(), ApiEndpoint::new("cert.cgi", 2));
        let s = HttpSession::from_config(&cfg).unwrap();
        assert_eq!(s.resolve_endpoint(SERVICE_API).unwrap(), ApiEndpoint::new("cert.cgi", 2));
        assert_eq!(s.resolve_endpoint(CERT_API).unwrap().path, "entry.cgi");
    }
}
