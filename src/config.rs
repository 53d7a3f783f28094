//! Client configuration file parser.
//!
//! Plain `key = value` lines; `#` starts a comment, unknown keys are ignored.
//! Endpoint overrides use `api.<API NAME> = <path>:<version>`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::binding::DuplicatePolicy;
use crate::error::{CertError, Result};
use crate::transport::ApiEndpoint;

const PORT:        u16 = 5000;
const DSM_VERSION: u32 = 7;
const TIMEOUT:     u64 = 30;

/// Full client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // ── Appliance ─────────────────────────────────────────────────────────────
    /// DSM hostname or IP address.
    pub host: String,
    pub port: u16,
    /// Use https instead of http.
    pub secure: bool,
    /// Validate the appliance's TLS certificate chain and hostname.
    pub cert_verify: bool,
    /// DSM major version (drives the binding payload shape).
    pub dsm_version: u32,
    // ── Session (obtained out of band) ────────────────────────────────────────
    pub sid: String,
    /// `X-SYNO-TOKEN` header value.
    pub syno_token: Option<String>,
    // ── Behaviour ─────────────────────────────────────────────────────────────
    /// Request timeout in seconds.
    pub timeout: u64,
    pub strict_export: bool,
    pub duplicate_binding: DuplicatePolicy,
    pub log_syslog: bool,
    /// Per-API endpoint overrides.
    pub endpoints: HashMap<String, ApiEndpoint>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host:              String::new(),
            port:              PORT,
            secure:            false,
            cert_verify:       false,
            dsm_version:       DSM_VERSION,
            sid:               String::new(),
            syno_token:        None,
            timeout:           TIMEOUT,
            strict_export:     false,
            duplicate_binding: DuplicatePolicy::FirstMatch,
            log_syslog:        false,
            endpoints:         HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// `{http|https}://host:port/webapi/`
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}/webapi/", self.host, self.port)
    }
}

/// Parse `path` as a `dsm-certctl.conf` key=value configuration file.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| CertError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_config(&content)
}

/// Parse configuration text.
pub fn parse_config(content: &str) -> Result<ClientConfig> {
    let mut cfg = ClientConfig::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let key = match parts.next() {
            Some(k) => k.trim().to_string(),
            None => continue,
        };
        let val = match parts.next() {
            Some(v) => v.trim().to_string(),
            None => continue,
        };
        if val.is_empty() {
            continue;
        }

        // API names are case sensitive, so only the prefix is folded.
        if let Some(api) = strip_prefix_ci(&key, "api.") {
            cfg.endpoints.insert(api.to_string(), parse_endpoint(api, &val)?);
            continue;
        }

        match key.to_ascii_lowercase().as_str() {
            "host"              => cfg.host          = val,
            "port"              => cfg.port          = val.parse().unwrap_or(PORT),
            "secure"            => cfg.secure        = flag(&val),
            "cert_verify"       => cfg.cert_verify   = flag(&val),
            "dsm_version"       => cfg.dsm_version   = val.parse().unwrap_or(DSM_VERSION),
            "sid"               => cfg.sid           = val,
            "syno_token"        => cfg.syno_token    = Some(val),
            "timeout"           => cfg.timeout       = val.parse().unwrap_or(TIMEOUT),
            "strict_export"     => cfg.strict_export = flag(&val),
            "log_syslog"        => cfg.log_syslog    = flag(&val),
            "duplicate_binding" => {
                cfg.duplicate_binding = match val.to_ascii_lowercase().as_str() {
                    "reject" => DuplicatePolicy::Reject,
                    "first"  => DuplicatePolicy::FirstMatch,
                    other    => {
                        return Err(CertError::Config(format!(
                            "duplicate_binding must be `first` or `reject`, got {other:?}"
                        )))
                    }
                };
            }
            _ => {} // ignore unknown keys
        }
    }

    Ok(cfg)
}

fn flag(val: &str) -> bool {
    val == "true" || val == "1" || val == "yes"
}

fn strip_prefix_ci<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    match key.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) && key.len() > prefix.len() => {
            Some(&key[prefix.len()..])
        }
        _ => None,
    }
}

/// `entry.cgi:1` → `ApiEndpoint { path: "entry.cgi", min_version: 1 }`.
fn parse_endpoint(api: &str, val: &str) -> Result<ApiEndpoint> {
    let (path, version) = val
        .rsplit_once(':')
        .ok_or_else(|| CertError::Config(format!("api.{api}: expected <path>:<version>")))?;
    let min_version = version
        .trim()
        .parse()
        .map_err(|_| CertError::Config(format!("api.{api}: bad version {version:?}")))?;
    Ok(ApiEndpoint::new(path.trim(), min_version))
}

/// Validate that required fields are populated.
pub fn validate_config(cfg: &ClientConfig) -> Result<()> {
    if cfg.host.is_empty() {
        return Err(CertError::Config("host is required".into()));
    }
    if cfg.port == 0 {
        return Err(CertError::Config("port must be non-zero".into()));
    }
    if cfg.sid.is_empty() {
        return Err(CertError::Config("sid is required".into()));
    }
    if cfg.dsm_version == 0 {
        return Err(CertError::Config("dsm_version must be non-zero".into()));
    }
    Ok(())
}
