//! Service-Binding Coordinator — `SYNO.Core.Certificate.Service`.
//!
//! Flow for one bind request:
//!   1. Read the registry snapshot (`list`)
//!   2. Find the certificate currently serving the named service
//!   3. Stop with `BindOutcome::AlreadyBound` if it is the requested one
//!   4. Otherwise build the service descriptor for the appliance's DSM major
//!      version and submit a single `set` carrying `old_id` and `id`
//!
//! Step 3 is a safety guard: re-submitting an identical binding makes DSM 6
//! drop the default service entirely.
//!
//! The read and the write are not atomic.  Another client may change the
//! registry in between; callers needing exactly-once binding serialize
//! themselves.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde_json::{json, Map, Value};

use crate::error::{CertError, Result};
use crate::model::{ApiReply, Certificate};
use crate::registry::CertificateRegistry;
use crate::transport::{params, Transport};

pub const SERVICE_API: &str = "SYNO.Core.Certificate.Service";
pub const DEFAULT_SERVICE: &str = "DSM Desktop Service";

// ── Service profile table ─────────────────────────────────────────────────────

/// Scalar value of one descriptor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Text(&'static str),
    Flag(bool),
}

impl Field {
    fn to_json(self) -> Value {
        match self {
            Field::Text(s) => Value::String(s.to_string()),
            Field::Flag(b) => Value::Bool(b),
        }
    }
}

/// Inclusive range of DSM major versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min_major: u32,
    pub max_major: Option<u32>,
}

impl VersionRange {
    pub const ANY: VersionRange = VersionRange { min_major: 0, max_major: None };

    pub const fn since(min_major: u32) -> Self {
        VersionRange { min_major, max_major: None }
    }

    pub fn contains(&self, major: u32) -> bool {
        major >= self.min_major && self.max_major.map_or(true, |max| major <= max)
    }
}

/// Descriptor fields that apply to a range of DSM versions.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorFragment {
    pub versions: VersionRange,
    pub fields:   &'static [(&'static str, Field)],
}

/// Everything needed to describe one bindable service to DSM.
#[derive(Debug, Clone, Copy)]
pub struct ServiceProfile {
    pub display_name: &'static str,
    pub fragments:    &'static [DescriptorFragment],
}

impl ServiceProfile {
    /// Merge every fragment whose range contains `major`, in table order.
    pub fn descriptor(&self, major: u32) -> Map<String, Value> {
        let mut out = Map::new();
        for fragment in self.fragments.iter().filter(|f| f.versions.contains(major)) {
            for (name, value) in fragment.fields {
                out.insert((*name).to_string(), value.to_json());
            }
        }
        out
    }
}

static DSM_DESKTOP: ServiceProfile = ServiceProfile {
    display_name: DEFAULT_SERVICE,
    fragments: &[
        DescriptorFragment {
            versions: VersionRange::ANY,
            fields: &[
                ("display_name",      Field::Text(DEFAULT_SERVICE)),
                ("display_name_i18n", Field::Text("common:web_desktop")),
                ("isPkg",             Field::Flag(false)),
                ("owner",             Field::Text("root")),
                ("service",           Field::Text("default")),
                ("subscriber",        Field::Text("system")),
            ],
        },
        // DSM 7 rejects the update without these two.
        DescriptorFragment {
            versions: VersionRange::since(7),
            fields: &[
                ("multiple_cert", Field::Flag(true)),
                ("user_setable",  Field::Flag(true)),
            ],
        },
    ],
};

/// Services this client knows how to bind.
pub static SERVICE_PROFILES: &[&ServiceProfile] = &[&DSM_DESKTOP];

/// Look up the profile for a service display name.
pub fn profile(service_name: &str) -> Result<&'static ServiceProfile> {
    SERVICE_PROFILES
        .iter()
        .copied()
        .find(|p| p.display_name == service_name)
        .ok_or_else(|| CertError::UnsupportedService(service_name.to_string()))
}

// ── Snapshot inspection ───────────────────────────────────────────────────────

/// What to do when several certificates claim the same service in one
/// snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Take the first certificate in registry order.
    #[default]
    FirstMatch,
    /// Fail with `CertError::RegistryConflict`.
    Reject,
}

/// Id of the certificate currently serving `service_name`, if any.
pub fn current_binding<'a>(
    certs:        &'a [Certificate],
    service_name: &str,
    policy:       DuplicatePolicy,
) -> Result<Option<&'a str>> {
    let mut claimants = certs.iter().filter(|c| c.serves(service_name));
    let first = match claimants.next() {
        Some(c) => c,
        None => return Ok(None),
    };

    let rest: Vec<&Certificate> = claimants.collect();
    if !rest.is_empty() {
        let ids: Vec<String> = std::iter::once(first)
            .chain(rest)
            .map(|c| c.id.clone())
            .collect();
        match policy {
            DuplicatePolicy::FirstMatch => {
                warn!("service {service_name:?} claimed by {ids:?}; using {}", first.id);
            }
            DuplicatePolicy::Reject => {
                return Err(CertError::RegistryConflict {
                    service: service_name.to_string(),
                    ids,
                });
            }
        }
    }
    Ok(Some(first.id.as_str()))
}

/// Service display name → serving certificate id, first claimant wins.
pub fn current_bindings(certs: &[Certificate]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for cert in certs {
        for svc in &cert.services {
            out.entry(svc.display_name.clone()).or_insert_with(|| cert.id.clone());
        }
    }
    out
}

/// Compact JSON `settings` blob: a one-element list of
/// `{service, old_id, id}`.
pub fn settings_payload(descriptor: Map<String, Value>, old_id: &str, id: &str) -> Result<String> {
    let settings = json!([{
        "service": descriptor,
        "old_id":  old_id,
        "id":      id,
    }]);
    Ok(serde_json::to_string(&settings)?)
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Outcome of a bind request that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    /// The service already used this certificate; nothing was written.
    AlreadyBound { cert_id: String },
    /// One update was submitted and accepted.
    Updated { old_id: String, reply: ApiReply },
}

pub struct ServiceBinder<'t, T: Transport + ?Sized> {
    transport:  &'t T,
    duplicates: DuplicatePolicy,
}

impl<'t, T: Transport + ?Sized> ServiceBinder<'t, T> {
    pub fn new(transport: &'t T) -> Self {
        Self { transport, duplicates: DuplicatePolicy::default() }
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    /// Make `cert_id` the certificate serving `service_name`.
    pub async fn bind_certificate_to_service(
        &self,
        cert_id:      &str,
        service_name: &str,
    ) -> Result<BindOutcome> {
        if cert_id.is_empty() {
            return Err(CertError::InvalidArgument("certificate id is empty".into()));
        }
        let profile = profile(service_name)?;

        let certs = CertificateRegistry::new(self.transport).list().await?;
        let old_id = current_binding(&certs, service_name, self.duplicates)?
            .unwrap_or("")
            .to_string();

        if old_id == cert_id {
            info!("certificate {cert_id} already serves {service_name:?}; nothing to do");
            return Ok(BindOutcome::AlreadyBound { cert_id: old_id });
        }

        let major = self.transport.dsm_major_version();
        let settings = settings_payload(profile.descriptor(major), &old_id, cert_id)?;
        debug!("{SERVICE_API} set (DSM {major}): {settings}");

        let endpoint = self.transport.resolve_endpoint(SERVICE_API)?;
        let version = endpoint.min_version.to_string();
        let query = params([("_sid", self.transport.session_id())]);
        let form = params([
            ("settings", settings.as_str()),
            ("api", SERVICE_API),
            ("version", version.as_str()),
            ("method", "set"),
        ]);

        let reply = self
            .transport
            .post_form(&endpoint, query, form)
            .await?
            .checked()?;
        info!("certificate {cert_id} now serves {service_name:?} (was {old_id:?})");
        Ok(BindOutcome::Updated { old_id, reply })
    }

    /// Bind to the DSM web desktop, the service most callers mean.
    pub async fn bind_default_service(&self, cert_id: &str) -> Result<BindOutcome> {
        self.bind_certificate_to_service(cert_id, DEFAULT_SERVICE).await
    }
}
