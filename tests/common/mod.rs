//! In-memory DSM appliance used by the integration tests.
//!
//! Implements `Transport`, records every call and applies set/delete/bind
//! writes to its own registry so later `list` calls observe them.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use dsm_certctl::error::Result;
use dsm_certctl::model::{ApiReply, Certificate, RawReply, ServiceBinding};
use dsm_certctl::transport::{ApiEndpoint, FilePart, Params, Transport};

pub const ARCHIVE: &[u8] = b"PK\x03\x04archive-bytes";

#[derive(Debug, Clone)]
pub enum Call {
    Dispatch  { api: String, params: Params },
    PostForm  { path: String, query: Params, form: Params },
    Multipart { query: Params, fields: Params, files: Vec<FilePart> },
    Download  { query: Params },
}

impl Call {
    pub fn is_write(&self) -> bool {
        match self {
            Call::Dispatch { params, .. } => param(params, "method") != Some("list"),
            Call::PostForm { .. } | Call::Multipart { .. } => true,
            Call::Download { .. } => false,
        }
    }
}

pub fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

pub fn cert(id: &str, is_default: bool, services: &[&str]) -> Certificate {
    Certificate {
        id: id.into(),
        desc: format!("cert {id}"),
        is_default,
        services: services
            .iter()
            .map(|s| ServiceBinding {
                display_name: s.to_string(),
                display_name_i18n: Some("common:web_desktop".into()),
                owner: Some("root".into()),
                service: Some("default".into()),
                subscriber: Some("system".into()),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub struct StubAppliance {
    pub major:    u32,
    pub certs:    Mutex<Vec<Certificate>>,
    pub calls:    Mutex<Vec<Call>>,
    /// Replaces the next `list` reply when set.
    pub fail_read:  Mutex<Option<ApiReply>>,
    /// Replaces the next write reply when set.
    pub fail_write: Mutex<Option<ApiReply>>,
    /// Replaces the export reply when set.
    pub export_reply: Mutex<Option<RawReply>>,
    next_id: Mutex<u32>,
}

impl StubAppliance {
    pub fn new(major: u32, certs: Vec<Certificate>) -> Self {
        Self {
            major,
            certs:        Mutex::new(certs),
            calls:        Mutex::new(Vec::new()),
            fail_read:    Mutex::new(None),
            fail_write:   Mutex::new(None),
            export_reply: Mutex::new(None),
            next_id:      Mutex::new(1),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn snapshot(&self) -> Vec<Certificate> {
        self.certs.lock().unwrap().clone()
    }

    pub fn fail_next_write(&self, reply: ApiReply) {
        *self.fail_write.lock().unwrap() = Some(reply);
    }

    pub fn fail_next_read(&self, reply: ApiReply) {
        *self.fail_read.lock().unwrap() = Some(reply);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn scripted_failure(&self) -> Option<ApiReply> {
        self.fail_write.lock().unwrap().take()
    }

    fn ok(data: Value) -> ApiReply {
        ApiReply::new(200, json!({"success": true, "data": data}))
    }

    fn api_error(code: i64) -> ApiReply {
        ApiReply::new(200, json!({"success": false, "error": {"code": code}}))
    }

    fn apply_crt(&self, params: &Params) -> ApiReply {
        let mut certs = self.certs.lock().unwrap();
        match param(params, "method") {
            Some("list") => Self::ok(json!({ "certificates": *certs })),
            Some("set") => {
                let id = param(params, "id").unwrap_or("").trim_matches('"');
                if !certs.iter().any(|c| c.id == id) {
                    return Self::api_error(5511);
                }
                for c in certs.iter_mut() {
                    c.is_default = c.id == id;
                }
                Self::ok(Value::Null)
            }
            Some("delete") => {
                let ids: Vec<String> = param(params, "ids")
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or_default();
                certs.retain(|c| !ids.contains(&c.id));
                Self::ok(Value::Null)
            }
            _ => Self::api_error(103),
        }
    }

    fn apply_bind(&self, form: &Params) -> ApiReply {
        let settings: Value = match param(form, "settings").map(serde_json::from_str) {
            Some(Ok(v)) => v,
            _ => return Self::api_error(120),
        };
        let mut certs = self.certs.lock().unwrap();
        for entry in settings.as_array().into_iter().flatten() {
            let target = entry["id"].as_str().unwrap_or("");
            let name = entry["service"]["display_name"].as_str().unwrap_or("");
            if !certs.iter().any(|c| c.id == target) {
                return Self::api_error(5511);
            }
            for c in certs.iter_mut() {
                c.services.retain(|s| s.display_name != name);
            }
            if let Some(c) = certs.iter_mut().find(|c| c.id == target) {
                c.services.push(ServiceBinding {
                    display_name: name.to_string(),
                    ..Default::default()
                });
            }
        }
        Self::ok(Value::Null)
    }
}

#[async_trait]
impl Transport for StubAppliance {
    fn resolve_endpoint(&self, _api_name: &str) -> Result<ApiEndpoint> {
        Ok(ApiEndpoint::new("entry.cgi", 1))
    }

    fn session_id(&self) -> &str {
        "stub-sid"
    }

    fn dsm_major_version(&self) -> u32 {
        self.major
    }

    async fn dispatch(&self, api_name: &str, _endpoint: &ApiEndpoint, params: Params) -> Result<ApiReply> {
        let call = Call::Dispatch { api: api_name.to_string(), params: params.clone() };
        let is_write = call.is_write();
        self.record(call);
        let scripted = if is_write {
            self.scripted_failure()
        } else {
            self.fail_read.lock().unwrap().take()
        };
        if let Some(reply) = scripted {
            return Ok(reply);
        }
        Ok(self.apply_crt(&params))
    }

    async fn post_form(&self, endpoint: &ApiEndpoint, query: Params, form: Params) -> Result<ApiReply> {
        self.record(Call::PostForm { path: endpoint.path.clone(), query, form: form.clone() });
        if let Some(reply) = self.scripted_failure() {
            return Ok(reply);
        }
        Ok(self.apply_bind(&form))
    }

    async fn post_multipart(
        &self,
        _endpoint: &ApiEndpoint,
        query:     Params,
        fields:    Params,
        files:     Vec<FilePart>,
    ) -> Result<ApiReply> {
        self.record(Call::Multipart { query, fields: fields.clone(), files });
        if let Some(reply) = self.scripted_failure() {
            return Ok(reply);
        }
        let id = match param(&fields, "id") {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let mut next = self.next_id.lock().unwrap();
                let id = format!("new{next}");
                *next += 1;
                self.certs.lock().unwrap().push(cert(&id, false, &[]));
                id
            }
        };
        if param(&fields, "as_default") == Some("true") {
            for c in self.certs.lock().unwrap().iter_mut() {
                c.is_default = c.id == id;
            }
        }
        Ok(Self::ok(json!({ "id": id })))
    }

    async fn download(&self, _endpoint: &ApiEndpoint, query: Params) -> Result<RawReply> {
        self.record(Call::Download { query });
        let scripted = self.export_reply.lock().unwrap().clone();
        Ok(scripted.unwrap_or_else(|| RawReply { status: 200, body: ARCHIVE.to_vec() }))
    }
}
