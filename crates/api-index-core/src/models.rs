//! Core data models for API Index.
//!
//! [`Endpoint`] is the canonical, format-independent unit of indexing.
//! [`IndexedDocument`] is what an endpoint becomes when stored in a
//! project's vector collection, and [`SearchHit`] is what comes back out.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Separator used when flattening an endpoint's folder path into metadata.
pub const FOLDER_SEPARATOR: &str = " / ";

/// The fixed set of HTTP verbs an endpoint may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
}

impl HttpMethod {
    /// Every supported verb, in the order OpenAPI path items list them.
    pub const ALL: [HttpMethod; 9] = [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Patch,
        HttpMethod::Trace,
        HttpMethod::Connect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a supported HTTP verb.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported HTTP method: '{0}'")]
pub struct UnknownMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        HttpMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// Opaque request body: either raw text or structured JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "content", rename_all = "lowercase")]
pub enum RequestBody {
    Raw(String),
    Json(Value),
}

impl RequestBody {
    /// A body is empty when it carries no content at all: an empty or
    /// whitespace-only string, JSON `null`, or an empty array/object.
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Raw(s) => s.trim().is_empty(),
            RequestBody::Json(v) => match v {
                Value::Null => true,
                Value::String(s) => s.trim().is_empty(),
                Value::Array(a) => a.is_empty(),
                Value::Object(o) => o.is_empty(),
                _ => false,
            },
        }
    }
}

/// Authentication descriptor: a scheme type plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

/// An example request/response pair attached to an endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Example {
    pub name: Option<String>,
    pub status: Option<u16>,
    pub request: Option<Value>,
    pub response: Option<Value>,
}

/// Caller-supplied endpoint fields, before derived flags are computed.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointFields {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub folder_path: Vec<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    pub auth: Option<AuthDescriptor>,
    pub examples: Vec<Example>,
}

/// A normalized API endpoint.
///
/// The `has_*` flags are derived from the other fields when the endpoint
/// is built via [`Endpoint::from_fields`] and cannot be set independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub folder_path: Vec<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    pub auth: Option<AuthDescriptor>,
    pub examples: Vec<Example>,
    has_examples: bool,
    has_auth: bool,
    has_body: bool,
}

impl Endpoint {
    pub fn from_fields(fields: EndpointFields) -> Self {
        let has_examples = !fields.examples.is_empty();
        let has_auth = fields.auth.is_some();
        let has_body = fields.body.as_ref().is_some_and(|b| !b.is_empty());
        Self {
            name: fields.name,
            method: fields.method,
            url: fields.url,
            folder_path: fields.folder_path,
            headers: fields.headers,
            body: fields.body,
            auth: fields.auth,
            examples: fields.examples,
            has_examples,
            has_auth,
            has_body,
        }
    }

    pub fn has_examples(&self) -> bool {
        self.has_examples
    }

    pub fn has_auth(&self) -> bool {
        self.has_auth
    }

    pub fn has_body(&self) -> bool {
        self.has_body
    }
}

/// A scalar metadata value stored alongside a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

/// Flat metadata record, keyed by field name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata stored for every indexed endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointMetadata {
    pub file_id: String,
    pub method: String,
    pub url: String,
    pub name: String,
    pub folder_path: String,
    pub has_examples: bool,
    pub has_auth: bool,
    pub has_body: bool,
}

impl EndpointMetadata {
    pub fn for_endpoint(file_id: &str, endpoint: &Endpoint) -> Self {
        Self {
            file_id: file_id.to_string(),
            method: endpoint.method.to_string(),
            url: endpoint.url.clone(),
            name: endpoint.name.clone(),
            folder_path: endpoint.folder_path.join(FOLDER_SEPARATOR),
            has_examples: endpoint.has_examples(),
            has_auth: endpoint.has_auth(),
            has_body: endpoint.has_body(),
        }
    }

    pub fn into_metadata(self) -> Metadata {
        let mut m = Metadata::new();
        m.insert("file_id".into(), self.file_id.into());
        m.insert("method".into(), self.method.into());
        m.insert("url".into(), self.url.into());
        m.insert("name".into(), self.name.into());
        m.insert("folder_path".into(), self.folder_path.into());
        m.insert("has_examples".into(), self.has_examples.into());
        m.insert("has_auth".into(), self.has_auth.into());
        m.insert("has_body".into(), self.has_body.into());
        m
    }
}

/// Deterministic document id: `{file_id}_{method}_{url}`.
///
/// Two endpoints with the same method and url in one file share an id;
/// the one written last wins.
pub fn document_id(file_id: &str, method: HttpMethod, url: &str) -> String {
    format!("{}_{}_{}", file_id, method, url)
}

/// An endpoint ready to be written to a project's vector collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    /// Pretty-printed JSON of the full endpoint; also the embedding input.
    pub document_text: String,
    pub metadata: EndpointMetadata,
}

impl IndexedDocument {
    pub fn from_endpoint(file_id: &str, endpoint: &Endpoint) -> serde_json::Result<Self> {
        Ok(Self {
            id: document_id(file_id, endpoint.method, &endpoint.url),
            document_text: serde_json::to_string_pretty(endpoint)?,
            metadata: EndpointMetadata::for_endpoint(file_id, endpoint),
        })
    }
}

/// One ranked search result. Lower `distance` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub distance: f32,
}
