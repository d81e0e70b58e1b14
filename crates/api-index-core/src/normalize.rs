//! Endpoint normalization.
//!
//! Maps a format-specific [`RawEndpoint`] onto the canonical [`Endpoint`]
//! schema. Normalization only reads from the source document; the derived
//! `has_*` flags are computed by [`Endpoint::from_fields`].
//!
//! A record without a usable method or url is rejected with a
//! [`Rejected`] reason. Rejections are not errors for the pipeline:
//! [`normalize_all`] logs them and moves on.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::detect::ApiFormat;
use crate::models::{
    AuthDescriptor, Endpoint, EndpointFields, Example, HttpMethod, RequestBody,
};
use crate::parse::{OperationRecord, PostmanRequest, RawEndpoint, RawSource};

/// Why a raw record could not become an [`Endpoint`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("missing HTTP method")]
    MissingMethod,
    #[error("unsupported HTTP method '{0}'")]
    UnknownMethod(String),
    #[error("missing url")]
    MissingUrl,
}

/// Normalize a single raw record.
pub fn normalize(raw: &RawEndpoint<'_>) -> Result<Endpoint, Rejected> {
    let fields = match &raw.source {
        RawSource::Postman(req) => postman_fields(req, &raw.folder_path)?,
        RawSource::Operation(op) => operation_fields(op, &raw.folder_path)?,
    };
    Ok(Endpoint::from_fields(fields))
}

/// Normalize every record, dropping (and logging) the ones that fail.
pub fn normalize_all(raws: &[RawEndpoint<'_>]) -> Vec<Endpoint> {
    raws.iter()
        .filter_map(|raw| match normalize(raw) {
            Ok(ep) => Some(ep),
            Err(reason) => {
                debug!(folder = ?raw.folder_path, %reason, "dropping endpoint record");
                None
            }
        })
        .collect()
}

fn parse_method(method: Option<&str>) -> Result<HttpMethod, Rejected> {
    let method = method.map(str::trim).filter(|m| !m.is_empty());
    match method {
        None => Err(Rejected::MissingMethod),
        Some(m) => m
            .parse::<HttpMethod>()
            .map_err(|_| Rejected::UnknownMethod(m.to_string())),
    }
}

fn non_empty_url(url: Option<String>) -> Result<String, Rejected> {
    url.map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(Rejected::MissingUrl)
}

fn display_name(name: Option<&str>, method: HttpMethod, url: &str) -> String {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => format!("{} {}", method, url),
    }
}

/// Render a JSON scalar as a header value; strings are taken verbatim.
fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============ Postman ============

fn postman_fields(req: &PostmanRequest<'_>, folder_path: &[String]) -> Result<EndpointFields, Rejected> {
    // A bare string request is shorthand for a GET of that URL.
    if let Some(url) = req.request.as_str() {
        let url = non_empty_url(Some(url.to_string()))?;
        let method = HttpMethod::Get;
        return Ok(EndpointFields {
            name: display_name(req.name, method, &url),
            method,
            url,
            folder_path: folder_path.to_vec(),
            headers: BTreeMap::new(),
            body: None,
            auth: None,
            examples: postman_examples(req.responses),
        });
    }

    let request = req.request;
    let method = parse_method(request.get("method").and_then(Value::as_str))?;
    let url = non_empty_url(request.get("url").and_then(postman_url))?;

    Ok(EndpointFields {
        name: display_name(req.name, method, &url),
        method,
        url,
        folder_path: folder_path.to_vec(),
        headers: request.get("header").map(postman_headers).unwrap_or_default(),
        body: request.get("body").and_then(postman_body),
        auth: request.get("auth").and_then(postman_auth),
        examples: postman_examples(req.responses),
    })
}

/// Resolve a Postman url, which is either a string or an object with a
/// `raw` string and/or `protocol`/`host`/`path` components.
fn postman_url(url: &Value) -> Option<String> {
    if let Some(s) = url.as_str() {
        return Some(s.to_string());
    }
    let obj = url.as_object()?;
    if let Some(raw) = obj.get("raw").and_then(Value::as_str) {
        if !raw.trim().is_empty() {
            return Some(raw.to_string());
        }
    }

    let host = join_segments(obj.get("host"), ".");
    let path = join_segments(obj.get("path"), "/");
    if host.is_empty() && path.is_empty() {
        return None;
    }

    let mut out = String::new();
    if let Some(protocol) = obj.get("protocol").and_then(Value::as_str) {
        out.push_str(protocol);
        out.push_str("://");
    }
    out.push_str(&host);
    if !path.is_empty() {
        out.push('/');
        out.push_str(&path);
    }
    Some(out)
}

fn join_segments(v: Option<&Value>, sep: &str) -> String {
    match v {
        Some(Value::String(s)) => s.trim_matches('/').to_string(),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|p| match p {
                // Path segments may be objects like {"type": "string", "value": "users"}.
                Value::Object(o) => o.get("value").map(value_to_string).unwrap_or_default(),
                other => value_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(sep),
        _ => String::new(),
    }
}

fn is_disabled(entry: &Value) -> bool {
    entry.get("disabled").and_then(Value::as_bool).unwrap_or(false)
}

/// Postman headers are a list of `{key, value, disabled}` or a raw
/// `Key: value` block, one header per line.
fn postman_headers(headers: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    match headers {
        Value::Array(entries) => {
            for entry in entries.iter().filter(|e| !is_disabled(e)) {
                let Some(key) = entry.get("key").and_then(Value::as_str) else {
                    continue;
                };
                let value = entry.get("value").map(value_to_string).unwrap_or_default();
                out.insert(key.to_string(), value);
            }
        }
        Value::String(block) => {
            for line in block.lines() {
                if let Some((k, v)) = line.split_once(':') {
                    let k = k.trim();
                    if !k.is_empty() {
                        out.insert(k.to_string(), v.trim().to_string());
                    }
                }
            }
        }
        _ => {}
    }
    out
}

fn postman_body(body: &Value) -> Option<RequestBody> {
    let obj = body.as_object()?;
    if obj.get("disabled").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    match obj.get("mode").and_then(Value::as_str) {
        Some("raw") => obj
            .get("raw")
            .and_then(Value::as_str)
            .map(|raw| RequestBody::Raw(raw.to_string())),
        Some(mode @ ("urlencoded" | "formdata")) => {
            let fields: Map<String, Value> = obj
                .get(mode)
                .and_then(Value::as_array)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|e| !is_disabled(e))
                        .filter_map(|e| {
                            let key = e.get("key").and_then(Value::as_str)?;
                            let value = e
                                .get("value")
                                .or_else(|| e.get("src"))
                                .cloned()
                                .unwrap_or(Value::Null);
                            Some((key.to_string(), value))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(RequestBody::Json(Value::Object(fields)))
        }
        Some(mode @ ("graphql" | "file")) => obj.get(mode).cloned().map(RequestBody::Json),
        _ if obj.is_empty() => None,
        _ => Some(RequestBody::Json(body.clone())),
    }
}

/// Postman auth: `{"type": "bearer", "bearer": [{"key": .., "value": ..}]}`.
/// `noauth` and `inherit` mean the request carries no auth of its own.
fn postman_auth(auth: &Value) -> Option<AuthDescriptor> {
    let kind = auth.get("type").and_then(Value::as_str)?;
    if matches!(kind, "noauth" | "inherit") || kind.trim().is_empty() {
        return None;
    }

    let mut params = BTreeMap::new();
    match auth.get(kind) {
        Some(Value::Array(entries)) => {
            for entry in entries {
                if let Some(key) = entry.get("key").and_then(Value::as_str) {
                    params.insert(
                        key.to_string(),
                        entry.get("value").cloned().unwrap_or(Value::Null),
                    );
                }
            }
        }
        Some(Value::Object(map)) => {
            params.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        _ => {}
    }

    Some(AuthDescriptor {
        kind: kind.to_string(),
        params,
    })
}

fn postman_examples(responses: &[Value]) -> Vec<Example> {
    responses
        .iter()
        .filter(|r| r.is_object())
        .map(|r| Example {
            name: r.get("name").and_then(Value::as_str).map(str::to_string),
            status: r
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok()),
            request: r.get("originalRequest").cloned(),
            response: r.get("body").cloned(),
        })
        .collect()
}

// ============ OpenAPI / Swagger ============

fn operation_fields(op: &OperationRecord<'_>, folder_path: &[String]) -> Result<EndpointFields, Rejected> {
    let method = parse_method(Some(op.method))?;
    let url = non_empty_url(Some(op.path.to_string()))?;

    let summary = op.operation.get("summary").and_then(Value::as_str);
    let operation_id = op.operation.get("operationId").and_then(Value::as_str);
    let name = display_name(
        summary.filter(|s| !s.trim().is_empty()).or(operation_id),
        method,
        &url,
    );

    let parameters = merged_parameters(op);

    let body = match op.dialect {
        ApiFormat::Swagger => swagger_body(&parameters),
        _ => op
            .operation
            .get("requestBody")
            .cloned()
            .map(RequestBody::Json),
    };

    Ok(EndpointFields {
        name,
        method,
        url,
        folder_path: folder_path.to_vec(),
        headers: header_parameters(&parameters),
        body,
        auth: operation_auth(op),
        examples: operation_examples(op),
    })
}

/// Path-level parameters overridden by operation-level ones with the same
/// `name` and `in`.
fn merged_parameters<'a>(op: &OperationRecord<'a>) -> Vec<&'a Value> {
    let op_params: &'a [Value] = op
        .operation
        .get("parameters")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let key = |p: &Value| {
        (
            p.get("name").and_then(Value::as_str).map(str::to_string),
            p.get("in").and_then(Value::as_str).map(str::to_string),
        )
    };

    let mut merged: Vec<&'a Value> = op
        .path_parameters
        .iter()
        .filter(|pp| !op_params.iter().any(|p| key(p) == key(*pp)))
        .collect();
    merged.extend(op_params.iter());
    merged
}

fn header_parameters(params: &[&Value]) -> BTreeMap<String, String> {
    params
        .iter()
        .filter(|p| p.get("in").and_then(Value::as_str) == Some("header"))
        .filter_map(|p| {
            let name = p.get("name").and_then(Value::as_str)?;
            let value = p
                .get("example")
                .or_else(|| p.get("schema").and_then(|s| s.get("example")))
                .or_else(|| p.get("schema").and_then(|s| s.get("default")))
                .or_else(|| p.get("default"))
                .map(value_to_string)
                .unwrap_or_default();
            Some((name.to_string(), value))
        })
        .collect()
}

/// Swagger 2 bodies live in parameters: a single `in: body` parameter, or a
/// set of `in: formData` fields.
fn swagger_body(params: &[&Value]) -> Option<RequestBody> {
    if let Some(body) = params
        .iter()
        .find(|p| p.get("in").and_then(Value::as_str) == Some("body"))
    {
        let schema = body.get("schema").cloned().unwrap_or_else(|| (*body).clone());
        return Some(RequestBody::Json(schema));
    }

    let form: Map<String, Value> = params
        .iter()
        .filter(|p| p.get("in").and_then(Value::as_str) == Some("formData"))
        .filter_map(|p| {
            let name = p.get("name").and_then(Value::as_str)?;
            Some((name.to_string(), (*p).clone()))
        })
        .collect();

    if form.is_empty() {
        None
    } else {
        Some(RequestBody::Json(Value::Object(form)))
    }
}

/// Only operation-level `security` counts. A missing list means the
/// document-wide default applies (inherited), and `[]` or `[{}]` means the
/// operation is explicitly unauthenticated.
fn operation_auth(op: &OperationRecord<'_>) -> Option<AuthDescriptor> {
    let requirements = op.operation.get("security")?.as_array()?;
    let (scheme, scopes) = requirements
        .iter()
        .filter_map(Value::as_object)
        .find_map(|req| req.iter().next())?;

    let definition = op
        .security_schemes
        .and_then(|schemes| schemes.get(scheme))
        .and_then(Value::as_object);

    let kind = definition
        .and_then(|d| d.get("type"))
        .and_then(Value::as_str)
        .unwrap_or(scheme.as_str())
        .to_string();

    let mut params = BTreeMap::new();
    params.insert("scheme".to_string(), Value::String(scheme.clone()));
    params.insert("scopes".to_string(), scopes.clone());
    if let Some(definition) = definition {
        for (k, v) in definition {
            if k != "type" && k != "description" {
                params.insert(k.clone(), v.clone());
            }
        }
    }

    Some(AuthDescriptor { kind, params })
}

/// Named example values of an OpenAPI `content` map: both the single
/// `example` and the `examples.{name}.value` forms, per media type.
fn media_examples(content: Option<&Value>) -> Vec<(Option<String>, Value)> {
    let Some(content) = content.and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for media in content.values() {
        if let Some(example) = media.get("example") {
            out.push((None, example.clone()));
        }
        if let Some(examples) = media.get("examples").and_then(Value::as_object) {
            for (name, ex) in examples {
                let value = ex.get("value").unwrap_or(ex).clone();
                out.push((Some(name.clone()), value));
            }
        }
    }
    out
}

fn operation_examples(op: &OperationRecord<'_>) -> Vec<Example> {
    let request_example = match op.dialect {
        ApiFormat::Swagger => None,
        _ => media_examples(op.operation.get("requestBody").and_then(|b| b.get("content")))
            .into_iter()
            .next()
            .map(|(_, v)| v),
    };

    let mut examples = Vec::new();
    if let Some(responses) = op.operation.get("responses").and_then(Value::as_object) {
        for (code, response) in responses {
            let status = code.parse::<u16>().ok();
            let found: Vec<(Option<String>, Value)> = match op.dialect {
                // Swagger 2: `examples` maps a mime type to the example body.
                ApiFormat::Swagger => response
                    .get("examples")
                    .and_then(Value::as_object)
                    .map(|m| m.iter().map(|(k, v)| (Some(k.clone()), v.clone())).collect())
                    .unwrap_or_default(),
                _ => media_examples(response.get("content")),
            };
            for (name, value) in found {
                examples.push(Example {
                    name,
                    status,
                    request: request_example.clone(),
                    response: Some(value),
                });
            }
        }
    }

    if examples.is_empty() {
        if let Some(request) = request_example {
            examples.push(Example {
                name: None,
                status: None,
                request: Some(request),
                response: None,
            });
        }
    }
    examples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect_format;
    use serde_json::json;
    use crate::parse::parse_collection;

    fn normalize_doc(doc: &Value) -> Vec<Endpoint> {
        let raws = parse_collection(detect_format(doc), doc);
        normalize_all(&raws)
    }

    #[test]
    fn test_postman_full_request() {
        let doc = json!({
            "info": {"schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"},
            "item": [{
                "name": "Payments",
                "item": [{
                    "name": "Create payment",
                    "request": {
                        "method": "post",
                        "url": {"raw": "{{base}}/payments?dry=1", "host": ["{{base}}"], "path": ["payments"]},
                        "header": [
                            {"key": "Content-Type", "value": "application/json"},
                            {"key": "X-Debug", "value": "1", "disabled": true}
                        ],
                        "body": {"mode": "raw", "raw": "{\"amount\": 10}"},
                        "auth": {"type": "bearer", "bearer": [{"key": "token", "value": "{{token}}", "type": "string"}]}
                    },
                    "response": [{"name": "Created", "code": 201, "body": "{\"id\": 1}"}]
                }]
            }]
        });
        let eps = normalize_doc(&doc);
        assert_eq!(eps.len(), 1);
        let ep = &eps[0];
        assert_eq!(ep.name, "Create payment");
        assert_eq!(ep.method, HttpMethod::Post);
        assert_eq!(ep.url, "{{base}}/payments?dry=1");
        assert_eq!(ep.folder_path, vec!["Payments"]);
        assert_eq!(ep.headers.len(), 1);
        assert_eq!(ep.headers["Content-Type"], "application/json");
        assert_eq!(ep.body, Some(RequestBody::Raw("{\"amount\": 10}".to_string())));
        let auth = ep.auth.as_ref().unwrap();
        assert_eq!(auth.kind, "bearer");
        assert_eq!(auth.params["token"], json!("{{token}}"));
        assert_eq!(ep.examples.len(), 1);
        assert_eq!(ep.examples[0].status, Some(201));
        assert!(ep.has_examples() && ep.has_auth() && ep.has_body());
    }

    #[test]
    fn test_postman_url_from_components() {
        let url = json!({"protocol": "https", "host": ["api", "example", "com"], "path": ["v1", "users"]});
        assert_eq!(postman_url(&url).as_deref(), Some("https://api.example.com/v1/users"));
        assert_eq!(postman_url(&json!({})), None);
    }

    #[test]
    fn test_postman_noauth_and_string_request() {
        let doc = json!({
            "info": {"schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"},
            "item": [
                {"name": "Ping", "request": "https://api.example.com/ping"},
                {"name": "Open", "request": {"method": "GET", "url": "/open", "auth": {"type": "noauth"}}}
            ]
        });
        let eps = normalize_doc(&doc);
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].method, HttpMethod::Get);
        assert_eq!(eps[0].url, "https://api.example.com/ping");
        assert!(eps[1].auth.is_none());
        assert!(!eps[1].has_auth());
    }

    #[test]
    fn test_records_without_method_or_url_are_dropped() {
        let doc = json!({
            "info": {"schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"},
            "item": [
                {"name": "No method", "request": {"url": "/a"}},
                {"name": "No url", "request": {"method": "GET"}},
                {"name": "Blank url", "request": {"method": "GET", "url": "  "}},
                {"name": "Weird verb", "request": {"method": "FETCH", "url": "/b"}},
                {"name": "Fine", "request": {"method": "DELETE", "url": "/c"}}
            ]
        });
        let eps = normalize_doc(&doc);
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].name, "Fine");
    }

    #[test]
    fn test_rejection_reasons() {
        let request = json!({"url": "/a"});
        let raw = RawEndpoint {
            folder_path: Vec::new(),
            source: RawSource::Postman(PostmanRequest {
                name: None,
                request: &request,
                responses: &[],
            }),
        };
        assert_eq!(normalize(&raw), Err(Rejected::MissingMethod));
    }

    #[test]
    fn test_openapi_operation() {
        let doc = json!({
            "openapi": "3.0.3",
            "security": [{"bearerAuth": []}],
            "components": {"securitySchemes": {
                "bearerAuth": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"},
                "oauth": {"type": "oauth2", "flows": {}}
            }},
            "paths": {
                "/pets": {
                    "parameters": [{"name": "X-Trace", "in": "header", "schema": {"type": "string", "default": "off"}}],
                    "get": {
                        "tags": ["pets"],
                        "operationId": "listPets",
                        "parameters": [{"name": "X-Trace", "in": "header", "example": "on"}],
                        "responses": {"200": {"content": {"application/json": {
                            "examples": {"two": {"value": [{"id": 1}, {"id": 2}]}}
                        }}}}
                    },
                    "post": {
                        "summary": "Create pet",
                        "security": [{"oauth": ["pets:write"]}],
                        "requestBody": {"content": {"application/json": {
                            "schema": {"type": "object"},
                            "example": {"name": "rex"}
                        }}}
                    }
                },
                "/health": {"get": {"security": []}}
            }
        });
        let eps = normalize_doc(&doc);
        assert_eq!(eps.len(), 3);

        let list = &eps[0];
        assert_eq!(list.name, "listPets");
        assert_eq!(list.url, "/pets");
        assert_eq!(list.folder_path, vec!["pets"]);
        assert_eq!(list.headers["X-Trace"], "on");
        assert!(list.body.is_none());
        // Document-level security is inherited, not attached to the operation.
        assert!(list.auth.is_none());
        assert_eq!(list.examples.len(), 1);
        assert_eq!(list.examples[0].name.as_deref(), Some("two"));
        assert_eq!(list.examples[0].status, Some(200));

        let create = &eps[1];
        assert_eq!(create.name, "Create pet");
        assert!(create.has_body());
        let auth = create.auth.as_ref().unwrap();
        assert_eq!(auth.kind, "oauth2");
        assert_eq!(auth.params["scopes"], json!(["pets:write"]));
        assert_eq!(create.examples.len(), 1);
        assert_eq!(create.examples[0].request, Some(json!({"name": "rex"})));

        let health = &eps[2];
        assert_eq!(health.name, "GET /health");
        assert!(!health.has_auth());
    }

    #[test]
    fn test_swagger_body_and_examples() {
        let doc = json!({
            "swagger": "2.0",
            "securityDefinitions": {"api_key": {"type": "apiKey", "in": "header", "name": "X-Key"}},
            "paths": {
                "/orders": {
                    "post": {
                        "tags": ["store"],
                        "parameters": [{"name": "order", "in": "body", "schema": {"$ref": "#/definitions/Order"}}],
                        "security": [{"api_key": []}],
                        "responses": {"200": {"examples": {"application/json": {"id": 7}}}}
                    },
                    "put": {
                        "parameters": [
                            {"name": "status", "in": "formData", "type": "string"},
                            {"name": "X-Req", "in": "header", "default": "abc"}
                        ]
                    }
                }
            }
        });
        let eps = normalize_doc(&doc);
        assert_eq!(eps.len(), 2);

        let post = &eps[0];
        assert_eq!(post.body, Some(RequestBody::Json(json!({"$ref": "#/definitions/Order"}))));
        let auth = post.auth.as_ref().unwrap();
        assert_eq!(auth.kind, "apiKey");
        assert_eq!(auth.params["name"], json!("X-Key"));
        assert_eq!(post.examples[0].response, Some(json!({"id": 7})));
        assert_eq!(post.examples[0].name.as_deref(), Some("application/json"));

        let put = &eps[1];
        assert!(put.has_body());
        assert_eq!(put.headers["X-Req"], "abc");
        assert!(!put.has_examples());
    }

    #[test]
    fn test_normalize_does_not_touch_input() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {"/a": {"get": {"summary": "A"}}}
        });
        let before = doc.clone();
        let _ = normalize_doc(&doc);
        assert_eq!(doc, before);
    }
}
