//! Collection parsing: flatten a classified document into raw endpoint records.
//!
//! Each supported [`ApiFormat`] has its own parse function, selected through
//! the [`PARSERS`] dispatch table. Parsers only walk the document structure
//! and tag every request or operation with its folder path; turning those
//! format-specific records into [`Endpoint`](crate::models::Endpoint)s is
//! the job of [`normalize`](crate::normalize).
//!
//! # Postman
//!
//! Items form a tree. An item with a nested `item` array is a folder, an item
//! with a `request` is a request. The tree is walked depth-first in document
//! order, pushing folder names onto the path while descending.
//!
//! # OpenAPI / Swagger
//!
//! `paths` maps a path template to a path item, whose HTTP-method keys are
//! operations. Every operation becomes one record; its `tags` become the
//! folder path.

use serde_json::{Map, Value};

use crate::detect::ApiFormat;
use crate::models::HttpMethod;

/// A format-specific endpoint record, borrowing from the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEndpoint<'a> {
    /// Folder names (Postman) or tags (OpenAPI/Swagger), outer to inner.
    pub folder_path: Vec<String>,
    pub source: RawSource<'a>,
}

/// The format-specific payload of a [`RawEndpoint`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawSource<'a> {
    Postman(PostmanRequest<'a>),
    Operation(OperationRecord<'a>),
}

/// A Postman request item.
#[derive(Debug, Clone, PartialEq)]
pub struct PostmanRequest<'a> {
    pub name: Option<&'a str>,
    /// The item's `request` field: either a URL string or a request object.
    pub request: &'a Value,
    /// Saved example responses (`response` array), possibly empty.
    pub responses: &'a [Value],
}

/// An OpenAPI or Swagger operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord<'a> {
    /// [`ApiFormat::OpenApi`] or [`ApiFormat::Swagger`].
    pub dialect: ApiFormat,
    pub path: &'a str,
    pub method: &'a str,
    pub operation: &'a Value,
    /// Parameters declared on the path item, shared by all its operations.
    pub path_parameters: &'a [Value],
    /// `components.securitySchemes` (OpenAPI) or `securityDefinitions` (Swagger).
    pub security_schemes: Option<&'a Map<String, Value>>,
}

/// Signature shared by every format-specific parser.
pub type ParseFn = for<'a> fn(&'a Value) -> Vec<RawEndpoint<'a>>;

/// Dispatch table from detected format to parser.
pub const PARSERS: [(ApiFormat, ParseFn); 3] = [
    (ApiFormat::Postman, parse_postman as ParseFn),
    (ApiFormat::OpenApi, parse_openapi as ParseFn),
    (ApiFormat::Swagger, parse_swagger as ParseFn),
];

/// Look up the parser for a format. `Unsupported` has none.
pub fn parser_for(format: ApiFormat) -> Option<ParseFn> {
    PARSERS
        .iter()
        .find(|(f, _)| *f == format)
        .map(|(_, parse)| *parse)
}

/// Parse a document already classified as `format`.
///
/// Returns an empty list for `Unsupported` or for documents that contain
/// no requests/operations.
pub fn parse_collection(format: ApiFormat, doc: &Value) -> Vec<RawEndpoint<'_>> {
    match parser_for(format) {
        Some(parse) => parse(doc),
        None => Vec::new(),
    }
}

// ============ Postman ============

pub fn parse_postman(doc: &Value) -> Vec<RawEndpoint<'_>> {
    let mut out = Vec::new();
    if let Some(items) = doc.get("item").and_then(Value::as_array) {
        let mut path = Vec::new();
        walk_postman_items(items, &mut path, &mut out);
    }
    out
}

fn walk_postman_items<'a>(
    items: &'a [Value],
    path: &mut Vec<String>,
    out: &mut Vec<RawEndpoint<'a>>,
) {
    for item in items {
        let name = item.get("name").and_then(Value::as_str);

        if let Some(children) = item.get("item").and_then(Value::as_array) {
            // Unnamed folders group items without adding a path segment.
            let pushed = match name.map(str::trim) {
                Some(n) if !n.is_empty() => {
                    path.push(n.to_string());
                    true
                }
                _ => false,
            };
            walk_postman_items(children, path, out);
            if pushed {
                path.pop();
            }
        } else if let Some(request) = item.get("request") {
            let responses = item
                .get("response")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            out.push(RawEndpoint {
                folder_path: path.clone(),
                source: RawSource::Postman(PostmanRequest {
                    name,
                    request,
                    responses,
                }),
            });
        }
    }
}

// ============ OpenAPI / Swagger ============

pub fn parse_openapi(doc: &Value) -> Vec<RawEndpoint<'_>> {
    let schemes = doc
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(Value::as_object);
    parse_paths(doc, ApiFormat::OpenApi, schemes)
}

pub fn parse_swagger(doc: &Value) -> Vec<RawEndpoint<'_>> {
    let schemes = doc.get("securityDefinitions").and_then(Value::as_object);
    parse_paths(doc, ApiFormat::Swagger, schemes)
}

fn parse_paths<'a>(
    doc: &'a Value,
    dialect: ApiFormat,
    security_schemes: Option<&'a Map<String, Value>>,
) -> Vec<RawEndpoint<'a>> {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (path, path_item) in paths {
        let Some(path_item) = path_item.as_object() else {
            continue;
        };
        let path_parameters = path_item
            .get("parameters")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for (key, operation) in path_item {
            if key.parse::<HttpMethod>().is_err() || !operation.is_object() {
                continue;
            }
            let folder_path = operation
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            out.push(RawEndpoint {
                folder_path,
                source: RawSource::Operation(OperationRecord {
                    dialect,
                    path,
                    method: key,
                    operation,
                    path_parameters,
                    security_schemes,
                }),
            });
        }
    }
    out
}
