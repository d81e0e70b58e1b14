//! API description format detection.
//!
//! Classification looks only at three top-level markers, in order:
//! the Postman `info.schema` URL, the OpenAPI `openapi` version field,
//! and the Swagger `swagger` version field. Anything else is
//! [`ApiFormat::Unsupported`].

use std::fmt;

use serde_json::Value;

/// Schema URL prefix carried in `info.schema` by Postman collections.
pub const POSTMAN_SCHEMA_PREFIX: &str = "https://schema.getpostman.com";

/// The API description formats the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiFormat {
    Postman,
    OpenApi,
    Swagger,
    Unsupported,
}

impl ApiFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFormat::Postman => "postman",
            ApiFormat::OpenApi => "openapi",
            ApiFormat::Swagger => "swagger",
            ApiFormat::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ApiFormat::Unsupported)
    }
}

impl fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a decoded document.
///
/// Total over every JSON value: non-objects are `Unsupported`. A marker
/// field counts only when it is set: not `null`, `false`, `0`, or an empty
/// string, array, or object.
pub fn detect_format(doc: &Value) -> ApiFormat {
    let Some(obj) = doc.as_object() else {
        return ApiFormat::Unsupported;
    };

    let is_postman = obj
        .get("info")
        .and_then(|info| info.get("schema"))
        .and_then(Value::as_str)
        .is_some_and(|schema| schema.starts_with(POSTMAN_SCHEMA_PREFIX));

    if is_postman {
        ApiFormat::Postman
    } else if obj.get("openapi").is_some_and(is_set) {
        ApiFormat::OpenApi
    } else if obj.get("swagger").is_some_and(is_set) {
        ApiFormat::Swagger
    } else {
        ApiFormat::Unsupported
    }
}

fn is_set(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_postman() {
        let doc = json!({
            "info": {
                "name": "Demo",
                "schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"
            },
            "item": []
        });
        assert_eq!(detect_format(&doc), ApiFormat::Postman);
    }

    #[test]
    fn test_detect_openapi_and_swagger() {
        assert_eq!(
            detect_format(&json!({"openapi": "3.0.3", "paths": {}})),
            ApiFormat::OpenApi
        );
        assert_eq!(
            detect_format(&json!({"swagger": "2.0", "paths": {}})),
            ApiFormat::Swagger
        );
    }

    #[test]
    fn test_postman_wins_over_openapi_marker() {
        let doc = json!({
            "info": {"schema": "https://schema.getpostman.com/json/collection/v2.0.0/"},
            "openapi": "3.1.0"
        });
        assert_eq!(detect_format(&doc), ApiFormat::Postman);
    }

    #[test]
    fn test_openapi_checked_before_swagger() {
        let doc = json!({"openapi": "3.0.0", "swagger": "2.0"});
        assert_eq!(detect_format(&doc), ApiFormat::OpenApi);
    }

    #[test]
    fn test_detect_unsupported() {
        assert_eq!(detect_format(&json!({"foo": "bar"})), ApiFormat::Unsupported);
        assert_eq!(
            detect_format(&json!({"info": {"schema": "https://example.com/schema"}})),
            ApiFormat::Unsupported
        );
        assert_eq!(detect_format(&json!({"openapi": null})), ApiFormat::Unsupported);
        assert_eq!(detect_format(&json!({"openapi": ""})), ApiFormat::Unsupported);
        assert_eq!(detect_format(&json!({"swagger": false})), ApiFormat::Unsupported);
        assert_eq!(detect_format(&json!({"swagger": 0})), ApiFormat::Unsupported);
        assert_eq!(
            detect_format(&json!({"openapi": "", "swagger": "2.0"})),
            ApiFormat::Swagger
        );
        assert_eq!(detect_format(&json!({"openapi": 3})), ApiFormat::OpenApi);
        assert_eq!(detect_format(&json!([1, 2, 3])), ApiFormat::Unsupported);
        assert_eq!(detect_format(&json!("openapi")), ApiFormat::Unsupported);
        assert_eq!(detect_format(&Value::Null), ApiFormat::Unsupported);
    }
}
