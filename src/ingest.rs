//! Uploaded-file commands: `detect`, `index`, and `delete`.
//!
//! Documents are decoded as JSON or YAML into a `serde_json::Value`, then
//! handed to the core pipeline. `.json` files are parsed as JSON and
//! `.yaml`/`.yml` as YAML; any other extension tries JSON first, then YAML.

use anyhow::Result;
use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

use api_index_core::manager::extract_endpoints;
use api_index_core::{DeleteOutcome, IndexOutcome, SkipReason};

use crate::runtime::ApiIndex;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Read and decode an uploaded collection file.
pub fn load_document(path: &Path) -> Result<Value, DocumentError> {
    let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("json") => parse_json(path, &content),
        Some("yaml") | Some("yml") => parse_yaml(path, &content),
        _ => parse_json(path, &content).or_else(|_| parse_yaml(path, &content)),
    }
}

fn parse_json(path: &Path, content: &str) -> Result<Value, DocumentError> {
    serde_json::from_str(content).map_err(|source| DocumentError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_yaml(path: &Path, content: &str) -> Result<Value, DocumentError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|source| DocumentError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(yaml_to_json(yaml))
}

/// Convert YAML into JSON. Non-string mapping keys (e.g. `200:` response
/// codes) become their string form.
pub fn yaml_to_json(yaml: serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (k, v) in mapping {
                map.insert(yaml_key(k), yaml_to_json(v));
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => yaml_to_json(other).to_string(),
    }
}

/// `apidx detect <file>`: print the format and endpoint count.
pub fn run_detect(path: &Path) -> Result<()> {
    let doc = load_document(path)?;
    let (format, endpoints) = extract_endpoints(&doc);
    println!("detect {}", path.display());
    println!("  format: {}", format);
    println!("  endpoints: {}", endpoints.len());
    Ok(())
}

/// `apidx index <project> <file_id> <file>`.
///
/// Only a file that cannot be read or decoded is an error; indexing
/// problems are reported through the printed outcome.
pub async fn run_index(client: &ApiIndex, project_id: &str, file_id: &str, path: &Path) -> Result<()> {
    let doc = load_document(path)?;
    let outcome = client
        .manager()
        .store_embeddings(project_id, file_id, &doc)
        .await;

    println!("index {} {}", project_id, file_id);
    match outcome {
        IndexOutcome::Indexed {
            format,
            endpoints,
            batches,
        } => {
            println!("  format: {}", format);
            println!("  endpoints indexed: {}", endpoints);
            println!("  batches: {}", batches);
            println!("ok");
        }
        IndexOutcome::Skipped(SkipReason::UnsupportedFormat) => {
            println!("  skipped: unsupported format");
        }
        IndexOutcome::Skipped(SkipReason::NoEndpoints) => {
            println!("  skipped: no endpoints found");
        }
        IndexOutcome::Partial {
            endpoints_committed,
            batches_committed,
            total_batches,
            error,
        } => {
            println!("  endpoints indexed: {}", endpoints_committed);
            println!("  batches: {} / {}", batches_committed, total_batches);
            println!("  error: {}", error);
            println!("partial");
        }
        IndexOutcome::Failed { error } => {
            println!("  error: {}", error);
            println!("failed");
        }
    }
    Ok(())
}

/// `apidx delete <project> <file_id>`.
pub async fn run_delete(client: &ApiIndex, project_id: &str, file_id: &str) -> Result<()> {
    let outcome = client
        .manager()
        .delete_embeddings(project_id, file_id)
        .await;

    println!("delete {} {}", project_id, file_id);
    match outcome {
        DeleteOutcome::Deleted(n) => {
            println!("  removed: {}", n);
            println!("ok");
        }
        DeleteOutcome::Failed { error } => {
            println!("  error: {}", error);
            println!("failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_index_core::ApiFormat;
    use std::fs;
    use tempfile::TempDir;

    const PETSTORE_YAML: &str = r#"
openapi: 3.0.0
info:
  title: Petstore
  version: "1.0"
paths:
  /pets:
    get:
      summary: List pets
      responses:
        200:
          description: ok
          content:
            application/json:
              example: [{"id": 1}]
"#;

    #[test]
    fn test_yaml_integer_keys_become_strings() {
        let yaml: serde_yaml::Value = serde_yaml::from_str(PETSTORE_YAML).unwrap();
        let json = yaml_to_json(yaml);
        assert!(json["paths"]["/pets"]["get"]["responses"]["200"].is_object());
        assert_eq!(json["info"]["version"], "1.0");
    }

    #[test]
    fn test_load_document_by_extension() {
        let tmp = TempDir::new().unwrap();
        let yaml_path = tmp.path().join("petstore.yaml");
        fs::write(&yaml_path, PETSTORE_YAML).unwrap();
        let doc = load_document(&yaml_path).unwrap();
        let (format, endpoints) = extract_endpoints(&doc);
        assert_eq!(format, ApiFormat::OpenApi);
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints[0].has_examples());

        let json_path = tmp.path().join("bad.json");
        fs::write(&json_path, "openapi: 3.0.0").unwrap();
        assert!(matches!(
            load_document(&json_path),
            Err(DocumentError::Json { .. })
        ));
    }

    #[test]
    fn test_load_document_without_extension_falls_back_to_yaml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("upload");
        fs::write(&path, PETSTORE_YAML).unwrap();
        assert_eq!(load_document(&path).unwrap()["openapi"], "3.0.0");

        let missing = tmp.path().join("missing.json");
        assert!(matches!(
            load_document(&missing),
            Err(DocumentError::Read { .. })
        ));
    }
}
