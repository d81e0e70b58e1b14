//! `apidx search` and `apidx list`.

use anyhow::{Context, Result};

use api_index_core::filter::MetadataFilter;
use api_index_core::models::{Metadata, SearchHit};

use crate::runtime::ApiIndex;

/// Combine `--where k=v` assignments and a `--filter` JSON expression into
/// one conjunctive filter.
pub fn build_filter(wheres: &[String], filter_json: Option<&str>) -> Result<Option<MetadataFilter>> {
    let mut clauses = Vec::new();

    if let Some(f) = MetadataFilter::from_assignments(wheres)? {
        clauses.push(f);
    }

    if let Some(raw) = filter_json {
        let value: serde_json::Value =
            serde_json::from_str(raw).with_context(|| format!("--filter is not valid JSON: {}", raw))?;
        clauses.push(MetadataFilter::from_json(&value)?);
    }

    Ok(match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(MetadataFilter::And(clauses)),
    })
}

fn field(metadata: &Metadata, key: &str) -> String {
    metadata.get(key).map(|v| v.to_string()).unwrap_or_default()
}

/// Run a search and print ranked hits. A missing project or a failing
/// embedder is an error.
pub async fn run_search(
    client: &ApiIndex,
    project_id: &str,
    query: &str,
    limit: Option<usize>,
    filter: Option<&MetadataFilter>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(client.config().search.default_limit);
    let hits = client
        .manager()
        .search_endpoints(project_id, query, limit, filter)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    print_hits(&hits);
    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        let m = &hit.metadata;
        println!(
            "{}. [{:.4}] {} {}",
            i + 1,
            hit.distance,
            field(m, "method"),
            field(m, "url")
        );
        println!("    name: {}", field(m, "name"));
        let folder = field(m, "folder_path");
        if !folder.is_empty() {
            println!("    folder: {}", folder);
        }
        println!(
            "    auth: {}  body: {}  examples: {}",
            field(m, "has_auth"),
            field(m, "has_body"),
            field(m, "has_examples")
        );
        println!("    file: {}", field(m, "file_id"));
        println!("    id: {}", hit.id);
        println!();
    }
}

/// List stored endpoints of a project, optionally for one file.
pub async fn run_list(client: &ApiIndex, project_id: &str, file_id: Option<&str>) -> Result<()> {
    let records = client
        .manager()
        .list_endpoints(project_id, file_id)
        .await?;

    if records.is_empty() {
        println!("No endpoints.");
        return Ok(());
    }

    println!(
        "{:<8} {:<40} {:<32} {}",
        "METHOD", "URL", "NAME", "FOLDER"
    );
    println!("{}", "-".repeat(96));
    for r in &records {
        println!(
            "{:<8} {:<40} {:<32} {}",
            field(&r.metadata, "method"),
            field(&r.metadata, "url"),
            field(&r.metadata, "name"),
            field(&r.metadata, "folder_path")
        );
    }
    println!();
    println!("{} endpoint(s)", records.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_index_core::models::MetadataValue;

    #[test]
    fn test_build_filter_combines_sources() {
        assert!(build_filter(&[], None).unwrap().is_none());

        let f = build_filter(&["has_auth=true".to_string()], None)
            .unwrap()
            .unwrap();
        assert_eq!(f, MetadataFilter::Eq("has_auth".into(), MetadataValue::Bool(true)));

        let f = build_filter(
            &["has_auth=true".to_string()],
            Some(r#"{"method": {"$in": ["GET", "POST"]}}"#),
        )
        .unwrap()
        .unwrap();
        assert!(matches!(f, MetadataFilter::And(ref c) if c.len() == 2));
    }

    #[test]
    fn test_build_filter_rejects_bad_input() {
        assert!(build_filter(&["novalue".to_string()], None).is_err());
        assert!(build_filter(&[], Some("{not json")).is_err());
        assert!(build_filter(&[], Some(r#"{"a": {"$gt": 1}}"#)).is_err());
    }
}
