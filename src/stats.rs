//! Index statistics.
//!
//! A quick summary of what is indexed: the index file, the embedding
//! provider, and every project collection with its metric, dimensionality,
//! and endpoint count. Used by `apidx stats`.

use anyhow::Result;

use crate::runtime::ApiIndex;

/// Run the stats command and print a summary.
pub async fn run_stats(client: &ApiIndex) -> Result<()> {
    let config = client.config();
    let collections = client.manager().collections().await?;
    let embedder = client.manager().embedder();

    let db_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let total: usize = collections.iter().map(|c| c.count).sum();

    println!("API Index Stats");
    println!("===============");
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Embedder:    {} ({} dims)",
        embedder.model_name(),
        embedder.dims()
    );
    println!();
    println!("  Projects:    {}", collections.len());
    println!("  Endpoints:   {}", total);

    if !collections.is_empty() {
        println!();
        println!("  By project:");
        println!(
            "  {:<36} {:>8} {:>6} {:>10}",
            "PROJECT", "METRIC", "DIMS", "ENDPOINTS"
        );
        println!("  {}", "-".repeat(63));

        for c in &collections {
            let dims = c
                .dims
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<36} {:>8} {:>6} {:>10}",
                c.name,
                c.metric.as_str(),
                dims,
                c.count
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
