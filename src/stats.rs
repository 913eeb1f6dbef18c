//! Index statistics for `recall stats`.
//!
//! A quick summary of what's indexed: note and chunk counts, embedding
//! coverage, the model the vectors came from and the database size.

use std::path::Path;

use crate::models::StoreStats;

/// Render the stats report as printed by the CLI.
pub fn render_stats(stats: &StoreStats, db_path: &Path) -> String {
    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    let mut out = String::new();
    out.push_str("Recall Index Stats\n");
    out.push_str("==================\n\n");
    out.push_str(&format!("  Database:    {}\n", db_path.display()));
    out.push_str(&format!("  Size:        {}\n\n", format_bytes(db_size)));
    out.push_str(&format!("  Notes:       {}\n", stats.files));
    out.push_str(&format!("  Chunks:      {}\n", stats.chunks));
    out.push_str(&format!(
        "  Embedded:    {} / {} ({}%)\n",
        stats.embeddings,
        stats.chunks,
        if stats.chunks > 0 {
            (stats.embeddings * 100) / stats.chunks
        } else {
            0
        }
    ));
    match &stats.model {
        Some(m) => out.push_str(&format!("  Model:       {} ({} dims)\n", m.model, m.dims)),
        None => out.push_str("  Model:       (none recorded)\n"),
    }
    out
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
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
