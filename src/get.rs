//! Direct line-range reads from note files.
//!
//! Used to expand a search hit into its surrounding context without going
//! through the index, so the content is whatever is on disk right now.

use std::path::Path;

use crate::error::Result;
use crate::models::LineRange;
use crate::notes::NoteSet;

pub const DEFAULT_LINES: usize = 50;

/// Read `lines` lines of `path` starting at the 1-based line `from`.
///
/// `from` values below 1 are treated as 1 and the range is clamped to the end
/// of the file. A range starting past the end yields empty content with
/// `to = from - 1`.
pub async fn get_range(notes: &NoteSet, path: &str, from: usize, lines: usize) -> Result<LineRange> {
    let file_path = notes.relative_path(Path::new(path))?;
    let text = tokio::fs::read_to_string(notes.absolute(&file_path)).await?;
    Ok(slice_lines(file_path, &text, from, lines))
}

fn slice_lines(path: String, text: &str, from: usize, lines: usize) -> LineRange {
    let all: Vec<&str> = text.lines().collect();
    let from = from.max(1);
    let start = (from - 1).min(all.len());
    let end = start.saturating_add(lines).min(all.len());

    LineRange {
        path,
        from,
        to: end.max(from - 1),
        content: all[start..end].join("\n"),
    }
}
