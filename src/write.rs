//! Appending to the daily log and the long-term memory file.
//!
//! - **daily**: `{daily_dir}/YYYY-MM-DD.md`, created with a `# YYYY-MM-DD`
//!   heading on first write of the day, new entries appended after a blank line.
//! - **longterm**: `{longterm_file}`; a new entry goes in front of the last
//!   `---` separator line so a trailing footer stays at the bottom. Without a
//!   separator the entry is appended.
//!
//! These functions only touch the file; the engine re-indexes it afterwards.

use chrono::NaiveDate;
use std::str::FromStr;

use crate::config::NotesConfig;
use crate::error::{Error, Result};
use crate::notes::NoteSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteTarget {
    #[default]
    Daily,
    Longterm,
}

impl FromStr for WriteTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "daily" => Ok(WriteTarget::Daily),
            "longterm" => Ok(WriteTarget::Longterm),
            other => Err(format!(
                "unknown write target '{}', expected daily or longterm",
                other
            )),
        }
    }
}

/// Write `content` to the target file and return its note identifier.
pub async fn write_note(
    config: &NotesConfig,
    notes: &NoteSet,
    target: WriteTarget,
    content: &str,
    today: NaiveDate,
) -> Result<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::InvalidInput("note content is empty".to_string()));
    }

    let relative = match target {
        WriteTarget::Daily => config
            .daily_dir
            .join(format!("{}.md", today.format("%Y-%m-%d"))),
        WriteTarget::Longterm => config.longterm_file.clone(),
    };
    let file_path = notes.relative_path(&relative)?;
    let absolute = notes.absolute(&file_path);

    let existing = match tokio::fs::read_to_string(&absolute).await {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let updated = match target {
        WriteTarget::Daily => append_daily(existing.as_deref(), content, today),
        WriteTarget::Longterm => insert_longterm(existing.as_deref().unwrap_or(""), content),
    };

    if let Some(parent) = absolute.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&absolute, updated).await?;

    tracing::info!(file_path = %file_path, target = ?target, "wrote note");
    Ok(file_path)
}

fn append_daily(existing: Option<&str>, content: &str, today: NaiveDate) -> String {
    match existing {
        Some(text) if !text.trim().is_empty() => {
            format!("{}\n\n{}\n", text.trim_end(), content)
        }
        _ => format!("# {}\n\n{}\n", today.format("%Y-%m-%d"), content),
    }
}

fn insert_longterm(existing: &str, content: &str) -> String {
    let lines: Vec<&str> = existing.lines().collect();
    let separator = lines.iter().rposition(|l| l.trim() == "---");

    match separator {
        Some(idx) => {
            let head = lines[..idx].join("\n");
            let tail = lines[idx..].join("\n");
            let head = head.trim_end();
            if head.is_empty() {
                format!("{}\n\n{}\n", content, tail)
            } else {
                format!("{}\n\n{}\n\n{}\n", head, content, tail)
            }
        }
        None if existing.trim().is_empty() => format!("{}\n", content),
        None => format!("{}\n\n{}\n", existing.trim_end(), content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn test_daily_new_file_gets_heading() {
        assert_eq!(
            append_daily(None, "first entry", day()),
            "# 2026-03-14\n\nfirst entry\n"
        );
    }

    #[test]
    fn test_daily_appends_after_blank_line() {
        let existing = "# 2026-03-14\n\nfirst entry\n\n\n";
        assert_eq!(
            append_daily(Some(existing), "second", day()),
            "# 2026-03-14\n\nfirst entry\n\nsecond\n"
        );
    }

    #[test]
    fn test_longterm_inserts_before_last_separator() {
        let existing = "# Memory\n\n- fact one\n\n---\nmiddle\n---\n_footer_\n";
        assert_eq!(
            insert_longterm(existing, "- fact two"),
            "# Memory\n\n- fact one\n\n---\nmiddle\n\n- fact two\n\n---\n_footer_\n"
        );
    }

    #[test]
    fn test_longterm_without_separator_appends() {
        assert_eq!(
            insert_longterm("# Memory\n- a\n", "- b"),
            "# Memory\n- a\n\n- b\n"
        );
        assert_eq!(insert_longterm("", "- b"), "- b\n");
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("longterm".parse::<WriteTarget>().unwrap(), WriteTarget::Longterm);
        assert!("weekly".parse::<WriteTarget>().is_err());
    }

    #[tokio::test]
    async fn test_write_note_creates_daily_file() {
        let tmp = TempDir::new().unwrap();
        let cfg: NotesConfig =
            toml::from_str(&format!("root = \"{}\"", tmp.path().display())).unwrap();
        let notes = NoteSet::new(&cfg).unwrap();

        let path = write_note(&cfg, &notes, WriteTarget::Daily, "  met with Sam  ", day())
            .await
            .unwrap();
        assert_eq!(path, "memory/2026-03-14.md");
        let written = std::fs::read_to_string(tmp.path().join(&path)).unwrap();
        assert_eq!(written, "# 2026-03-14\n\nmet with Sam\n");

        assert!(matches!(
            write_note(&cfg, &notes, WriteTarget::Longterm, "   ", day()).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
