//! The set of note files under the notes root.
//!
//! Resolves user-supplied paths to the stable `/`-separated identifiers the
//! store uses, refuses paths that escape the root, and walks the root with
//! the configured include/exclude globs.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::NotesConfig;
use crate::error::{Error, Result};

pub struct NoteSet {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl NoteSet {
    pub fn new(config: &NotesConfig) -> anyhow::Result<Self> {
        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());

        Ok(Self {
            root: normalize(&std::path::absolute(&config.root)?),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&default_excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a path (absolute, or relative to the notes root) to its identifier.
    ///
    /// `..` components are resolved lexically; anything that ends up outside
    /// the root is rejected with [`Error::InvalidPath`].
    pub fn relative_path(&self, path: &Path) -> Result<String> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let normalized = normalize(&joined);
        let relative = normalized
            .strip_prefix(&self.root)
            .map_err(|_| Error::InvalidPath(path.display().to_string()))?;
        if relative.as_os_str().is_empty() {
            return Err(Error::InvalidPath(path.display().to_string()));
        }
        Ok(to_identifier(relative))
    }

    /// Absolute location of an identifier returned by [`relative_path`](Self::relative_path).
    pub fn absolute(&self, file_path: &str) -> PathBuf {
        self.root.join(file_path)
    }

    /// Whether the include/exclude globs select this identifier.
    pub fn is_note(&self, file_path: &str) -> bool {
        !self.exclude.is_match(file_path) && self.include.is_match(file_path)
    }

    /// Every note under the root, sorted. A missing root yields nothing.
    pub fn walk(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let rel_str = to_identifier(relative);
            if self.is_note(&rel_str) {
                files.push(rel_str);
            }
        }

        files.sort();
        Ok(files)
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn to_identifier(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn notes_config(root: &Path) -> NotesConfig {
        toml::from_str(&format!("root = \"{}\"", root.display())).unwrap()
    }

    #[test]
    fn test_relative_path_resolution() {
        let tmp = TempDir::new().unwrap();
        let notes = NoteSet::new(&notes_config(tmp.path())).unwrap();

        assert_eq!(
            notes.relative_path(Path::new("memory/2026-01-02.md")).unwrap(),
            "memory/2026-01-02.md"
        );
        assert_eq!(
            notes
                .relative_path(&tmp.path().join("a/./b/../c.md"))
                .unwrap(),
            "a/c.md"
        );
    }

    #[test]
    fn test_escaping_paths_rejected() {
        let tmp = TempDir::new().unwrap();
        let notes = NoteSet::new(&notes_config(&tmp.path().join("notes"))).unwrap();

        for bad in ["../secret.md", "a/../../b.md", "/etc/passwd", ""] {
            assert!(
                matches!(notes.relative_path(Path::new(bad)), Err(Error::InvalidPath(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_walk_applies_globs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("memory")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("MEMORY.md"), "# long term").unwrap();
        std::fs::write(root.join("memory/2026-01-01.md"), "day").unwrap();
        std::fs::write(root.join("notes.txt"), "not markdown").unwrap();
        std::fs::write(root.join("node_modules/pkg/README.md"), "vendored").unwrap();

        let notes = NoteSet::new(&notes_config(root)).unwrap();
        assert_eq!(
            notes.walk().unwrap(),
            vec!["MEMORY.md".to_string(), "memory/2026-01-01.md".to_string()]
        );
    }

    #[test]
    fn test_missing_root_walks_empty() {
        let tmp = TempDir::new().unwrap();
        let notes = NoteSet::new(&notes_config(&tmp.path().join("nope"))).unwrap();
        assert!(notes.walk().unwrap().is_empty());
    }
}
