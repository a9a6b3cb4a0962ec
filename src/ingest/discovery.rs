//! Recursive discovery of ingestible files.

use crate::processing::SourceFile;
use std::ffi::OsStr;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Every supported file under `root`, sorted by relative path.
///
/// Names starting with `~` (editor lock files) or `.` (hidden files and directories) are
/// skipped. A missing root yields an empty list.
pub fn discover_files(root: &Path) -> Vec<SourceFile> {
    if !root.is_dir() {
        tracing::warn!(root = %root.display(), "Content root is not a directory");
        return Vec::new();
    }

    let mut files: Vec<SourceFile> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(error = %error, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| SourceFile::under_root(root, entry.into_path()))
        .collect();

    files.sort_by(|left, right| left.relative_path().cmp(right.relative_path()));
    tracing::info!(root = %root.display(), files = files.len(), "Discovered source files");
    files
}

fn is_skipped(entry: &DirEntry) -> bool {
    is_temporary_or_hidden(entry.file_name())
}

fn is_temporary_or_hidden(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| name.starts_with('~') || name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_supported_files_recursively_in_order() {
        let root = tempfile::tempdir().expect("temp dir");
        let session = root.path().join("Session 1");
        fs::create_dir_all(&session).expect("dirs");
        fs::write(session.join("b.md"), "b").expect("write");
        fs::write(session.join("a.PDF"), "a").expect("write");
        fs::write(root.path().join("notes.docx"), "d").expect("write");
        fs::write(root.path().join("image.png"), "x").expect("write");

        let paths: Vec<String> = discover_files(root.path())
            .iter()
            .map(|file| file.relative_path().to_string())
            .collect();
        assert_eq!(paths, vec!["Session 1/a.PDF", "Session 1/b.md", "notes.docx"]);
    }

    #[test]
    fn temporary_and_hidden_names_are_skipped() {
        let root = tempfile::tempdir().expect("temp dir");
        fs::write(root.path().join("~$draft.docx"), "lock").expect("write");
        fs::write(root.path().join(".hidden.md"), "h").expect("write");
        let hidden_dir = root.path().join(".cache");
        fs::create_dir_all(&hidden_dir).expect("dirs");
        fs::write(hidden_dir.join("inside.md"), "i").expect("write");
        fs::write(root.path().join("kept.md"), "k").expect("write");

        let files = discover_files(root.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name(), "kept.md");
    }

    #[test]
    fn missing_or_empty_roots_yield_nothing() {
        let root = tempfile::tempdir().expect("temp dir");
        assert!(discover_files(root.path()).is_empty());
        assert!(discover_files(&root.path().join("absent")).is_empty());
    }
}
