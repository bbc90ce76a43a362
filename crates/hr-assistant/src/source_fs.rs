//! Policy folder document source.
//!
//! Walks `documents.folder` with `walkdir`, filters relative paths through
//! include/exclude globs, and extracts each file on a blocking thread.
//! Document names are folder-relative paths with `/` separators.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use hr_retrieval_core::ingest::DocumentSource;
use hr_retrieval_core::models::ExtractedDocument;

use crate::config::DocumentsConfig;
use crate::extract::extract_document;

pub struct FolderSource {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FolderSource {
    pub fn new(config: &DocumentsConfig) -> Result<Self> {
        let mut excludes = vec!["**/.git/**".to_string(), "**/~$*".to_string()];
        excludes.extend(config.exclude_globs.iter().cloned());
        Ok(Self {
            root: config.folder.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            bail!("documents folder does not exist: {}", self.root.display());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let rel_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }
            names.push(rel_str);
        }

        names.sort();
        Ok(names)
    }

    /// Resolve a document name inside the folder, rejecting escapes.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if name.is_empty() || escapes {
            bail!("invalid document name: {}", name);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentSource for FolderSource {
    async fn list_documents(&self) -> Result<Vec<String>> {
        self.scan()
    }

    async fn extract(&self, name: &str) -> Result<ExtractedDocument> {
        let path = self.resolve(name)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = name.to_string();
        tokio::task::spawn_blocking(move || extract_document(&name, &bytes)).await?
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config(root: &Path, exclude: &[&str]) -> DocumentsConfig {
        DocumentsConfig {
            folder: root.to_path_buf(),
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
            follow_symlinks: false,
        }
    }

    #[tokio::test]
    async fn test_lists_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("leave")).unwrap();
        fs::create_dir_all(dir.path().join("drafts")).unwrap();
        fs::write(dir.path().join("wfh.md"), "work from home").unwrap();
        fs::write(dir.path().join("leave/casual.txt"), "casual leave").unwrap();
        fs::write(dir.path().join("drafts/old.md"), "old").unwrap();
        fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();

        let source = FolderSource::new(&config(dir.path(), &["drafts/**"])).unwrap();
        let names = source.list_documents().await.unwrap();
        assert_eq!(names, vec!["leave/casual.txt".to_string(), "wfh.md".to_string()]);

        let doc = source.extract("leave/casual.txt").await.unwrap();
        assert_eq!(doc.name, "leave/casual.txt");
        assert_eq!(doc.pages[0].text, "casual leave");
    }

    #[tokio::test]
    async fn test_missing_folder_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FolderSource::new(&config(&dir.path().join("nope"), &[])).unwrap();
        assert!(source.list_documents().await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let source = FolderSource::new(&config(dir.path(), &[])).unwrap();
        assert!(source.extract("../secret.txt").await.is_err());
        assert!(source.extract("/etc/passwd").await.is_err());
    }

    #[test]
    fn test_invalid_glob_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &[]);
        cfg.include_globs = vec!["[".to_string()];
        assert!(FolderSource::new(&cfg).is_err());
    }
}
