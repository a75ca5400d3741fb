//! Source document loading: produces `(content, file type)` pairs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::DocumentLoadError;
use crate::types::FileType;

/// Loads `.txt`, `.md` and `.pdf` files from disk.
#[derive(Debug, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a single file, dispatching on its extension.
    pub fn load_file(&self, path: &Path) -> Result<(String, FileType), DocumentLoadError> {
        if !path.exists() {
            return Err(DocumentLoadError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let file_type = FileType::from_extension(&extension).ok_or_else(|| {
            DocumentLoadError::UnsupportedExtension {
                path: path.to_path_buf(),
                extension: extension.clone(),
            }
        })?;

        let content = match file_type {
            FileType::Text | FileType::Markdown => read_text(path)?,
            FileType::Pdf => read_pdf(path)?,
        };

        info!(path = %path.display(), chars = content.chars().count(), "document loaded");
        Ok((content, file_type))
    }

    /// Load every supported file directly under `directory`.
    ///
    /// Files that fail to load are skipped with a warning rather than
    /// aborting the whole batch.
    pub fn load_directory(
        &self,
        directory: &Path,
    ) -> Result<Vec<(PathBuf, String, FileType)>, DocumentLoadError> {
        if !directory.is_dir() {
            return Err(DocumentLoadError::DirectoryNotFound {
                path: directory.to_path_buf(),
            });
        }

        let mut files: Vec<PathBuf> = WalkDir::new(directory)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_lowercase)
                    .is_some_and(|ext| FileType::from_extension(&ext).is_some())
            })
            .collect();
        files.sort();

        let mut results = Vec::new();
        for path in files {
            match self.load_file(&path) {
                Ok((content, file_type)) => results.push((path, content, file_type)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping document"),
            }
        }

        info!(dir = %directory.display(), count = results.len(), "documents loaded");
        Ok(results)
    }
}

fn read_text(path: &Path) -> Result<String, DocumentLoadError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        // Fall back to lossy decoding for files with stray non-UTF-8 bytes.
        Err(_) => {
            let bytes = fs::read(path).map_err(|e| DocumentLoadError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
    }
}

fn read_pdf(path: &Path) -> Result<String, DocumentLoadError> {
    let text = pdf_extract::extract_text(path).map_err(|e| DocumentLoadError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if text.trim().is_empty() {
        return Err(DocumentLoadError::Unreadable {
            path: path.to_path_buf(),
            reason: "no extractable text".to_string(),
        });
    }
    Ok(text)
}
