//! Attachment content storage and upload policy.
//!
//! Content is written under a flat directory using generated names
//! (`<uuid><original extension>`); the database only keeps metadata.

use crate::error::ApiError;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions accepted by default, lowercase with leading dot.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    // Documents
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".odt", ".ods", ".odp", ".txt",
    ".rtf", ".csv",
    // Images
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".ico",
    // Archives
    ".zip", ".tar", ".gz", ".7z", ".rar",
    // Other
    ".json", ".xml", ".yaml", ".yml", ".md", ".html", ".css",
];

pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("stored file not found: {0}")]
    NotFound(String),
    #[error("invalid stored filename: {0}")]
    InvalidName(String),
    #[error("file store I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<FileStoreError> for ApiError {
    fn from(err: FileStoreError) -> Self {
        ApiError::internal(err)
    }
}

/// Lowercased extension of `name` with a leading dot, or empty.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Upload-supplied content type, or a guess from the file name.
pub fn resolve_mime_type(declared: Option<&str>, original_name: &str) -> String {
    match declared.map(str::trim) {
        Some(m) if !m.is_empty() && m != FALLBACK_MIME_TYPE => m.to_string(),
        _ => mime_guess::from_path(original_name)
            .first_raw()
            .unwrap_or(FALLBACK_MIME_TYPE)
            .to_string(),
    }
}

/// Size cap and extension allow-list for uploads.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_size_bytes: u64,
    /// Lowercase, dot-prefixed. Empty accepts every extension.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl UploadPolicy {
    pub fn new(max_size_bytes: u64, allowed_extensions: impl IntoIterator<Item = String>) -> Self {
        Self {
            max_size_bytes,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| normalize_extension(&e))
                .filter(|e| e.len() > 1)
                .collect(),
        }
    }

    /// Reject a declared or accumulated size above the cap.
    pub fn check_size(&self, size: u64) -> Result<(), ApiError> {
        if size > self.max_size_bytes {
            return Err(ApiError::payload_too_large(self.max_size_bytes));
        }
        Ok(())
    }

    /// Reject a file name whose extension is not on the allow-list.
    pub fn check_extension(&self, original_name: &str) -> Result<(), ApiError> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        let ext = extension_of(original_name);
        if ext.is_empty() || !self.allowed_extensions.contains(&ext) {
            let shown = if ext.is_empty() { "(none)" } else { ext.as_str() };
            return Err(ApiError::unsupported_file_type(shown));
        }
        Ok(())
    }
}

fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

/// Flat directory of attachment content.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Generated storage name keeping the original extension.
    pub fn generate_name(original_name: &str) -> String {
        format!("{}{}", Uuid::now_v7(), extension_of(original_name))
    }

    /// Resolve a stored name, refusing anything that could leave the root.
    fn path_for(&self, filename: &str) -> Result<PathBuf, FileStoreError> {
        let unsafe_name = filename.is_empty()
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains('\0');
        if unsafe_name {
            return Err(FileStoreError::InvalidName(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }

    pub async fn write(&self, filename: &str, content: &[u8]) -> Result<(), FileStoreError> {
        let path = self.path_for(filename)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, content).await?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "stored attachment content");
        Ok(())
    }

    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, FileStoreError> {
        let path = self.path_for(filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove stored content. A file that is already gone is not an error.
    pub async fn remove(&self, filename: &str) -> Result<(), FileStoreError> {
        let path = self.path_for(filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of several files; failures are logged.
    pub async fn remove_all<I, S>(&self, filenames: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in filenames {
            if let Err(e) = self.remove(name.as_ref()).await {
                tracing::warn!(filename = name.as_ref(), error = %e, "failed to remove attachment content");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn extension_is_lowercased_with_dot() {
        assert_eq!(extension_of("Report.PDF"), ".pdf");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn generated_name_keeps_extension() {
        let name = FileStore::generate_name("photo.JPG");
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), 36 + 4);
    }

    #[test]
    fn mime_type_guessed_when_missing() {
        assert_eq!(resolve_mime_type(None, "notes.txt"), "text/plain");
        assert_eq!(resolve_mime_type(Some("image/png"), "x.bin"), "image/png");
        assert_eq!(
            resolve_mime_type(Some("application/octet-stream"), "doc.pdf"),
            "application/pdf"
        );
        assert_eq!(resolve_mime_type(None, "mystery"), FALLBACK_MIME_TYPE);
    }

    #[test]
    fn policy_rejects_large_and_unlisted_files() {
        let policy = UploadPolicy::new(10, vec!["TXT".to_string(), ".md".to_string()]);
        assert!(policy.check_size(10).is_ok());
        assert_eq!(policy.check_size(11).unwrap_err().code, ErrorCode::PayloadTooLarge);

        assert!(policy.check_extension("notes.txt").is_ok());
        assert!(policy.check_extension("README.MD").is_ok());
        assert_eq!(
            policy.check_extension("run.exe").unwrap_err().code,
            ErrorCode::UnsupportedFileType
        );
        assert!(policy.check_extension("noext").is_err());
    }

    #[test]
    fn empty_allow_list_accepts_everything() {
        let policy = UploadPolicy::new(1024, Vec::new());
        assert!(policy.check_extension("run.exe").is_ok());
        assert!(policy.check_extension("noext").is_ok());
    }

    #[tokio::test]
    async fn write_read_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("attachments"));

        store.write("a.txt", b"hello").await.unwrap();
        assert_eq!(store.read("a.txt").await.unwrap(), b"hello");

        store.remove("a.txt").await.unwrap();
        assert!(matches!(
            store.read("a.txt").await,
            Err(FileStoreError::NotFound(_))
        ));
        store.remove("a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn traversal_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for bad in ["../escape.txt", "a/b.txt", "..", ""] {
            assert!(matches!(
                store.write(bad, b"x").await,
                Err(FileStoreError::InvalidName(_))
            ));
        }
    }
}
