//! Hybrid byte store (§4.2): small files inline in the database, large ones on disk under a
//! random filename keyed only by hash, never by the caller's path.

use crate::error::{CoreError, Result};
use sha2::{Digest, Sha256};

/// Inline/on-disk threshold.
pub const INLINE_THRESHOLD: usize = 1024 * 1024;

pub struct PutResult {
    pub inline_text: Option<String>,
    pub location: Option<String>,
    pub hash: String,
    pub size: i64,
}

#[derive(Clone)]
pub struct FileStore {
    blob_dir: std::path::PathBuf,
}

impl FileStore {
    pub fn new(blob_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            blob_dir: blob_dir.into(),
        }
    }

    pub async fn put(&self, bytes: Vec<u8>) -> Result<PutResult> {
        let hash = hex::encode(Sha256::digest(&bytes));
        let size = bytes.len() as i64;

        if bytes.len() < INLINE_THRESHOLD {
            let text = String::from_utf8(bytes)
                .map_err(|e| CoreError::validation(format!("file is not valid UTF-8: {e}")))?;
            return Ok(PutResult {
                inline_text: Some(text),
                location: None,
                hash,
                size,
            });
        }

        tokio::fs::create_dir_all(&self.blob_dir).await?;
        let name = random_hex_name();
        let path = self.blob_dir.join(&name);
        tokio::fs::write(&path, &bytes).await?;

        Ok(PutResult {
            inline_text: None,
            location: Some(path.to_string_lossy().into_owned()),
            hash,
            size,
        })
    }

    pub async fn get(&self, inline_text: Option<&str>, location: Option<&str>) -> Result<Vec<u8>> {
        if let Some(text) = inline_text {
            return Ok(text.as_bytes().to_vec());
        }
        if let Some(loc) = location {
            return Ok(tokio::fs::read(loc).await?);
        }
        Err(CoreError::Internal(
            "file record has neither inline content nor a location".to_string(),
        ))
    }

    /// Best-effort delete; a missing file is not an error.
    pub async fn delete(&self, location: &str) -> Result<()> {
        match tokio::fs::remove_file(location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reject absolute paths and any `..` segment, before or after normalisation, and return the
    /// normalised relative path. Every externally supplied path must pass through this.
    pub fn validate_path(p: &str) -> Result<String> {
        if p.is_empty() {
            return Err(CoreError::validation("path must not be empty"));
        }
        if p.starts_with('/') {
            return Err(CoreError::validation("path must not be absolute"));
        }
        if p.split('/').any(|seg| seg == "..") {
            return Err(CoreError::validation("path must not contain '..' segments"));
        }

        let normalised: Vec<&str> = p.split('/').filter(|seg| !seg.is_empty() && *seg != ".").collect();
        if normalised.iter().any(|seg| *seg == "..") {
            return Err(CoreError::validation("path must not contain '..' segments"));
        }
        if normalised.is_empty() {
            return Err(CoreError::validation("path must not be empty"));
        }

        Ok(normalised.join("/"))
    }

    pub fn detect_mime(path: &str) -> String {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

fn random_hex_name() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_path_rejects_absolute_and_traversal() {
        assert!(FileStore::validate_path("/etc/passwd").is_err());
        assert!(FileStore::validate_path("a/../../b").is_err());
        assert!(FileStore::validate_path("..").is_err());
        assert!(FileStore::validate_path("").is_err());
        assert_eq!(FileStore::validate_path("./a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(FileStore::validate_path("a/b.txt").unwrap(), "a/b.txt");
    }

    #[test]
    fn detect_mime_known_and_default() {
        assert_eq!(FileStore::detect_mime("notes.md"), "text/markdown");
        assert_eq!(FileStore::detect_mime("data.bin"), "application/octet-stream");
    }

    #[tokio::test]
    async fn put_inlines_small_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let result = store.put(b"hello world".to_vec()).await.unwrap();
        assert_eq!(result.inline_text.as_deref(), Some("hello world"));
        assert!(result.location.is_none());
        assert_eq!(result.size, 11);
    }

    #[tokio::test]
    async fn put_spills_large_files_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let bytes = vec![b'x'; INLINE_THRESHOLD + 1];
        let result = store.put(bytes.clone()).await.unwrap();
        assert!(result.inline_text.is_none());
        let location = result.location.unwrap();
        let roundtrip = store.get(None, Some(&location)).await.unwrap();
        assert_eq!(roundtrip, bytes);
    }
}
