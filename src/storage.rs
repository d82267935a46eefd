use nanoid::nanoid;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::WorkflowError;

/// Extensions accepted as proof-of-attendance artifacts.
pub const PROOF_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// 5 MiB upload ceiling for proofs.
pub const PROOF_MAX_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("the file exceeds the maximum allowed size")]
    TooLarge,
    #[error("the file type is not allowed")]
    DisallowedType,
}

/// Opaque reference to a stored artifact, relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRef(pub String);

/// Validates an upload and returns the canonical extension to store it under.
/// The declared extension must be allowed, and when the content is
/// recognizable its sniffed type must be allowed too, so a renamed executable
/// does not pass as a pdf.
fn validate_upload(
    bytes: &[u8],
    original_name: &str,
    allowed_extensions: &[&str],
    max_size: usize,
) -> Result<String, UploadError> {
    if bytes.len() > max_size {
        return Err(UploadError::TooLarge);
    }

    let claimed = original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or(UploadError::DisallowedType)?;
    if !allowed_extensions.contains(&claimed.as_str()) {
        return Err(UploadError::DisallowedType);
    }

    match infer::get(bytes) {
        Some(kind) if allowed_extensions.contains(&kind.extension()) => {
            Ok(kind.extension().to_string())
        }
        Some(_) => Err(UploadError::DisallowedType),
        // pdf/png/jpeg all have magic numbers; anything unrecognizable is out
        None => Err(UploadError::DisallowedType),
    }
}

/// Filesystem-backed blob store. Retrieval happens over the static file
/// mount; this type only ever writes.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> FileStore {
        FileStore { root: root.into() }
    }

    pub fn path_of(&self, stored: &StoredRef) -> PathBuf {
        self.root.join(&stored.0)
    }

    pub async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
        allowed_extensions: &[&str],
        max_size: usize,
    ) -> Result<StoredRef, WorkflowError> {
        let extension = validate_upload(bytes, original_name, allowed_extensions, max_size)
            .map_err(WorkflowError::Upload)?;

        let file_name = format!("{}.{}", nanoid!(), extension);
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(Path::new(&self.root).join(&file_name), bytes).await?;
        Ok(StoredRef(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // %PDF-1.4 header is enough for the sniffer
    const PDF_BYTES: &[u8] = b"%PDF-1.4 test document";
    const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn accepts_allowed_types() {
        assert_eq!(
            validate_upload(PDF_BYTES, "proof.pdf", PROOF_EXTENSIONS, PROOF_MAX_SIZE),
            Ok("pdf".to_string())
        );
        assert_eq!(
            validate_upload(PNG_BYTES, "photo.PNG", PROOF_EXTENSIONS, PROOF_MAX_SIZE),
            Ok("png".to_string())
        );
    }

    #[test]
    fn rejects_oversized_uploads() {
        let big = vec![0u8; 16];
        assert_eq!(
            validate_upload(&big, "proof.pdf", PROOF_EXTENSIONS, 8),
            Err(UploadError::TooLarge)
        );
    }

    #[test]
    fn rejects_disallowed_or_disguised_types() {
        // disallowed extension
        assert_eq!(
            validate_upload(PDF_BYTES, "proof.exe", PROOF_EXTENSIONS, PROOF_MAX_SIZE),
            Err(UploadError::DisallowedType)
        );
        // no extension at all
        assert_eq!(
            validate_upload(PDF_BYTES, "proof", PROOF_EXTENSIONS, PROOF_MAX_SIZE),
            Err(UploadError::DisallowedType)
        );
        // elf binary renamed to .pdf
        let elf = [0x7F, 0x45, 0x4C, 0x46, 2, 1, 1, 0];
        assert_eq!(
            validate_upload(&elf, "proof.pdf", PROOF_EXTENSIONS, PROOF_MAX_SIZE),
            Err(UploadError::DisallowedType)
        );
    }

    #[tokio::test]
    async fn stores_under_a_generated_name() {
        let root = std::env::temp_dir().join(format!("campus-clubs-test-{}", nanoid!()));
        let store = FileStore::new(&root);

        let stored = store
            .store(PDF_BYTES, "proof.pdf", PROOF_EXTENSIONS, PROOF_MAX_SIZE)
            .await
            .unwrap();
        assert!(stored.0.ends_with(".pdf"));
        assert_eq!(tokio::fs::read(store.path_of(&stored)).await.unwrap(), PDF_BYTES);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
