use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;

const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;
const ALLOWED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Store bytes, get a URL back. The lifecycle engine only ever sees the
/// returned URL, never the bytes.
pub trait BlobStore: Send + Sync {
    fn store(
        &self,
        bytes: &[u8],
        content_type: &str,
        suggested_name: &str,
    ) -> Result<String, AppError>;
}

/// In-memory stand-in for the external object store. Enforces the same
/// limits as the production uploader: 5 MiB cap, JPEG/PNG only.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: DashMap<String, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn store(
        &self,
        bytes: &[u8],
        content_type: &str,
        suggested_name: &str,
    ) -> Result<String, AppError> {
        if bytes.is_empty() {
            return Err(AppError::Validation("photo body is empty".to_string()));
        }

        if bytes.len() > MAX_PHOTO_BYTES {
            return Err(AppError::Validation(format!(
                "photo exceeds {MAX_PHOTO_BYTES} bytes"
            )));
        }

        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(AppError::Validation(format!(
                "unsupported content type {content_type}; only JPEG and PNG are accepted"
            )));
        }

        let key = format!("photos/{}-{}", Uuid::new_v4(), suggested_name);
        let url = format!("mem://{key}");
        self.objects.insert(key, bytes.to_vec());

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_jpeg_and_returns_url() {
        let store = InMemoryBlobStore::new();
        let url = store
            .store(&[0xff, 0xd8, 0xff], "image/jpeg", "evidence.jpg")
            .unwrap();

        assert!(url.starts_with("mem://photos/"));
        assert!(url.ends_with("evidence.jpg"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rejects_unsupported_content_type() {
        let store = InMemoryBlobStore::new();
        let err = store.store(&[1, 2, 3], "application/pdf", "report.pdf");

        assert!(matches!(err, Err(AppError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_oversized_body() {
        let store = InMemoryBlobStore::new();
        let big = vec![0u8; MAX_PHOTO_BYTES + 1];
        let err = store.store(&big, "image/png", "huge.png");

        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_empty_body() {
        let store = InMemoryBlobStore::new();
        let err = store.store(&[], "image/png", "empty.png");

        assert!(matches!(err, Err(AppError::Validation(_))));
    }
}
