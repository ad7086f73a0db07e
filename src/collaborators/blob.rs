use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Server-generated name; the caller-supplied filename is never used for
    /// storage paths.
    pub secure_name: String,
    pub url: String,
}

/// Opaque file storage used for receipt images. Failures here surface as
/// upload errors to the caller and never change payment state.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save_file(
        &self,
        category: &str,
        owner_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredBlob, String>;

    async fn delete_file(&self, category: &str, secure_name: &str) -> Result<(), String>;
}

fn secure_name_for(filename: &str) -> String {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    format!("{}.{}", Uuid::new_v4(), extension)
}

/// Filesystem-backed store writing under a configured root directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save_file(
        &self,
        category: &str,
        owner_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredBlob, String> {
        let secure_name = secure_name_for(filename);
        let dir = self.root.join(category).join(owner_id.to_string());
        let path = dir.join(&secure_name);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| format!("failed to create storage directory: {}", e))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| format!("failed to write file: {}", e))?;

        info!(category = category, owner_id = %owner_id, name = %secure_name, "stored file");
        Ok(StoredBlob {
            url: format!("/files/{}/{}/{}", category, owner_id, secure_name),
            secure_name,
        })
    }

    async fn delete_file(&self, category: &str, secure_name: &str) -> Result<(), String> {
        // Secure names are server generated uuids; reject anything else so a
        // crafted name cannot escape the storage root.
        if secure_name.contains('/') || secure_name.contains("..") {
            return Err("invalid file name".to_string());
        }

        let mut entries = tokio::fs::read_dir(self.root.join(category))
            .await
            .map_err(|e| format!("failed to read storage directory: {}", e))?;
        while let Ok(Some(owner_dir)) = entries.next_entry().await.map_err(|e| e.to_string()) {
            let candidate = owner_dir.path().join(secure_name);
            if candidate.exists() {
                return tokio::fs::remove_file(candidate)
                    .await
                    .map_err(|e| format!("failed to delete file: {}", e));
            }
        }
        Err(format!("file {} not found", secure_name))
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryBlobStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().expect("blob store lock").len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn save_file(
        &self,
        category: &str,
        owner_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredBlob, String> {
        let secure_name = secure_name_for(filename);
        let key = format!("{}/{}/{}", category, owner_id, secure_name);
        self.files
            .lock()
            .expect("blob store lock")
            .insert(key.clone(), bytes.to_vec());
        Ok(StoredBlob {
            url: format!("/files/{}", key),
            secure_name,
        })
    }

    async fn delete_file(&self, category: &str, secure_name: &str) -> Result<(), String> {
        let mut files = self.files.lock().expect("blob store lock");
        let key = files
            .keys()
            .find(|k| k.starts_with(category) && k.ends_with(secure_name))
            .cloned();
        match key {
            Some(key) => {
                files.remove(&key);
                Ok(())
            }
            None => Err(format!("file {} not found", secure_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_names_keep_extension_only() {
        let name = secure_name_for("../../etc/passwd.jpg");
        assert!(name.ends_with(".jpg"));
        assert!(!name.contains(".."));
        assert!(!name.contains('/'));
    }

    #[test]
    fn extensionless_files_get_bin() {
        assert!(secure_name_for("receipt").ends_with(".bin"));
    }

    #[tokio::test]
    async fn in_memory_store_round_trip() {
        let store = InMemoryBlobStore::new();
        let owner = Uuid::new_v4();

        let blob = store
            .save_file("payment-receipts", owner, "receipt.jpg", b"fake-jpeg")
            .await
            .expect("save should succeed");
        assert_eq!(store.file_count(), 1);
        assert!(blob.url.contains("payment-receipts"));

        store
            .delete_file("payment-receipts", &blob.secure_name)
            .await
            .expect("delete should succeed");
        assert_eq!(store.file_count(), 0);
    }

    #[tokio::test]
    async fn fs_store_writes_and_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let owner = Uuid::new_v4();

        let blob = store
            .save_file("payment-receipts", owner, "receipt.png", b"png-bytes")
            .await
            .expect("save should succeed");

        let on_disk = dir
            .path()
            .join("payment-receipts")
            .join(owner.to_string())
            .join(&blob.secure_name);
        assert!(on_disk.exists());

        store
            .delete_file("payment-receipts", &blob.secure_name)
            .await
            .expect("delete should succeed");
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn fs_delete_rejects_path_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let err = store
            .delete_file("payment-receipts", "../outside.jpg")
            .await
            .expect_err("traversal must be rejected");
        assert!(err.contains("invalid"));
    }
}
