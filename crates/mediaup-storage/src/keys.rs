//! Shared key handling for storage backends.
//!
//! Generated key format: `{folder}/{uuid}{.ext}`, or `{uuid}{.ext}` without a folder.

use crate::traits::{StorageError, StorageResult};
use uuid::Uuid;

/// Generate a storage key for a payload named `file_name`.
///
/// The extension of the original name is kept (lowercased); everything else is replaced by
/// a random UUID. All backends must use this format for consistency.
pub fn generate_storage_key(folder: Option<&str>, file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default();

    let name = format!("{}{}", Uuid::new_v4(), ext);
    match folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        Some(folder) => format!("{}/{}", folder, name),
        None => name,
    }
}

/// Reject keys that could escape the bucket root or the storage directory
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// `{base}/{key}` with exactly one slash in between
pub fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_keeps_folder_and_extension() {
        let key = generate_storage_key(Some("avatars/"), "Me.PNG");
        assert!(key.starts_with("avatars/"));
        assert!(key.ends_with(".png"));
        assert_eq!(key.len(), "avatars/".len() + 36 + ".png".len());
    }

    #[test]
    fn key_without_folder_or_extension() {
        let key = generate_storage_key(None, "README");
        assert_eq!(key.len(), 36);
        assert!(!key.contains('/'));
    }

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a/../../b").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("videos/other/u1/1_abc_a..b.mp4").is_ok());
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://cdn/", "/a/b"), "http://cdn/a/b");
    }
}
