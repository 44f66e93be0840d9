use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::error::ApiError;

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Writes the object and returns the stored path.
    async fn put_object(&self, name: &str, body: Bytes) -> anyhow::Result<String>;
    async fn delete_object(&self, name: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: &str) -> anyhow::Result<Self> {
        let root = PathBuf::from(root);
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, name: &str, body: Bytes) -> anyhow::Result<String> {
        let path = self.root.join(name);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn delete_object(&self, name: &str) -> anyhow::Result<()> {
        let path = self.root.join(name);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("remove {}", path.display()))?;
        Ok(())
    }
}

/// Lowercased extension of an accepted image file name, without the dot.
/// Rejects anything outside the allow-list before any handler logic runs.
pub fn image_extension(file_name: &str) -> Result<String, ApiError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(e) if ALLOWED_EXTENSIONS.contains(&e.as_str()) => Ok(e),
        _ => Err(ApiError::bad_request(
            "Please upload a valid image (PNG, JPG, JPEG, GIF, WebP, SVG)",
        )),
    }
}

/// Stored file name: `<field>_<upload-timestamp>.<ext>`.
pub fn stored_file_name(field: &str, ext: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("{field}_{millis}.{ext}")
}

/// Base name of a stored path, resolvable under the public upload route.
/// Only the base name is ever exposed to clients.
pub fn public_image_url(base_url: &str, stored_path: &str) -> Option<String> {
    let name = Path::new(stored_path).file_name()?.to_str()?;
    Some(format!("{base_url}/uploads/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_extensions_case_insensitive() {
        for name in ["a.png", "b.JPG", "c.Jpeg", "d.gif", "e.WEBP", "f.svg"] {
            assert!(image_extension(name).is_ok(), "{name} should be accepted");
        }
        assert_eq!(image_extension("photo.JPG").unwrap(), "jpg");
    }

    #[test]
    fn rejects_unknown_or_missing_extensions() {
        for name in ["a.exe", "b.pdf", "noext", "", "c.png.sh"] {
            let err = image_extension(name).unwrap_err();
            assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn stored_name_carries_field_and_extension() {
        let name = stored_file_name("image", "png");
        assert!(name.starts_with("image_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn public_url_uses_base_name_only() {
        let url = public_image_url("http://localhost:8080", "images/nested/image_17.png");
        assert_eq!(
            url.as_deref(),
            Some("http://localhost:8080/uploads/image_17.png")
        );
    }
}
