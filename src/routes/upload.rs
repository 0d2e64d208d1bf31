//! Story cover image storage.
//!
//! Covers arrive as the `coverImage` part of a story form, are checked by
//! extension and magic bytes, and are written under `<UPLOAD_DIR>/covers`
//! with a generated name. They are served back from `/uploads`.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::ApiError;

pub const COVERS_DIR: &str = "covers";
pub const PUBLIC_PREFIX: &str = "/uploads/covers/";
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_COVER: &str = "default-cover.jpg";
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Uploaded file taken from a multipart form, not yet validated.
#[derive(Debug, Clone)]
pub struct CoverUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Check size, extension and content; returns the detected MIME type.
pub fn validate_cover(upload: &CoverUpload) -> Result<&'static str, ApiError> {
    if upload.bytes.is_empty() {
        return Err(ApiError::invalid("coverImage", "Empty file"));
    }
    if upload.bytes.len() > MAX_FILE_SIZE {
        return Err(ApiError::invalid(
            "coverImage",
            "File too large. Maximum size is 5MB.",
        ));
    }

    if let Some(name) = upload.file_name.as_deref() {
        let ext = name.rsplit_once('.').map(|(_, e)| e.to_lowercase());
        if !ext.is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e.as_str())) {
            return Err(ApiError::invalid(
                "coverImage",
                "Unsupported file type. Allowed: JPEG, PNG, WebP, GIF.",
            ));
        }
    }

    sniff_image(&upload.bytes).ok_or_else(|| {
        ApiError::invalid(
            "coverImage",
            "File content does not match an allowed image type.",
        )
    })
}

/// Validate and store a cover, returning its public URL.
pub async fn save_cover(upload_dir: &Path, upload: &CoverUpload) -> Result<String, ApiError> {
    let mime = validate_cover(upload)?;

    let dir = upload_dir.join(COVERS_DIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::Internal(format!("cannot create {}: {}", dir.display(), e)))?;

    let filename = format!("{}.{}", Uuid::new_v4(), extension_for(mime));
    let path = dir.join(&filename);
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("cannot write {}: {}", path.display(), e)))?;

    tracing::info!(file = %filename, size = upload.bytes.len(), mime, "cover image stored");
    Ok(format!("{}{}", PUBLIC_PREFIX, filename))
}

/// Local file behind a stored cover URL. `None` for the default cover or
/// anything not written by [`save_cover`].
pub fn stored_cover_path(upload_dir: &Path, url: &str) -> Option<PathBuf> {
    let name = url.strip_prefix(PUBLIC_PREFIX)?;
    is_plain_filename(name).then(|| upload_dir.join(COVERS_DIR).join(name))
}

/// Best-effort removal of a replaced or orphaned cover.
pub async fn remove_cover(upload_dir: &Path, url: &str) {
    let Some(path) = stored_cover_path(upload_dir, url) else {
        return;
    };
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::info!(path = %path.display(), "cover image removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove cover image"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn upload(name: &str, bytes: &[u8]) -> CoverUpload {
        CoverUpload {
            file_name: Some(name.to_string()),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_magic_bytes_detection() {
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image(PNG), Some("image/png"));
        assert_eq!(sniff_image(b"GIF89a"), Some("image/gif"));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image(b"<?php"), None);
    }

    #[test]
    fn test_validate_cover_accepts_png() {
        assert_eq!(validate_cover(&upload("cover.PNG", PNG)).unwrap(), "image/png");
    }

    #[test]
    fn test_validate_cover_rejects_disguised_file() {
        assert!(validate_cover(&upload("cover.png", b"#!/bin/sh\necho")).is_err());
        assert!(validate_cover(&upload("cover.exe", PNG)).is_err());
        assert!(validate_cover(&upload("cover", PNG)).is_err());
        assert!(validate_cover(&upload("cover.png", &[])).is_err());
    }

    #[test]
    fn test_validate_cover_rejects_oversized_file() {
        let mut bytes = PNG.to_vec();
        bytes.resize(MAX_FILE_SIZE + 1, 0);
        assert!(validate_cover(&upload("big.png", &bytes)).is_err());
    }

    #[test]
    fn test_stored_cover_path_only_for_generated_names() {
        let dir = Path::new("uploads");
        assert_eq!(
            stored_cover_path(dir, "/uploads/covers/abc.png"),
            Some(PathBuf::from("uploads/covers/abc.png"))
        );
        assert_eq!(stored_cover_path(dir, DEFAULT_COVER), None);
        assert_eq!(stored_cover_path(dir, "/uploads/covers/../../etc/passwd"), None);
    }

    #[tokio::test]
    async fn test_save_cover_writes_file_under_covers() {
        let dir = std::env::temp_dir().join(format!("novelread-test-{}", Uuid::new_v4()));
        let url = save_cover(&dir, &upload("cover.png", PNG)).await.unwrap();
        assert!(url.starts_with(PUBLIC_PREFIX));
        assert!(url.ends_with(".png"));

        let path = stored_cover_path(&dir, &url).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), PNG);

        remove_cover(&dir, &url).await;
        assert!(!path.exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
