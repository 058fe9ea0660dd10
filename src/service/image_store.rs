use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDateTime;
use std::path::PathBuf;
use tracing::warn;

use crate::model::attendance::CheckType;

/// Strip an optional `data:image/...;base64,` prefix and decode.
pub fn decode_base64_image(input: &str) -> Result<Vec<u8>> {
    let payload = match input.split_once("base64,") {
        Some((_, rest)) => rest,
        None => input,
    };

    let bytes = BASE64
        .decode(payload.trim())
        .context("invalid base64 image payload")?;

    if bytes.is_empty() {
        bail!("empty image payload");
    }

    Ok(bytes)
}

/// Blob store for captured face images.
///
/// Writes are append-only under `attendance/{date}/{user}_{check}_{HHMMSS}.jpg`
/// so every accepted submission leaves an auditable capture keyed by time.
///
/// `at` is the server-local wall clock, so the directory date always matches
/// the record's attendance_date.
pub trait FaceImageStore {
    async fn save(
        &self,
        user_id: u64,
        check_type: CheckType,
        at: NaiveDateTime,
        bytes: &[u8],
    ) -> Result<String>;

    /// Best-effort delete; used for cascade cleanup and for rolling back the
    /// capture when the record insert loses a race.
    async fn delete(&self, relative_path: &str);
}

pub struct DiskImageStore {
    root: PathBuf,
}

impl DiskImageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl FaceImageStore for DiskImageStore {
    async fn save(
        &self,
        user_id: u64,
        check_type: CheckType,
        at: NaiveDateTime,
        bytes: &[u8],
    ) -> Result<String> {
        let relative = format!(
            "attendance/{}/{}_{}_{}.jpg",
            at.format("%Y-%m-%d"),
            user_id,
            check_type.as_ref(),
            at.format("%H%M%S"),
        );

        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("writing {}", full.display()))?;

        Ok(relative)
    }

    async fn delete(&self, relative_path: &str) {
        let full = self.root.join(relative_path);
        if let Err(e) = tokio::fs::remove_file(&full).await {
            warn!(error = %e, path = %full.display(), "Failed to delete face image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_base64() {
        let encoded = BASE64.encode(b"jpegbytes");
        assert_eq!(decode_base64_image(&encoded).unwrap(), b"jpegbytes");
    }

    #[test]
    fn strips_data_url_prefix() {
        let encoded = format!("data:image/jpeg;base64,{}", BASE64.encode(b"jpegbytes"));
        assert_eq!(decode_base64_image(&encoded).unwrap(), b"jpegbytes");
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_base64_image("!!! not base64 !!!").is_err());
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(decode_base64_image("").is_err());
    }

    #[tokio::test]
    async fn save_uses_audit_path_layout() {
        let root = std::env::temp_dir().join(format!("face_store_test_{}", uuid::Uuid::new_v4()));
        let store = DiskImageStore::new(root.clone());

        let at = NaiveDateTime::parse_from_str("2026-03-02 08:15:42", "%Y-%m-%d %H:%M:%S").unwrap();

        let path = store
            .save(42, CheckType::CheckIn, at, b"jpegbytes")
            .await
            .unwrap();

        assert_eq!(path, "attendance/2026-03-02/42_check_in_081542.jpg");
        assert_eq!(tokio::fs::read(root.join(&path)).await.unwrap(), b"jpegbytes");

        store.delete(&path).await;
        assert!(!root.join(&path).exists());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn path_is_keyed_by_wall_clock_date() {
        // Early-morning wall clock. In an eastern-offset deployment this
        // instant would be the previous day in UTC; the directory must still
        // use the local date, matching the record's attendance_date.
        let root = std::env::temp_dir().join(format!("face_store_test_{}", uuid::Uuid::new_v4()));
        let store = DiskImageStore::new(root.clone());

        let at = NaiveDateTime::parse_from_str("2026-03-02 01:30:00", "%Y-%m-%d %H:%M:%S").unwrap();

        let path = store
            .save(42, CheckType::CheckIn, at, b"jpegbytes")
            .await
            .unwrap();

        assert_eq!(path, "attendance/2026-03-02/42_check_in_013000.jpg");

        tokio::fs::remove_dir_all(&root).await.ok();
    }
}
