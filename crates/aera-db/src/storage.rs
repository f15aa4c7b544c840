//! Filesystem-backed object storage with HMAC-signed read URLs.
//!
//! Objects live under `{base_path}/{path}`. A signed URL carries an
//! `expires` unix timestamp and a hex HMAC-SHA256 of `"{path}:{expires}"`
//! keyed by the storage signing secret.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use aera_core::{Error, ObjectStorage, Result};

type HmacSha256 = Hmac<Sha256>;

/// Reject empty, absolute, or parent-relative object paths.
pub fn validate_object_path(path: &str) -> Result<()> {
    if path.is_empty() || path.contains('\0') || path.contains('\\') {
        return Err(Error::InvalidInput(format!("Invalid object path: {:?}", path)));
    }
    let ok = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(Error::InvalidInput(format!("Invalid object path: {:?}", path)));
    }
    Ok(())
}

/// Compute the hex signature for `path` valid until `expires` (unix seconds).
pub fn sign_path(secret: &[u8], path: &str, expires: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| Error::Config(format!("Invalid signing secret: {}", e)))?;
    mac.update(format!("{}:{}", path, expires).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Object storage rooted at a local directory.
pub struct FilesystemObjectStorage {
    base_path: PathBuf,
    signing_secret: Vec<u8>,
    public_base_url: String,
}

impl FilesystemObjectStorage {
    pub fn new(
        base_path: impl Into<PathBuf>,
        signing_secret: impl Into<Vec<u8>>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            signing_secret: signing_secret.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        validate_object_path(path)?;
        Ok(self.base_path.join(path))
    }

    /// Round-trip a scratch file to catch permission problems at startup.
    pub async fn validate(&self) -> Result<()> {
        let scratch = ".health-check/scratch.bin";
        self.upload(scratch, b"storage-health-check", "application/octet-stream")
            .await?;
        let data = self.download(scratch).await?;
        if data != b"storage-health-check" {
            return Err(Error::Storage("read-back mismatch".to_string()));
        }
        self.remove(scratch).await?;
        let _ = fs::remove_dir(self.base_path.join(".health-check")).await;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for FilesystemObjectStorage {
    async fn upload(&self, path: &str, data: &[u8], content_type: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        debug!(
            subsystem = "storage",
            op = "upload",
            storage_path = %path,
            content_type,
            size = data.len(),
            "Writing object"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file, then rename into place.
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "Object rename failed");
            e
        })?;
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object {}", path)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn create_signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        validate_object_path(path)?;
        let expires = Utc::now().timestamp() + expires_in_secs as i64;
        let signature = sign_path(&self.signing_secret, path, expires)?;
        Ok(format!(
            "{}/api/storage/{}?expires={}&signature={}",
            self.public_base_url, path, expires, signature
        ))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object {}", path)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn remove_many(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            match self.remove(path).await {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Returns false for expired timestamps and mismatched signatures.
    fn verify_signature(&self, path: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.signing_secret) else {
            return false;
        };
        mac.update(format!("{}:{}", path, expires).as_bytes());
        mac.verify_slice(&sig_bytes).is_ok()
    }
}
