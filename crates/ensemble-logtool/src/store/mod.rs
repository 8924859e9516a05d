//! Blob store adapter.
//!
//! Each `(ensemble, test)` key maps to one location
//! `<partition>/simulation_logs/<ensemble>/<test_uid>/` holding the archive
//! (`logs.tar`) and a `manifest.json` written after it. The manifest is the
//! commit marker: a key without one does not exist, and its size and digest
//! are checked on every read.

mod http;
mod local;
mod s3;
mod ssh;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::archive::Compression;
use crate::config::{ClusterDoc, DEFAULT_LOCAL_ROOT};
use crate::error::{Error, Result};
use crate::keys::StorageKey;

pub use http::{HttpStore, HttpStoreConfig};
pub use local::{LocalStore, LocalStoreConfig};
pub use s3::{S3Store, S3StoreConfig};
pub use ssh::{SshStore, SshStoreConfig};

pub const LOGS_SUBSPACE: &str = "simulation_logs";
pub const ARCHIVE_OBJECT: &str = "logs.tar";
pub const MANIFEST_OBJECT: &str = "manifest.json";
const MANIFEST_VERSION: u32 = 1;

fn default_partition() -> String {
    "results".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    Local(LocalStoreConfig),
    Http(HttpStoreConfig),
    S3(S3StoreConfig),
    Ssh(SshStoreConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_partition")]
    pub partition: String,
    #[serde(flatten)]
    pub backend: StoreBackendConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            partition: default_partition(),
            backend: StoreBackendConfig::Local(LocalStoreConfig {
                root: format!("{DEFAULT_LOCAL_ROOT}/blobs"),
            }),
        }
    }
}

/// A directory-like place in the store, as `/`-joined segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    segments: Vec<String>,
}

impl BlobLocation {
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn rel_path(&self) -> String {
        self.segments.join("/")
    }
}

/// Whole-object transfer against an external namespace.
pub trait BlobStore {
    fn describe(&self) -> String;

    /// Replace object `name` at `loc` with the bytes of `src`.
    fn put_object(&self, loc: &BlobLocation, name: &str, src: &Path) -> Result<()>;

    /// Copy object `name` at `loc` into `dst`; `Ok(false)` when it is absent.
    fn get_object(&self, loc: &BlobLocation, name: &str, dst: &Path) -> Result<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobManifest {
    pub version: u32,
    pub ensemble_id: String,
    pub test_uid: String,
    pub size: u64,
    pub sha256: String,
    pub compression: Compression,
    pub file_count: usize,
    pub uploaded_at: String,
}

fn digest_file(path: &Path) -> Result<(u64, String)> {
    let mut f = fs::File::open(path)
        .map_err(|e| Error::msg(format!("failed to open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut f, &mut hasher)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
    Ok((size, hex::encode(hasher.finalize())))
}

pub struct LogStore {
    backend: Box<dyn BlobStore>,
    partition: String,
}

impl LogStore {
    pub fn new(backend: Box<dyn BlobStore>, partition: impl Into<String>) -> Self {
        Self {
            backend,
            partition: partition.into(),
        }
    }

    pub fn describe(&self) -> String {
        format!("{} [{}]", self.backend.describe(), self.partition)
    }

    pub fn location(&self, key: &StorageKey) -> BlobLocation {
        let mut segments = Vec::with_capacity(4);
        let partition = self.partition.trim_matches('/');
        if !partition.is_empty() {
            segments.extend(partition.split('/').map(str::to_string));
        }
        segments.push(LOGS_SUBSPACE.to_string());
        segments.push(key.ensemble_id().as_str().to_string());
        segments.push(key.test_uid().as_str().to_string());
        BlobLocation { segments }
    }

    /// Store `archive` under `key`, replacing whatever was there.
    pub fn put(
        &self,
        key: &StorageKey,
        archive: &Path,
        compression: Compression,
        file_count: usize,
    ) -> Result<BlobManifest> {
        let loc = self.location(key);
        let (size, sha256) = digest_file(archive)?;
        let manifest = BlobManifest {
            version: MANIFEST_VERSION,
            ensemble_id: key.ensemble_id().to_string(),
            test_uid: key.test_uid().to_string(),
            size,
            sha256,
            compression,
            file_count,
            uploaded_at: chrono::Utc::now().to_rfc3339(),
        };
        debug!(
            "Uploading {} bytes to {} at {}",
            size,
            self.backend.describe(),
            loc.rel_path()
        );
        self.backend
            .put_object(&loc, ARCHIVE_OBJECT, archive)
            .map_err(|e| Error::store(format!("failed to store archive for {key}: {e}")))?;

        let mut body = tempfile::NamedTempFile::new()
            .map_err(|e| Error::msg(format!("failed to create temp file: {e}")))?;
        let encoded = serde_json::to_vec_pretty(&manifest)?;
        body.write_all(&encoded)
            .map_err(|e| Error::msg(format!("failed to write manifest: {e}")))?;
        body.flush()
            .map_err(|e| Error::msg(format!("failed to write manifest: {e}")))?;
        self.backend
            .put_object(&loc, MANIFEST_OBJECT, body.path())
            .map_err(|e| Error::store(format!("failed to store manifest for {key}: {e}")))?;
        Ok(manifest)
    }

    /// Fetch the archive under `key` into `dst`.
    pub fn get(&self, key: &StorageKey, dst: &Path) -> Result<BlobManifest> {
        let loc = self.location(key);
        let manifest_file = tempfile::NamedTempFile::new()
            .map_err(|e| Error::msg(format!("failed to create temp file: {e}")))?;
        let found = self
            .backend
            .get_object(&loc, MANIFEST_OBJECT, manifest_file.path())
            .map_err(|e| Error::store(format!("failed to read manifest for {key}: {e}")))?;
        if !found {
            return Err(Error::not_found(format!(
                "no logs stored for {key} at {}",
                loc.rel_path()
            )));
        }
        let raw = fs::read(manifest_file.path())?;
        let manifest: BlobManifest = serde_json::from_slice(&raw)
            .map_err(|e| Error::store(format!("corrupt manifest for {key}: {e}")))?;

        debug!(
            "Downloading the archive to {} at {}",
            dst.display(),
            loc.rel_path()
        );
        let found = self
            .backend
            .get_object(&loc, ARCHIVE_OBJECT, dst)
            .map_err(|e| Error::store(format!("failed to read archive for {key}: {e}")))?;
        if !found {
            return Err(Error::store(format!(
                "archive missing for {key} while manifest exists"
            )));
        }

        let (size, sha256) = digest_file(dst)?;
        if size != manifest.size || sha256 != manifest.sha256 {
            return Err(Error::store(format!(
                "archive for {key} is damaged: got {size} bytes sha256 {sha256}, expected {} bytes sha256 {}",
                manifest.size, manifest.sha256
            )));
        }
        debug!("Tarfile size: {size}");
        Ok(manifest)
    }
}

pub fn open_store(doc: &ClusterDoc) -> Result<LogStore> {
    let cfg = &doc.config.store;
    let backend: Box<dyn BlobStore> = match &cfg.backend {
        StoreBackendConfig::Local(c) => Box::new(LocalStore::new(doc.resolve_path(&c.root)?)),
        StoreBackendConfig::Http(c) => Box::new(HttpStore::from_config(c)?),
        StoreBackendConfig::S3(c) => Box::new(S3Store::from_config(c)?),
        StoreBackendConfig::Ssh(c) => Box::new(SshStore::from_config(c)?),
    };
    Ok(LogStore::new(backend, cfg.partition.clone()))
}
