//! The three subcommands: upload, download, list.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::enumerate::FailureEnumerator;
use crate::error::{Error, Result};
use crate::keys::{EnsembleId, StorageKey, TestUid, resolve_ensemble_id};
use crate::selector::{self, matches_any_marker};
use crate::store::BlobManifest;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub work_dir: PathBuf,
    pub log_dir: PathBuf,
    pub ensemble_id: Option<String>,
    pub test_uid: TestUid,
    /// Only upload when a marker string occurs in the traces.
    pub check_markers: bool,
    /// Overrides the cluster's marker list when non-empty.
    pub markers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded {
        key: StorageKey,
        manifest: BlobManifest,
    },
    NoTraceFiles,
    MarkersNotFound,
}

fn temp_archive() -> Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix("logtool-")
        .suffix(".tar")
        .tempfile()
        .map_err(|e| Error::msg(format!("failed to create temp archive: {e}")))
}

/// Package the traces under `req.log_dir` and store them under the run's key.
///
/// Nothing is written to the store when there are no trace files or when the
/// marker check rejects the run.
pub fn upload(cluster: &Cluster, req: &UploadRequest) -> Result<UploadOutcome> {
    let files = selector::discover(&req.log_dir)?;
    if files.is_empty() {
        return Ok(UploadOutcome::NoTraceFiles);
    }

    if req.check_markers {
        let markers = if req.markers.is_empty() {
            cluster.markers()
        } else {
            req.markers.as_slice()
        };
        if !matches_any_marker(cluster.scanner(), &files, markers)? {
            debug!("Not a RocksDB test");
            return Ok(UploadOutcome::MarkersNotFound);
        }
    }

    let ensemble_id = resolve_ensemble_id(req.ensemble_id.as_deref(), &req.work_dir)?;
    debug!("Ensemble ID: {ensemble_id}");
    let key = StorageKey::new(ensemble_id, req.test_uid.clone());

    let archive = temp_archive()?;
    debug!("Tarfile: {}", archive.path().display());
    cluster.codec().pack(files.files(), archive.path())?;
    let manifest = cluster.store().put(
        &key,
        archive.path(),
        cluster.codec().compression(),
        files.len(),
    )?;
    info!(
        "Uploaded {} trace files ({} bytes) as {key}",
        manifest.file_count, manifest.size
    );
    Ok(UploadOutcome::Uploaded { key, manifest })
}

/// Fetch the archive stored under `key` and extract it into `dest`.
pub fn download(cluster: &Cluster, key: &StorageKey, dest: &Path) -> Result<BlobManifest> {
    let archive = temp_archive()?;
    let manifest = cluster.store().get(key, archive.path())?;
    std::fs::create_dir_all(dest)
        .map_err(|e| Error::msg(format!("failed to create {}: {e}", dest.display())))?;
    cluster.codec().unpack(archive.path(), dest)?;
    info!(
        "Extracted {} trace files for {key} into {}",
        manifest.file_count,
        dest.display()
    );
    Ok(manifest)
}

/// Download references for every failed test in the ensemble that names its UID.
pub fn list(cluster: &Cluster, ensemble_id: EnsembleId) -> Result<FailureEnumerator> {
    FailureEnumerator::new(
        cluster.feed(),
        ensemble_id,
        cluster.cluster_file().map(Path::to_path_buf),
    )
}
