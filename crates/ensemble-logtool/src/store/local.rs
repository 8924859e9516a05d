use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{BlobLocation, BlobStore};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct LocalStoreConfig {
    pub root: String,
}

/// Objects as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, loc: &BlobLocation, name: &str) -> PathBuf {
        let mut p = self.root.clone();
        for seg in loc.segments() {
            p.push(seg);
        }
        p.join(name)
    }
}

// Copy into a sibling temp file and rename over the target, so a reader never
// sees a partially written object.
fn replace_file(src: &Path, dst: &Path) -> Result<()> {
    let parent = dst
        .parent()
        .ok_or_else(|| Error::msg(format!("invalid object path: {}", dst.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| Error::msg(format!("failed to create {}: {e}", parent.display())))?;
    let file_name = dst.file_name().and_then(|s| s.to_str()).unwrap_or("object");
    let tmp = parent.join(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let copied = fs::copy(src, &tmp).and_then(|_| fs::File::open(&tmp)?.sync_all());
    if let Err(e) = copied {
        let _ = fs::remove_file(&tmp);
        return Err(Error::msg(format!(
            "failed to write {}: {e}",
            tmp.display()
        )));
    }
    fs::rename(&tmp, dst).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::msg(format!(
            "failed to rename {} -> {}: {e}",
            tmp.display(),
            dst.display()
        ))
    })
}

impl BlobStore for LocalStore {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    fn put_object(&self, loc: &BlobLocation, name: &str, src: &Path) -> Result<()> {
        replace_file(src, &self.object_path(loc, name))
    }

    fn get_object(&self, loc: &BlobLocation, name: &str, dst: &Path) -> Result<bool> {
        let p = self.object_path(loc, name);
        if !p.is_file() {
            return Ok(false);
        }
        fs::copy(&p, dst).map_err(|e| {
            Error::msg(format!(
                "failed to copy {} -> {}: {e}",
                p.display(),
                dst.display()
            ))
        })?;
        Ok(true)
    }
}
