//! Cluster file loading.
//!
//! A cluster file is TOML describing where archives are stored and where
//! failure records are read from. It may `extends = "<path>"` one base file;
//! tables merge recursively and the extending file wins.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value;

use crate::archive::Compression;
use crate::error::{Error, Result};
use crate::feed::FeedConfig;
use crate::selector::default_markers;
use crate::store::StoreConfig;

pub const CLUSTER_FILE_ENV: &str = "LOGTOOL_CLUSTER_FILE";
pub const DEFAULT_LOCAL_ROOT: &str = "logtool-store";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub compression: Compression,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    #[default]
    Grep,
    Builtin,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub scanner: ScannerKind,
    /// Trace strings that mark a run as worth uploading under `--check-rocksdb`.
    pub markers: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerKind::Grep,
            markers: default_markers(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub store: StoreConfig,
    pub feed: FeedConfig,
    pub archive: ArchiveConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ClusterDoc {
    /// None for the built-in default.
    pub path: Option<PathBuf>,
    pub config: ClusterConfig,
}

impl ClusterDoc {
    /// Directory that relative paths in the cluster file are resolved against.
    pub fn base_dir(&self) -> Result<PathBuf> {
        match self.path.as_deref().and_then(Path::parent) {
            Some(p) if !p.as_os_str().is_empty() => Ok(p.to_path_buf()),
            _ => std::env::current_dir().map_err(|e| Error::msg(format!("cwd error: {e}"))),
        }
    }

    pub fn resolve_path(&self, raw: &str) -> Result<PathBuf> {
        let p = PathBuf::from(raw.trim());
        if p.is_absolute() {
            return Ok(p);
        }
        Ok(self.base_dir()?.join(p))
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn load_value(path: &Path, seen: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(canonical.clone()) {
        return Err(Error::config(format!(
            "cluster file extends cycle at {}",
            canonical.display()
        )));
    }

    let raw = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read cluster file {}: {e}", path.display()))
    })?;
    let mut value: Value = toml::from_str(&raw).map_err(|e| {
        Error::config(format!("TOML parse error in {}: {e}", path.display()))
    })?;

    let mut out = Value::Table(Default::default());
    let parent = value
        .as_table_mut()
        .and_then(|t| t.remove("extends"))
        .map(|v| {
            v.as_str().map(str::to_owned).ok_or_else(|| {
                Error::config(format!("extends in {} must be a string", path.display()))
            })
        })
        .transpose()?;
    if let Some(parent) = parent {
        let parent_path = path.parent().unwrap_or_else(|| Path::new(".")).join(parent);
        out = load_value(&parent_path, seen)?;
    }
    merge_values(&mut out, value);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ClusterDoc> {
    let value = load_value(path, &mut HashSet::new())?;
    let config: ClusterConfig = value.try_into().map_err(|e| {
        Error::config(format!("invalid cluster file {}: {e}", path.display()))
    })?;
    Ok(ClusterDoc {
        path: Some(path.to_path_buf()),
        config,
    })
}

/// `--cluster-file`, then `$LOGTOOL_CLUSTER_FILE`, then the built-in default.
pub fn load_or_default(explicit: Option<&Path>) -> Result<ClusterDoc> {
    if let Some(p) = explicit {
        return load(p);
    }
    if let Some(p) = resolve_env_ref(Some(CLUSTER_FILE_ENV)) {
        return load(Path::new(&p));
    }
    Ok(ClusterDoc {
        path: None,
        config: ClusterConfig::default(),
    })
}

pub(crate) fn resolve_env_ref(env_key: Option<&str>) -> Option<String> {
    env_key
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A literal value wins over the environment variable it names.
pub(crate) fn resolve_string_field(literal: Option<&str>, env_key: Option<&str>) -> Option<String> {
    literal
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| resolve_env_ref(env_key))
}

pub(crate) fn resolve_required_string_field(
    cfg_path: &str,
    literal: Option<&str>,
    env_key: Option<&str>,
) -> Result<String> {
    resolve_string_field(literal, env_key).ok_or_else(|| {
        match env_key.map(str::trim).filter(|s| !s.is_empty()) {
            Some(k) => Error::config(format!("{cfg_path} is empty (also checked env var '{k}')")),
            None => Error::config(format!("{cfg_path} is empty")),
        }
    })
}
