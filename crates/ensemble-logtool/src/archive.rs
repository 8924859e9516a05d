use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::process::run_checked;

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Xz,
    Gzip,
    None,
}

impl Compression {
    fn tar_flag(self) -> Option<&'static str> {
        match self {
            Compression::Xz => Some("--xz"),
            Compression::Gzip => Some("--gzip"),
            Compression::None => None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Compression::Xz => "xz",
            Compression::Gzip => "gzip",
            Compression::None => "none",
        };
        f.write_str(s)
    }
}

pub trait ArchiveCodec {
    fn compression(&self) -> Compression;

    /// Write every file in `files` into one archive at `output`.
    fn pack(&self, files: &[PathBuf], output: &Path) -> Result<()>;

    /// Extract every entry of `archive` under `dest`, keeping stored paths.
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Archives with the system `tar`.
#[derive(Debug, Clone, Default)]
pub struct TarCli {
    compression: Compression,
}

impl TarCli {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }
}

impl ArchiveCodec for TarCli {
    fn compression(&self) -> Compression {
        self.compression
    }

    fn pack(&self, files: &[PathBuf], output: &Path) -> Result<()> {
        if files.is_empty() {
            return Err(Error::process("refusing to create an empty archive"));
        }
        let mut cmd = Command::new("tar");
        cmd.arg("-c").arg("-f").arg(output);
        if let Some(flag) = self.compression.tar_flag() {
            cmd.arg(flag);
        }
        cmd.arg("--").args(files);
        debug!("Execute tar: {:?}", cmd);
        run_checked(cmd, "tar archive")
    }

    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()> {
        if !archive.is_file() {
            return Err(Error::process(format!(
                "archive missing: {}",
                archive.display()
            )));
        }
        // tar detects the compression on extraction.
        let mut cmd = Command::new("tar");
        cmd.arg("-x").arg("-f").arg(archive).arg("-C").arg(dest);
        run_checked(cmd, "tar extract")
    }
}
