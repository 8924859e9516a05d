//! Trace file discovery and the content gate used before uploading.

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::Result;
use crate::process::run_status;

/// Trace events emitted when a simulation runs with a RocksDB storage engine.
pub const ROCKSDB_TRACE_EVENTS: &[&str] = &["RocksDBNonDeterminism", "ShardedRocksDBNonDeterminism"];

const TRACE_PREFIX: &str = "trace";
const XML_SUFFIX: &str = ".xml";
const JSON_SUFFIX: &str = ".json";
const SCAN_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFileSet {
    files: Vec<PathBuf>,
}

impl LogFileSet {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_trace_file(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(TRACE_PREFIX) && n.ends_with(suffix))
        .unwrap_or(false)
}

// Symlinked directories are not descended into; a symlink to a trace file
// still counts. Unreadable entries are skipped.
fn find_trace_files(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };
        if entry.path().is_file() && is_trace_file(entry.path(), suffix) {
            out.push(entry.into_path());
        }
    }
    out.sort();
    out
}

/// Collect `trace*.xml` then `trace*.json` files anywhere under `root`.
///
/// An empty set is a normal outcome; a missing root is too.
pub fn discover(root: &Path) -> Result<LogFileSet> {
    if !root.is_dir() {
        debug!("Log directory {} does not exist", root.display());
        return Ok(LogFileSet::default());
    }
    let mut files = find_trace_files(root, XML_SUFFIX);
    if files.is_empty() {
        debug!("No XML file found in directory {}", root.display());
    }
    files.extend(find_trace_files(root, JSON_SUFFIX));
    if files.is_empty() {
        debug!("No JSON file found in directory {}", root.display());
    } else {
        debug!("Total {} files found", files.len());
    }
    Ok(LogFileSet::new(files))
}

pub trait ContentScanner {
    /// True when `marker` occurs literally in at least one of `files`.
    fn contains(&self, marker: &str, files: &[PathBuf]) -> Result<bool>;
}

/// Scans with `grep -F`; exit status 0 means found, anything else not found.
#[derive(Debug, Clone, Default)]
pub struct GrepCli;

impl ContentScanner for GrepCli {
    fn contains(&self, marker: &str, files: &[PathBuf]) -> Result<bool> {
        if files.is_empty() {
            return Ok(false);
        }
        let mut cmd = Command::new("grep");
        cmd.arg("-F").arg("-q").arg("-e").arg(marker).arg("--").args(files);
        let status = run_status(&mut cmd)?;
        if !status.success() && status.code() != Some(1) {
            debug!("grep for {marker} exited with {status}; treating as not found");
        }
        Ok(status.success())
    }
}

// Reads in chunks, keeping the last `needle.len() - 1` bytes so a match that
// straddles two chunks is still seen.
fn file_contains(path: &Path, needle: &[u8]) -> io::Result<bool> {
    let mut reader = BufReader::with_capacity(SCAN_CHUNK, fs::File::open(path)?);
    let keep = needle.len() - 1;
    let mut window = Vec::with_capacity(SCAN_CHUNK + keep);
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(false);
        }
        window.extend_from_slice(buf);
        let n = buf.len();
        reader.consume(n);
        if window.windows(needle.len()).any(|w| w == needle) {
            return Ok(true);
        }
        let consumed = window.len().saturating_sub(keep);
        window.drain(..consumed);
    }
}

/// In-process literal search over raw file bytes.
#[derive(Debug, Clone, Default)]
pub struct ByteScanner;

impl ContentScanner for ByteScanner {
    fn contains(&self, marker: &str, files: &[PathBuf]) -> Result<bool> {
        let needle = marker.as_bytes();
        if needle.is_empty() {
            return Ok(!files.is_empty());
        }
        for path in files {
            match file_contains(path, needle) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => debug!("skipping unreadable {}: {e}", path.display()),
            }
        }
        Ok(false)
    }
}

/// OR across markers and across files.
pub fn matches_any_marker<S: ContentScanner + ?Sized>(
    scanner: &S,
    files: &LogFileSet,
    markers: &[String],
) -> Result<bool> {
    for marker in markers {
        if scanner.contains(marker, files.files())? {
            debug!("marker {marker} found");
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn default_markers() -> Vec<String> {
    ROCKSDB_TRACE_EVENTS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn have_bin(name: &str) -> bool {
        Command::new(name)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
        let p = root.join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&p, body).expect("write");
        p
    }

    #[test]
    fn discover_finds_xml_then_json_recursively() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        write(root, "b/trace.1.json", "{}");
        write(root, "trace.0.xml", "<Trace/>");
        write(root, "nested/deeper/trace.2.xml", "<Trace/>");
        write(root, "notes.xml", "<x/>");
        write(root, "trace.0.log", "x");
        write(root, "mytrace.xml", "<x/>");

        let set = discover(root).expect("discover");
        let names = set
            .files()
            .iter()
            .map(|p| p.strip_prefix(root).expect("rel").to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["nested/deeper/trace.2.xml", "trace.0.xml", "b/trace.1.json"]
        );
    }

    #[test]
    fn discover_empty_and_missing_dirs_yield_empty_set() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert!(discover(tmp.path()).expect("empty").is_empty());
        assert!(discover(&tmp.path().join("missing")).expect("missing").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn discover_skips_dangling_and_looping_symlinks() {
        use std::os::unix::fs::symlink;

        let tmp = tempfile::tempdir().expect("tempdir");
        let logs = tmp.path().join("logs");
        write(&logs, "trace.0.xml", "<Trace/>");
        symlink(tmp.path().join("missing"), logs.join("core.latest")).expect("dangling");
        symlink(&logs, logs.join("loop")).expect("loop");
        symlink(tmp.path().join("missing.xml"), logs.join("trace.9.xml")).expect("dangling trace");

        let set = discover(&logs).expect("discover");
        assert_eq!(set.files(), &[logs.join("trace.0.xml")]);
    }

    #[cfg(unix)]
    #[test]
    fn discover_keeps_symlinked_trace_files() {
        use std::os::unix::fs::symlink;

        let tmp = tempfile::tempdir().expect("tempdir");
        let real = write(tmp.path(), "elsewhere/trace.1.json", "{}");
        let logs = tmp.path().join("logs");
        fs::create_dir_all(&logs).expect("mkdir");
        symlink(&real, logs.join("trace.1.json")).expect("link");
        assert_eq!(discover(&logs).expect("discover").len(), 1);
    }

    #[test]
    fn json_only_directory_is_not_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write(tmp.path(), "trace.9.json", "{}");
        assert_eq!(discover(tmp.path()).expect("discover").len(), 1);
    }

    #[test]
    fn byte_scanner_ors_markers_and_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let a = write(tmp.path(), "trace.0.xml", "<Event Type=\"Other\"/>");
        let b = write(
            tmp.path(),
            "trace.1.xml",
            "<Event Type=\"ShardedRocksDBNonDeterminism\"/>",
        );
        let set = LogFileSet::new(vec![a.clone(), b]);
        assert!(matches_any_marker(&ByteScanner, &set, &default_markers()).expect("scan"));

        let only_a = LogFileSet::new(vec![a]);
        assert!(!matches_any_marker(&ByteScanner, &only_a, &default_markers()).expect("scan"));
        assert!(!matches_any_marker(&ByteScanner, &only_a, &[]).expect("scan"));
    }

    #[test]
    fn byte_scanner_finds_marker_across_chunk_boundary() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let marker = "RocksDBNonDeterminism";
        let mut body = "x".repeat(SCAN_CHUNK - 5);
        body.push_str(marker);
        body.push_str(&"y".repeat(SCAN_CHUNK));
        let big = write(tmp.path(), "trace.0.xml", &body);
        assert!(ByteScanner.contains(marker, &[big.clone()]).expect("scan"));
        assert!(!ByteScanner.contains("Sharded", &[big]).expect("scan"));

        let tiny = write(tmp.path(), "trace.1.xml", "Roc");
        assert!(!ByteScanner.contains(marker, &[tiny]).expect("scan"));
    }

    #[test]
    fn grep_scanner_agrees_with_byte_scanner() {
        if !have_bin("grep") {
            eprintln!("skip: missing grep");
            return;
        }
        let tmp = tempfile::tempdir().expect("tempdir");
        let a = write(tmp.path(), "trace.0.xml", "<Event Type=\"RocksDBNonDeterminism\"/>");
        let b = write(tmp.path(), "trace.1.json", "{\"Type\":\"Other\"}");
        let files = vec![a, b.clone()];
        for marker in ["RocksDBNonDeterminism", "Other", "Absent.Marker"] {
            assert_eq!(
                GrepCli.contains(marker, &files).expect("grep"),
                ByteScanner.contains(marker, &files).expect("bytes"),
                "{marker}"
            );
        }
        assert!(!GrepCli.contains("RocksDB", &[b]).expect("grep"));
    }
}
