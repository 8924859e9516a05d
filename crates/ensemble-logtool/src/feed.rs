//! Results feed: per-ensemble test outcome records.
//!
//! Both feeds carry newline-delimited JSON, one `ResultRecord` per line, and
//! are consumed lazily in a single pass.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    ClusterDoc, DEFAULT_LOCAL_ROOT, resolve_required_string_field, resolve_string_field,
};
use crate::error::{Error, Result};
use crate::keys::EnsembleId;

#[derive(Debug, Clone, Deserialize)]
pub struct LocalFeedConfig {
    pub root: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HttpFeedConfig {
    pub base_url: String,
    pub base_url_env: Option<String>,
    pub token: Option<String>,
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedConfig {
    Local(LocalFeedConfig),
    Http(HttpFeedConfig),
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig::Local(LocalFeedConfig {
            root: format!("{DEFAULT_LOCAL_ROOT}/results"),
        })
    }
}

/// One line of the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub host: Option<String>,
    pub exit_code: i32,
    #[serde(default)]
    pub harness_output: String,
}

impl ResultRecord {
    pub fn is_failure(&self) -> bool {
        self.exit_code != 0
    }
}

/// A failed test's record; the harness output embeds its test UID.
pub type FailureRecord = ResultRecord;

pub type FailureIter = Box<dyn Iterator<Item = Result<FailureRecord>>>;

pub trait ResultsFeed {
    fn describe(&self) -> String;

    /// Query failure records for `ensemble`. Each call re-queries the feed.
    fn failures(&self, ensemble: &EnsembleId) -> Result<FailureIter>;
}

fn failures_from_reader<R: Read + 'static>(reader: R, origin: String) -> FailureIter {
    let lines = BufReader::new(reader).lines().enumerate();
    Box::new(lines.filter_map(move |(i, line)| {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                return Some(Err(Error::feed(format!(
                    "failed to read {origin} line {}: {e}",
                    i + 1
                ))));
            }
        };
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<ResultRecord>(&line) {
            Ok(rec) if rec.is_failure() => Some(Ok(rec)),
            Ok(_) => None,
            Err(e) => Some(Err(Error::feed(format!(
                "invalid record at {origin} line {}: {e}",
                i + 1
            )))),
        }
    }))
}

/// `<root>/<ensemble>.jsonl` files.
#[derive(Debug, Clone)]
pub struct LocalFeed {
    root: PathBuf,
}

impl LocalFeed {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, ensemble: &EnsembleId) -> PathBuf {
        self.root.join(format!("{}.jsonl", ensemble.as_str()))
    }
}

impl ResultsFeed for LocalFeed {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    fn failures(&self, ensemble: &EnsembleId) -> Result<FailureIter> {
        let path = self.path_for(ensemble);
        if !path.is_file() {
            return Ok(Box::new(std::iter::empty()));
        }
        let f = fs::File::open(&path)
            .map_err(|e| Error::feed(format!("failed to open {}: {e}", path.display())))?;
        Ok(failures_from_reader(f, path.display().to_string()))
    }
}

/// `GET <base>/ensembles/<id>/results?errors_only=true`, streamed.
pub struct HttpFeed {
    base_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpFeed {
    pub fn from_config(cfg: &HttpFeedConfig) -> Result<Self> {
        let base_url = resolve_required_string_field(
            "feed.base_url",
            Some(cfg.base_url.as_str()),
            cfg.base_url_env.as_deref(),
        )?;
        // No overall timeout: the body is consumed lazily by the caller.
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            token: resolve_string_field(cfg.token.as_deref(), cfg.token_env.as_deref()),
            client,
        })
    }
}

impl ResultsFeed for HttpFeed {
    fn describe(&self) -> String {
        format!("http:{}", self.base_url)
    }

    fn failures(&self, ensemble: &EnsembleId) -> Result<FailureIter> {
        let url = format!(
            "{}/ensembles/{}/results?errors_only=true",
            self.base_url.trim_end_matches('/'),
            ensemble.as_str()
        );
        let mut req = self.client.get(&url);
        if let Some(t) = self.token.as_deref() {
            req = req.bearer_auth(t);
        }
        let res = req
            .send()
            .map_err(|e| Error::feed(format!("results query failed: {e}")))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Box::new(std::iter::empty()));
        }
        if !res.status().is_success() {
            return Err(Error::feed(format!(
                "results query failed with status {}",
                res.status()
            )));
        }
        Ok(failures_from_reader(res, url))
    }
}

pub fn open_feed(doc: &ClusterDoc) -> Result<Box<dyn ResultsFeed>> {
    Ok(match &doc.config.feed {
        FeedConfig::Local(c) => Box::new(LocalFeed::new(doc.resolve_path(&c.root)?)),
        FeedConfig::Http(c) => Box::new(HttpFeed::from_config(c)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    fn line(exit_code: i32, output: &str) -> String {
        serde_json::to_string(&ResultRecord {
            sequence: 0,
            host: None,
            exit_code,
            harness_output: output.to_string(),
        })
        .expect("encode")
    }

    #[test]
    fn local_feed_yields_only_failures() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let feed = LocalFeed::new(tmp.path());
        let e = EnsembleId::parse("E1").expect("id");
        let body = [line(0, "pass"), String::new(), line(1, "fail-a"), line(-9, "fail-b")]
            .join("\n");
        fs::write(feed.path_for(&e), body).expect("write");

        let outputs = feed
            .failures(&e)
            .expect("query")
            .map(|r| r.expect("record").harness_output)
            .collect::<Vec<_>>();
        assert_eq!(outputs, vec!["fail-a", "fail-b"]);
    }

    #[test]
    fn local_feed_for_unknown_ensemble_is_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let feed = LocalFeed::new(tmp.path());
        let e = EnsembleId::parse("nobody").expect("id");
        assert_eq!(feed.failures(&e).expect("query").count(), 0);
    }

    #[test]
    fn malformed_line_surfaces_as_feed_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let feed = LocalFeed::new(tmp.path());
        let e = EnsembleId::parse("E1").expect("id");
        fs::write(feed.path_for(&e), "{not json}\n").expect("write");
        let first = feed.failures(&e).expect("query").next().expect("one item");
        assert_eq!(
            first.expect_err("decode").kind(),
            crate::error::ErrorKind::Feed
        );
    }

    #[test]
    fn http_feed_streams_ndjson() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let body = format!("{}\n{}\n", line(1, "a"), line(2, "b"));
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 4096];
            let n = std::io::Read::read(&mut stream, &mut buf).expect("read");
            let req = String::from_utf8_lossy(&buf[..n]).to_string();
            let hdr = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(hdr.as_bytes()).expect("hdr");
            stream.write_all(body.as_bytes()).expect("body");
            req
        });

        let feed = HttpFeed::from_config(&HttpFeedConfig {
            base_url: format!("http://{addr}"),
            ..Default::default()
        })
        .expect("feed");
        let e = EnsembleId::parse("E1").expect("id");
        let codes = feed
            .failures(&e)
            .expect("query")
            .map(|r| r.expect("record").exit_code)
            .collect::<Vec<_>>();
        assert_eq!(codes, vec![1, 2]);

        let req = handle.join().expect("join");
        assert!(
            req.starts_with("GET /ensembles/E1/results?errors_only=true "),
            "{req}"
        );
    }
}
