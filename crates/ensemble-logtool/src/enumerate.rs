//! Turns failure records into ready-to-run download commands.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::error::Result;
use crate::feed::{FailureIter, FailureRecord, ResultsFeed};
use crate::keys::{EnsembleId, TestUid};
use crate::log_sanitize::sanitize_log_line;
use crate::process::shell_word;

pub const BIN_NAME: &str = "logtool";

// e.g. <Test TestUID="1ad90d42-824b-4693-aacf-53de3a6ccd27" Statistics="AAAA
fn test_uid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i:TestUID)="(?P<uid>[0-9a-fA-F\-]+)""#).expect("static regex")
    })
}

pub fn extract_test_uid(harness_output: &str) -> Option<TestUid> {
    let caps = test_uid_regex().captures(harness_output)?;
    TestUid::parse(&caps["uid"]).ok()
}

/// Advisory: nothing checks that the archive behind it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRef {
    pub ensemble_id: EnsembleId,
    pub test_uid: TestUid,
    pub cluster_file: Option<PathBuf>,
}

impl fmt::Display for DownloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BIN_NAME}")?;
        if let Some(cf) = &self.cluster_file {
            write!(f, " --cluster-file {}", shell_word(&cf.display().to_string()))?;
        }
        write!(
            f,
            " download --ensemble-id {} --test-uid {}",
            self.ensemble_id, self.test_uid
        )
    }
}

pub struct FailureEnumerator {
    ensemble_id: EnsembleId,
    cluster_file: Option<PathBuf>,
    records: FailureIter,
}

impl FailureEnumerator {
    pub fn new(
        feed: &dyn ResultsFeed,
        ensemble_id: EnsembleId,
        cluster_file: Option<PathBuf>,
    ) -> Result<Self> {
        let records = feed.failures(&ensemble_id)?;
        Ok(Self {
            ensemble_id,
            cluster_file,
            records,
        })
    }

    fn to_ref(&self, record: &FailureRecord) -> Option<DownloadRef> {
        match extract_test_uid(&record.harness_output) {
            Some(test_uid) => Some(DownloadRef {
                ensemble_id: self.ensemble_id.clone(),
                test_uid,
                cluster_file: self.cluster_file.clone(),
            }),
            None => {
                warn!(
                    "Test UID not found in {}",
                    sanitize_log_line(&record.harness_output)
                );
                None
            }
        }
    }
}

impl Iterator for FailureEnumerator {
    type Item = Result<DownloadRef>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            if let Some(r) = self.to_ref(&record) {
                return Some(Ok(r));
            }
        }
    }
}
