//! Typed storage keys.
//!
//! An archive is addressed by `(EnsembleId, TestUid)`. The ensemble id is
//! either given explicitly or recovered from a work directory of the form
//! `.../ensembles/<ensemble-id>`.

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

const ENSEMBLES_SEGMENT: &str = "ensembles";

// No trimming here: surrounding whitespace is a parse failure.
fn validate_token(what: &str, token: &str) -> Result<String> {
    if token.is_empty() {
        return Err(Error::config(format!("{what} is empty")));
    }
    if token == "." || token == ".." {
        return Err(Error::config(format!("{what} '{token}' is not a valid name")));
    }
    if !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(Error::config(format!(
            "{what} '{token}' contains invalid characters"
        )));
    }
    Ok(token.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnsembleId(String);

impl EnsembleId {
    /// Parse an explicitly supplied id; surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        validate_token("ensemble id", raw.trim()).map(Self)
    }

    /// Recover the ensemble id from a work directory.
    ///
    /// The directory must end in `ensembles/<token>` with `ensembles` as a whole
    /// path segment and no trailing separator, e.g.
    /// `/var/joshua/ensembles/20230221-051349-xiaogesu-c9fc5b230dcd91cf`.
    pub fn from_work_dir(work_dir: &str) -> Result<Self> {
        let unresolved = || {
            Error::config(format!(
                "Ensemble ID missing in work directory {work_dir}"
            ))
        };
        let mut segments = work_dir.rsplit('/');
        let token = segments.next().filter(|s| !s.is_empty()).ok_or_else(unresolved)?;
        match segments.next() {
            Some(ENSEMBLES_SEGMENT) => {}
            _ => return Err(unresolved()),
        }
        validate_token("ensemble id", token)
            .map(Self)
            .map_err(|_| unresolved())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnsembleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestUid(String);

impl TestUid {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_token("test uid", raw.trim()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Explicit id wins; otherwise the id is parsed out of `work_dir`.
pub fn resolve_ensemble_id(explicit: Option<&str>, work_dir: &Path) -> Result<EnsembleId> {
    if let Some(raw) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return EnsembleId::parse(raw);
    }
    let work_dir = work_dir.to_string_lossy();
    EnsembleId::from_work_dir(&work_dir)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    ensemble_id: EnsembleId,
    test_uid: TestUid,
}

impl StorageKey {
    pub fn new(ensemble_id: EnsembleId, test_uid: TestUid) -> Self {
        Self {
            ensemble_id,
            test_uid,
        }
    }

    pub fn ensemble_id(&self) -> &EnsembleId {
        &self.ensemble_id
    }

    pub fn test_uid(&self) -> &TestUid {
        &self.test_uid
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.ensemble_id, self.test_uid)
    }
}
