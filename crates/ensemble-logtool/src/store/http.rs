use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::{BlobLocation, BlobStore};
use crate::config::{resolve_required_string_field, resolve_string_field};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HttpStoreConfig {
    pub base_url: String,
    pub base_url_env: Option<String>,
    pub token: Option<String>,
    pub token_env: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `PUT`/`GET` of `<base_url>/<location>/<object>`.
pub struct HttpStore {
    base_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpStore {
    pub fn from_config(cfg: &HttpStoreConfig) -> Result<Self> {
        let base_url = resolve_required_string_field(
            "store.base_url",
            Some(cfg.base_url.as_str()),
            cfg.base_url_env.as_deref(),
        )?;
        let token = resolve_string_field(cfg.token.as_deref(), cfg.token_env.as_deref());
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.unwrap_or(300)))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    fn url(&self, loc: &BlobLocation, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            loc.rel_path(),
            name
        )
    }

    fn authorize(
        &self,
        req: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match self.token.as_deref() {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

impl BlobStore for HttpStore {
    fn describe(&self) -> String {
        format!("http:{}", self.base_url)
    }

    fn put_object(&self, loc: &BlobLocation, name: &str, src: &Path) -> Result<()> {
        let body = fs::File::open(src)
            .map_err(|e| Error::msg(format!("failed to open {}: {e}", src.display())))?;
        let res = self
            .authorize(self.client.put(self.url(loc, name)).body(body))
            .send()
            .map_err(|e| Error::store(format!("HTTP upload failed: {e}")))?;
        if res.status().is_success() {
            return Ok(());
        }
        Err(Error::store(format!(
            "HTTP upload failed with status {}",
            res.status()
        )))
    }

    fn get_object(&self, loc: &BlobLocation, name: &str, dst: &Path) -> Result<bool> {
        let mut res = self
            .authorize(self.client.get(self.url(loc, name)))
            .send()
            .map_err(|e| Error::store(format!("HTTP download failed: {e}")))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !res.status().is_success() {
            return Err(Error::store(format!(
                "HTTP download failed with status {}",
                res.status()
            )));
        }
        let mut out = fs::File::create(dst)
            .map_err(|e| Error::msg(format!("failed to create {}: {e}", dst.display())))?;
        res.copy_to(&mut out)
            .map_err(|e| Error::store(format!("HTTP body read failed: {e}")))?;
        Ok(true)
    }
}
