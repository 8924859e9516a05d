use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::{BlobLocation, BlobStore};
use crate::config::{resolve_env_ref, resolve_required_string_field, resolve_string_field};
use crate::error::{Error, Result};
use crate::process::{command_summary, is_not_found_text, run_checked, run_output};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct S3StoreConfig {
    pub bucket: String,
    pub bucket_env: Option<String>,
    pub region: Option<String>,
    pub region_env: Option<String>,
    pub prefix: Option<String>,
    pub prefix_env: Option<String>,
    pub endpoint_url: Option<String>,
    pub endpoint_url_env: Option<String>,
    pub profile: Option<String>,
    pub profile_env: Option<String>,
    pub aws_access_key_id_env: Option<String>,
    pub aws_secret_access_key_env: Option<String>,
    pub aws_session_token_env: Option<String>,
}

/// Objects in an S3 bucket, moved with the `aws` CLI.
#[derive(Debug, Clone)]
pub struct S3Store {
    bucket: String,
    region: Option<String>,
    prefix: Option<String>,
    endpoint_url: Option<String>,
    profile: Option<String>,
    command_env: BTreeMap<String, String>,
}

impl S3Store {
    pub fn from_config(cfg: &S3StoreConfig) -> Result<Self> {
        let bucket = resolve_required_string_field(
            "store.bucket",
            Some(cfg.bucket.as_str()),
            cfg.bucket_env.as_deref(),
        )?;
        let mut command_env = BTreeMap::new();
        for (dst, src) in [
            ("AWS_ACCESS_KEY_ID", cfg.aws_access_key_id_env.as_deref()),
            ("AWS_SECRET_ACCESS_KEY", cfg.aws_secret_access_key_env.as_deref()),
            ("AWS_SESSION_TOKEN", cfg.aws_session_token_env.as_deref()),
        ] {
            if let Some(v) = resolve_env_ref(src) {
                command_env.insert(dst.to_string(), v);
            }
        }
        Ok(Self {
            bucket,
            region: resolve_string_field(cfg.region.as_deref(), cfg.region_env.as_deref()),
            prefix: resolve_string_field(cfg.prefix.as_deref(), cfg.prefix_env.as_deref()),
            endpoint_url: resolve_string_field(
                cfg.endpoint_url.as_deref(),
                cfg.endpoint_url_env.as_deref(),
            ),
            profile: resolve_string_field(cfg.profile.as_deref(), cfg.profile_env.as_deref()),
            command_env,
        })
    }

    fn object_url(&self, loc: &BlobLocation, name: &str) -> String {
        let mut key = String::new();
        if let Some(prefix) = self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            if !prefix.is_empty() {
                key.push_str(prefix);
                key.push('/');
            }
        }
        key.push_str(&loc.rel_path());
        key.push('/');
        key.push_str(name);
        format!("s3://{}/{key}", self.bucket)
    }

    fn aws(&self) -> Command {
        let mut cmd = Command::new("aws");
        if let Some(profile) = self.profile.as_deref() {
            cmd.arg("--profile").arg(profile);
        }
        if let Some(region) = self.region.as_deref() {
            cmd.arg("--region").arg(region);
        }
        if let Some(endpoint) = self.endpoint_url.as_deref() {
            cmd.arg("--endpoint-url").arg(endpoint);
        }
        cmd.envs(&self.command_env);
        cmd
    }
}

impl BlobStore for S3Store {
    fn describe(&self) -> String {
        format!("s3:{}", self.bucket)
    }

    fn put_object(&self, loc: &BlobLocation, name: &str, src: &Path) -> Result<()> {
        let mut cmd = self.aws();
        cmd.arg("s3")
            .arg("cp")
            .arg("--only-show-errors")
            .arg(src)
            .arg(self.object_url(loc, name));
        run_checked(cmd, "S3 upload")
    }

    fn get_object(&self, loc: &BlobLocation, name: &str, dst: &Path) -> Result<bool> {
        let mut cmd = self.aws();
        cmd.arg("s3")
            .arg("cp")
            .arg("--only-show-errors")
            .arg(self.object_url(loc, name))
            .arg(dst);
        let out = run_output(&mut cmd)?;
        if out.status.success() {
            return Ok(true);
        }
        let msg = command_summary(&out);
        if is_not_found_text(&msg) {
            return Ok(false);
        }
        Err(Error::store(format!("S3 download failed: {msg}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_joins_prefix_and_location() {
        let store = S3Store::from_config(&S3StoreConfig {
            bucket: "ci-logs".into(),
            prefix: Some("/joshua/".into()),
            ..Default::default()
        })
        .expect("store");
        let loc = BlobLocation {
            segments: vec!["results".into(), "simulation_logs".into(), "E1".into(), "T1".into()],
        };
        assert_eq!(
            store.object_url(&loc, "logs.tar"),
            "s3://ci-logs/joshua/results/simulation_logs/E1/T1/logs.tar"
        );
    }

    #[test]
    fn credentials_come_from_named_env_vars() {
        unsafe {
            std::env::set_var("LOGTOOL_TEST_S3_BUCKET", "bucket-from-env");
            std::env::set_var("LOGTOOL_TEST_S3_KEY", "key-from-env");
        }
        let store = S3Store::from_config(&S3StoreConfig {
            bucket_env: Some("LOGTOOL_TEST_S3_BUCKET".into()),
            aws_access_key_id_env: Some("LOGTOOL_TEST_S3_KEY".into()),
            ..Default::default()
        })
        .expect("store");
        assert_eq!(store.bucket, "bucket-from-env");
        assert_eq!(
            store.command_env.get("AWS_ACCESS_KEY_ID"),
            Some(&"key-from-env".to_string())
        );
        assert!(!store.command_env.contains_key("AWS_SECRET_ACCESS_KEY"));
    }
}
