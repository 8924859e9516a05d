use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::{BlobLocation, BlobStore};
use crate::config::{resolve_env_ref, resolve_required_string_field, resolve_string_field};
use crate::error::{Error, Result};
use crate::process::{command_summary, run_checked, run_output, sh_quote};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SshStoreConfig {
    /// "user@host:/base/path"
    pub target: String,
    pub target_env: Option<String>,
    pub port: Option<u16>,
    pub port_env: Option<String>,
    pub identity_file: Option<String>,
    pub identity_file_env: Option<String>,
    pub known_hosts_file: Option<String>,
    pub strict_host_key_checking: Option<bool>,
}

/// Objects as files on a remote host, moved with `ssh`/`scp`.
#[derive(Debug, Clone)]
pub struct SshStore {
    host: String,
    base_path: String,
    port: Option<u16>,
    identity_file: Option<String>,
    known_hosts_file: Option<String>,
    strict_host_key_checking: Option<bool>,
}

impl SshStore {
    pub fn from_config(cfg: &SshStoreConfig) -> Result<Self> {
        let target = resolve_required_string_field(
            "store.target",
            Some(cfg.target.as_str()),
            cfg.target_env.as_deref(),
        )?;
        let (host, base_path) = target
            .split_once(':')
            .ok_or_else(|| Error::config("store.target must be 'host:/path'"))?;
        let port = match cfg.port {
            Some(p) => Some(p),
            None => resolve_env_ref(cfg.port_env.as_deref())
                .map(|s| {
                    s.parse::<u16>()
                        .map_err(|e| Error::config(format!("store.port_env parse failed: {e}")))
                })
                .transpose()?,
        };
        Ok(Self {
            host: host.trim().to_string(),
            base_path: base_path.trim().trim_end_matches('/').to_string(),
            port,
            identity_file: resolve_string_field(
                cfg.identity_file.as_deref(),
                cfg.identity_file_env.as_deref(),
            ),
            known_hosts_file: cfg
                .known_hosts_file
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned),
            strict_host_key_checking: cfg.strict_host_key_checking,
        })
    }

    fn remote_dir(&self, loc: &BlobLocation) -> String {
        format!("{}/{}", self.base_path, loc.rel_path())
    }

    fn command(&self, program: &str) -> Command {
        let scp_style = program == "scp";
        let mut cmd = Command::new(program);
        cmd.arg("-o").arg("BatchMode=yes");
        if let Some(port) = self.port {
            cmd.arg(if scp_style { "-P" } else { "-p" })
                .arg(port.to_string());
        }
        if let Some(id) = self.identity_file.as_deref() {
            cmd.arg("-i").arg(id);
        }
        if let Some(kh) = self.known_hosts_file.as_deref() {
            cmd.arg("-o").arg(format!("UserKnownHostsFile={kh}"));
        }
        if matches!(self.strict_host_key_checking, Some(false)) {
            cmd.arg("-o").arg("StrictHostKeyChecking=no");
            if self.known_hosts_file.is_none() {
                cmd.arg("-o").arg("UserKnownHostsFile=/dev/null");
            }
        }
        cmd
    }
}

impl BlobStore for SshStore {
    fn describe(&self) -> String {
        format!("ssh:{}:{}", self.host, self.base_path)
    }

    fn put_object(&self, loc: &BlobLocation, name: &str, src: &Path) -> Result<()> {
        let dir = self.remote_dir(loc);
        let mut mkdir = self.command("ssh");
        mkdir.arg(&self.host).arg(format!("mkdir -p {}", sh_quote(&dir)));
        run_checked(mkdir, "SSH mkdir")?;

        // Upload beside the target and move it into place.
        let tmp = format!("{dir}/.{name}.tmp.{}", std::process::id());
        let mut scp = self.command("scp");
        scp.arg(src).arg(format!("{}:{tmp}", self.host));
        run_checked(scp, "SCP upload")?;

        let mut mv = self.command("ssh");
        mv.arg(&self.host).arg(format!(
            "mv -f {} {}",
            sh_quote(&tmp),
            sh_quote(&format!("{dir}/{name}"))
        ));
        run_checked(mv, "SSH rename")
    }

    fn get_object(&self, loc: &BlobLocation, name: &str, dst: &Path) -> Result<bool> {
        let remote = format!("{}/{name}", self.remote_dir(loc));
        let mut exists = self.command("ssh");
        exists.arg(&self.host).arg(format!("test -f {}", sh_quote(&remote)));
        let out = run_output(&mut exists)?;
        if !out.status.success() {
            if out.status.code() == Some(1) {
                return Ok(false);
            }
            return Err(Error::store(format!(
                "SSH existence check failed: {}",
                command_summary(&out)
            )));
        }
        let mut scp = self.command("scp");
        scp.arg(format!("{}:{remote}", self.host)).arg(dst);
        run_checked(scp, "SCP download")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_splits_into_host_and_base_path() {
        unsafe {
            std::env::set_var("LOGTOOL_TEST_SSH_TARGET", "u@h:/srv/logs/");
            std::env::set_var("LOGTOOL_TEST_SSH_PORT", "2222");
        }
        let store = SshStore::from_config(&SshStoreConfig {
            target_env: Some("LOGTOOL_TEST_SSH_TARGET".into()),
            port_env: Some("LOGTOOL_TEST_SSH_PORT".into()),
            strict_host_key_checking: Some(false),
            ..Default::default()
        })
        .expect("store");
        assert_eq!(store.host, "u@h");
        assert_eq!(store.base_path, "/srv/logs");
        assert_eq!(store.port, Some(2222));
        let loc = BlobLocation {
            segments: vec!["simulation_logs".into(), "E1".into(), "T1".into()],
        };
        assert_eq!(store.remote_dir(&loc), "/srv/logs/simulation_logs/E1/T1");
    }

    #[test]
    fn target_without_path_is_rejected() {
        let err = SshStore::from_config(&SshStoreConfig {
            target: "just-a-host".into(),
            ..Default::default()
        })
        .expect_err("bad target");
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
