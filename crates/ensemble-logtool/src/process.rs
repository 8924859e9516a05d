use std::process::{Command, ExitStatus, Output, Stdio};

use tracing::debug;

use crate::error::{Error, Result};

/// Run to completion and fail unless the exit status is success.
pub fn run_checked(mut cmd: Command, what: &str) -> Result<()> {
    let out = run_output(&mut cmd)?;
    if out.status.success() {
        return Ok(());
    }
    Err(Error::process(format!(
        "{what} failed: {}",
        command_summary(&out)
    )))
}

pub fn run_output(cmd: &mut Command) -> Result<Output> {
    debug!("exec: {:?}", cmd);
    cmd.stdin(Stdio::null())
        .output()
        .map_err(|e| Error::process(format!("failed to run command {:?}: {e}", cmd)))
}

/// Run with output discarded; only the exit status matters.
pub fn run_status(cmd: &mut Command) -> Result<ExitStatus> {
    debug!("exec: {:?}", cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| Error::process(format!("failed to spawn {:?}: {e}", cmd)))
}

pub fn command_summary(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    if !stdout.is_empty() {
        return stdout;
    }
    format!("status {}", out.status)
}

pub fn is_not_found_text(msg: &str) -> bool {
    let m = msg.to_ascii_lowercase();
    m.contains("not found")
        || m.contains("404")
        || m.contains("no such")
        || m.contains("does not exist")
}

pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// `s` as one shell word, quoted only when it needs to be.
pub fn shell_word(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:@%+=,".contains(c));
    if plain { s.to_string() } else { sh_quote(s) }
}
