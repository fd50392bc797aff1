//! Local process execution for the engine runner.

use super::ExecOutput;
use crate::core::error::{Error, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Run `program args...` in `cwd` and wait for it. A non-zero exit is not an
/// error here; callers decide.
pub fn exec_local(program: &str, args: &[String], cwd: &Path) -> Result<ExecOutput> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::Engine {
            program: program.to_string(),
            detail: format!("failed to spawn in {}: {}", cwd.display(), e),
        })?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
