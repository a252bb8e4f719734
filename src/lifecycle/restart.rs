//! Successor process spawning.
//!
//! # Responsibilities
//! - Build the successor's command line (same arguments, restart flag set)
//! - Spawn the successor with the listener at fd 3
//! - Restore execute permission on a replaced binary
//!
//! # Design Decisions
//! - Spawn failure is reported to the caller, which keeps serving
//! - The daemon flag is dropped: the successor is already detached

use std::ffi::OsString;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::lifecycle::handoff::{HandoffError, ListenerHandoff};

/// Flag marking a process started by a restart.
pub const GRACEFUL_FLAG: &str = "-g";

const STRIPPED_FLAGS: [&str; 4] = ["-d", "--daemon", "-g", "--graceful"];

#[derive(Debug, thiserror::Error)]
pub enum RestartError {
    #[error("cannot locate current executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error("failed to spawn successor: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Arguments for the successor: ours without daemon/restart flags, plus `-g`.
pub fn successor_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut next: Vec<OsString> = args
        .into_iter()
        .filter(|arg| !STRIPPED_FLAGS.iter().any(|flag| arg == flag))
        .collect();
    next.push(GRACEFUL_FLAG.into());
    next
}

/// Start `program` holding the handed off listener.
pub fn spawn_successor(
    handoff: &ListenerHandoff,
    program: &Path,
    args: &[OsString],
) -> Result<Child, RestartError> {
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());
    handoff.attach(&mut command)?;
    command.spawn().map_err(RestartError::Spawn)
}

/// Give `path` mode 0755 when any execute bit is missing.
///
/// Returns true when the mode was changed.
#[cfg(unix)]
pub fn ensure_executable(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();
    if mode & 0o111 == 0o111 {
        return Ok(false);
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(true)
}

#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) -> std::io::Result<bool> {
    Ok(false)
}
