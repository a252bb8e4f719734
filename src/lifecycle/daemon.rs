//! Background (daemon) mode.
//!
//! The binary re-executes itself without the daemon flag in a new session
//! with stdio detached, and the foreground process exits. A process already
//! adopted by init is treated as detached and keeps running.

use std::ffi::OsString;
use std::process::{Command, Stdio};

/// True when the parent is init, i.e. the process is already detached.
#[cfg(unix)]
pub fn is_detached() -> bool {
    // SAFETY: getppid has no preconditions.
    unsafe { libc::getppid() == 1 }
}

#[cfg(not(unix))]
pub fn is_detached() -> bool {
    true
}

/// Relaunch in the background. Returns the child's pid; the caller should exit.
pub fn daemonize<I>(args: I) -> std::io::Result<u32>
where
    I: IntoIterator<Item = OsString>,
{
    let program = std::env::current_exe()?;
    let args: Vec<OsString> = args
        .into_iter()
        .filter(|arg| arg != "-d" && arg != "--daemon")
        .collect();

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: setsid is async-signal-safe.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = command.spawn()?;
    Ok(child.id())
}
