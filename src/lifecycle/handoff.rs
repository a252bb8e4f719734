//! Listening socket handoff across a restart.
//!
//! The parent keeps a duplicate of the listener descriptor for its whole life.
//! On restart the duplicate is placed at fd 3 in the child, which rebuilds the
//! listener from it (`ListenerHandoff::import`) while the parent drains. The socket is never closed, so no
//! connection attempt is refused during the switch.

use std::net::TcpListener;
use std::process::Command;

use crate::net::listener::{inherit_listener, ListenerError, INHERITED_FD};

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("failed to duplicate listener descriptor: {0}")]
    Export(#[source] std::io::Error),
    #[error("listener handoff is not supported on this platform")]
    Unsupported,
}

/// Exported listener descriptor, ready to be inherited by a child process.
#[derive(Debug)]
pub struct ListenerHandoff {
    #[cfg(unix)]
    fd: std::os::fd::OwnedFd,
}

impl ListenerHandoff {
    /// Duplicate the descriptor behind `listener`.
    #[cfg(unix)]
    pub fn export(listener: &TcpListener) -> Result<Self, HandoffError> {
        use std::os::fd::AsFd;

        let fd = listener
            .as_fd()
            .try_clone_to_owned()
            .map_err(HandoffError::Export)?;
        Ok(Self { fd })
    }

    #[cfg(not(unix))]
    pub fn export(_listener: &TcpListener) -> Result<Self, HandoffError> {
        Err(HandoffError::Unsupported)
    }

    /// Rebuild the listener a parent handed to this process.
    pub fn import() -> Result<TcpListener, ListenerError> {
        let listener = inherit_listener(INHERITED_FD)?;
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, fd = INHERITED_FD, "Inherited listener");
        }
        Ok(listener)
    }

    /// Make the descriptor appear at fd 3 in processes spawned from `command`.
    #[cfg(unix)]
    pub fn attach(&self, command: &mut Command) -> Result<(), HandoffError> {
        use std::os::fd::AsRawFd;
        use std::os::unix::process::CommandExt;

        let fd = self.fd.as_raw_fd();
        // SAFETY: the hook runs between fork and exec and only calls the
        // async-signal-safe dup2 and fcntl.
        unsafe {
            command.pre_exec(move || {
                if fd == INHERITED_FD {
                    let flags = libc::fcntl(fd, libc::F_GETFD);
                    if flags == -1 || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                } else if libc::dup2(fd, INHERITED_FD) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn attach(&self, _command: &mut Command) -> Result<(), HandoffError> {
        Err(HandoffError::Unsupported)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::net::listener::bind_listener;

    #[test]
    fn exported_descriptor_is_the_same_socket() {
        use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};

        let listener = bind_listener(0).unwrap();
        let addr = listener.local_addr().unwrap();
        let handoff = ListenerHandoff::export(&listener).unwrap();
        assert_ne!(handoff.fd.as_raw_fd(), listener.as_raw_fd());

        drop(listener);
        let raw = handoff.fd.into_raw_fd();
        // SAFETY: `raw` was just released by the OwnedFd above.
        let rebuilt = unsafe { TcpListener::from_raw_fd(raw) };
        assert_eq!(rebuilt.local_addr().unwrap(), addr);
    }
}
