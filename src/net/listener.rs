//! Listening socket acquisition.
//!
//! # Responsibilities
//! - Bind the configured port (port 0 picks a free port)
//! - Rebuild the listener from the descriptor inherited across a restart
//!
//! # Design Decisions
//! - Returns a `std` listener so both the plain and TLS servers can adopt it
//! - A missing inherited descriptor is fatal, never silently replaced by a bind

use std::net::{Ipv4Addr, SocketAddr, TcpListener};

/// Descriptor slot holding the listener inherited from the parent process.
pub const INHERITED_FD: i32 = 3;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("no listening socket inherited at fd {0}")]
    MissingInherited(i32),
    #[error("inherited fd {fd} is not a usable listener: {source}")]
    Inherited { fd: i32, source: std::io::Error },
    #[error("listener inheritance is not supported on this platform")]
    Unsupported,
    #[error("failed to load TLS material: {0}")]
    Tls(std::io::Error),
}

/// Bind all interfaces on `port`.
pub fn bind_listener(port: u16) -> Result<TcpListener, ListenerError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr).map_err(|source| ListenerError::Bind { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| ListenerError::Bind { addr, source })?;
    Ok(listener)
}

/// Take ownership of the listener inherited at `fd`.
#[cfg(unix)]
pub fn inherit_listener(fd: i32) -> Result<TcpListener, ListenerError> {
    use std::os::fd::FromRawFd;

    // SAFETY: F_GETFD only inspects the descriptor table.
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
        return Err(ListenerError::MissingInherited(fd));
    }
    // SAFETY: the descriptor is open and nothing else in this process owns it;
    // the parent placed it at this slot for us.
    let listener = unsafe { TcpListener::from_raw_fd(fd) };
    listener
        .local_addr()
        .and_then(|_| listener.set_nonblocking(true))
        .map_err(|source| ListenerError::Inherited { fd, source })?;
    Ok(listener)
}

#[cfg(not(unix))]
pub fn inherit_listener(_fd: i32) -> Result<TcpListener, ListenerError> {
    Err(ListenerError::Unsupported)
}
