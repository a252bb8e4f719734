//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGQUIT, SIGHUP)
//! - Translate signals to lifecycle events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP requests a restart, never a plain shutdown
//! - Restarts requested from inside the process use the same event channel

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the process manager should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Drain and exit.
    Shutdown(&'static str),
    /// Hand the listener to a new process, then drain and exit.
    Restart(&'static str),
}

/// Forward OS signals as lifecycle events until the receiver goes away.
#[cfg(unix)]
pub fn spawn_signal_listener(events: mpsc::Sender<LifecycleEvent>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hangup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = terminate.recv() => LifecycleEvent::Shutdown("SIGTERM"),
                _ = interrupt.recv() => LifecycleEvent::Shutdown("SIGINT"),
                _ = quit.recv() => LifecycleEvent::Shutdown("SIGQUIT"),
                _ = hangup.recv() => LifecycleEvent::Restart("SIGHUP"),
            };
            tracing::info!(event = ?event, "Signal received");
            if events.send(event).await.is_err() {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(events: mpsc::Sender<LifecycleEvent>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received");
            if events.send(LifecycleEvent::Shutdown("ctrl-c")).await.is_err() {
                break;
            }
        }
    }))
}
