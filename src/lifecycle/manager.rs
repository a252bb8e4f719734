//! Process lifecycle manager.
//!
//! # Responsibilities
//! - Acquire the listener (bind, or inherit it after a restart)
//! - Serve until a signal, a config change or a binary change asks otherwise
//! - Hand the listener to a successor on restart
//! - Drain in-flight requests within the grace window, then run close hooks
//!
//! # Design Decisions
//! - Every trigger (signals, watchers, callers) goes through one event channel
//! - The successor is started before the drain begins; if it cannot be
//!   started the old process keeps serving
//! - The executable path is captured at startup, before any replacement

use std::ffi::OsString;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{ConfigStore, LifecycleConfig};
use crate::http::dispatcher::Dispatcher;
use crate::http::server::{build_router, serve};
use crate::lifecycle::handoff::{HandoffError, ListenerHandoff};
use crate::lifecycle::restart::{ensure_executable, spawn_successor, successor_args, RestartError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{spawn_signal_listener, LifecycleEvent};
use crate::net::listener::{bind_listener, ListenerError};
use crate::net::tls::load_tls_config;
use crate::observability::metrics;
use crate::watch::FileWatcher;

/// Process states, in the order they are normally visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    ShuttingDown,
    Restarting,
    Terminated,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// Owns the listening socket and the process' lifetime.
pub struct ProcessManager {
    config: Arc<ConfigStore>,
    dispatcher: Arc<Dispatcher>,
    inherited: bool,
    listener: Option<TcpListener>,
    program: Result<PathBuf, Arc<std::io::Error>>,
    args: Vec<OsString>,
    close_hooks: Vec<CloseHook>,
    state: watch::Sender<LifecycleState>,
    shutdown: Shutdown,
    events_tx: mpsc::Sender<LifecycleEvent>,
    events_rx: mpsc::Receiver<LifecycleEvent>,
}

impl ProcessManager {
    pub fn new(config: Arc<ConfigStore>, dispatcher: Arc<Dispatcher>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            config,
            dispatcher,
            inherited: false,
            listener: None,
            program: std::env::current_exe().map_err(Arc::new),
            args: std::env::args_os().skip(1).collect(),
            close_hooks: Vec::new(),
            state,
            shutdown: Shutdown::new(),
            events_tx,
            events_rx,
        }
    }

    /// Take the listener from fd 3 instead of binding (restart child).
    pub fn inherited(mut self, inherited: bool) -> Self {
        self.inherited = inherited;
        self
    }

    /// Serve an already bound listener.
    pub fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Program and arguments used to start the successor.
    pub fn with_program(mut self, program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        self.program = Ok(program.into());
        self.args = args;
        self
    }

    /// Register teardown work, run after the drain in registration order.
    pub fn on_close(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.close_hooks.push(Box::new(hook));
    }

    /// Handle for requesting a restart or shutdown from inside the process.
    pub fn events(&self) -> mpsc::Sender<LifecycleEvent> {
        self.events_tx.clone()
    }

    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "Lifecycle state changed");
        }
    }

    /// Serve until shutdown or a successful restart.
    pub async fn run(mut self) -> Result<(), LifecycleError> {
        let snapshot = self.config.snapshot();
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None if self.inherited => ListenerHandoff::import()?,
            None => {
                let listener = bind_listener(snapshot.http.port)?;
                if let Ok(addr) = listener.local_addr() {
                    tracing::info!(address = %addr, "Listener bound");
                }
                listener
            }
        };
        let handoff = match ListenerHandoff::export(&listener) {
            Ok(handoff) => Some(handoff),
            Err(e) => {
                tracing::warn!(error = %e, "Listener cannot be handed off, restarts disabled");
                None
            }
        };
        let tls = load_tls_config(&snapshot.http).await?;

        let mut background = vec![
            spawn_signal_listener(self.events_tx.clone()).map_err(LifecycleError::Signals)?,
            Arc::clone(self.dispatcher.admission()).spawn_reconfigure(self.config.subscribe()),
        ];
        background.extend(self.spawn_watchers(&snapshot.lifecycle));

        let app = build_router(Arc::clone(&self.dispatcher), &snapshot.http);
        let mut server = tokio::spawn(serve(listener, app, tls, self.shutdown.wait()));
        self.set_state(LifecycleState::Serving);
        tracing::info!(pid = std::process::id(), inherited = self.inherited, "Serving");

        let reason = loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(LifecycleEvent::Shutdown(reason)) => {
                        self.set_state(LifecycleState::ShuttingDown);
                        break reason;
                    }
                    Some(LifecycleEvent::Restart(reason)) => {
                        if self.restart(handoff.as_ref(), reason) {
                            break reason;
                        }
                    }
                    None => break "event channel closed",
                },
                result = &mut server => {
                    self.finish(background);
                    return match result {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(LifecycleError::Serve(e)),
                        Err(e) => Err(LifecycleError::Serve(std::io::Error::other(e))),
                    };
                }
            }
        };

        let grace = Duration::from_secs(snapshot.lifecycle.shutdown_grace_secs);
        tracing::info!(reason, grace_secs = grace.as_secs(), "Draining");
        self.shutdown.trigger();
        match tokio::time::timeout(grace, &mut server).await {
            Ok(Ok(Ok(()))) => tracing::info!("Drain complete"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server failed while draining"),
            Ok(Err(e)) => tracing::error!(error = %e, "Server task failed while draining"),
            Err(_) => {
                tracing::warn!(
                    abandoned = self.dispatcher.inflight().active_count(),
                    grace_secs = grace.as_secs(),
                    "Drain deadline passed, abandoning in-flight requests"
                );
                server.abort();
            }
        }

        self.finish(background);
        Ok(())
    }

    /// Start a successor. Returns false (still serving) when that fails.
    fn restart(&self, handoff: Option<&ListenerHandoff>, reason: &str) -> bool {
        self.set_state(LifecycleState::Restarting);
        tracing::warn!(reason, "Restart requested");

        let result = match (handoff, &self.program) {
            (None, _) => Err(RestartError::Handoff(HandoffError::Unsupported)),
            (_, Err(e)) => Err(RestartError::CurrentExe(std::io::Error::new(e.kind(), e.to_string()))),
            (Some(handoff), Ok(program)) => {
                spawn_successor(handoff, program, &successor_args(self.args.iter().cloned()))
            }
        };

        match result {
            Ok(child) => {
                metrics::record_restart("spawned");
                tracing::info!(successor_pid = child.id(), "Successor started");
                true
            }
            Err(e) => {
                metrics::record_restart("failed");
                tracing::error!(error = %e, "Restart aborted, still serving");
                self.set_state(LifecycleState::Serving);
                false
            }
        }
    }

    fn spawn_watchers(&self, lifecycle: &LifecycleConfig) -> Vec<JoinHandle<()>> {
        let interval = Duration::from_secs(lifecycle.watch_interval_secs.max(1));
        let watcher = Arc::new(FileWatcher::new(interval));
        let mut tasks = Vec::new();

        if let Some(path) = self.config.path() {
            let mut changes = watcher.watch(path);
            let config = Arc::clone(&self.config);
            let events = self.events_tx.clone();
            tasks.push(tokio::spawn(async move {
                while changes.recv().await.is_some() {
                    match config.reload() {
                        Ok(outcome) if outcome.restart_required => {
                            let _ = events.send(LifecycleEvent::Restart("tls settings changed")).await;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Config reload failed, keeping current snapshot");
                        }
                    }
                }
            }));
        }

        if lifecycle.watch_self {
            match &self.program {
                Ok(program) => {
                    let program = program.clone();
                    let mut changes = watcher.watch(&program);
                    let events = self.events_tx.clone();
                    tasks.push(tokio::spawn(async move {
                        while changes.recv().await.is_some() {
                            match ensure_executable(&program) {
                                Ok(true) => tracing::info!(path = %program.display(), "Execute permission restored"),
                                Ok(false) => {}
                                Err(e) => {
                                    tracing::error!(path = %program.display(), error = %e, "Failed to restore execute permission");
                                    continue;
                                }
                            }
                            tracing::warn!(path = %program.display(), "Executable changed");
                            let _ = events.send(LifecycleEvent::Restart("executable changed")).await;
                        }
                    }));
                }
                Err(e) => tracing::warn!(error = %e, "Executable path unknown, not watching it"),
            }
        }

        if watcher.tracked_count() > 0 {
            tasks.push(watcher.spawn(self.shutdown.subscribe()));
        }
        tasks
    }

    fn finish(&mut self, background: Vec<JoinHandle<()>>) {
        self.shutdown.trigger();
        for task in background {
            task.abort();
        }
        for hook in self.close_hooks.drain(..) {
            hook();
        }
        self.set_state(LifecycleState::Terminated);
        tracing::info!("Shutdown complete");
    }
}
