//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchyard::config::AppConfig;
use switchyard::http::{build_router, serve};
use switchyard::net::listener::bind_listener;
use switchyard::{ConfigStore, Dispatcher, RouteRegistry, Shutdown};
use tokio::task::JoinHandle;

/// A dispatcher served on a loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub dispatcher: Arc<Dispatcher>,
    shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.addr.port(), path)
    }

    /// Trigger shutdown and wait for the drain to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not drain in time");
        result.expect("server task panicked").expect("server failed");
    }
}

/// Build a dispatcher over `config` with routes from `configure`.
pub fn dispatcher(config: AppConfig, configure: impl FnOnce(&mut RouteRegistry)) -> Dispatcher {
    let mut registry = RouteRegistry::new();
    configure(&mut registry);
    Dispatcher::new(registry.build(), Arc::new(ConfigStore::new(config)))
}

/// Serve `dispatcher` on an OS assigned port.
pub async fn start(dispatcher: Dispatcher) -> TestServer {
    let dispatcher = Arc::new(dispatcher);
    let listener = bind_listener(0).unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(Arc::clone(&dispatcher), &dispatcher.config().snapshot().http);

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(serve(listener, app, None, shutdown.wait()));
    TestServer {
        addr,
        dispatcher,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
