//! switchyard server binary.
//!
//! Loads the configuration, registers the demo routes and hands the process
//! to the lifecycle manager.
//!
//! ```text
//! switchyard -c config/app.toml      foreground
//! switchyard -c config/app.toml -d   background
//! kill -HUP <pid>                    zero downtime restart
//! kill -TERM <pid>                   drain and exit
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request};
use clap::Parser;
use serde::Serialize;

use switchyard::config::loader::load_or_default;
use switchyard::lifecycle::daemon;
use switchyard::observability::{logging, metrics};
use switchyard::{
    ConfigStore, Controller, ControllerRoutes, Dispatcher, ProcessManager, RequestContext,
    RouteRegistry,
};

#[derive(Debug, Parser)]
#[command(name = "switchyard", version, about = "HTTP dispatch server")]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "config/app.toml")]
    config: PathBuf,

    /// Run in the background.
    #[arg(short, long)]
    daemon: bool,

    /// Started by a restart; take the listener from fd 3.
    #[arg(short, long, hide = true)]
    graceful: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Note {
    id: i64,
    text: String,
}

/// In-memory notes, exposed as `/api/notes/{get,add,list}`.
#[derive(Default)]
struct Notes {
    items: RwLock<HashMap<i64, Note>>,
}

impl Controller for Notes {
    fn routes(self) -> ControllerRoutes {
        let notes = Arc::new(self);
        let get = Arc::clone(&notes);
        let add = Arc::clone(&notes);
        let list = notes;
        ControllerRoutes::new("Notes")
            .method("Get", move |ctx: &mut RequestContext, id: i64| {
                let items = get.items.read().unwrap_or_else(|e| e.into_inner());
                match items.get(&id) {
                    Some(note) => ctx.set_data(note),
                    None => ctx.fail(404, format!("note {id} not found")),
                }
            })
            .method("Add", move |ctx: &mut RequestContext| {
                let text = match ctx.param_string("text", "note text", true, 1, 280, "") {
                    Ok(text) => text,
                    Err(e) => return ctx.add_error(e),
                };
                let mut items = add.items.write().unwrap_or_else(|e| e.into_inner());
                let id = items.keys().max().copied().unwrap_or(0) + 1;
                let note = Note { id, text };
                items.insert(id, note.clone());
                ctx.set_data(note);
            })
            .method("List", move |ctx: &mut RequestContext| {
                let items = list.items.read().unwrap_or_else(|e| e.into_inner());
                let mut notes: Vec<&Note> = items.values().collect();
                notes.sort_by_key(|note| note.id);
                ctx.set_data(notes);
            })
    }
}

fn cors(request: &Request<Body>, headers: &mut HeaderMap) -> bool {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    // Preflight stops here with an empty envelope.
    request.method() != Method::OPTIONS
}

fn routes() -> RouteRegistry {
    let mut registry = RouteRegistry::new();
    registry.bind_func("ping", |ctx: &mut RequestContext| ctx.set_data("pong"));
    registry
        .prefix("api")
        .bind_middleware(|ctx: &mut RequestContext| {
            tracing::debug!(handler = %ctx.handler_name, "api call");
            true
        })
        .bind_struct(Notes::default(), None);
    registry.prefix("echo").bind_wildcard(|ctx: &mut RequestContext| {
        let path = ctx.uri.path().to_string();
        ctx.set_data(path);
    });
    registry
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let found = cli.config.exists();
    let config = load_or_default(&cli.config)?;
    logging::init_logging(&config.observability, &config.env)?;
    if !found {
        tracing::warn!(path = %cli.config.display(), "Config file not found, running on defaults");
    }

    if cli.daemon && !daemon::is_detached() {
        let pid = daemon::daemonize(std::env::args_os().skip(1))?;
        tracing::info!(pid, "Running in background");
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %config.env,
        port = config.http.port,
        graceful = cli.graceful,
        "switchyard starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(ConfigStore::with_path(config, cli.config.clone()));
    let router = routes().build();
    tracing::info!(routes = router.len(), "Routes registered");

    let dispatcher = Arc::new(Dispatcher::new(router, Arc::clone(&store)).with_global_middleware(cors));
    let mut manager = ProcessManager::new(store, dispatcher).inherited(cli.graceful);
    manager.on_close(|| tracing::info!("Bye"));
    manager.run().await?;
    Ok(())
}
