//! Route registration.
//!
//! # Responsibilities
//! - Compose `prefix + name` into normalized path keys
//! - Attach pending middleware to the next bind call only
//! - Expose controller methods as routes without reflection
//!
//! # Design Decisions
//! - Builder is used at startup only, then compiled into a [`SegmentRouter`]
//! - Last registration for a path key wins (logged)
//! - Pending middleware is moved into the bound entries, leaving the buffer empty

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::routing::handler::{Handler, HandlerDescriptor};
use crate::routing::middleware::{RouteMiddleware, SharedRouteMiddleware};
use crate::routing::segment::SegmentRouter;

/// A compiled route: path key, handler, and its middleware chain.
#[derive(Clone)]
pub struct RouteEntry {
    pub path_key: String,
    pub handler: HandlerDescriptor,
    pub middleware: Vec<SharedRouteMiddleware>,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path_key", &self.path_key)
            .field("handler", &self.handler)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Collapse `//`, strip the leading and trailing `/`.
pub fn normalize_path_key(raw: &str) -> String {
    let mut key = raw.to_string();
    while key.contains("//") {
        key = key.replace("//", "/");
    }
    key.trim_matches('/').to_string()
}

/// Lower-case the first character: `UserController` → `userController`.
pub fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Route names must look like identifiers and must not be private (`_x`).
fn is_valid_method_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// A controller's exported methods, built once at registration.
///
/// Methods capture whatever controller state they need, usually an `Arc` of
/// the controller itself.
pub struct ControllerRoutes {
    name: String,
    methods: Vec<(String, HandlerDescriptor)>,
}

impl ControllerRoutes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Expose `handler` as the method `method`.
    ///
    /// The first handler parameter is always the request context; the others
    /// are limited to `i32`, `i64`, `f64` and `String` by [`Handler`].
    pub fn method<Args, H: Handler<Args>>(mut self, method: &str, handler: H) -> Self {
        if !is_valid_method_name(method) {
            tracing::warn!(
                controller = %self.name,
                method = %method,
                "Skipping controller method with an invalid name"
            );
            return self;
        }
        let qualified = format!("{}.{}", self.name, method);
        self.methods
            .push((method.to_string(), handler.into_descriptor(qualified)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Something that can describe its routes.
pub trait Controller {
    fn routes(self) -> ControllerRoutes;
}

impl Controller for ControllerRoutes {
    fn routes(self) -> ControllerRoutes {
        self
    }
}

/// Init-time route builder.
#[derive(Default)]
pub struct RouteRegistry {
    prefix: String,
    pending: Vec<SharedRouteMiddleware>,
    entries: BTreeMap<String, RouteEntry>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prefix for the following binds. Replaces the previous prefix.
    pub fn prefix(&mut self, prefix: &str) -> &mut Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Queue middleware for the next bind call.
    pub fn bind_middleware<M: RouteMiddleware>(&mut self, middleware: M) -> &mut Self {
        self.pending.push(Arc::new(middleware));
        self
    }

    /// Bind one function at `prefix/name`.
    pub fn bind_func<Args, H: Handler<Args>>(&mut self, name: &str, handler: H) -> &mut Self {
        if self.prefix.is_empty() && name.is_empty() {
            tracing::info!("bind_func with empty prefix and name, skipped");
            self.pending.clear();
            return self;
        }
        let key = normalize_path_key(&format!("{}/{}", self.prefix, name));
        let descriptor = handler.into_descriptor(key.clone());
        let middleware = std::mem::take(&mut self.pending);
        self.insert(key, descriptor, middleware);
        self
    }

    /// Send every otherwise unmatched path under the prefix to `handler`.
    pub fn bind_wildcard<Args, H: Handler<Args>>(&mut self, handler: H) -> &mut Self {
        let key = normalize_path_key(&format!("{}/*", self.prefix));
        let descriptor = handler.into_descriptor(key.clone());
        let middleware = std::mem::take(&mut self.pending);
        self.insert(key, descriptor, middleware);
        self
    }

    /// Bind every method of one controller at `prefix/controller/method`.
    ///
    /// `alias` replaces the controller component of the route name.
    pub fn bind_struct<C: Controller>(&mut self, controller: C, alias: Option<&str>) -> &mut Self {
        let routes = controller.routes();
        let middleware = std::mem::take(&mut self.pending);
        self.bind_routes(routes, alias, &middleware);
        self
    }

    /// Bind several controllers; pending middleware applies to all of them.
    pub fn bind_structs<I>(&mut self, controllers: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Controller,
    {
        let middleware = std::mem::take(&mut self.pending);
        for controller in controllers {
            self.bind_routes(controller.routes(), None, &middleware);
        }
        self
    }

    fn bind_routes(
        &mut self,
        routes: ControllerRoutes,
        alias: Option<&str>,
        middleware: &[SharedRouteMiddleware],
    ) {
        let component = match alias {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => lower_first(&routes.name),
        };
        for (method, descriptor) in routes.methods {
            let key = normalize_path_key(&format!(
                "{}/{}/{}",
                self.prefix,
                component,
                lower_first(&method)
            ));
            self.insert(key, descriptor, middleware.to_vec());
        }
    }

    fn insert(
        &mut self,
        path_key: String,
        handler: HandlerDescriptor,
        middleware: Vec<SharedRouteMiddleware>,
    ) {
        tracing::debug!(
            path = %path_key,
            handler = %handler.qualified_name(),
            middleware = middleware.len(),
            "Route bound"
        );
        let entry = RouteEntry {
            path_key: path_key.clone(),
            handler,
            middleware,
        };
        if let Some(previous) = self.entries.insert(path_key.clone(), entry) {
            tracing::info!(
                path = %path_key,
                replaced = %previous.handler.qualified_name(),
                "Duplicate route, last registration wins"
            );
        }
    }

    /// Registered path keys, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compile the registered routes into an immutable router.
    pub fn build(self) -> SegmentRouter {
        tracing::info!(routes = self.entries.len(), "Route table compiled");
        SegmentRouter::build(self.entries.into_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::RequestContext;

    fn noop(_: &mut RequestContext) {}

    fn pass(_: &mut RequestContext) -> bool {
        true
    }

    struct UserController {
        greeting: String,
    }

    impl Controller for UserController {
        fn routes(self) -> ControllerRoutes {
            let this = Arc::new(self);
            let show = Arc::clone(&this);
            ControllerRoutes::new("UserController")
                .method("Show", move |ctx: &mut RequestContext, id: i64| {
                    ctx.set_data(format!("{} {id}", show.greeting));
                })
                .method("List", |_: &mut RequestContext| {})
                .method("_hidden", |_: &mut RequestContext| {})
                .method("", |_: &mut RequestContext| {})
                .method("bad-name", |_: &mut RequestContext| {})
        }
    }

    #[test]
    fn path_keys_are_normalized() {
        assert_eq!(normalize_path_key("/api//item/"), "api/item");
        assert_eq!(normalize_path_key("api///x"), "api/x");
        assert_eq!(normalize_path_key("/"), "");
        assert_eq!(lower_first("UserController"), "userController");
        assert_eq!(lower_first(""), "");
    }

    #[test]
    fn middleware_attaches_to_next_bind_only() {
        let mut registry = RouteRegistry::new();
        registry
            .prefix("api")
            .bind_middleware(pass)
            .bind_middleware(pass)
            .bind_func("first", noop)
            .bind_func("second", noop);

        let entries = &registry.entries;
        assert_eq!(entries["api/first"].middleware.len(), 2);
        assert!(entries["api/second"].middleware.is_empty());
        assert!(registry.pending.is_empty());
    }

    #[test]
    fn duplicate_registration_last_wins() {
        let mut registry = RouteRegistry::new();
        registry
            .prefix("api")
            .bind_func("item", noop)
            .bind_func("item", |_: &mut RequestContext, _id: i64| {});

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entries["api/item"].handler.param_kinds().len(), 1);
    }

    #[test]
    fn empty_route_is_skipped_and_bare_prefix_is_legal() {
        let mut registry = RouteRegistry::new();
        registry.bind_func("", noop);
        assert!(registry.is_empty());

        registry.prefix("/admin/").bind_func("", noop);
        assert_eq!(registry.paths().collect::<Vec<_>>(), vec!["admin"]);
    }

    #[test]
    fn controller_methods_become_routes() {
        let mut registry = RouteRegistry::new();
        registry
            .prefix("v1")
            .bind_middleware(pass)
            .bind_struct(
                UserController {
                    greeting: "hi".into(),
                },
                None,
            );

        assert_eq!(
            registry.paths().collect::<Vec<_>>(),
            vec!["v1/userController/list", "v1/userController/show"]
        );
        let show = &registry.entries["v1/userController/show"];
        assert_eq!(show.handler.qualified_name(), "UserController.Show");
        assert_eq!(show.middleware.len(), 1);

        let mut ctx = RequestContext::new();
        show.handler.call(&mut ctx, &["3".to_string()]).unwrap();
        assert_eq!(ctx.ret_data, Some(serde_json::json!("hi 3")));
    }

    #[test]
    fn alias_replaces_controller_component() {
        let mut registry = RouteRegistry::new();
        registry.bind_struct(
            UserController {
                greeting: "yo".into(),
            },
            Some("users"),
        );
        assert!(registry.entries.contains_key("users/show"));
        assert!(registry.entries.contains_key("users/list"));
    }

    #[test]
    fn bind_structs_shares_pending_middleware() {
        let mut registry = RouteRegistry::new();
        registry.bind_middleware(pass).bind_structs(vec![
            ControllerRoutes::new("Orders").method("Create", noop),
            ControllerRoutes::new("Stock").method("Count", noop),
        ]);

        assert_eq!(registry.entries["orders/create"].middleware.len(), 1);
        assert_eq!(registry.entries["stock/count"].middleware.len(), 1);
        assert!(registry.pending.is_empty());
    }

    #[test]
    fn wildcard_binds_prefix_star() {
        let mut registry = RouteRegistry::new();
        registry.prefix("admin").bind_wildcard(noop);
        assert!(registry.entries.contains_key("admin/*"));
    }
}
