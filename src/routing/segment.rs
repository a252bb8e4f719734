//! Segment trie used for route lookup.
//!
//! # Responsibilities
//! - Store route entries one node per path segment, sharing prefixes
//! - Resolve a request path to an entry plus trailing positional arguments
//!
//! # Design Decisions
//! - Immutable after construction (read concurrently without locks)
//! - Exact labels win over `*` at the same depth
//! - A leaf consumes the rest of the path as arguments; an inner node does not
//! - A top level `*` is the last resort when the walk fails

use std::collections::HashMap;
use std::sync::Arc;

use crate::routing::registry::RouteEntry;

/// Label of the wildcard segment.
pub const WILDCARD: &str = "*";

#[derive(Default)]
struct Segment {
    entry: Option<Arc<RouteEntry>>,
    children: HashMap<String, Segment>,
}

impl Segment {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub entry: Arc<RouteEntry>,
    /// Unconsumed path segments, in order.
    pub args: Vec<String>,
}

impl RouteMatch {
    fn new(entry: &Arc<RouteEntry>, rest: &[&str]) -> Self {
        Self {
            entry: Arc::clone(entry),
            args: rest.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Immutable route trie.
#[derive(Default)]
pub struct SegmentRouter {
    root: Segment,
    routes: usize,
}

impl SegmentRouter {
    /// Build the trie from registry entries.
    pub fn build(entries: impl IntoIterator<Item = RouteEntry>) -> Self {
        let mut router = Self::default();
        for entry in entries {
            let mut node = &mut router.root;
            for label in split(&entry.path_key) {
                node = node.children.entry(label.to_string()).or_default();
            }
            if node.entry.is_none() {
                router.routes += 1;
            }
            node.entry = Some(Arc::new(entry));
        }
        router
    }

    /// Number of routes in the trie.
    pub fn len(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }

    /// Find the handler for `path`.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let segments: Vec<&str> = split(path).collect();

        let mut node = &self.root;
        for (depth, label) in segments.iter().enumerate() {
            if let Some(child) = node.children.get(*label) {
                if child.is_leaf() {
                    return match &child.entry {
                        Some(entry) => Some(RouteMatch::new(entry, &segments[depth + 1..])),
                        None => self.fallback(&segments),
                    };
                }
                node = child;
                continue;
            }
            if let Some(entry) = node.children.get(WILDCARD).and_then(|w| w.entry.as_ref()) {
                return Some(RouteMatch::new(entry, &segments[depth..]));
            }
            return self.fallback(&segments);
        }

        match &node.entry {
            Some(entry) => Some(RouteMatch::new(entry, &[])),
            None => self.fallback(&segments),
        }
    }

    fn fallback(&self, segments: &[&str]) -> Option<RouteMatch> {
        self.root
            .children
            .get(WILDCARD)
            .and_then(|w| w.entry.as_ref())
            .map(|entry| RouteMatch::new(entry, segments))
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::RequestContext;
    use crate::routing::registry::RouteRegistry;

    fn noop(_: &mut RequestContext) {}

    fn router(paths: &[&str]) -> SegmentRouter {
        let mut registry = RouteRegistry::new();
        for path in paths {
            registry.bind_func(path, noop);
        }
        registry.build()
    }

    fn resolve(router: &SegmentRouter, path: &str) -> Option<(String, Vec<String>)> {
        router
            .resolve(path)
            .map(|m| (m.entry.path_key.clone(), m.args))
    }

    #[test]
    fn exact_routes_resolve_without_args() {
        let r = router(&["api/item", "api/list", "user/profile/show", "admin"]);
        assert_eq!(r.len(), 4);
        for path in ["api/item", "/api/list/", "user/profile/show", "admin"] {
            let (key, args) = resolve(&r, path).unwrap();
            assert_eq!(key, path.trim_matches('/'));
            assert!(args.is_empty());
        }
    }

    #[test]
    fn leaf_absorbs_trailing_segments() {
        let r = router(&["api/item"]);
        assert_eq!(
            resolve(&r, "/api/item/5/9"),
            Some(("api/item".into(), vec!["5".into(), "9".into()]))
        );
    }

    #[test]
    fn inner_node_does_not_absorb() {
        let r = router(&["api", "api/item"]);
        assert_eq!(resolve(&r, "api"), Some(("api".into(), vec![])));
        assert!(resolve(&r, "api/other").is_none());
    }

    #[test]
    fn wildcard_catches_unmatched_at_its_depth() {
        let r = router(&["admin/*", "admin/users"]);
        assert_eq!(resolve(&r, "admin/users"), Some(("admin/users".into(), vec![])));
        assert_eq!(
            resolve(&r, "admin/settings/mail"),
            Some(("admin/*".into(), vec!["settings".into(), "mail".into()]))
        );
        assert!(resolve(&r, "admin").is_none());
        assert!(resolve(&r, "other").is_none());
    }

    #[test]
    fn top_level_wildcard_is_last_resort() {
        let r = router(&["*", "api/item"]);
        assert_eq!(resolve(&r, "api/item"), Some(("api/item".into(), vec![])));
        assert_eq!(
            resolve(&r, "api/nope"),
            Some(("*".into(), vec!["api".into(), "nope".into()]))
        );
        assert_eq!(resolve(&r, "/"), Some(("*".into(), vec![])));
    }

    #[test]
    fn empty_trie_resolves_nothing() {
        let r = SegmentRouter::default();
        assert!(r.is_empty());
        assert!(r.resolve("/").is_none());
        assert!(r.resolve("/anything").is_none());
    }
}
