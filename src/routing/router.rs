//! Route table lookup.
//!
//! # Responsibilities
//! - Compile the configured routes once at startup
//! - Resolve an inbound path to a backend and its outbound path
//! - Return an explicit no-match rather than a silent default
//!
//! # Design Decisions
//! - Immutable after construction (shared via `Arc` without locks)
//! - Longest prefix wins; priority breaks ties; then declaration order
//! - O(n) scan, fine for a handful of routes

use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub service: String,
    pub matcher: PathPrefixMatcher,
    pub upstream_prefix: String,
    pub priority: u32,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a str,
    pub service: &'a str,
    /// Outbound path with the inbound prefix rewritten; no query string.
    pub upstream_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut compiled: Vec<Route> = routes
            .iter()
            .map(|r| Route {
                name: r.name.clone(),
                service: r.service.clone(),
                matcher: PathPrefixMatcher::new(r.path_prefix.as_str()),
                upstream_prefix: r.upstream_prefix.trim_end_matches('/').to_string(),
                priority: r.priority,
            })
            .collect();

        // Stable sort keeps declaration order among equals.
        compiled.sort_by(|a, b| {
            b.matcher
                .prefix()
                .len()
                .cmp(&a.matcher.prefix().len())
                .then(b.priority.cmp(&a.priority))
        });

        for route in &compiled {
            tracing::debug!(
                route = %route.name,
                prefix = %route.matcher.prefix(),
                service = %route.service,
                upstream_prefix = %route.upstream_prefix,
                "Route compiled"
            );
        }

        Self { routes: compiled }
    }

    /// Find the route for `path` (path only, no query).
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            let rest = route.matcher.remainder(path)?;
            let upstream_path = match (route.upstream_prefix.as_str(), rest) {
                ("", "") => "/".to_string(),
                ("", rest) => rest.to_string(),
                (prefix, rest) => format!("{}{}", prefix, rest),
            };
            Some(RouteMatch {
                route: &route.name,
                service: &route.service,
                upstream_path,
            })
        })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn table() -> RouteTable {
        RouteTable::from_config(&GatewayConfig::default().routes)
    }

    #[test]
    fn test_default_routes_rewrite_prefix() {
        let table = table();
        let cases = [
            ("/api/auth/login", "user-service", "/auth/login"),
            ("/api/users/u1", "user-service", "/users/u1"),
            ("/api/items", "item-service", "/items"),
            ("/api/items/i9", "item-service", "/items/i9"),
            ("/api/categories", "item-service", "/categories"),
            ("/api/lists/l1/items", "list-service", "/lists/l1/items"),
        ];
        for (path, service, upstream) in cases {
            let m = table.resolve(path).unwrap_or_else(|| panic!("no route for {}", path));
            assert_eq!(m.service, service, "{}", path);
            assert_eq!(m.upstream_path, upstream, "{}", path);
        }
    }

    #[test]
    fn test_longest_prefix_wins_over_declaration_order() {
        let table = table();
        let m = table.resolve("/api/items/search").unwrap();
        assert_eq!(m.route, "item-search");
        assert_eq!(m.upstream_path, "/search");
    }

    #[test]
    fn test_no_match() {
        let table = table();
        assert!(table.resolve("/api/unknown").is_none());
        assert!(table.resolve("/api/listsX").is_none());
        assert!(table.resolve("/health").is_none());
    }

    #[test]
    fn test_priority_breaks_ties() {
        let mut routes = vec![
            RouteConfig {
                name: "low".into(),
                path_prefix: "/api/x".into(),
                service: "a".into(),
                upstream_prefix: "/x".into(),
                priority: 0,
            },
            RouteConfig {
                name: "high".into(),
                path_prefix: "/api/x/".into(),
                service: "b".into(),
                upstream_prefix: "/".into(),
                priority: 5,
            },
        ];
        let table = RouteTable::from_config(&routes);
        let m = table.resolve("/api/x/1").unwrap();
        assert_eq!(m.service, "b");
        assert_eq!(m.upstream_path, "/1");

        routes[1].priority = 0;
        let table = RouteTable::from_config(&routes);
        assert_eq!(table.resolve("/api/x").unwrap().route, "low");
        assert_eq!(table.len(), 2);
    }
}
