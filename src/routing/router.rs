//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes with their authorization instances
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Explicit no-match rather than silent default; only a config without
//!   any routes gets an implicit catch-all

use crate::auth::RouteInstance;
use crate::config::{ConfigError, RouteConfig};
use crate::config::validation::route_instance;
use crate::http::RequestHead;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub priority: u32,
    matcher: AndMatcher,
    /// Tags matching requests for authorization with per-route options.
    pub auth: Option<RouteInstance>,
}

impl Route {
    fn catch_all() -> Self {
        Self {
            name: "default".to_string(),
            priority: 0,
            matcher: AndMatcher::new(Vec::new()),
            auth: None,
        }
    }
}

#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile `configs`, highest priority first. Declaration order breaks
    /// ties.
    pub fn from_config(configs: &[RouteConfig], upstream: &str) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Ok(Self {
                routes: vec![Route::catch_all()],
            });
        }

        let mut routes = Vec::with_capacity(configs.len());
        for config in configs {
            let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
            if let Some(host) = &config.host {
                matchers.push(Box::new(HostMatcher::new(host.as_str())));
            }
            if let Some(prefix) = &config.path_prefix {
                matchers.push(Box::new(PathPrefixMatcher::new(prefix.as_str())));
            }

            let auth = route_instance(config, upstream)
                .transpose()
                .map_err(|source| ConfigError::Options {
                    scope: format!("routes.{}.auth_args", config.name),
                    source,
                })?;

            routes.push(Route {
                name: config.name.clone(),
                priority: config.priority,
                matcher: AndMatcher::new(matchers),
                auth,
            });
        }

        // Stable sort keeps declaration order among equal priorities.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        for route in &routes {
            tracing::debug!(
                route = %route.name,
                priority = route.priority,
                tagged = route.auth.is_some(),
                "Compiled route"
            );
        }
        Ok(Self { routes })
    }

    /// First route matching `req`.
    pub fn match_request(&self, req: &RequestHead) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(req))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
