//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, timeouts and authorization options
//! - Check that route mode has something to authorize
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::auth::{AuthOptions, OptionsError, RouteInstance};
use crate::config::schema::{AuthMode, ProxyConfig, RouteConfig};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("{scope}: {source}")]
    AuthOptions {
        scope: String,
        #[source]
        source: OptionsError,
    },

    #[error("route with empty name")]
    EmptyRouteName,

    #[error("duplicate route name '{0}'")]
    DuplicateRoute(String),

    #[error("auth.mode = \"route\" needs at least one route with auth_args")]
    NoTaggedRoutes,
}

/// Program name the global option vector is parsed under.
pub const GLOBAL_ARGV0: &str = "authproxy";

/// Parse the global options in `auth.args`.
pub fn global_options(args: &[String]) -> Result<AuthOptions, OptionsError> {
    AuthOptions::from_args(std::iter::once(GLOBAL_ARGV0).chain(args.iter().map(String::as_str)))
}

/// Build a route's authorization instance. The route stands in as the
/// `from` target and the upstream as `to`.
pub fn route_instance(
    route: &RouteConfig,
    upstream: &str,
) -> Option<Result<RouteInstance, OptionsError>> {
    let args = route.auth_args.as_ref()?;
    let from = route.name.as_str();
    Some(RouteInstance::new(
        [from, upstream]
            .into_iter()
            .chain(args.iter().map(String::as_str)),
    ))
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "upstream.address", &config.upstream.address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("connect_secs", timeouts.connect_secs),
        ("auth_secs", timeouts.auth_secs),
        ("request_secs", timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if config.auth.mode == AuthMode::Global {
        if let Err(source) = global_options(&config.auth.args) {
            errors.push(ValidationError::AuthOptions {
                scope: "auth.args".to_string(),
                source,
            });
        }
    }

    let mut names = HashSet::new();
    let mut tagged = 0usize;
    for route in &config.routes {
        if route.name.is_empty() {
            errors.push(ValidationError::EmptyRouteName);
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        match route_instance(route, &config.upstream.address) {
            Some(Ok(_)) => tagged += 1,
            Some(Err(source)) => errors.push(ValidationError::AuthOptions {
                scope: format!("routes.{}.auth_args", route.name),
                source,
            }),
            None => {}
        }
    }

    if config.auth.mode == AuthMode::Route && tagged == 0 {
        errors.push(ValidationError::NoTaggedRoutes);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, auth_args: Option<&[&str]>) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            host: None,
            path_prefix: Some("/".to_string()),
            priority: 0,
            auth_args: auth_args.map(|a| a.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.timeouts.auth_secs = 0;
        config.auth.args = vec!["--auth-transform=rewrite".to_string()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ZeroTimeout("auth_secs"))));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::AuthOptions { .. })));
    }

    #[test]
    fn route_mode_requires_a_tagged_route() {
        let mut config = ProxyConfig::default();
        config.auth.mode = AuthMode::Route;
        config.routes.push(route("open", None));

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[..], [ValidationError::NoTaggedRoutes]));

        config.routes.push(route("secure", Some(&["--auth-port=9000"])));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn bad_route_options_are_reported_with_their_route() {
        let mut config = ProxyConfig::default();
        config.routes.push(route("secure", Some(&["--auth-port=none"])));
        config.routes.push(route("secure", None));

        let errors = validate_config(&config).unwrap_err();
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert!(messages[0].starts_with("routes.secure.auth_args:"));
        assert_eq!(messages[1], "duplicate route name 'secure'");
    }

    #[test]
    fn route_instance_uses_route_options() {
        let secure = route("secure", Some(&["--auth-host=auth.internal", "--force-cacheability"]));
        let instance = route_instance(&secure, "127.0.0.1:3000").unwrap().unwrap();
        assert_eq!(instance.options().hostname, "auth.internal");
        assert!(instance.options().force_cacheability);

        assert!(route_instance(&route("open", None), "127.0.0.1:3000").is_none());
    }
}
