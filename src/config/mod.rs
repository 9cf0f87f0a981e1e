//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, auth option parsing)
//!     → ProxyConfig (validated, immutable)
//!     → HttpServer builds the AuthProxy and route table from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Bad authorization options fail loading; nothing falls back silently

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{AuthConfig, AuthMode, ProxyConfig, RouteConfig};
pub use schema::{ListenerConfig, ObservabilityConfig, TimeoutConfig, UpstreamConfig};

use crate::auth::AuthProxy;

impl ProxyConfig {
    /// Build the authorization hook for the configured mode.
    pub fn auth_proxy(&self) -> Result<Option<AuthProxy>, ConfigError> {
        match self.auth.mode {
            AuthMode::Off => Ok(None),
            AuthMode::Route => Ok(Some(AuthProxy::tagged())),
            AuthMode::Global => validation::global_options(&self.auth.args)
                .map(|options| Some(AuthProxy::global(options)))
                .map_err(|source| ConfigError::Options {
                    scope: "auth.args".to_string(),
                    source,
                }),
        }
    }
}
