//! Authorization options and plugin argument parsing.
//!
//! Options are parsed once per global install and once per route instance,
//! then shared read-only between every context that uses them.

use std::ffi::OsString;

use clap::Parser;
use thiserror::Error;

use crate::auth::transform::Transform;

pub const DEFAULT_AUTH_HOST: &str = "127.0.0.1";
pub const DEFAULT_AUTH_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    pub hostname: String,
    pub port: u16,
    /// Let authorized requests be cached even when they carry credentials.
    pub force_cacheability: bool,
    pub transform: Transform,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_AUTH_HOST.to_string(),
            port: DEFAULT_AUTH_PORT,
            force_cacheability: false,
            transform: Transform::Redirect,
        }
    }
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid authorization options: {0}")]
    Invalid(#[from] clap::Error),

    #[error("route instance needs `from` and `to` arguments")]
    MissingRemapTarget,
}

#[derive(Parser, Debug)]
#[command(name = "authproxy", disable_help_flag = true, disable_version_flag = true)]
struct AuthArgs {
    /// Authorization service host name.
    #[arg(long, default_value = DEFAULT_AUTH_HOST)]
    auth_host: String,

    /// Authorization service port.
    #[arg(long, default_value_t = DEFAULT_AUTH_PORT)]
    auth_port: u16,

    /// How to build the authorization request.
    #[arg(long, value_enum, ignore_case = true, default_value_t = Transform::Redirect)]
    auth_transform: Transform,

    #[arg(long)]
    force_cacheability: bool,
}

impl AuthOptions {
    /// Parse a plugin argument vector. The first element is the program name.
    ///
    /// An unknown transform name is rejected rather than replaced by the
    /// default.
    pub fn from_args<I, T>(args: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = AuthArgs::try_parse_from(args)?;
        Ok(Self {
            hostname: args.auth_host,
            port: args.auth_port,
            force_cacheability: args.force_cacheability,
            transform: args.auth_transform,
        })
    }

    /// Parse a route instance's `from to [options...]` vector.
    ///
    /// `from` is skipped and `to` stands in as the program name.
    pub fn from_remap_args<I, T>(args: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut args = args.into_iter().peekable();
        args.next().ok_or(OptionsError::MissingRemapTarget)?;
        if args.peek().is_none() {
            return Err(OptionsError::MissingRemapTarget);
        }
        Self::from_args(args)
    }
}
