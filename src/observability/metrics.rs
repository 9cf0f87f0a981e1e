//! Metrics collection and exposition.
//!
//! # Metrics
//! - `authproxy_decisions_total` (counter): authorization outcomes by `outcome`
//! - `authproxy_auth_duration_seconds` (histogram): time spent authorizing
//! - `authproxy_requests_total` (counter): client responses by `status`
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing when metrics are disabled.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// How an authorization attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Authorized,
    /// Failed closed with the fixed 403.
    Unauthorized,
    /// The auth service's own denial went to the client.
    Relayed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Authorized => "authorized",
            Outcome::Unauthorized => "unauthorized",
            Outcome::Relayed => "denied",
        }
    }
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("authproxy_decisions_total", "Authorization outcomes");
    describe_histogram!(
        "authproxy_auth_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent authorizing a request"
    );
    describe_counter!("authproxy_requests_total", "Client responses by status");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_decision(outcome: Outcome) {
    counter!("authproxy_decisions_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_auth_duration(start: Instant) {
    histogram!("authproxy_auth_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_request(status: u16) {
    counter!("authproxy_requests_total", "status" => status.to_string()).increment(1);
}
