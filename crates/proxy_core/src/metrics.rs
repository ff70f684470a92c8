use lazy_static::lazy_static;
use prometheus::{IntCounter, IntGauge, Registry};

lazy_static! {
	pub static ref REGISTRY: Registry = Registry::new();
	pub static ref CONNECTIONS_ACCEPTED: IntCounter =
		IntCounter::new("proxy_connections_accepted_total", "TCP connections accepted by the listener").unwrap();
	pub static ref HANDSHAKE_FAILURES: IntCounter =
		IntCounter::new("proxy_handshake_failures_total", "TLS handshakes that failed or timed out").unwrap();
	pub static ref RATE_LIMIT_REJECTIONS: IntCounter =
		IntCounter::new("proxy_rate_limit_rejections_total", "Connections rejected by the rate limiter").unwrap();
	pub static ref UNAUTHORIZED_REJECTIONS: IntCounter =
		IntCounter::new("proxy_unauthorized_rejections_total", "Connections rejected by the authorizer").unwrap();
	pub static ref DIAL_FAILURES: IntCounter =
		IntCounter::new("proxy_dial_failures_total", "Upstream dial attempts that failed or timed out").unwrap();
	pub static ref FORWARD_ERRORS: IntCounter =
		IntCounter::new("proxy_forward_errors_total", "Connections that ended due to a forwarding I/O error").unwrap();
	pub static ref ACTIVE_CONNECTIONS: IntGauge =
		IntGauge::new("proxy_active_connections", "Connections currently being forwarded").unwrap();
}

/// Registers every metric with `REGISTRY`. Idempotent only in the sense
/// that it is meant to be called exactly once, at startup; a second call
/// would fail on the duplicate registration.
pub fn register_all() -> prometheus::Result<()> {
	REGISTRY.register(Box::new(CONNECTIONS_ACCEPTED.clone()))?;
	REGISTRY.register(Box::new(HANDSHAKE_FAILURES.clone()))?;
	REGISTRY.register(Box::new(RATE_LIMIT_REJECTIONS.clone()))?;
	REGISTRY.register(Box::new(UNAUTHORIZED_REJECTIONS.clone()))?;
	REGISTRY.register(Box::new(DIAL_FAILURES.clone()))?;
	REGISTRY.register(Box::new(FORWARD_ERRORS.clone()))?;
	REGISTRY.register(Box::new(ACTIVE_CONNECTIONS.clone()))?;
	Ok(())
}
