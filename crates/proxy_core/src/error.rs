use thiserror::Error;

/// Fatal startup errors. Anything surfaced here aborts the process with a
/// non-zero exit code before the acceptance loop is ever entered.
#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	Io { path: String, source: std::io::Error },

	#[error("failed to parse TOML config {path}: {source}")]
	Parse { path: String, source: toml::de::Error },

	#[error("rate limiter sweep_interval ({sweep_interval_secs}s) must be >= window ({window_secs}s)")]
	SweepIntervalTooShort { sweep_interval_secs: u64, window_secs: u64 },

	#[error("rate limiter limit must be a positive integer, got {0}")]
	NonPositiveLimit(u32),

	#[error("upstream group {label} has {len} members, exceeding the maximum of 10")]
	GroupTooLarge { label: String, len: usize },

	#[error("upstream group {0} has no members")]
	EmptyGroupDefinition(String),

	#[error("failed to load certificate/key material: {0}")]
	CertLoad(String),

	#[error("invalid TLS server configuration: {0}")]
	Tls(#[from] rustls::Error),

	#[error("failed to bind listener on {addr}: {source}")]
	Bind { addr: String, source: std::io::Error },
}

/// Errors from the upstream pool / forwarder. `GroupUnknown` indicates a
/// configuration bug (the authorizer produced a label the pool doesn't
/// have); `GroupEmpty` indicates a group was defined with zero members.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
	#[error("unknown upstream group: {0}")]
	GroupUnknown(String),

	#[error("upstream group {0} has no members")]
	GroupEmpty(String),
}

/// Per-connection handler errors. None of these ever escape the handler
/// task: the handler logs the failure locally and terminates, while the
/// acceptance loop keeps serving other connections.
#[derive(Error, Debug)]
pub enum HandlerError {
	#[error("TLS handshake failed: {0}")]
	TlsHandshakeFailed(#[source] std::io::Error),

	#[error("TLS handshake timed out")]
	TlsHandshakeTimeout,

	#[error("missing or invalid client certificate: {0}")]
	MissingOrInvalidCert(String),

	#[error("client rate limited")]
	RateLimited,

	#[error("client organization not authorized: {0}")]
	Unauthorized(String),

	#[error("no upstream available: {0}")]
	NoUpstream(#[from] PoolError),

	#[error("failed to dial upstream {addr}: {source}")]
	DialFailed { addr: String, source: std::io::Error },

	#[error("dial to upstream {0} timed out")]
	DialTimeout(String),

	#[error("error while forwarding: {0}")]
	ForwardError(#[source] std::io::Error),
}
