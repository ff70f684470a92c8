use crate::error::ConfigError;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Operational configuration: a `clap::Parser` struct reading CLI flags
/// with `env` fallbacks, plus `serde` for the pieces that also round-trip
/// through a TOML file.
#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct ProxyConfig {
	/// Address the TLS listener binds to
	#[arg(long, env = "PROXY_BIND_ADDR", default_value = "0.0.0.0:8443")]
	pub bind_addr: String,

	/// Server certificate chain (PEM)
	#[arg(long, env = "PROXY_SERVER_CERT_PATH")]
	pub server_cert_path: String,

	/// Server private key (PEM)
	#[arg(long, env = "PROXY_SERVER_KEY_PATH")]
	pub server_key_path: String,

	/// CA bundle used to verify client certificates (mTLS)
	#[arg(long, env = "PROXY_CLIENT_CA_PATH")]
	pub client_ca_path: String,

	/// TOML file describing upstream groups
	#[arg(long, env = "PROXY_POOL_CONFIG_PATH")]
	pub pool_config_path: String,

	/// TOML file describing the clientOrg -> group authorization table
	#[arg(long, env = "PROXY_AUTHZ_CONFIG_PATH")]
	pub authz_config_path: String,

	/// Max admissions per client per window
	#[arg(long, env = "PROXY_RATE_LIMIT", default_value = "100")]
	pub rate_limit: u32,

	/// Rate limiter window, in seconds
	#[arg(long, env = "PROXY_RATE_WINDOW_SECS", default_value = "60")]
	pub rate_window_secs: u64,

	/// Rate limiter sweeper interval, in seconds; must be >= rate_window_secs
	#[arg(long, env = "PROXY_RATE_SWEEP_INTERVAL_SECS", default_value = "60")]
	pub rate_sweep_interval_secs: u64,

	/// Upstream dial timeout, in seconds
	#[arg(long, env = "PROXY_DIAL_TIMEOUT_SECS", default_value = "10")]
	pub dial_timeout_secs: u64,

	/// TLS handshake timeout, in seconds
	#[arg(long, env = "PROXY_HANDSHAKE_TIMEOUT_SECS", default_value = "10")]
	pub handshake_timeout_secs: u64,

	/// Graceful shutdown drain window, in seconds
	#[arg(long, env = "PROXY_DRAIN_TIMEOUT_SECS", default_value = "30")]
	pub drain_timeout_secs: u64,

	/// Emit JSON-formatted logs instead of compact text
	#[arg(long, env = "PROXY_LOG_JSON", default_value = "false")]
	pub log_json: bool,

	/// tracing-subscriber EnvFilter directive, e.g. "info,proxy_core=debug"
	#[arg(long, env = "RUST_LOG")]
	pub rust_log: Option<String>,

	/// Optional bind address for the Prometheus text-exposition endpoint
	#[arg(long, env = "PROXY_METRICS_ADDR")]
	pub metrics_addr: Option<String>,
}

impl ProxyConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::parse()
	}

	pub fn rate_window(&self) -> Duration {
		Duration::from_secs(self.rate_window_secs)
	}

	pub fn rate_sweep_interval(&self) -> Duration {
		Duration::from_secs(self.rate_sweep_interval_secs)
	}

	pub fn dial_timeout(&self) -> Duration {
		Duration::from_secs(self.dial_timeout_secs)
	}

	pub fn handshake_timeout(&self) -> Duration {
		Duration::from_secs(self.handshake_timeout_secs)
	}

	pub fn drain_timeout(&self) -> Duration {
		Duration::from_secs(self.drain_timeout_secs)
	}

	/// Validates cross-field invariants that are configuration
	/// preconditions rather than runtime checks: the sweeper must run no
	/// more often than once per window, and the limit must be reachable.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.rate_limit == 0 {
			return Err(ConfigError::NonPositiveLimit(self.rate_limit));
		}
		if self.rate_sweep_interval_secs < self.rate_window_secs {
			return Err(ConfigError::SweepIntervalTooShort {
				sweep_interval_secs: self.rate_sweep_interval_secs,
				window_secs: self.rate_window_secs,
			});
		}
		Ok(())
	}
}

/// Upstream group definitions as loaded from `pool_config_path`.
///
/// ```toml
/// [groups]
/// groupA = ["10.0.0.1:9000", "10.0.0.2:9000"]
/// groupB = ["10.0.1.1:9000"]
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PoolSpec {
	pub groups: HashMap<String, Vec<String>>,
}

impl PoolSpec {
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path_ref = path.as_ref();
		let raw = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
			path: path_ref.display().to_string(),
			source,
		})?;
		let spec: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
			path: path_ref.display().to_string(),
			source,
		})?;
		spec.validate()?;
		Ok(spec)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		const MAX_GROUP_MEMBERS: usize = 10;
		for (label, members) in &self.groups {
			if members.is_empty() {
				return Err(ConfigError::EmptyGroupDefinition(label.clone()));
			}
			if members.len() > MAX_GROUP_MEMBERS {
				return Err(ConfigError::GroupTooLarge {
					label: label.clone(),
					len: members.len(),
				});
			}
		}
		Ok(())
	}
}

/// Static clientOrg -> group-label authorization table, loaded from
/// `authz_config_path`.
///
/// ```toml
/// [orgs]
/// orgA = "groupA"
/// orgB = "groupB"
/// orgC = "groupC"
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AuthzSpec {
	pub orgs: HashMap<String, String>,
}

impl AuthzSpec {
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path_ref = path.as_ref();
		let raw = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
			path: path_ref.display().to_string(),
			source,
		})?;
		let spec: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
			path: path_ref.display().to_string(),
			source,
		})?;
		Ok(spec)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pool_spec_rejects_oversized_group() {
		let mut groups = HashMap::new();
		groups.insert("groupA".to_string(), (0..11).map(|i| format!("10.0.0.{i}:9000")).collect());
		let spec = PoolSpec { groups };
		assert!(matches!(spec.validate(), Err(ConfigError::GroupTooLarge { .. })));
	}

	#[test]
	fn pool_spec_rejects_empty_group() {
		let mut groups = HashMap::new();
		groups.insert("groupA".to_string(), vec![]);
		let spec = PoolSpec { groups };
		assert!(matches!(spec.validate(), Err(ConfigError::EmptyGroupDefinition(_))));
	}

	#[test]
	fn sweep_interval_must_not_be_shorter_than_window() {
		let config = ProxyConfig {
			bind_addr: "0.0.0.0:8443".into(),
			server_cert_path: String::new(),
			server_key_path: String::new(),
			client_ca_path: String::new(),
			pool_config_path: String::new(),
			authz_config_path: String::new(),
			rate_limit: 10,
			rate_window_secs: 60,
			rate_sweep_interval_secs: 30,
			dial_timeout_secs: 10,
			handshake_timeout_secs: 10,
			drain_timeout_secs: 30,
			log_json: false,
			rust_log: None,
			metrics_addr: None,
		};
		assert!(matches!(config.validate(), Err(ConfigError::SweepIntervalTooShort { .. })));
	}
}
