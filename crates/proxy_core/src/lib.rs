pub mod authorizer;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod handler;
pub mod identity;
pub mod limiter;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod tls;

pub use authorizer::Authorizer;
pub use config::{AuthzSpec, PoolSpec, ProxyConfig};
pub use error::{ConfigError, HandlerError, PoolError};
pub use forwarder::{Forwarder, UpstreamHandle};
pub use handler::HandlerDeps;
pub use identity::ClientIdentity;
pub use limiter::{Admission, RateLimiter};
pub use pool::{Group, Pool, Upstream};
pub use server::ProxyServer;
