mod metrics_server;

use anyhow::Context;
use proxy_core::config::{AuthzSpec, PoolSpec};
use proxy_core::handler::HandlerDeps;
use proxy_core::{tls, Authorizer, Forwarder, Pool, ProxyConfig, ProxyServer, RateLimiter};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &ProxyConfig) {
	let filter = config.rust_log.clone().map_or_else(|| EnvFilter::new("info"), EnvFilter::new);
	let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
	if config.log_json {
		subscriber.json().init();
	} else {
		subscriber.init();
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	dotenvy::dotenv().ok();

	let config = ProxyConfig::new();
	config.validate().context("invalid configuration")?;
	init_tracing(&config);

	proxy_core::metrics::register_all().context("failed to register metrics")?;

	let pool_spec = PoolSpec::load(&config.pool_config_path).context("failed to load pool config")?;
	let authz_spec = AuthzSpec::load(&config.authz_config_path).context("failed to load authorization config")?;

	let pool = Pool::from_spec(&pool_spec).context("failed to build upstream pool")?;
	let forwarder = Arc::new(Forwarder::new(Arc::new(pool)));
	let authorizer = Arc::new(Authorizer::new(authz_spec));
	let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.rate_window()));

	let tls_server_config = tls::load_server_config(&config.server_cert_path, &config.server_key_path, &config.client_ca_path)
		.context("failed to build TLS server configuration")?;
	let tls_acceptor = tokio_rustls::TlsAcceptor::from(tls_server_config);

	let shutdown = CancellationToken::new();
	let sweeper_handle = proxy_core::limiter::spawn_sweeper(Arc::clone(&limiter), config.rate_sweep_interval(), shutdown.clone());

	let deps = Arc::new(HandlerDeps {
		tls_acceptor,
		limiter,
		authorizer,
		forwarder,
		dial_timeout: config.dial_timeout(),
		handshake_timeout: config.handshake_timeout(),
	});

	let server = ProxyServer::bind(&config.bind_addr, deps, config.drain_timeout())
		.await
		.context("failed to bind listener")?;

	if let Some(metrics_addr) = config.metrics_addr.clone() {
		let metrics_shutdown = shutdown.clone();
		tokio::spawn(metrics_server::serve(metrics_addr, metrics_shutdown));
	}

	tokio::spawn({
		let shutdown = shutdown.clone();
		async move {
			let _ = tokio::signal::ctrl_c().await;
			info!("received ctrl-c, starting graceful shutdown");
			shutdown.cancel();
		}
	});

	server.run(shutdown).await;
	sweeper_handle.await.ok();

	Ok(())
}
