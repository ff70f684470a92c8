use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Auxiliary Prometheus text-exposition endpoint. Entirely separate from
/// the data-plane listener; its failure never affects connection handling.
pub async fn serve(addr: String, shutdown: CancellationToken) {
	let app = Router::new().route("/metrics", get(render_metrics));
	let listener = match tokio::net::TcpListener::bind(&addr).await {
		Ok(listener) => listener,
		Err(e) => {
			warn!(%addr, error = %e, "failed to bind metrics endpoint, continuing without it");
			return;
		}
	};
	info!(%addr, "metrics endpoint listening");

	let _ = axum::serve(listener, app)
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await;
}

async fn render_metrics() -> String {
	let metric_families = proxy_core::metrics::REGISTRY.gather();
	let encoder = TextEncoder::new();
	let mut buffer = Vec::new();
	if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
		tracing::error!(error = %e, "failed to encode metrics");
		return String::new();
	}
	String::from_utf8(buffer).unwrap_or_default()
}
