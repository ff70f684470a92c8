use crate::handler::{handle_connection, log_handler_error, HandlerDeps};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns the listener and the set of in-flight connection handlers. `run`
/// drives the acceptance loop until `shutdown` is cancelled, then waits up
/// to `drain_timeout` for outstanding handlers before returning.
pub struct ProxyServer {
	listener: TcpListener,
	deps: Arc<HandlerDeps>,
	drain_timeout: Duration,
}

impl ProxyServer {
	pub async fn bind(bind_addr: &str, deps: Arc<HandlerDeps>, drain_timeout: Duration) -> std::io::Result<Self> {
		let listener = TcpListener::bind(bind_addr).await?;
		info!(%bind_addr, "listening");
		Ok(Self { listener, deps, drain_timeout })
	}

	pub async fn run(self, shutdown: CancellationToken) {
		let mut tasks = JoinSet::new();

		loop {
			tokio::select! {
				_ = shutdown.cancelled() => {
					info!("shutdown signal received, no longer accepting connections");
					break;
				}
				accepted = self.listener.accept() => {
					match accepted {
						Ok((stream, peer_addr)) => {
							let deps = Arc::clone(&self.deps);
							tasks.spawn(async move {
								if let Err(e) = handle_connection(stream, peer_addr, deps).await {
									log_handler_error(peer_addr, &e);
								}
							});
						}
						Err(e) => {
							error!(error = %e, "failed to accept connection");
						}
					}
				}
			}
		}

		self.drain(tasks).await;
	}

	async fn drain(&self, mut tasks: JoinSet<()>) {
		if tasks.is_empty() {
			return;
		}
		info!(in_flight = tasks.len(), timeout_secs = self.drain_timeout.as_secs(), "draining in-flight connections");
		let drained = tokio::time::timeout(self.drain_timeout, async {
			while tasks.join_next().await.is_some() {}
		})
		.await;
		if drained.is_err() {
			warn!(remaining = tasks.len(), "drain window elapsed with connections still in flight");
		}
	}
}
