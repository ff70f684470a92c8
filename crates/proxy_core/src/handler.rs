use crate::authorizer::Authorizer;
use crate::error::HandlerError;
use crate::forwarder::{Forwarder, UpstreamHandle};
use crate::identity::{extract_identity, ClientIdentity};
use crate::limiter::{Admission, RateLimiter};
use crate::metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{self, AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Shared, read-only dependencies every connection handler needs. Cloned
/// (cheaply, via the inner `Arc`s) into each spawned handler task.
pub struct HandlerDeps {
	pub tls_acceptor: TlsAcceptor,
	pub limiter: Arc<RateLimiter>,
	pub authorizer: Arc<Authorizer>,
	pub forwarder: Arc<Forwarder>,
	pub dial_timeout: Duration,
	pub handshake_timeout: Duration,
}

/// Runs one client connection through the full handler lifecycle:
/// handshake -> identify -> rate-limit -> authorize -> pick -> dial ->
/// splice. Every `Err` returned here was already recovered locally by the
/// caller's perspective — it never unwinds past this function, it only
/// tells the caller what to log.
pub async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, deps: Arc<HandlerDeps>) -> Result<(), HandlerError> {
	metrics::CONNECTIONS_ACCEPTED.inc();

	let tls_stream = match timeout(deps.handshake_timeout, deps.tls_acceptor.accept(stream)).await {
		Ok(Ok(stream)) => stream,
		Ok(Err(e)) => {
			metrics::HANDSHAKE_FAILURES.inc();
			return Err(HandlerError::TlsHandshakeFailed(e));
		}
		Err(_) => {
			metrics::HANDSHAKE_FAILURES.inc();
			return Err(HandlerError::TlsHandshakeTimeout);
		}
	};

	let identity = identify_peer(&tls_stream)?;
	debug!(client_id = %identity.client_id, client_org = %identity.client_org, %peer_addr, "client identified");

	if deps.limiter.check(&identity.client_id) == Admission::Denied {
		metrics::RATE_LIMIT_REJECTIONS.inc();
		return Err(HandlerError::RateLimited);
	}

	let group_label = deps
		.authorizer
		.authorize(&identity.client_org)
		.ok_or_else(|| HandlerError::Unauthorized(identity.client_org.clone()))
		.inspect_err(|_| metrics::UNAUTHORIZED_REJECTIONS.inc())?
		.to_string();

	let upstream_handle = deps.forwarder.pick(&group_label)?;
	metrics::ACTIVE_CONNECTIONS.inc();
	let _release_gauge = scopeguard(&metrics::ACTIVE_CONNECTIONS);

	let upstream_stream = dial_upstream(&upstream_handle, deps.dial_timeout).await?;

	info!(client_id = %identity.client_id, group = %group_label, upstream = %upstream_handle.addr(), "forwarding connection");

	let result = splice(tls_stream, upstream_stream).await;
	drop(upstream_handle);

	result.map_err(|source| {
		metrics::FORWARD_ERRORS.inc();
		HandlerError::ForwardError(source)
	})
}

/// Logs a handler failure at the severity its kind warrants: client-caused
/// rejections (bad handshake, bad cert, rate limited, unauthorized) are
/// routine and logged at debug, while failures that indicate a
/// server-side or upstream problem (no upstream reachable, dial failed,
/// forwarding broke) are logged at warn.
pub fn log_handler_error(peer_addr: SocketAddr, error: &HandlerError) {
	match error {
		HandlerError::TlsHandshakeFailed(_) | HandlerError::TlsHandshakeTimeout => {
			debug!(%peer_addr, %error, "TLS handshake failed");
		}
		HandlerError::MissingOrInvalidCert(_) => {
			debug!(%peer_addr, %error, "client certificate rejected");
		}
		HandlerError::RateLimited => {
			debug!(%peer_addr, %error, "client rate limited");
		}
		HandlerError::Unauthorized(_) => {
			debug!(%peer_addr, %error, "client not authorized");
		}
		HandlerError::NoUpstream(_) => {
			warn!(%peer_addr, %error, "no upstream available");
		}
		HandlerError::DialFailed { .. } | HandlerError::DialTimeout(_) => {
			warn!(%peer_addr, %error, "failed to dial upstream");
		}
		HandlerError::ForwardError(_) => {
			warn!(%peer_addr, %error, "forwarding error");
		}
	}
}

fn identify_peer<IO>(tls_stream: &tokio_rustls::server::TlsStream<IO>) -> Result<ClientIdentity, HandlerError> {
	let (_, session) = tls_stream.get_ref();
	let leaf = session
		.peer_certificates()
		.and_then(|certs| certs.first())
		.ok_or_else(|| HandlerError::MissingOrInvalidCert("no peer certificate presented".to_string()))?;
	extract_identity(leaf.as_ref()).map_err(HandlerError::MissingOrInvalidCert)
}

async fn dial_upstream(handle: &UpstreamHandle, dial_timeout: Duration) -> Result<TcpStream, HandlerError> {
	match timeout(dial_timeout, TcpStream::connect(handle.addr())).await {
		Ok(Ok(stream)) => Ok(stream),
		Ok(Err(source)) => {
			metrics::DIAL_FAILURES.inc();
			Err(HandlerError::DialFailed { addr: handle.addr().to_string(), source })
		}
		Err(_) => {
			metrics::DIAL_FAILURES.inc();
			Err(HandlerError::DialTimeout(handle.addr().to_string()))
		}
	}
}

/// Bidirectionally forwards bytes between `client` and `upstream` and
/// returns as soon as either direction reaches EOF or errors — a full
/// close on both ends rather than `tokio::io::copy_bidirectional`'s
/// wait-for-both-to-finish semantics.
async fn splice<C>(client: C, upstream: TcpStream) -> io::Result<()>
where
	C: AsyncRead + AsyncWrite + Unpin,
{
	let (upstream_rd, upstream_wr) = upstream.into_split();
	splice_halves(client, upstream_rd, upstream_wr).await
}

async fn splice_halves<C, UR, UW>(client: C, mut upstream_rd: UR, mut upstream_wr: UW) -> io::Result<()>
where
	C: AsyncRead + AsyncWrite + Unpin,
	UR: AsyncRead + Unpin,
	UW: AsyncWrite + Unpin,
{
	let (mut client_rd, mut client_wr) = io::split(client);

	tokio::select! {
		result = io::copy(&mut client_rd, &mut upstream_wr) => result.map(|_| ()),
		result = io::copy(&mut upstream_rd, &mut client_wr) => result.map(|_| ()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	#[tokio::test]
	async fn splice_returns_as_soon_as_either_side_closes() {
		let (client, mut client_peer) = tokio::io::duplex(64);
		let (upstream_rd, mut upstream_wr_peer) = tokio::io::duplex(64);
		let (mut upstream_rd_peer, upstream_wr) = tokio::io::duplex(64);

		let splice_task = tokio::spawn(splice_halves(client, upstream_rd, upstream_wr));

		client_peer.write_all(b"hello").await.unwrap();
		let mut buf = [0u8; 5];
		upstream_rd_peer.read_exact(&mut buf).await.unwrap();
		assert_eq!(&buf, b"hello");

		// Closing just one side (the client) must be enough to end the splice,
		// even though the upstream side is still open.
		drop(client_peer);
		drop(upstream_wr_peer);

		let result = tokio::time::timeout(Duration::from_secs(5), splice_task).await;
		assert!(result.is_ok(), "splice did not terminate after one side closed");
	}
}

/// Minimal RAII decrement for the ambient active-connections gauge; this
/// mirrors the upstream slot's own release discipline but is purely
/// observational and never gates forwarding.
fn scopeguard(gauge: &'static prometheus::IntGauge) -> impl Drop {
	struct Guard(&'static prometheus::IntGauge);
	impl Drop for Guard {
		fn drop(&mut self) {
			self.0.dec();
		}
	}
	Guard(gauge)
}
