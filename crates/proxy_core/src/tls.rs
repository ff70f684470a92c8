use crate::error::ConfigError;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

/// Builds the server-side `rustls::ServerConfig` with mandatory client
/// certificate verification (mutual TLS). Client certs that don't chain to
/// `client_ca_path` are rejected during the handshake itself, before the
/// connection handler ever sees them.
pub fn load_server_config(server_cert_path: &str, server_key_path: &str, client_ca_path: &str) -> Result<Arc<ServerConfig>, ConfigError> {
	let cert_chain = load_certs(server_cert_path)?;
	let key = load_private_key(server_key_path)?;
	let client_roots = load_root_store(client_ca_path)?;

	let client_verifier = WebPkiClientVerifier::builder(Arc::new(client_roots))
		.build()
		.map_err(|e| ConfigError::CertLoad(format!("failed to build client verifier: {e}")))?;

	let config = ServerConfig::builder()
		.with_client_cert_verifier(client_verifier)
		.with_single_cert(cert_chain, key)
		.map_err(ConfigError::Tls)?;

	Ok(Arc::new(config))
}

fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, ConfigError> {
	let file = File::open(path).map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
	let mut reader = BufReader::new(file);
	certs(&mut reader)
		.collect::<Result<Vec<_>, _>>()
		.map_err(|e| ConfigError::CertLoad(format!("failed to parse certificate chain {path}: {e}")))
}

fn load_private_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>, ConfigError> {
	let file = File::open(path).map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
	let mut reader = BufReader::new(file);
	private_key(&mut reader)
		.map_err(|e| ConfigError::CertLoad(format!("failed to parse private key {path}: {e}")))?
		.ok_or_else(|| ConfigError::CertLoad(format!("no private key found in {path}")))
}

fn load_root_store(path: &str) -> Result<RootCertStore, ConfigError> {
	let mut store = RootCertStore::empty();
	for cert in load_certs(path)? {
		store
			.add(cert)
			.map_err(|e| ConfigError::CertLoad(format!("failed to add CA certificate from {path}: {e}")))?;
	}
	Ok(store)
}
