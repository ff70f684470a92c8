use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

/// Identity extracted from a verified client certificate: the leaf's
/// `Subject.CommonName` and the first `Subject.Organization` value. Client
/// certificates that lack either field are rejected at the handshake
/// boundary, not carried forward as a partial identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
	pub client_id: String,
	pub client_org: String,
}

/// Pulls `ClientIdentity` out of the DER-encoded leaf certificate presented
/// during the handshake. Only the first certificate in the chain (the
/// client's own leaf) is inspected; `rustls`'s `WebPkiClientVerifier` has
/// already validated the chain against the configured CA by the time this
/// runs.
pub fn extract_identity(leaf_der: &[u8]) -> Result<ClientIdentity, String> {
	let (_, cert) = X509Certificate::from_der(leaf_der).map_err(|e| format!("malformed certificate: {e}"))?;

	let client_id = common_name(&cert).ok_or_else(|| "certificate subject has no CommonName".to_string())?;
	let client_org = organization(&cert).ok_or_else(|| "certificate subject has no Organization".to_string())?;

	Ok(ClientIdentity { client_id, client_org })
}

/// A present-but-empty RDN value is treated the same as an absent one —
/// an empty CommonName is a bad certificate, not a valid (if degenerate)
/// client identity.
fn common_name(cert: &X509Certificate<'_>) -> Option<String> {
	cert.subject()
		.iter_common_name()
		.next()
		.and_then(|attr| attr.as_str().ok())
		.filter(|s| !s.is_empty())
		.map(str::to_owned)
}

/// Only the first Organization RDN value is used; a certificate naming
/// multiple organizations would make authorization ambiguous, so later
/// values are ignored rather than merged. As with the CommonName, an
/// empty value is treated as absent.
fn organization(cert: &X509Certificate<'_>) -> Option<String> {
	cert.subject()
		.iter_organization()
		.next()
		.and_then(|attr| attr.as_str().ok())
		.filter(|s| !s.is_empty())
		.map(str::to_owned)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_garbage_der() {
		let err = extract_identity(&[0x00, 0x01, 0x02]).unwrap_err();
		assert!(err.contains("malformed certificate"));
	}
}
