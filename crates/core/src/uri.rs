//! Provisioning-URI model and output scraping for the linking handshake.

use url::Url;

use crate::error::{Result, SiglinkError};

const SCHEME: &str = "sgnl";
const IDENTITY_PARAM: &str = "uuid";
const PUB_KEY_PARAM: &str = "pub_key";

/// A parsed `sgnl://linkdevice?uuid=..&pub_key=..` link. The `uuid` query
/// parameter is the account identity token used for correlating the offered
/// and scanned sides of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningUri {
	raw: String,
	identity_token: String,
	pub_key: Option<String>,
}

impl ProvisioningUri {
	pub fn parse(raw: &str) -> Result<Self> {
		let raw = raw.trim();
		let invalid = |reason: &str| SiglinkError::InvalidLinkUri {
			uri: raw.to_string(),
			reason: reason.to_string(),
		};

		let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
		if url.scheme() != SCHEME {
			return Err(invalid(&format!("expected {SCHEME}:// scheme, got {}://", url.scheme())));
		}

		let mut identity_token = None;
		let mut pub_key = None;
		for (key, value) in url.query_pairs() {
			match key.as_ref() {
				IDENTITY_PARAM => identity_token = Some(value.into_owned()),
				PUB_KEY_PARAM => pub_key = Some(value.into_owned()),
				_ => {}
			}
		}

		let identity_token = identity_token.filter(|t| !t.is_empty()).ok_or_else(|| invalid("missing uuid parameter"))?;

		Ok(Self {
			raw: raw.to_string(),
			identity_token,
			pub_key,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.raw
	}

	pub fn identity_token(&self) -> &str {
		&self.identity_token
	}

	pub fn pub_key(&self) -> Option<&str> {
		self.pub_key.as_deref()
	}

	/// Correlation predicate: both URIs embed the same account identity.
	pub fn same_identity(&self, other: &ProvisioningUri) -> bool {
		self.identity_token == other.identity_token
	}
}

/// Scrapes the first provisioning URI out of free-form CLI output.
pub fn first_provisioning_uri(output: &str) -> Option<&str> {
	let prefix = format!("{SCHEME}://");
	output.split_whitespace().find(|token| token.starts_with(&prefix))
}

#[cfg(test)]
mod tests {
	use super::*;

	const URI: &str = "sgnl://linkdevice?uuid=ABCD&pub_key=XYZ";

	#[test]
	fn parses_identity_and_key() {
		let uri = ProvisioningUri::parse(URI).unwrap();
		assert_eq!(uri.identity_token(), "ABCD");
		assert_eq!(uri.pub_key(), Some("XYZ"));
		assert_eq!(uri.as_str(), URI);
	}

	#[test]
	fn surrounding_whitespace_is_trimmed() {
		let uri = ProvisioningUri::parse("  sgnl://linkdevice?uuid=ABCD&pub_key=XYZ\n").unwrap();
		assert_eq!(uri.as_str(), URI);
	}

	#[test]
	fn rejects_foreign_scheme() {
		let err = ProvisioningUri::parse("https://linkdevice?uuid=ABCD").unwrap_err();
		assert!(matches!(err, SiglinkError::InvalidLinkUri { .. }));
	}

	#[test]
	fn rejects_missing_identity() {
		let err = ProvisioningUri::parse("sgnl://linkdevice?pub_key=XYZ").unwrap_err();
		assert!(matches!(err, SiglinkError::InvalidLinkUri { .. }));
	}

	#[test]
	fn identity_correlation() {
		let a = ProvisioningUri::parse(URI).unwrap();
		let b = ProvisioningUri::parse("sgnl://linkdevice?uuid=ABCD&pub_key=OTHER").unwrap();
		let c = ProvisioningUri::parse("sgnl://linkdevice?uuid=EFGH&pub_key=XYZ").unwrap();
		assert!(a.same_identity(&b));
		assert!(!a.same_identity(&c));
	}

	#[test]
	fn scrapes_uri_out_of_banner_text() {
		let output = format!("Scan this QR code with your phone:\n{URI}\nWaiting...\n");
		assert_eq!(first_provisioning_uri(&output), Some(URI));
	}

	#[test]
	fn no_uri_in_output() {
		assert_eq!(first_provisioning_uri("nothing to see here"), None);
	}
}
