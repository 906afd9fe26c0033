//! Query-API request signing (Signature Version 2, HmacSHA256).
//!
//! The canonical string is
//!
//! ```text
//! METHOD \n host \n path \n k1=v1&k2=v2...
//! ```
//!
//! with keys in lexicographic order and both sides percent-encoded. The
//! signature is `base64(HMAC-SHA256(secret, canonical))`, stored under
//! `Signature`. Any `Signature` already present is left out of the canonical
//! string, so signing the same parameters twice gives the same value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Credentials;
use crate::http::HttpMethod;
use crate::params::{encode_component, Params};

type HmacSha256 = Hmac<Sha256>;

/// Protocol version sent with every request.
pub const API_VERSION: &str = "2012-06-01";

/// Wire format of the `Timestamp` parameter.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const SIGNATURE_KEY: &str = "Signature";

/// Signs parameter sets with one pair of credentials.
#[derive(Debug, Clone)]
pub struct RequestSigner<'a> {
    credentials: &'a Credentials,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credentials: &'a Credentials) -> Self {
        Self { credentials }
    }

    /// Stamp `Version`, `Timestamp` and the auth fields (unless present),
    /// then compute and insert `Signature`. Returns the signature.
    ///
    /// Call this after every other parameter is final.
    pub fn sign(
        &self,
        method: &HttpMethod,
        host: &str,
        path: &str,
        params: &mut Params,
        timestamp: DateTime<Utc>,
    ) -> Result<String, InvalidLength> {
        params.insert_default("Version", API_VERSION);
        params.insert_default("Timestamp", timestamp.format(TIMESTAMP_FORMAT).to_string());
        params.insert("AWSAccessKeyId", self.credentials.access_key.as_str());
        params.insert("SignatureVersion", "2");
        params.insert("SignatureMethod", "HmacSHA256");

        let payload = canonical_string(method, host, path, params);
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret_key.as_bytes())?;
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        params.insert(SIGNATURE_KEY, signature.as_str());
        Ok(signature)
    }
}

/// The string the signature is computed over. Ignores `Signature`.
pub fn canonical_string(method: &HttpMethod, host: &str, path: &str, params: &Params) -> String {
    let joined = params
        .iter()
        .filter(|(k, _)| *k != SIGNATURE_KEY)
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}\n{host}\n{path}\n{joined}", method.as_str())
}
