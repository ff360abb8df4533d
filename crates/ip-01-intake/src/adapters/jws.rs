//! HS256 compact JWS verification.
//!
//! Token layout: `base64url(header) . base64url(payload) . base64url(mac)`,
//! where `mac = HMAC-SHA256(key, "header.payload")`. Only `alg: HS256` is
//! accepted.

use crate::domain::errors::VerifierError;
use crate::ports::outbound::TokenVerifier;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SUPPORTED_ALGORITHM: &str = "HS256";

#[derive(Deserialize)]
struct JoseHeader {
    alg: String,
}

pub struct HmacJwsVerifier {
    key: Vec<u8>,
}

impl HmacJwsVerifier {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self) -> Result<HmacSha256, VerifierError> {
        if self.key.is_empty() {
            return Err(VerifierError::Unavailable(
                "no verification key configured".to_string(),
            ));
        }
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| VerifierError::Unavailable(e.to_string()))
    }

    /// Produce a token over `payload`. Used by fixtures and the spool tooling.
    pub fn sign(&self, payload: &[u8]) -> Result<String, VerifierError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload);
        let signing_input = format!("{header}.{body}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }
}

impl TokenVerifier for HmacJwsVerifier {
    fn verify(&self, token: &str) -> Result<(), VerifierError> {
        let mut parts = token.trim().split('.');
        let (Some(header), Some(body), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VerifierError::BadSignature(
                "token is not a compact JWS".to_string(),
            ));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|e| VerifierError::BadSignature(format!("invalid header encoding: {e}")))?;
        let jose: JoseHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| VerifierError::BadSignature(format!("invalid header: {e}")))?;
        if jose.alg != SUPPORTED_ALGORITHM {
            return Err(VerifierError::BadSignature(format!(
                "unsupported algorithm {}",
                jose.alg
            )));
        }

        URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| VerifierError::BadSignature(format!("invalid payload encoding: {e}")))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| VerifierError::BadSignature(format!("invalid signature encoding: {e}")))?;

        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| VerifierError::BadSignature("signature mismatch".to_string()))
    }
}
