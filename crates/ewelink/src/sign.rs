use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::Sha256;

use crate::error::{EwelinkError, EwelinkResult};

type HmacSha256 = Hmac<Sha256>;

/// Sign a request body with the application secret.
///
/// The cloud expects the base64 encoded HMAC-SHA256 of the exact bytes sent,
/// in an `Authorization: Sign <signature>` header.
pub fn sign_payload(secret: &str, payload: &[u8]) -> EwelinkResult<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| EwelinkError::InvalidKey)?;
    mac.update(payload);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Random 8 character request nonce.
#[must_use]
pub fn nonce() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Random api key identifying this bridge on the local network.
#[must_use]
pub fn self_api_key() -> String {
    let bytes: [u8; 20] = rand::rng().random();
    hex::encode(bytes)
}
