//! Request signing primitives shared by the adapters.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Encodes parameter pairs as an `application/x-www-form-urlencoded` query
/// string, byte-identical to what the HTTP client sends. Signatures are
/// computed over this exact encoding.
pub(crate) fn encode_query(params: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

/// HMAC-SHA256 of the payload, hex-encoded (Binance style).
pub(crate) fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    hex::encode(digest(secret, payload))
}

/// HMAC-SHA256 of the payload, base64-encoded (OKX style).
pub(crate) fn hmac_sha256_base64(secret: &str, payload: &str) -> String {
    STANDARD.encode(digest(secret, payload))
}

fn digest(secret: &str, payload: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC should accept any key length");
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}
