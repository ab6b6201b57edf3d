use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Header LINE puts the body signature in.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

type HmacSha256 = Hmac<Sha256>;

/// Base64 encoded HMAC-SHA256 of the body, keyed with the channel secret.
#[cfg_attr(not(test), allow(dead_code))]
pub fn sign(body: &[u8], channel_secret: &str) -> String {
    general_purpose::STANDARD.encode(digest(body, channel_secret))
}

/// Checks a webhook body against the value of the `x-line-signature` header.
///
/// The header is decoded and compared as raw MAC bytes in constant time, so the
/// position of a mismatch can't be observed. Anything that isn't a valid
/// signature (missing, empty, malformed base64) is rejected.
pub fn verify_signature(body: &[u8], signature: Option<&str>, channel_secret: &str) -> bool {
    let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    let Ok(provided) = general_purpose::STANDARD.decode(signature) else {
        return false;
    };

    let expected = digest(body, channel_secret);
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

fn digest(body: &[u8], channel_secret: &str) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .expect("HMAC can take a key of any size");
    mac.update(body);

    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}
