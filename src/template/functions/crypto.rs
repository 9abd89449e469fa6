use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use minijinja::Environment;
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub(super) fn register(env: &mut Environment<'static>) {
    env.add_function("md5", |s: String| format!("{:x}", md5::compute(s.as_bytes())));
    env.add_function("sha1", |s: String| hex::encode(Sha1::digest(s.as_bytes())));
    env.add_function("sha256", |s: String| sha256_hex(s.as_bytes()));
    env.add_function("base64Encode", |s: String| STANDARD.encode(s.as_bytes()));
    env.add_function("base64Decode", |s: String| base64_decode(&s));
    env.add_function("hexEncode", |s: String| hex::encode(s.as_bytes()));
    env.add_function("hexDecode", |s: String| hex_decode(&s));
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Undecodable input yields an empty string.
pub(crate) fn base64_decode(s: &str) -> String {
    STANDARD
        .decode(s.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

pub(crate) fn hex_decode(s: &str) -> String {
    hex::decode(s.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}
