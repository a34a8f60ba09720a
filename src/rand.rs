use rand::{thread_rng, Rng};

pub(crate) const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub(crate) const RUNES_ALPHANUMERIC: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RUNES_BASE64: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/";

const LEN_UFRAG: usize = 16;
const LEN_PWD: usize = 32;
const LEN_ID: usize = 16;
// 30 bytes of SRTP master key and salt, base64 encoded
const LEN_SDES_KEY: usize = 40;

pub(crate) fn generate_crypto_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = thread_rng();

    (0..n)
        .map(|_| {
            let idx = rng.gen_range(0..runes.len());
            runes[idx] as char
        })
        .collect()
}

/// ICE user fragment.
pub(crate) fn generate_ufrag() -> String {
    generate_crypto_random_string(LEN_UFRAG, RUNES_ALPHA)
}

/// ICE password.
pub(crate) fn generate_pwd() -> String {
    generate_crypto_random_string(LEN_PWD, RUNES_ALPHA)
}

/// Random id used for senders, receivers and remote tracks that were not
/// signaled with one.
pub(crate) fn generate_id() -> String {
    generate_crypto_random_string(LEN_ID, RUNES_ALPHANUMERIC)
}

/// SDES key parameter in the `inline:` form of RFC 4568.
pub(crate) fn generate_sdes_key_params() -> String {
    format!(
        "inline:{}",
        generate_crypto_random_string(LEN_SDES_KEY, RUNES_BASE64)
    )
}

pub(crate) fn generate_ssrc() -> u32 {
    thread_rng().gen_range(1..u32::MAX)
}

/// o= session id, kept below 2^63 as RFC 3264 asks.
pub(crate) fn generate_session_id() -> u64 {
    thread_rng().gen_range(1..i64::MAX as u64)
}
