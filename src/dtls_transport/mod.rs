pub mod dtls_fingerprint;
pub mod dtls_role;
