#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// re-export the sdp crate backing the default codec
pub use sdp;

pub mod api;
pub mod data_channel;
pub mod dtls_transport;
pub mod error;
pub mod ice_transport;
pub mod peer_connection;
pub(crate) mod rand;
pub mod rtp_transceiver;
pub mod track;
pub mod transport;

pub use error::Error;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";

pub(crate) const SDP_ATTRIBUTE_RID: &str = "rid";
pub(crate) const SDP_ATTRIBUTE_SIMULCAST: &str = "simulcast";
pub(crate) const SDES_RTP_STREAM_ID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";
pub(crate) const SDES_REPAIR_RTP_STREAM_ID_URI: &str =
    "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id";
pub(crate) const SDES_MID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";
