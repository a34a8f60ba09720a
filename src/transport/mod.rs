use std::fmt;

use async_trait::async_trait;
use portable_atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::dtls_transport::dtls_role::DTLSRole;
use crate::error::Result;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::JsepSessionDescription;
use crate::rtp_transceiver::rtp_codec::RTPCodecType;

/// ChannelHandle identifies a media channel created by a
/// [`MediaChannelFactory`]. The negotiation core never looks inside it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u64);

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// TransportController owns ICE and DTLS. The negotiation core pushes every
/// applied description down to it and hands it remote candidates.
///
/// Pushing the same description twice must be a no-op.
#[async_trait]
pub trait TransportController {
    /// push_down_local_description applies the ICE and DTLS parameters of a
    /// local description.
    async fn push_down_local_description(
        &self,
        sdp_type: RTCSdpType,
        desc: &JsepSessionDescription,
    ) -> Result<()>;

    /// push_down_remote_description applies the ICE and DTLS parameters of a
    /// remote description.
    async fn push_down_remote_description(
        &self,
        sdp_type: RTCSdpType,
        desc: &JsepSessionDescription,
    ) -> Result<()>;

    /// add_remote_candidates starts using remote candidates for the
    /// transport of `mid`.
    async fn add_remote_candidates(&self, mid: &str, candidates: &[String]) -> Result<()>;

    /// get_dtls_role reports the role negotiated for the transport of `mid`,
    /// if the transport exists and has one.
    async fn get_dtls_role(&self, mid: &str) -> Option<DTLSRole>;

    /// local_fingerprint is the fingerprint of the local certificate. It is
    /// written into every offer and answer when DTLS is in use.
    fn local_fingerprint(&self) -> Option<RTCDtlsFingerprint>;

    /// rollback_transports discards transports created for a pending offer.
    async fn rollback_transports(&self) -> Result<()> {
        Ok(())
    }
}

/// MediaChannelFactory creates the media channels bound to negotiated
/// sections and the single data channel transport.
#[async_trait]
pub trait MediaChannelFactory {
    /// create_channel is only called for a non-rejected section without a
    /// bound channel. None reports a failure.
    async fn create_channel(&self, mid: &str, kind: RTPCodecType) -> Option<ChannelHandle>;

    async fn destroy_channel(&self, handle: ChannelHandle);

    /// create_data_channel_transport returns false on failure.
    async fn create_data_channel_transport(&self, mid: &str) -> bool;

    async fn destroy_data_channel_transport(&self, mid: &str);
}

/// CountingChannelFactory hands out sequential handles and keeps no other
/// state. It is the factory used when the application does not install one.
#[derive(Default, Debug)]
pub struct CountingChannelFactory {
    next: AtomicU64,
}

#[async_trait]
impl MediaChannelFactory for CountingChannelFactory {
    async fn create_channel(&self, mid: &str, kind: RTPCodecType) -> Option<ChannelHandle> {
        let handle = ChannelHandle(self.next.fetch_add(1, Ordering::SeqCst));
        log::trace!("created {} for {} section {}", handle, kind, mid);
        Some(handle)
    }

    async fn destroy_channel(&self, handle: ChannelHandle) {
        log::trace!("destroyed {}", handle);
    }

    async fn create_data_channel_transport(&self, _mid: &str) -> bool {
        true
    }

    async fn destroy_data_channel_transport(&self, _mid: &str) {}
}
