use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_server::RTCIceServer;
use crate::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use crate::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use crate::peer_connection::policy::sdp_semantics::RTCSdpSemantics;

pub(crate) const MAX_ICE_CANDIDATE_POOL_SIZE: u32 = u16::MAX as u32;

/// RTCCryptoOptions selects the SRTP protection profiles offered. They are
/// frozen once a local description has been applied.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCCryptoOptions {
    pub enable_gcm_crypto_suites: bool,
    pub enable_aes128_sha1_32_crypto_cipher: bool,
    pub enable_encrypted_rtp_header_extensions: bool,
}

/// Defines a set of parameters to configure how the peer-to-peer communication via
/// [`RTCPeerConnection`] is established or re-established. These may be set up once
/// and reused across multiple connections, and are treated as readonly. As long as
/// they are unmodified, they are safe for concurrent use.
///
/// [`RTCPeerConnection`]: crate::peer_connection::RTCPeerConnection
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCConfiguration {
    /// Defines a slice describing servers available to be used by
    /// ICE, such as STUN and TURN servers.
    pub ice_servers: Vec<RTCIceServer>,

    /// Indicates which candidates the ICE Agent is allowed
    /// to use.
    pub ice_transport_policy: RTCIceTransportPolicy,

    /// Indicates which media-bundling policy to use when gathering
    /// ICE candidates.
    pub bundle_policy: RTCBundlePolicy,

    /// Indicates which rtcp-mux policy to use when gathering ICE
    /// candidates.
    pub rtcp_mux_policy: RTCRtcpMuxPolicy,

    /// The size of the prefetched ICE pool, as defined in
    /// [RFC8829](https://www.rfc-editor.org/rfc/rfc8829).
    pub ice_candidate_pool_size: u32,

    pub crypto_options: RTCCryptoOptions,

    pub sdp_semantics: RTCSdpSemantics,

    /// enable_implicit_rollback lets a remote offer that arrives while a
    /// local offer is outstanding roll the local offer back instead of
    /// failing with glare.
    pub enable_implicit_rollback: bool,
}

impl RTCConfiguration {
    /// validate checks the fields that can be checked without comparing
    /// against a previous configuration.
    pub(crate) fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            server.validate()?;
        }
        if self.ice_candidate_pool_size > MAX_ICE_CANDIDATE_POOL_SIZE {
            return Err(Error::ErrICECandidatePoolSizeOutOfRange);
        }
        Ok(())
    }

    /// check_modification validates `next` as a replacement of `self`.
    /// Pool size and crypto options freeze once a local description exists.
    pub(crate) fn check_modification(
        &self,
        next: &RTCConfiguration,
        has_local_description: bool,
    ) -> Result<()> {
        if has_local_description {
            if next.ice_candidate_pool_size != self.ice_candidate_pool_size {
                return Err(Error::ErrModifyingICECandidatePoolSize);
            }
            if next.crypto_options != self.crypto_options {
                return Err(Error::ErrModifyingCryptoOptions);
            }
        }

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #5)
        if next.bundle_policy != self.bundle_policy {
            return Err(Error::ErrModifyingBundlePolicy);
        }

        // https://www.w3.org/TR/webrtc/#set-the-configuration (step #6)
        if next.rtcp_mux_policy != self.rtcp_mux_policy {
            return Err(Error::ErrModifyingRTCPMuxPolicy);
        }

        if next.sdp_semantics != self.sdp_semantics {
            return Err(Error::ErrModifyingSdpSemantics);
        }

        Ok(())
    }

    /// needs_ice_restart reports a change that only takes effect with new
    /// ICE credentials.
    pub(crate) fn needs_ice_restart(&self, next: &RTCConfiguration) -> bool {
        self.ice_servers != next.ice_servers
            || self.ice_transport_policy != next.ice_transport_policy
    }
}
