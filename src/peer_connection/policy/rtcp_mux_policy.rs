use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer_connection::sdp::JsepSessionDescription;

/// RTCPMuxPolicy affects what ICE candidates are gathered to support
/// non-multiplexed RTCP.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum RTCRtcpMuxPolicy {
    Unspecified = 0,

    /// Negotiate gathers for both RTP and RTCP and multiplexes only when the
    /// remote endpoint supports it.
    #[serde(rename = "negotiate")]
    Negotiate = 1,

    /// Require multiplexes RTCP on the RTP candidates. Descriptions with an
    /// active RTP section lacking rtcp-mux are refused.
    #[default]
    #[serde(rename = "require")]
    Require = 2,
}

const RTCP_MUX_POLICY_NEGOTIATE_STR: &str = "negotiate";
const RTCP_MUX_POLICY_REQUIRE_STR: &str = "require";

impl From<&str> for RTCRtcpMuxPolicy {
    fn from(raw: &str) -> Self {
        match raw {
            RTCP_MUX_POLICY_NEGOTIATE_STR => RTCRtcpMuxPolicy::Negotiate,
            RTCP_MUX_POLICY_REQUIRE_STR => RTCRtcpMuxPolicy::Require,
            _ => RTCRtcpMuxPolicy::Unspecified,
        }
    }
}

impl fmt::Display for RTCRtcpMuxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCRtcpMuxPolicy::Negotiate => RTCP_MUX_POLICY_NEGOTIATE_STR,
            RTCRtcpMuxPolicy::Require => RTCP_MUX_POLICY_REQUIRE_STR,
            RTCRtcpMuxPolicy::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RTCRtcpMuxPolicy {
    pub(crate) fn accepts(&self, desc: &JsepSessionDescription) -> bool {
        *self != RTCRtcpMuxPolicy::Require
            || desc
                .media_sections
                .iter()
                .filter(|m| !m.rejected && m.media_type.is_rtp())
                .all(|m| m.rtcp_mux)
    }
}
