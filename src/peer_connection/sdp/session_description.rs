use serde::{Deserialize, Serialize};

use super::sdp_codec::{DefaultSdpCodec, SdpCodec};
use super::sdp_type::RTCSdpType;
use super::JsepSessionDescription;
use crate::error::Result;

/// SessionDescription is used to expose local and remote session descriptions.
///
/// ## Specifications
///
/// * [MDN]
/// * [W3C]
///
/// [MDN]: https://developer.mozilla.org/en-US/docs/Web/API/RTCSessionDescription
/// [W3C]: https://w3c.github.io/webrtc-pc/#rtcsessiondescription-class
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCSessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: RTCSdpType,

    pub sdp: String,

    /// This will never be initialized by callers, internal use only
    #[serde(skip)]
    pub(crate) parsed: Option<JsepSessionDescription>,
}

impl RTCSessionDescription {
    /// Given SDP representing an answer, wrap it in an RTCSessionDescription
    /// that can be given to an RTCPeerConnection.
    pub fn answer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::parse(RTCSdpType::Answer, sdp)
    }

    /// Given SDP representing an offer, wrap it in an RTCSessionDescription
    /// that can be given to an RTCPeerConnection.
    pub fn offer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::parse(RTCSdpType::Offer, sdp)
    }

    /// Given SDP representing an answer, wrap it in an RTCSessionDescription
    /// that can be given to an RTCPeerConnection. `pranswer` is used when the
    /// answer may not be final, or when updating a previously sent pranswer.
    pub fn pranswer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::parse(RTCSdpType::Pranswer, sdp)
    }

    /// rollback builds the description that cancels a pending offer.
    pub fn rollback() -> RTCSessionDescription {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Rollback,
            sdp: String::new(),
            parsed: None,
        }
    }

    fn parse(sdp_type: RTCSdpType, sdp: String) -> Result<RTCSessionDescription> {
        let mut desc = RTCSessionDescription {
            sdp,
            sdp_type,
            parsed: None,
        };

        let parsed = desc.unmarshal()?;
        desc.parsed = Some(parsed);

        Ok(desc)
    }

    /// Unmarshal is a helper to deserialize the sdp
    pub fn unmarshal(&self) -> Result<JsepSessionDescription> {
        DefaultSdpCodec.parse(&self.sdp)
    }

    /// parsed returns the structured description, if this description was
    /// created by a peer connection or one of the typed constructors.
    pub fn parsed(&self) -> Option<&JsepSessionDescription> {
        self.parsed.as_ref()
    }

    pub(crate) fn from_parsed(
        sdp_type: RTCSdpType,
        sdp: String,
        parsed: JsepSessionDescription,
    ) -> RTCSessionDescription {
        RTCSessionDescription {
            sdp_type,
            sdp,
            parsed: Some(parsed),
        }
    }
}
