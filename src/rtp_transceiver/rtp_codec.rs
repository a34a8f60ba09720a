use std::fmt;

use serde::{Deserialize, Serialize};

use super::PayloadType;

pub const MIME_TYPE_OPUS: &str = "audio/opus";
pub const MIME_TYPE_PCMU: &str = "audio/PCMU";
pub const MIME_TYPE_PCMA: &str = "audio/PCMA";
pub const MIME_TYPE_VP8: &str = "video/VP8";
pub const MIME_TYPE_VP9: &str = "video/VP9";
pub const MIME_TYPE_H264: &str = "video/H264";

/// RTPCodecType determines the kind of media a transceiver carries.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RTPCodecType {
    #[default]
    Unspecified = 0,

    /// RTPCodecTypeAudio indicates this is an audio codec
    #[serde(rename = "audio")]
    Audio = 1,

    /// RTPCodecTypeVideo indicates this is a video codec
    #[serde(rename = "video")]
    Video = 2,
}

impl From<&str> for RTPCodecType {
    fn from(raw: &str) -> Self {
        match raw {
            "audio" => RTPCodecType::Audio,
            "video" => RTPCodecType::Video,
            _ => RTPCodecType::Unspecified,
        }
    }
}

impl fmt::Display for RTPCodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTPCodecType::Audio => "audio",
            RTPCodecType::Video => "video",
            RTPCodecType::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

/// RTCRtpCodecCapability provides information about codec capabilities.
/// <https://w3c.github.io/webrtc-pc/#dictionary-rtcrtpcodeccapability-members>
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpCodecCapability {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: String,
}

impl RTCRtpCodecCapability {
    /// encoding_name strips the kind prefix from the mime type, the form used
    /// on rtpmap lines.
    pub fn encoding_name(&self) -> &str {
        match self.mime_type.split_once('/') {
            Some((_, name)) => name,
            None => &self.mime_type,
        }
    }
}

/// RTCRtpHeaderExtensionCapability is used to define a RFC5285 RTP header
/// extension supported by the codec.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpHeaderExtensionCapability {
    pub uri: String,
}

/// RTCRtpHeaderExtensionParameters represents a negotiated RFC5285 RTP header extension.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpHeaderExtensionParameters {
    pub uri: String,
    pub id: u16,
}

/// RTCRtpCodecParameters is a codec together with the payload type it is
/// signaled with.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpCodecParameters {
    pub capability: RTCRtpCodecCapability,
    pub payload_type: PayloadType,
}

/// default_codecs is the codec list offered for a kind when the transceiver
/// has no codec preferences.
pub(crate) fn default_codecs(kind: RTPCodecType) -> Vec<RTCRtpCodecParameters> {
    match kind {
        RTPCodecType::Audio => vec![
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                },
                payload_type: 111,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_PCMU.to_owned(),
                    clock_rate: 8000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                },
                payload_type: 0,
            },
        ],
        RTPCodecType::Video => vec![
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                },
                payload_type: 96,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_H264.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line:
                        "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                            .to_owned(),
                },
                payload_type: 102,
            },
        ],
        RTPCodecType::Unspecified => vec![],
    }
}

/// default_header_extensions lists the extensions every section of `kind`
/// negotiates. Video carries the RID extensions needed for simulcast.
pub(crate) fn default_header_extensions(
    kind: RTPCodecType,
) -> Vec<RTCRtpHeaderExtensionParameters> {
    let mut extensions = vec![RTCRtpHeaderExtensionParameters {
        uri: crate::SDES_MID_URI.to_owned(),
        id: 1,
    }];
    if kind == RTPCodecType::Video {
        extensions.push(RTCRtpHeaderExtensionParameters {
            uri: crate::SDES_RTP_STREAM_ID_URI.to_owned(),
            id: 2,
        });
        extensions.push(RTCRtpHeaderExtensionParameters {
            uri: crate::SDES_REPAIR_RTP_STREAM_ID_URI.to_owned(),
            id: 3,
        });
    }
    extensions
}

/// codecs_intersection keeps the offered codecs that match one of the local
/// codecs by name, clock rate and channel count. The offered payload types
/// are kept so the answer mirrors the offer.
pub(crate) fn codecs_intersection(
    offered: &[RTCRtpCodecParameters],
    local: &[RTCRtpCodecParameters],
) -> Vec<RTCRtpCodecParameters> {
    offered
        .iter()
        .filter(|o| {
            local.iter().any(|l| {
                l.capability.mime_type.eq_ignore_ascii_case(&o.capability.mime_type)
                    && l.capability.clock_rate == o.capability.clock_rate
                    && l.capability.channels == o.capability.channels
            })
        })
        .cloned()
        .collect()
}
