
pub mod sdp_codec;
pub mod sdp_type;
pub mod session_description;

use std::collections::HashSet;
use std::fmt;

use sdp::util::ConnectionRole;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::rtp_transceiver::rtp_codec::{
    RTCRtpCodecParameters, RTCRtpHeaderExtensionParameters, RTPCodecType,
};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::SSRC;

pub(crate) const MEDIA_SECTION_APPLICATION: &str = "application";
pub(crate) const DEFAULT_SCTP_PORT: u16 = 5000;
pub(crate) const SDES_CRYPTO_SUITE: &str = "AES_CM_128_HMAC_SHA1_80";

/// MediaType is the kind of content a media section negotiates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "application")]
    Data,
}

impl MediaType {
    pub fn from_codec_type(kind: RTPCodecType) -> Option<MediaType> {
        match kind {
            RTPCodecType::Audio => Some(MediaType::Audio),
            RTPCodecType::Video => Some(MediaType::Video),
            RTPCodecType::Unspecified => None,
        }
    }

    /// codec_type is the transceiver kind carried by this section. Data
    /// sections have none.
    pub fn codec_type(&self) -> RTPCodecType {
        match self {
            MediaType::Audio => RTPCodecType::Audio,
            MediaType::Video => RTPCodecType::Video,
            MediaType::Data => RTPCodecType::Unspecified,
        }
    }

    pub fn is_rtp(&self) -> bool {
        *self != MediaType::Data
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Data => MEDIA_SECTION_APPLICATION,
        };
        write!(f, "{s}")
    }
}

/// TransportDescription holds the ICE and DTLS parameters of a section.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TransportDescription {
    pub ice_ufrag: String,
    pub ice_pwd: String,
    pub fingerprint: Option<RTCDtlsFingerprint>,
    pub connection_role: ConnectionRole,
    pub candidates: Vec<String>,
}

impl TransportDescription {
    /// ice_credentials_changed reports an ICE restart between two
    /// descriptions of the same transport.
    pub(crate) fn ice_credentials_changed(&self, other: &TransportDescription) -> bool {
        self.ice_ufrag != other.ice_ufrag || self.ice_pwd != other.ice_pwd
    }
}

/// CryptoParams is one `a=crypto` line of RFC 4568.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct CryptoParams {
    pub tag: u32,
    pub crypto_suite: String,
    pub key_params: String,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SimulcastRidParseError {
    /// SyntaxIdDirSplit indicates rid-syntax could not be parsed.
    #[error("RFC8851 mandates rid-syntax        = %s\"a=rid:\" rid-id SP rid-dir")]
    SyntaxIdDirSplit,
    /// UnknownDirection indicates rid-dir was not parsed. Should be "send" or "recv".
    #[error("RFC8851 mandates rid-dir           = %s\"send\" / %s\"recv\"")]
    UnknownDirection,
}

/// RidDirection tells whether a rid describes an encoding the section
/// author sends or receives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RidDirection {
    Send,
    Recv,
}

impl RidDirection {
    pub fn reverse(&self) -> RidDirection {
        match self {
            RidDirection::Send => RidDirection::Recv,
            RidDirection::Recv => RidDirection::Send,
        }
    }
}

impl TryFrom<&str> for RidDirection {
    type Error = SimulcastRidParseError;
    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "send" => Ok(RidDirection::Send),
            "recv" => Ok(RidDirection::Recv),
            _ => Err(SimulcastRidParseError::UnknownDirection),
        }
    }
}

impl fmt::Display for RidDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RidDirection::Send => write!(f, "send"),
            RidDirection::Recv => write!(f, "recv"),
        }
    }
}

/// RidDescription is one `a=rid` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RidDescription {
    pub rid: SmolStr,
    pub direction: RidDirection,
    pub params: String,
}

impl TryFrom<&str> for RidDescription {
    type Error = SimulcastRidParseError;
    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        let mut split = value.split(' ');
        let rid = split
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(SimulcastRidParseError::SyntaxIdDirSplit)?;
        let direction = RidDirection::try_from(
            split
                .next()
                .ok_or(SimulcastRidParseError::SyntaxIdDirSplit)?,
        )?;
        let params = split.collect::<Vec<&str>>().join(" ");

        Ok(RidDescription {
            rid: SmolStr::from(rid),
            direction,
            params,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulcastLayer {
    pub rid: SmolStr,
    pub paused: bool,
}

/// SimulcastDescription is the `a=simulcast` line of a section.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SimulcastDescription {
    pub send_layers: Vec<SimulcastLayer>,
    pub receive_layers: Vec<SimulcastLayer>,
}

impl SimulcastDescription {
    pub fn is_empty(&self) -> bool {
        self.send_layers.is_empty() && self.receive_layers.is_empty()
    }

    /// parse reads the value of an `a=simulcast` attribute. Alternatives are
    /// flattened into the layer list.
    pub(crate) fn parse(value: &str) -> SimulcastDescription {
        let mut desc = SimulcastDescription::default();
        let mut split = value.split(' ').filter(|s| !s.is_empty());
        while let (Some(dir), Some(list)) = (split.next(), split.next()) {
            let layers: Vec<SimulcastLayer> = list
                .split(';')
                .flat_map(|alt| alt.split(','))
                .filter(|s| !s.is_empty())
                .map(|id| match id.strip_prefix('~') {
                    Some(id) => SimulcastLayer {
                        rid: SmolStr::from(id),
                        paused: true,
                    },
                    None => SimulcastLayer {
                        rid: SmolStr::from(id),
                        paused: false,
                    },
                })
                .collect();
            match RidDirection::try_from(dir) {
                Ok(RidDirection::Send) => desc.send_layers.extend(layers),
                Ok(RidDirection::Recv) => desc.receive_layers.extend(layers),
                Err(err) => log::warn!("Failed to parse simulcast direction: {}", err),
            }
        }
        desc
    }

    pub(crate) fn marshal(&self) -> String {
        let list = |layers: &[SimulcastLayer]| -> String {
            layers
                .iter()
                .map(|l| {
                    if l.paused {
                        format!("~{}", l.rid)
                    } else {
                        l.rid.to_string()
                    }
                })
                .collect::<Vec<String>>()
                .join(";")
        };

        let mut parts = vec![];
        if !self.send_layers.is_empty() {
            parts.push(format!("send {}", list(&self.send_layers)));
        }
        if !self.receive_layers.is_empty() {
            parts.push(format!("recv {}", list(&self.receive_layers)));
        }
        parts.join(" ")
    }

    /// reverse describes the same layers from the peer's point of view.
    pub(crate) fn reverse(&self) -> SimulcastDescription {
        SimulcastDescription {
            send_layers: self.receive_layers.clone(),
            receive_layers: self.send_layers.clone(),
        }
    }
}

/// StreamParams describes one sender signaled in a section.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    /// track id
    pub id: SmolStr,
    pub stream_ids: Vec<SmolStr>,
    pub cname: String,
    pub ssrcs: Vec<SSRC>,
}

/// MediaSection is one `m=` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection {
    pub mid: SmolStr,
    pub media_type: MediaType,
    pub direction: RTCRtpTransceiverDirection,
    pub rejected: bool,
    pub rtcp_mux: bool,
    pub transport: TransportDescription,
    pub cryptos: Vec<CryptoParams>,
    pub streams: Vec<StreamParams>,
    pub rids: Vec<RidDescription>,
    pub simulcast: SimulcastDescription,
    pub codecs: Vec<RTCRtpCodecParameters>,
    pub header_extensions: Vec<RTCRtpHeaderExtensionParameters>,
    pub sctp_port: Option<u16>,
}

impl MediaSection {
    pub fn new(mid: SmolStr, media_type: MediaType) -> Self {
        MediaSection {
            mid,
            media_type,
            direction: RTCRtpTransceiverDirection::Sendrecv,
            rejected: false,
            rtcp_mux: true,
            transport: TransportDescription::default(),
            cryptos: vec![],
            streams: vec![],
            rids: vec![],
            simulcast: SimulcastDescription::default(),
            codecs: vec![],
            header_extensions: vec![],
            sctp_port: None,
        }
    }

    pub fn has_simulcast(&self) -> bool {
        !self.simulcast.is_empty()
    }

    pub fn has_rid_extension(&self) -> bool {
        self.header_extensions
            .iter()
            .any(|e| e.uri == crate::SDES_RTP_STREAM_ID_URI)
    }

    /// stream_ids are the stream ids of the first sender, the ones a receiver
    /// on this section is associated with.
    pub fn stream_ids(&self) -> Vec<SmolStr> {
        self.streams
            .first()
            .map(|s| s.stream_ids.clone())
            .unwrap_or_default()
    }

    pub(crate) fn rids_in_direction(&self, direction: RidDirection) -> Vec<SmolStr> {
        self.rids
            .iter()
            .filter(|r| r.direction == direction)
            .map(|r| r.rid.clone())
            .collect()
    }
}

/// JsepSessionDescription is the structured form of an offer or answer.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct JsepSessionDescription {
    pub session_id: u64,
    pub session_version: u64,
    pub media_sections: Vec<MediaSection>,
    pub bundle_groups: Vec<Vec<SmolStr>>,
    pub ice_lite: bool,
    pub extmap_allow_mixed: bool,
}

impl JsepSessionDescription {
    pub fn section_by_mid(&self, mid: &str) -> Option<&MediaSection> {
        self.media_sections.iter().find(|m| m.mid == mid)
    }

    pub fn section_index_by_mid(&self, mid: &str) -> Option<usize> {
        self.media_sections.iter().position(|m| m.mid == mid)
    }

    pub fn bundle_group_for(&self, mid: &str) -> Option<&Vec<SmolStr>> {
        self.bundle_groups
            .iter()
            .find(|g| g.iter().any(|m| m.as_str() == mid))
    }

    /// is_bundled_non_tag reports a section that shares the transport of the
    /// first section of its BUNDLE group.
    pub fn is_bundled_non_tag(&self, mid: &str) -> bool {
        match self.bundle_group_for(mid) {
            Some(group) => group.first().map(|tag| tag.as_str() != mid).unwrap_or(false),
            None => false,
        }
    }

    /// transport_for returns the transport a section actually uses, which is
    /// the tag section's one when the section is bundled.
    pub fn transport_for(&self, mid: &str) -> Option<&TransportDescription> {
        let mid = match self.bundle_group_for(mid).and_then(|g| g.first()) {
            Some(tag) => tag.as_str(),
            None => mid,
        };
        self.section_by_mid(mid).map(|m| &m.transport)
    }

    pub fn first_data_section(&self) -> Option<&MediaSection> {
        self.media_sections
            .iter()
            .find(|m| m.media_type == MediaType::Data)
    }

    /// add_candidate appends a candidate line to a section. Duplicates are
    /// ignored and reported with false.
    pub(crate) fn add_candidate(&mut self, index: usize, candidate: &str) -> bool {
        match self.media_sections.get_mut(index) {
            Some(m) if !m.transport.candidates.iter().any(|c| c == candidate) => {
                m.transport.candidates.push(candidate.to_owned());
                true
            }
            _ => false,
        }
    }
}

/// MidGenerator hands out numeric mids that were never seen before in this
/// session.
#[derive(Default, Debug)]
pub(crate) struct MidGenerator {
    known: HashSet<SmolStr>,
    counter: u64,
}

impl MidGenerator {
    pub(crate) fn add_known(&mut self, mid: &str) {
        if !mid.is_empty() {
            self.known.insert(SmolStr::from(mid));
        }
    }

    pub(crate) fn generate(&mut self) -> SmolStr {
        loop {
            let mid = SmolStr::from(self.counter.to_string());
            self.counter += 1;
            if self.known.insert(mid.clone()) {
                return mid;
            }
        }
    }
}
