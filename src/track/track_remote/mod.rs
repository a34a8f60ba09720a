use smol_str::SmolStr;

use crate::rtp_transceiver::rtp_codec::RTPCodecType;

/// TrackRemote represents a single inbound source of media as signaled by
/// the remote description. It is created when a transceiver starts
/// receiving and handed to the application through `on_track`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRemote {
    pub(crate) id: SmolStr,
    pub(crate) stream_ids: Vec<SmolStr>,
    pub(crate) kind: RTPCodecType,
    pub(crate) mid: Option<SmolStr>,
    pub(crate) rids: Vec<SmolStr>,
}

impl TrackRemote {
    pub(crate) fn new(id: SmolStr, kind: RTPCodecType) -> Self {
        TrackRemote {
            id,
            stream_ids: vec![],
            kind,
            mid: None,
            rids: vec![],
        }
    }

    /// id is the unique identifier for this Track.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// stream_id is the first media stream this track belongs to, or an empty
    /// string when the remote signaled none.
    pub fn stream_id(&self) -> &str {
        self.stream_ids.first().map(|s| s.as_str()).unwrap_or_default()
    }

    pub fn stream_ids(&self) -> &[SmolStr] {
        &self.stream_ids
    }

    /// kind gets the Kind of the track
    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// mid is the media section this track was received on.
    pub fn mid(&self) -> Option<&str> {
        self.mid.as_deref()
    }

    /// rids lists the simulcast layers the remote announced for this track.
    pub fn rids(&self) -> &[SmolStr] {
        &self.rids
    }
}
