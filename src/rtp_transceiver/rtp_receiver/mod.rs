use smol_str::SmolStr;

use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::track::track_remote::TrackRemote;

/// RTPReceiver holds the remote track a transceiver delivers and the remote
/// streams that track is associated with.
#[derive(Debug, Clone)]
pub struct RTCRtpReceiver {
    pub(crate) id: SmolStr,
    pub(crate) kind: RTPCodecType,
    pub(crate) track: TrackRemote,
    pub(crate) stream_ids: Vec<SmolStr>,
}

impl RTCRtpReceiver {
    pub(crate) fn new(id: SmolStr, kind: RTPCodecType) -> Self {
        RTCRtpReceiver {
            track: TrackRemote::new(id.clone(), kind),
            id,
            kind,
            stream_ids: vec![],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    pub fn track(&self) -> &TrackRemote {
        &self.track
    }

    /// stream_ids are the remote streams the receiver track belongs to.
    pub fn stream_ids(&self) -> &[SmolStr] {
        &self.stream_ids
    }

    /// set_stream_ids replaces the associated remote streams and reports the
    /// streams added and removed by the change.
    pub(crate) fn set_stream_ids(
        &mut self,
        stream_ids: Vec<SmolStr>,
    ) -> (Vec<SmolStr>, Vec<SmolStr>) {
        let added = stream_ids
            .iter()
            .filter(|id| !self.stream_ids.contains(id))
            .cloned()
            .collect();
        let removed = self
            .stream_ids
            .iter()
            .filter(|id| !stream_ids.contains(id))
            .cloned()
            .collect();
        self.track.stream_ids = stream_ids.clone();
        self.stream_ids = stream_ids;
        (added, removed)
    }
}
