use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::peer_connection::sdp::SimulcastLayer;
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::{RTCRtpEncodingParameters, SSRC};
use crate::track::track_local::TrackLocal;

/// RTPSender describes what a transceiver sends: the attached track, the
/// streams it is associated with and its simulcast layers.
#[derive(Debug, Clone)]
pub struct RTCRtpSender {
    pub(crate) id: SmolStr,
    pub(crate) kind: RTPCodecType,
    pub(crate) track: Option<Arc<dyn TrackLocal + Send + Sync>>,

    /// The id of the initial track, even if we later change to a different
    /// track id should be use when negotiating.
    pub(crate) initial_track_id: Option<SmolStr>,
    /// AssociatedMediaStreamIds from the WebRTC specifcations
    pub(crate) associated_media_stream_ids: Vec<SmolStr>,

    pub(crate) send_encodings: Vec<RTCRtpEncodingParameters>,
    pub(crate) ssrc: SSRC,
}

impl RTCRtpSender {
    pub(crate) fn new(
        id: SmolStr,
        kind: RTPCodecType,
        track: Option<Arc<dyn TrackLocal + Send + Sync>>,
        stream_ids: Vec<SmolStr>,
    ) -> Self {
        let initial_track_id = track.as_ref().map(|t| SmolStr::from(t.id()));
        RTCRtpSender {
            id,
            kind,
            track,
            initial_track_id,
            associated_media_stream_ids: stream_ids,
            send_encodings: vec![],
            ssrc: crate::rand::generate_ssrc(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// track returns the RTCRtpTransceiver track, or None
    pub fn track(&self) -> Option<&Arc<dyn TrackLocal + Send + Sync>> {
        self.track.as_ref()
    }

    pub fn stream_ids(&self) -> &[SmolStr] {
        &self.associated_media_stream_ids
    }

    pub fn send_encodings(&self) -> &[RTCRtpEncodingParameters] {
        &self.send_encodings
    }

    /// track_id is the id signaled in a=msid for this sender.
    pub(crate) fn track_id(&self) -> SmolStr {
        match (&self.track, &self.initial_track_id) {
            (Some(t), _) => SmolStr::from(t.id()),
            (None, Some(initial)) => initial.clone(),
            (None, None) => self.id.clone(),
        }
    }

    pub(crate) fn replace_track(&mut self, track: Option<Arc<dyn TrackLocal + Send + Sync>>) {
        if let Some(t) = &track {
            if self.initial_track_id.is_none() {
                self.initial_track_id = Some(SmolStr::from(t.id()));
            }
        }
        self.track = track;
    }

    pub(crate) fn set_stream_ids(&mut self, stream_ids: Vec<SmolStr>) {
        self.associated_media_stream_ids = stream_ids;
    }

    /// set_send_encodings installs the simulcast layers. Every layer of a
    /// multi-layer sender needs a unique rid.
    pub(crate) fn set_send_encodings(
        &mut self,
        encodings: Vec<RTCRtpEncodingParameters>,
    ) -> Result<()> {
        if encodings.len() > 1 {
            for (i, e) in encodings.iter().enumerate() {
                if e.rid.is_empty() {
                    return Err(Error::ErrRTPSenderRidNil);
                }
                if encodings[..i].iter().any(|prev| prev.rid == e.rid) {
                    return Err(Error::ErrRTPSenderRIDCollision);
                }
            }
        }
        self.send_encodings = encodings;
        Ok(())
    }

    /// send_rids lists the rids offered for simulcast. A single layer is sent
    /// without rid signaling.
    pub(crate) fn send_rids(&self) -> Vec<(SmolStr, bool)> {
        if self.send_encodings.len() < 2 {
            return vec![];
        }
        self.send_encodings
            .iter()
            .map(|e| (e.rid.clone(), !e.active))
            .collect()
    }

    /// disable_simulcast keeps the first encoding only, sent without a rid.
    pub(crate) fn disable_simulcast(&mut self) {
        if self.send_encodings.len() > 1 {
            log::debug!(
                "Disabling simulcast on sender {}, dropping {} layers",
                self.id,
                self.send_encodings.len() - 1
            );
            self.send_encodings.truncate(1);
            self.send_encodings[0].rid = SmolStr::default();
        }
    }

    /// update_simulcast_layers applies the negotiated layer list: layers
    /// missing from it are dropped, the rest follow its paused flags.
    pub(crate) fn update_simulcast_layers(&mut self, layers: &[SimulcastLayer]) {
        if layers.iter().all(|l| l.rid.is_empty()) {
            return;
        }
        self.send_encodings
            .retain(|e| layers.iter().any(|l| l.rid == e.rid));
        for e in self.send_encodings.iter_mut() {
            if let Some(layer) = layers.iter().find(|l| l.rid == e.rid) {
                e.active = !layer.paused;
            }
        }
    }
}
