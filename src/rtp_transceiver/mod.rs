
use std::fmt;

use log::trace;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::rtp_transceiver::rtp_codec::*;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::transport::ChannelHandle;

pub mod rtp_codec;
pub mod rtp_receiver;
pub mod rtp_sender;
pub mod rtp_transceiver_direction;

/// SSRC represents a synchronization source
/// A synchronization source is a randomly chosen
/// value meant to be globally unique within a particular
/// RTP session. Used to identify a single stream of media.
/// <https://tools.ietf.org/html/rfc3550#section-3>
#[allow(clippy::upper_case_acronyms)]
pub type SSRC = u32;

/// PayloadType identifies the format of the RTP payload and determines
/// its interpretation by the application. Each codec in a RTP Session
/// will have a different PayloadType
/// <https://tools.ietf.org/html/rfc3550#section-3>
pub type PayloadType = u8;

/// TransceiverId is the opaque handle a transceiver is addressed by. It stays
/// valid for the life of the transceiver and is never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransceiverId(pub(crate) u64);

impl fmt::Display for TransceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transceiver-{}", self.0)
    }
}

/// RTPEncodingParameters describes one simulcast layer of a sender.
/// <http://draft.ortc.org/#dom-rtcrtpencodingparameters>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpEncodingParameters {
    pub rid: SmolStr,
    pub active: bool,
    pub ssrc: SSRC,
}

impl Default for RTCRtpEncodingParameters {
    fn default() -> Self {
        RTCRtpEncodingParameters {
            rid: SmolStr::default(),
            active: true,
            ssrc: 0,
        }
    }
}

/// RTPTransceiverInit dictionary is used when calling the WebRTC function addTransceiver() to provide configuration options for the new transceiver.
#[derive(Default, Debug, Clone)]
pub struct RTCRtpTransceiverInit {
    pub direction: RTCRtpTransceiverDirection,
    pub send_encodings: Vec<RTCRtpEncodingParameters>,
    pub stream_ids: Vec<String>,
}

/// RTPTransceiver represents a combination of an RTPSender and an RTPReceiver
/// that share a common mid.
///
/// Transceivers live in the registry owned by the peer connection and are
/// handed out to the application as snapshots.
#[derive(Debug, Clone)]
pub struct RTCRtpTransceiver {
    pub(crate) id: TransceiverId,
    pub(crate) kind: RTPCodecType,

    pub(crate) mid: Option<SmolStr>,
    pub(crate) mline_index: Option<usize>,

    pub(crate) direction: RTCRtpTransceiverDirection,
    pub(crate) current_direction: Option<RTCRtpTransceiverDirection>,
    pub(crate) fired_direction: Option<RTCRtpTransceiverDirection>,

    pub(crate) stopping: bool,
    pub(crate) stopped: bool,

    pub(crate) created_by_addtrack: bool,
    pub(crate) reused_for_addtrack: bool,
    pub(crate) has_ever_been_used_to_send: bool,

    pub(crate) sender: RTCRtpSender,
    pub(crate) receiver: RTCRtpReceiver,

    pub(crate) channel: Option<ChannelHandle>,

    // User provided codecs via set_codec_preferences
    pub(crate) codec_preferences: Vec<RTCRtpCodecParameters>,
    pub(crate) header_extensions: Vec<RTCRtpHeaderExtensionParameters>,
}

impl RTCRtpTransceiver {
    pub(crate) fn new(
        id: TransceiverId,
        kind: RTPCodecType,
        direction: RTCRtpTransceiverDirection,
        sender: RTCRtpSender,
        receiver: RTCRtpReceiver,
    ) -> Self {
        RTCRtpTransceiver {
            id,
            kind,
            mid: None,
            mline_index: None,
            direction,
            current_direction: None,
            fired_direction: None,
            stopping: false,
            stopped: false,
            created_by_addtrack: false,
            reused_for_addtrack: false,
            has_ever_been_used_to_send: false,
            sender,
            receiver,
            channel: None,
            codec_preferences: vec![],
            header_extensions: default_header_extensions(kind),
        }
    }

    pub fn id(&self) -> TransceiverId {
        self.id
    }

    /// kind returns RTPTransceiver's kind.
    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// mid gets the Transceiver's mid value. Set once the transceiver is
    /// associated with a media section.
    pub fn mid(&self) -> Option<&SmolStr> {
        self.mid.as_ref()
    }

    pub fn mline_index(&self) -> Option<usize> {
        self.mline_index
    }

    /// direction returns the RTPTransceiver's desired direction.
    pub fn direction(&self) -> RTCRtpTransceiverDirection {
        self.direction
    }

    /// current_direction returns the direction as negotiated by the last
    /// applied answer, if any.
    pub fn current_direction(&self) -> Option<RTCRtpTransceiverDirection> {
        self.current_direction
    }

    /// fired_direction is the direction remote tracks were last fired for.
    pub fn fired_direction(&self) -> Option<RTCRtpTransceiverDirection> {
        self.fired_direction
    }

    pub fn stopping(&self) -> bool {
        self.stopping
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }

    pub fn sender(&self) -> &RTCRtpSender {
        &self.sender
    }

    pub fn receiver(&self) -> &RTCRtpReceiver {
        &self.receiver
    }

    /// channel is the media channel bound for the associated section.
    pub fn channel(&self) -> Option<ChannelHandle> {
        self.channel
    }

    pub fn codec_preferences(&self) -> &[RTCRtpCodecParameters] {
        &self.codec_preferences
    }

    /// codecs returns the codecs offered for this transceiver.
    pub(crate) fn codecs(&self) -> Vec<RTCRtpCodecParameters> {
        if self.codec_preferences.is_empty() {
            default_codecs(self.kind)
        } else {
            self.codec_preferences.clone()
        }
    }

    pub(crate) fn set_direction_internal(&mut self, d: RTCRtpTransceiverDirection) -> bool {
        let previous = self.direction;
        let changed = d != previous;
        if changed {
            trace!(
                "Changing direction of transceiver {} from {} to {}",
                self.id,
                previous,
                d
            );
            self.direction = d;
        }
        changed
    }

    pub(crate) fn set_current_direction(&mut self, d: RTCRtpTransceiverDirection) {
        if self.current_direction != Some(d) {
            trace!(
                "Changing current direction of transceiver {} from {:?} to {}",
                self.id,
                self.current_direction,
                d,
            );
        }
        self.current_direction = Some(d);
        if d.has_send() {
            self.has_ever_been_used_to_send = true;
        }
    }

    pub(crate) fn set_fired_direction(&mut self, d: Option<RTCRtpTransceiverDirection>) {
        self.fired_direction = d;
    }

    /// stop_sending_and_receiving marks the transceiver as stopping. The
    /// transceiver still holds its section until the next negotiation.
    pub(crate) fn stop_sending_and_receiving(&mut self) {
        self.stopping = true;
        self.direction = RTCRtpTransceiverDirection::Inactive;
    }

    /// stop_procedure irreversibly stops the transceiver.
    pub(crate) fn stop_procedure(&mut self) {
        if !self.stopping {
            self.stop_sending_and_receiving();
        }
        self.stopped = true;
        self.current_direction = None;
    }

    /// set_sending_track replaces the sender track and adjusts the send bit
    /// of the desired direction.
    pub(crate) fn set_sending_track(
        &mut self,
        track: Option<std::sync::Arc<dyn crate::track::track_local::TrackLocal + Send + Sync>>,
    ) {
        let should_send = track.is_some();
        self.sender.replace_track(track);
        self.set_direction_internal(self.direction.with_send(should_send));
    }
}

/// TransceiverStableState records what a transceiver looked like before a
/// pending offer touched it, so a rollback can put it back.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct TransceiverStableState {
    mid: Option<SmolStr>,
    mline_index: Option<usize>,
    remote_stream_ids: Option<Vec<SmolStr>>,
    has_m_section: bool,
    newly_created: bool,
}

impl TransceiverStableState {
    pub(crate) fn set_newly_created(&mut self) {
        self.newly_created = true;
    }

    pub(crate) fn set_m_section_if_unset(
        &mut self,
        mid: Option<SmolStr>,
        mline_index: Option<usize>,
    ) {
        if !self.has_m_section {
            self.mid = mid;
            self.mline_index = mline_index;
            self.has_m_section = true;
        }
    }

    pub(crate) fn set_remote_stream_ids_if_unset(&mut self, ids: &[SmolStr]) {
        if self.remote_stream_ids.is_none() {
            self.remote_stream_ids = Some(ids.to_vec());
        }
    }

    pub(crate) fn mid(&self) -> Option<&SmolStr> {
        self.mid.as_ref()
    }

    pub(crate) fn mline_index(&self) -> Option<usize> {
        self.mline_index
    }

    pub(crate) fn remote_stream_ids(&self) -> Option<&[SmolStr]> {
        self.remote_stream_ids.as_deref()
    }

    pub(crate) fn has_m_section(&self) -> bool {
        self.has_m_section
    }

    pub(crate) fn newly_created(&self) -> bool {
        self.newly_created
    }
}

/// TransceiverList is the arena every transceiver lives in. Iteration order
/// is creation order.
#[derive(Default, Debug)]
pub(crate) struct TransceiverList {
    next_id: u64,
    transceivers: Vec<RTCRtpTransceiver>,
    stable_states: Vec<(TransceiverId, TransceiverStableState)>,
}

impl TransceiverList {
    pub(crate) fn next_id(&mut self) -> TransceiverId {
        let id = TransceiverId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn add(&mut self, t: RTCRtpTransceiver) -> TransceiverId {
        let id = t.id;
        trace!("Adding {} kind={} direction={}", id, t.kind, t.direction);
        self.transceivers.push(t);
        id
    }

    pub(crate) fn remove(&mut self, id: TransceiverId) -> Option<RTCRtpTransceiver> {
        self.stable_states.retain(|(sid, _)| *sid != id);
        let pos = self.transceivers.iter().position(|t| t.id == id)?;
        Some(self.transceivers.remove(pos))
    }

    pub(crate) fn get(&self, id: TransceiverId) -> Option<&RTCRtpTransceiver> {
        self.transceivers.iter().find(|t| t.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: TransceiverId) -> Option<&mut RTCRtpTransceiver> {
        self.transceivers.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RTCRtpTransceiver> {
        self.transceivers.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RTCRtpTransceiver> {
        self.transceivers.iter_mut()
    }

    pub(crate) fn ids(&self) -> Vec<TransceiverId> {
        self.transceivers.iter().map(|t| t.id).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.transceivers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.transceivers.is_empty()
    }

    pub(crate) fn find_by_mid(&self, mid: &str) -> Option<TransceiverId> {
        self.transceivers
            .iter()
            .find(|t| t.mid.as_deref() == Some(mid))
            .map(|t| t.id)
    }

    pub(crate) fn find_by_mline_index(&self, mline_index: usize) -> Option<TransceiverId> {
        self.transceivers
            .iter()
            .find(|t| t.mline_index == Some(mline_index))
            .map(|t| t.id)
    }

    pub(crate) fn find_by_sender_track(&self, track_id: &str) -> Option<TransceiverId> {
        self.transceivers
            .iter()
            .find(|t| {
                t.sender
                    .track()
                    .map(|track| track.id() == track_id)
                    .unwrap_or(false)
            })
            .map(|t| t.id)
    }

    /// stable_state returns the rollback record of a transceiver, creating an
    /// empty one on first use.
    pub(crate) fn stable_state(&mut self, id: TransceiverId) -> &mut TransceiverStableState {
        let pos = match self.stable_states.iter().position(|(sid, _)| *sid == id) {
            Some(pos) => pos,
            None => {
                self.stable_states
                    .push((id, TransceiverStableState::default()));
                self.stable_states.len() - 1
            }
        };
        &mut self.stable_states[pos].1
    }

    pub(crate) fn stable_states(&self) -> Vec<(TransceiverId, TransceiverStableState)> {
        self.stable_states.clone()
    }

    pub(crate) fn discard_stable_states(&mut self) {
        self.stable_states.clear();
    }
}
