#[cfg(test)]
pub(crate) mod peer_connection_test;

mod apply_description;
pub mod configuration;
mod description_validation;
mod negotiation_needed;
pub mod observer;
mod offer_answer;
pub mod offer_answer_options;
pub(crate) mod operation;
mod peer_connection_internal;
pub mod policy;
pub mod sdp;
pub mod signaling_state;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::api::API;
use crate::data_channel::data_channel_init::RTCDataChannelInit;
use crate::data_channel::RTCDataChannel;
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::RTCIceCandidateInit;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::observer::PeerConnectionObserver;
use crate::peer_connection::offer_answer_options::{RTCAnswerOptions, RTCOfferOptions};
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use crate::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use crate::peer_connection::policy::sdp_semantics::RTCSdpSemantics;
use crate::peer_connection::signaling_state::RTCSignalingState;
use crate::rtp_transceiver::rtp_codec::{default_codecs, RTCRtpCodecParameters, RTPCodecType};
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit, TransceiverId};
use crate::track::track_local::TrackLocal;
use peer_connection_internal::{NegotiationState, PeerConnectionInternal};

fn track_stream_ids(track: &(dyn TrackLocal + Send + Sync)) -> Vec<SmolStr> {
    if track.stream_id().is_empty() {
        vec![]
    } else {
        vec![SmolStr::from(track.stream_id())]
    }
}

/// sender_id_for picks the track id as sender id unless another sender
/// already uses it.
fn sender_id_for(state: &NegotiationState, track: &(dyn TrackLocal + Send + Sync)) -> SmolStr {
    if state.transceivers.iter().any(|t| t.sender.id == track.id()) {
        SmolStr::from(crate::rand::generate_id())
    } else {
        SmolStr::from(track.id())
    }
}

/// PeerConnection negotiates media sessions with a remote peer through the
/// offer/answer exchange. Media and transports are driven by the
/// collaborators installed on the [`API`]; the connection decides what they
/// are told and when.
///
/// create_offer, create_answer, set_local_description,
/// set_remote_description, add_ice_candidate and add_local_ice_candidate
/// run on the operations chain, one at a time in call order.
pub struct RTCPeerConnection {
    pub(crate) internal: Arc<PeerConnectionInternal>,
}

impl std::fmt::Debug for RTCPeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCPeerConnection")
            .field("signaling_state", &self.signaling_state())
            .field("is_closed", &self.internal.is_closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl RTCPeerConnection {
    pub(crate) fn new(
        api: &API,
        configuration: RTCConfiguration,
        observer: Arc<dyn PeerConnectionObserver>,
    ) -> Result<Self> {
        let mut configuration = configuration;
        RTCPeerConnection::init_configuration(&mut configuration)?;
        let internal = PeerConnectionInternal::new(api, configuration, observer)?;
        Ok(RTCPeerConnection { internal })
    }

    /// init_configuration validates the configuration and replaces unspecified
    /// policies with their defaults.
    /// <https://www.w3.org/TR/webrtc/#constructor> (step #3)
    fn init_configuration(configuration: &mut RTCConfiguration) -> Result<()> {
        configuration.validate()?;

        if configuration.bundle_policy == RTCBundlePolicy::Unspecified {
            configuration.bundle_policy = RTCBundlePolicy::Balanced;
        }
        if configuration.rtcp_mux_policy == RTCRtcpMuxPolicy::Unspecified {
            configuration.rtcp_mux_policy = RTCRtcpMuxPolicy::Require;
        }
        if configuration.sdp_semantics == RTCSdpSemantics::Unspecified {
            configuration.sdp_semantics = RTCSdpSemantics::UnifiedPlan;
        }
        if configuration.ice_transport_policy == RTCIceTransportPolicy::Unspecified {
            configuration.ice_transport_policy = RTCIceTransportPolicy::All;
        }

        Ok(())
    }

    /// create_offer generates an offer for the current transceivers and data
    /// channels. The result is remembered so that set_local_description can
    /// be called with an empty SDP.
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-createoffer>
    pub async fn create_offer(
        &self,
        options: Option<RTCOfferOptions>,
    ) -> Result<RTCSessionDescription> {
        let options = options.unwrap_or_default();
        self.internal
            .chain("create_offer", move |pc| async move {
                pc.create_offer(options).await
            })
            .await
    }

    /// create_answer answers the pending remote offer.
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-createanswer>
    pub async fn create_answer(
        &self,
        options: Option<RTCAnswerOptions>,
    ) -> Result<RTCSessionDescription> {
        let options = options.unwrap_or_default();
        self.internal
            .chain("create_answer", move |pc| async move {
                pc.create_answer(options).await
            })
            .await
    }

    /// set_local_description applies an offer, answer, pranswer or rollback
    /// generated by this connection. An empty SDP stands for the last offer
    /// or answer created.
    pub async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<()> {
        self.internal
            .chain("set_local_description", move |pc| async move {
                pc.set_local_description(desc).await
            })
            .await
    }

    /// set_remote_description applies a description received from the
    /// remote peer.
    pub async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<()> {
        self.internal
            .chain("set_remote_description", move |pc| async move {
                pc.set_remote_description(desc).await
            })
            .await
    }

    /// add_ice_candidate accepts a candidate from the remote peer. It is
    /// added to the remote description and, once a local description exists,
    /// handed to the transport.
    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        self.internal
            .chain("add_ice_candidate", move |pc| async move {
                pc.add_ice_candidate(candidate).await
            })
            .await
    }

    /// add_local_ice_candidate is called by the transport side for every
    /// gathered candidate. The candidate is added to the local description
    /// and forwarded to on_ice_candidate.
    pub async fn add_local_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        self.internal
            .chain("add_local_ice_candidate", move |pc| async move {
                pc.add_local_ice_candidate(candidate).await
            })
            .await
    }

    /// set_configuration updates the configuration of this PeerConnection
    /// object. Changing the ICE servers or the transport policy restarts ICE
    /// with the next offer.
    pub async fn set_configuration(&self, configuration: RTCConfiguration) -> Result<()> {
        let mut configuration = configuration;
        let mut events = vec![];
        {
            let mut state = self.internal.state.lock().await;
            // https://www.w3.org/TR/webrtc/#set-the-configuration (step #2)
            if state.is_closed() {
                return Err(Error::ErrConnectionClosed);
            }
            RTCPeerConnection::init_configuration(&mut configuration)?;
            state
                .configuration
                .check_modification(&configuration, state.local_description().is_some())?;

            let needs_ice_restart = state.configuration.needs_ice_restart(&configuration);
            state.configuration = configuration;
            if needs_ice_restart && state.local_description().is_some() {
                log::info!("configuration change requires an ice restart");
                state.stage_ice_restart();
            }
            state.update_negotiation_needed(&mut events);
        }
        self.internal.dispatch(events).await;
        Ok(())
    }

    /// get_configuration returns a copy of the configuration in use.
    pub async fn get_configuration(&self) -> RTCConfiguration {
        let state = self.internal.state.lock().await;
        state.configuration.clone()
    }

    /// restart_ice makes the next offer carry fresh ICE credentials.
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-restartice>
    pub async fn restart_ice(&self) {
        let mut events = vec![];
        {
            let mut state = self.internal.state.lock().await;
            if state.is_closed() {
                return;
            }
            state.stage_ice_restart();
            state.update_negotiation_needed(&mut events);
        }
        self.internal.dispatch(events).await;
    }

    /// add_track attaches a track to a transceiver that never sent, or to a
    /// new sendrecv transceiver.
    pub async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<RTCRtpSender> {
        let mut events = vec![];
        let sender = {
            let mut state = self.internal.state.lock().await;
            if state.is_closed() {
                return Err(Error::ErrConnectionClosed);
            }
            let kind = track.kind();
            if kind == RTPCodecType::Unspecified {
                return Err(Error::ErrTrackKindInvalid);
            }
            if state.transceivers.find_by_sender_track(track.id()).is_some() {
                return Err(Error::ErrExistingTrack);
            }

            let stream_ids = track_stream_ids(track.as_ref());
            let reusable = state
                .transceivers
                .iter()
                .find(|t| {
                    t.kind == kind
                        && t.sender.track().is_none()
                        && !t.has_ever_been_used_to_send
                        && !t.stopped
                })
                .map(|t| t.id);

            let id = match reusable {
                Some(id) => {
                    let t = state
                        .transceivers
                        .get_mut(id)
                        .ok_or(Error::ErrTransceiverNotFound)?;
                    if t.stopping {
                        return Err(Error::ErrRTPTransceiverStopping);
                    }
                    log::info!("reusing transceiver {} for track {}", id, track.id());
                    t.set_sending_track(Some(track));
                    t.sender.set_stream_ids(stream_ids);
                    t.reused_for_addtrack = true;
                    id
                }
                None => {
                    let sender_id = sender_id_for(&state, track.as_ref());
                    let id = state.create_transceiver(
                        kind,
                        RTCRtpTransceiverDirection::Sendrecv,
                        Some(track),
                        stream_ids,
                        sender_id,
                        SmolStr::from(crate::rand::generate_id()),
                    );
                    if let Some(t) = state.transceivers.get_mut(id) {
                        t.created_by_addtrack = true;
                    }
                    id
                }
            };

            let sender = state
                .transceivers
                .get(id)
                .map(|t| t.sender.clone())
                .ok_or(Error::ErrTransceiverNotFound)?;
            state.update_negotiation_needed(&mut events);
            sender
        };
        self.internal.dispatch(events).await;
        Ok(sender)
    }

    /// remove_track detaches the track of a sender and stops sending.
    pub async fn remove_track(&self, sender: &RTCRtpSender) -> Result<()> {
        let mut events = vec![];
        {
            let mut state = self.internal.state.lock().await;
            if state.is_closed() {
                return Err(Error::ErrConnectionClosed);
            }
            let t = state
                .transceivers
                .iter_mut()
                .find(|t| t.sender.id == sender.id)
                .ok_or(Error::ErrSenderNotCreatedByConnection)?;
            if t.sender.track().is_none() {
                return Ok(());
            }
            t.set_sending_track(None);
            state.update_negotiation_needed(&mut events);
        }
        self.internal.dispatch(events).await;
        Ok(())
    }

    /// add_transceiver_from_kind creates a transceiver without a track.
    pub async fn add_transceiver_from_kind(
        &self,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<RTCRtpTransceiver> {
        if kind == RTPCodecType::Unspecified {
            return Err(Error::ErrRTPTransceiverKindInvalid);
        }
        self.add_transceiver(kind, None, init).await
    }

    /// add_transceiver_from_track creates a transceiver sending `track`.
    pub async fn add_transceiver_from_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<RTCRtpTransceiver> {
        let kind = track.kind();
        if kind == RTPCodecType::Unspecified {
            return Err(Error::ErrTrackKindInvalid);
        }
        self.add_transceiver(kind, Some(track), init).await
    }

    async fn add_transceiver(
        &self,
        kind: RTPCodecType,
        track: Option<Arc<dyn TrackLocal + Send + Sync>>,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<RTCRtpTransceiver> {
        let init = init.unwrap_or_default();
        let direction = match init.direction {
            RTCRtpTransceiverDirection::Unspecified => RTCRtpTransceiverDirection::Sendrecv,
            d => d,
        };

        let mut events = vec![];
        let transceiver = {
            let mut state = self.internal.state.lock().await;
            if state.is_closed() {
                return Err(Error::ErrConnectionClosed);
            }
            if !state.configuration.sdp_semantics.is_unified_plan() {
                return Err(Error::ErrUnifiedPlanRequired);
            }

            let mut stream_ids: Vec<SmolStr> =
                init.stream_ids.iter().map(|s| SmolStr::from(s.as_str())).collect();
            if stream_ids.is_empty() {
                if let Some(track) = &track {
                    stream_ids = track_stream_ids(track.as_ref());
                }
            }
            let sender_id = match &track {
                Some(track) => sender_id_for(&state, track.as_ref()),
                None => SmolStr::from(crate::rand::generate_id()),
            };
            let id = state.create_transceiver(
                kind,
                direction,
                track,
                stream_ids,
                sender_id,
                SmolStr::from(crate::rand::generate_id()),
            );

            let result = match state.transceivers.get_mut(id) {
                Some(t) => t.sender.set_send_encodings(init.send_encodings),
                None => Err(Error::ErrTransceiverNotFound),
            };
            if let Err(err) = result {
                state.transceivers.remove(id);
                return Err(err);
            }
            log::debug!("added {} transceiver {} ({})", kind, id, direction);

            let transceiver = state
                .transceivers
                .get(id)
                .cloned()
                .ok_or(Error::ErrTransceiverNotFound)?;
            state.update_negotiation_needed(&mut events);
            transceiver
        };
        self.internal.dispatch(events).await;
        Ok(transceiver)
    }

    /// set_transceiver_direction changes the preferred direction of a
    /// transceiver. The change applies with the next negotiation.
    pub async fn set_transceiver_direction(
        &self,
        id: TransceiverId,
        direction: RTCRtpTransceiverDirection,
    ) -> Result<()> {
        if direction == RTCRtpTransceiverDirection::Unspecified {
            return Err(Error::ErrRTPTransceiverDirectionInvalid);
        }

        let mut events = vec![];
        {
            let mut state = self.internal.state.lock().await;
            if state.is_closed() {
                return Err(Error::ErrConnectionClosed);
            }
            let t = state
                .transceivers
                .get_mut(id)
                .ok_or(Error::ErrTransceiverNotFound)?;
            if t.stopping {
                return Err(Error::ErrRTPTransceiverStopped);
            }
            if !t.set_direction_internal(direction) {
                return Ok(());
            }
            state.update_negotiation_needed(&mut events);
        }
        self.internal.dispatch(events).await;
        Ok(())
    }

    /// stop_transceiver marks a transceiver stopping. Its section is
    /// rejected by the next offer and the transceiver is removed once both
    /// sides agreed.
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcrtptransceiver-stop>
    pub async fn stop_transceiver(&self, id: TransceiverId) -> Result<()> {
        let mut events = vec![];
        {
            let mut state = self.internal.state.lock().await;
            let closed = state.is_closed();
            let t = state
                .transceivers
                .get_mut(id)
                .ok_or(Error::ErrTransceiverNotFound)?;
            if closed {
                t.stop_procedure();
                return Ok(());
            }
            if t.stopping {
                return Ok(());
            }
            t.stop_sending_and_receiving();
            state.update_negotiation_needed(&mut events);
        }
        self.internal.dispatch(events).await;
        Ok(())
    }

    /// set_codec_preferences restricts and orders the codecs offered for a
    /// transceiver. An empty list restores the defaults.
    pub async fn set_codec_preferences(
        &self,
        id: TransceiverId,
        codecs: Vec<RTCRtpCodecParameters>,
    ) -> Result<()> {
        let mut state = self.internal.state.lock().await;
        let t = state
            .transceivers
            .get_mut(id)
            .ok_or(Error::ErrTransceiverNotFound)?;

        let supported = default_codecs(t.kind);
        for codec in &codecs {
            let known = supported.iter().any(|s| {
                s.capability
                    .mime_type
                    .eq_ignore_ascii_case(&codec.capability.mime_type)
                    && s.capability.clock_rate == codec.capability.clock_rate
                    && s.capability.channels == codec.capability.channels
            });
            if !known {
                return Err(Error::ErrRTPTransceiverCodecUnsupported(
                    codec.capability.mime_type.clone(),
                ));
            }
        }
        t.codec_preferences = codecs;
        Ok(())
    }

    /// create_data_channel registers a data channel. The first one makes
    /// offers carry an application section.
    pub async fn create_data_channel(
        &self,
        label: &str,
        options: Option<RTCDataChannelInit>,
    ) -> Result<RTCDataChannel> {
        let mut events = vec![];
        let channel = {
            let mut state = self.internal.state.lock().await;
            // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #2)
            if state.is_closed() {
                return Err(Error::ErrConnectionClosed);
            }
            let channel = RTCDataChannel::new(label, options)?;
            state.data_channels.push(channel.clone());
            if state.data_channels.len() == 1 {
                state.update_negotiation_needed(&mut events);
            }
            channel
        };
        self.internal.dispatch(events).await;
        Ok(channel)
    }

    /// should_fire_negotiation_needed_event reports whether the event with
    /// `event_id` is still current and should reach the application.
    pub async fn should_fire_negotiation_needed_event(&self, event_id: u32) -> bool {
        self.internal
            .should_fire_negotiation_needed_event(event_id)
            .await
    }

    /// close ends the PeerConnection. Queued operations fail with
    /// ErrConnectionClosed.
    pub async fn close(&self) -> Result<()> {
        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #1)
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #2)
        self.internal.is_closed.store(true, Ordering::SeqCst);

        let mut events = vec![];
        let (channels, data_mid) = {
            let mut state = self.internal.state.lock().await;
            // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #3)
            state.change_signaling_state(RTCSignalingState::Closed, &mut events);

            // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #4)
            let mut channels = vec![];
            for t in state.transceivers.iter_mut() {
                t.stop_procedure();
                channels.extend(t.channel.take());
            }
            state.pending_data_transport = false;
            (channels, state.data_mid.take())
        };

        for channel in channels {
            self.internal.channel_factory.destroy_channel(channel).await;
        }
        if let Some(mid) = data_mid {
            self.internal
                .channel_factory
                .destroy_data_channel_transport(&mid)
                .await;
        }

        self.internal.dispatch(events).await;
        self.internal.ops.close();
        Ok(())
    }

    /// signaling_state reports the state last published by the operations
    /// chain. It does not wait for operations in flight.
    pub fn signaling_state(&self) -> RTCSignalingState {
        self.internal.signaling_state.load(Ordering::SeqCst).into()
    }

    /// local_description returns pending_local_description if it is not
    /// None and otherwise it returns current_local_description.
    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        let state = self.internal.state.lock().await;
        state.local_description().cloned()
    }

    pub async fn remote_description(&self) -> Option<RTCSessionDescription> {
        let state = self.internal.state.lock().await;
        state.remote_description().cloned()
    }

    /// current_local_description is the local description negotiated the
    /// last time the connection reached stable, plus the local candidates
    /// gathered since.
    pub async fn current_local_description(&self) -> Option<RTCSessionDescription> {
        let state = self.internal.state.lock().await;
        state.current_local_description.clone()
    }

    /// pending_local_description is a local description that is in the
    /// process of being negotiated.
    pub async fn pending_local_description(&self) -> Option<RTCSessionDescription> {
        let state = self.internal.state.lock().await;
        state.pending_local_description.clone()
    }

    pub async fn current_remote_description(&self) -> Option<RTCSessionDescription> {
        let state = self.internal.state.lock().await;
        state.current_remote_description.clone()
    }

    pub async fn pending_remote_description(&self) -> Option<RTCSessionDescription> {
        let state = self.internal.state.lock().await;
        state.pending_remote_description.clone()
    }

    /// get_transceivers returns snapshots of the transceivers in creation
    /// order.
    pub async fn get_transceivers(&self) -> Vec<RTCRtpTransceiver> {
        let state = self.internal.state.lock().await;
        state.transceivers.iter().cloned().collect()
    }

    /// get_senders returns the senders of transceivers that are not stopped.
    pub async fn get_senders(&self) -> Vec<RTCRtpSender> {
        let state = self.internal.state.lock().await;
        state
            .transceivers
            .iter()
            .filter(|t| !t.stopped)
            .map(|t| t.sender.clone())
            .collect()
    }

    pub async fn get_receivers(&self) -> Vec<RTCRtpReceiver> {
        let state = self.internal.state.lock().await;
        state
            .transceivers
            .iter()
            .filter(|t| !t.stopped)
            .map(|t| t.receiver.clone())
            .collect()
    }

    pub async fn data_channels(&self) -> Vec<RTCDataChannel> {
        let state = self.internal.state.lock().await;
        state.data_channels.clone()
    }
}
