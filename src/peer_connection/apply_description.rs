use std::sync::Arc;

use smol_str::SmolStr;

use super::description_validation::is_media_section_being_recycled;
use super::observer::ObserverEvent;
use super::peer_connection_internal::{
    push_added_streams, push_removed_streams, NegotiationState, PeerConnectionInternal,
    SessionError,
};
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::RTCIceCandidateInit;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::{JsepSessionDescription, MediaSection, RidDirection};
use crate::peer_connection::signaling_state::{
    check_next_signaling_state, RTCSignalingState, StateChangeOp,
};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{RTCRtpEncodingParameters, TransceiverId};
use crate::transport::ChannelHandle;

/// section_index resolves the media section a candidate belongs to, by mid
/// first and by m-line index otherwise.
fn section_index(desc: &JsepSessionDescription, candidate: &RTCIceCandidateInit) -> Result<usize> {
    match (&candidate.sdp_mid, candidate.sdp_mline_index) {
        (Some(mid), _) if !mid.is_empty() => desc
            .section_index_by_mid(mid)
            .ok_or_else(|| Error::ErrIceCandidateMidNotFound(mid.clone())),
        (_, Some(index)) if (index as usize) < desc.media_sections.len() => Ok(index as usize),
        (_, Some(index)) => Err(Error::ErrIceCandidateMlineIndexOutOfRange(index)),
        _ => Err(Error::ErrIceCandidateMissingMidAndIndex),
    }
}

impl NegotiationState {
    /// resolve_local_description turns what the application passed to
    /// set_local_description into a parsed description. An empty SDP means
    /// the last created offer or answer.
    fn resolve_local_description(&self, desc: RTCSessionDescription) -> Result<RTCSessionDescription> {
        let last = match desc.sdp_type {
            RTCSdpType::Offer => self.last_offer.as_ref(),
            RTCSdpType::Answer | RTCSdpType::Pranswer => self.last_answer.as_ref(),
            _ => return Err(Error::ErrPeerConnSDPTypeInvalidValue),
        };

        if desc.sdp.is_empty() {
            let mut last = last.cloned().ok_or(Error::ErrSessionDescriptionInvalid)?;
            last.sdp_type = desc.sdp_type;
            return Ok(last);
        }
        if let Some(last) = last.filter(|l| l.sdp == desc.sdp && l.parsed.is_some()) {
            let mut last = last.clone();
            last.sdp_type = desc.sdp_type;
            return Ok(last);
        }

        let parsed = self.sdp_codec.parse(&desc.sdp)?;
        Ok(RTCSessionDescription::from_parsed(desc.sdp_type, desc.sdp, parsed))
    }

    fn resolve_remote_description(&self, desc: RTCSessionDescription) -> Result<RTCSessionDescription> {
        if !desc.sdp.is_empty() {
            let parsed = self.sdp_codec.parse(&desc.sdp)?;
            return Ok(RTCSessionDescription::from_parsed(desc.sdp_type, desc.sdp, parsed));
        }
        if desc.parsed.is_some() {
            return Ok(desc);
        }
        Err(Error::ErrSessionDescriptionInvalid)
    }

    /// associate_transceiver binds the transceiver answering media section
    /// `mline_index` to it, creating one for remote sections nobody answers.
    pub(crate) fn associate_transceiver(
        &mut self,
        source: StateChangeOp,
        sdp_type: RTCSdpType,
        mline_index: usize,
        m: &MediaSection,
        old_local: Option<&MediaSection>,
        old_remote: Option<&MediaSection>,
    ) -> Result<TransceiverId> {
        if is_media_section_being_recycled(sdp_type, m, old_local, old_remote) {
            let old_mid = match old_local {
                Some(o) if o.rejected => Some(o.mid.clone()),
                _ => old_remote.map(|o| o.mid.clone()),
            };
            let old = old_mid.and_then(|mid| self.transceivers.find_by_mid(&mid));
            if let Some(t) = old.and_then(|id| self.transceivers.get_mut(id)) {
                log::info!(
                    "dissociating transceiver {} from recycled media section {}",
                    t.id,
                    mline_index
                );
                t.mid = None;
                t.mline_index = None;
            }
        }

        let found = self.transceivers.find_by_mid(&m.mid);
        let id = match source {
            StateChangeOp::SetLocal => found
                .or_else(|| self.transceivers.find_by_mline_index(mline_index))
                .ok_or_else(|| Error::ErrUnknownTransceiverForSection(m.mid.clone()))?,
            StateChangeOp::SetRemote => {
                let kind = m.media_type.codec_type();
                let found = match found {
                    Some(id) => Some(id),
                    None if m.direction.has_recv() && !m.has_simulcast() => self
                        .transceivers
                        .iter()
                        .find(|t| {
                            t.kind == kind && t.created_by_addtrack && t.mid.is_none() && !t.stopped
                        })
                        .map(|t| t.id),
                    None => None,
                };
                let id = match found {
                    Some(id) => id,
                    None => self.create_transceiver_for_remote(sdp_type, mline_index, m)?,
                };

                let simulcast_rejected = old_local.map(|o| o.has_simulcast()).unwrap_or(false)
                    && (!m.has_simulcast() || !m.has_rid_extension());
                if simulcast_rejected {
                    if let Some(t) = self.transceivers.get_mut(id) {
                        t.sender.disable_simulcast();
                    }
                }
                id
            }
        };

        let t = self
            .transceivers
            .get_mut(id)
            .ok_or(Error::ErrTransceiverNotFound)?;
        if t.kind != m.media_type.codec_type() {
            return Err(Error::ErrTransceiverMediaTypeMismatch {
                mid: m.mid.clone(),
                transceiver: t.kind.to_string(),
                section: m.media_type.to_string(),
            });
        }
        if m.has_simulcast() {
            let layers = match source {
                StateChangeOp::SetLocal => &m.simulcast.send_layers,
                StateChangeOp::SetRemote => &m.simulcast.receive_layers,
            };
            t.sender.update_simulcast_layers(layers);
        }

        let old_mid = t.mid.clone();
        let old_mline_index = t.mline_index;
        let changed = old_mid.as_ref() != Some(&m.mid) || old_mline_index != Some(mline_index);
        t.mid = Some(m.mid.clone());
        t.mline_index = Some(mline_index);
        if sdp_type == RTCSdpType::Offer && changed {
            self.transceivers
                .stable_state(id)
                .set_m_section_if_unset(old_mid, old_mline_index);
        }
        Ok(id)
    }

    fn create_transceiver_for_remote(
        &mut self,
        sdp_type: RTCSdpType,
        mline_index: usize,
        m: &MediaSection,
    ) -> Result<TransceiverId> {
        log::info!(
            "adding {} transceiver for mid {} at {} in response to the remote description",
            m.media_type,
            m.mid,
            mline_index
        );
        let receiver_id = m
            .streams
            .first()
            .map(|s| s.id.clone())
            .unwrap_or_else(|| SmolStr::from(crate::rand::generate_id()));
        let id = self.create_transceiver(
            m.media_type.codec_type(),
            RTCRtpTransceiverDirection::Recvonly,
            None,
            vec![],
            SmolStr::from(crate::rand::generate_id()),
            receiver_id,
        );

        // layers the remote wants to receive become our send encodings
        let encodings: Vec<RTCRtpEncodingParameters> = m
            .simulcast
            .receive_layers
            .iter()
            .map(|l| RTCRtpEncodingParameters {
                rid: l.rid.clone(),
                active: !l.paused,
                ..Default::default()
            })
            .collect();
        let result = match self.transceivers.get_mut(id) {
            Some(t) => t.sender.set_send_encodings(encodings),
            None => Err(Error::ErrTransceiverNotFound),
        };
        if let Err(err) = result {
            self.transceivers.remove(id);
            return Err(err);
        }

        if sdp_type == RTCSdpType::Offer {
            self.transceivers.stable_state(id).set_newly_created();
        }
        Ok(id)
    }

    /// remove_stopped_transceivers drops stopped transceivers whose section
    /// was rejected on both sides, or that never got one. The channels they
    /// still held are returned for destruction.
    pub(crate) fn remove_stopped_transceivers(&mut self) -> Vec<ChannelHandle> {
        let local = self.local_jsep().cloned();
        let remote = self.remote_jsep().cloned();
        let section_rejected = |desc: &Option<JsepSessionDescription>, mid: &Option<SmolStr>| {
            match (desc, mid) {
                (Some(d), Some(mid)) => d.section_by_mid(mid).map(|m| m.rejected),
                _ => None,
            }
        };

        let mut channels = vec![];
        for id in self.transceivers.ids() {
            let remove = match self.transceivers.get(id) {
                Some(t) if t.stopped => {
                    match (
                        section_rejected(&local, &t.mid),
                        section_rejected(&remote, &t.mid),
                    ) {
                        (None, None) => {
                            log::info!("dropping stopped transceiver {} that was never associated", id);
                            true
                        }
                        (l, r) => l.unwrap_or(true) && r.unwrap_or(true),
                    }
                }
                _ => false,
            };
            if remove {
                if let Some(t) = self.transceivers.remove(id) {
                    log::debug!("removed stopped transceiver {}", id);
                    channels.extend(t.channel);
                }
            }
        }
        channels
    }

    /// stage_ice_restart marks the credentials of the local descriptions for
    /// replacement by the next offer.
    pub(crate) fn stage_ice_restart(&mut self) {
        let mut credentials: Vec<RTCIceParameters> = vec![];
        let descriptions = [
            self.current_local_jsep(),
            self.pending_local_description.as_ref().and_then(|d| d.parsed()),
        ];
        for desc in descriptions.iter().flatten() {
            for m in &desc.media_sections {
                let p = RTCIceParameters {
                    username_fragment: m.transport.ice_ufrag.clone(),
                    password: m.transport.ice_pwd.clone(),
                };
                if !p.is_empty() && !credentials.contains(&p) {
                    credentials.push(p);
                }
            }
        }
        self.ice_credentials_to_replace = credentials;
    }

    /// ice_restart_satisfied reports whether none of the credentials staged
    /// for replacement are still used by the current local description.
    fn ice_restart_satisfied(&self) -> bool {
        match self.current_local_jsep() {
            Some(desc) => !desc.media_sections.iter().any(|m| {
                self.ice_credentials_to_replace.iter().any(|c| {
                    c.username_fragment == m.transport.ice_ufrag && c.password == m.transport.ice_pwd
                })
            }),
            None => false,
        }
    }
}

impl PeerConnectionInternal {
    /// set_local_description runs on the operations chain. Notifications
    /// are queued for delivery after the state lock was released, also when
    /// the description was refused after a partial change.
    pub(super) async fn set_local_description(self: &Arc<Self>, desc: RTCSessionDescription) -> Result<()> {
        let mut events = vec![];
        let result = {
            let mut state = self.state.lock().await;
            self.do_set_local_description(&mut state, desc, &mut events)
                .await
        };
        self.queue_events(events);
        result
    }

    pub(super) async fn set_remote_description(self: &Arc<Self>, desc: RTCSessionDescription) -> Result<()> {
        let mut events = vec![];
        let result = {
            let mut state = self.state.lock().await;
            self.do_set_remote_description(&mut state, desc, &mut events)
                .await
        };
        self.queue_events(events);
        result
    }

    async fn do_set_local_description(
        &self,
        state: &mut NegotiationState,
        desc: RTCSessionDescription,
        events: &mut Vec<ObserverEvent>,
    ) -> Result<()> {
        state.check_session_error()?;

        if desc.sdp_type == RTCSdpType::Rollback {
            if !state.configuration.sdp_semantics.is_unified_plan() {
                return Err(Error::ErrRollbackPlanB);
            }
            return self
                .rollback(state, StateChangeOp::SetLocal, true, events)
                .await;
        }

        let desc = state.resolve_local_description(desc)?;
        state.validate_session_description(&desc, StateChangeOp::SetLocal)?;

        let sdp_type = desc.sdp_type;
        if let Err(err) = self.apply_local_description(state, desc, events).await {
            if state.session_error == SessionError::None {
                state.set_session_error(SessionError::Content, err.to_string());
            }
            return Err(err);
        }
        self.finish_set_description(state, sdp_type, events).await;
        Ok(())
    }

    async fn do_set_remote_description(
        &self,
        state: &mut NegotiationState,
        desc: RTCSessionDescription,
        events: &mut Vec<ObserverEvent>,
    ) -> Result<()> {
        state.check_session_error()?;

        let mut desc = match desc.sdp_type {
            RTCSdpType::Unspecified => return Err(Error::ErrPeerConnSDPTypeInvalidValue),
            RTCSdpType::Rollback => desc,
            _ => state.resolve_remote_description(desc)?,
        };

        if desc.sdp_type == RTCSdpType::Offer
            && state.signaling_state == RTCSignalingState::HaveLocalOffer
            && state.configuration.enable_implicit_rollback
        {
            log::info!("remote offer collides with the local one, rolling back implicitly");
            self.rollback(state, StateChangeOp::SetRemote, false, events)
                .await?;
        }

        if desc.sdp_type == RTCSdpType::Rollback {
            if !state.configuration.sdp_semantics.is_unified_plan() {
                return Err(Error::ErrRollbackPlanB);
            }
            return self
                .rollback(state, StateChangeOp::SetRemote, true, events)
                .await;
        }

        let mut filled = false;
        if let Some(parsed) = desc.parsed.as_mut() {
            filled = parsed.media_sections.iter().any(|m| m.mid.is_empty());
            state.fill_in_missing_remote_mids(parsed);
        }
        if filled {
            NegotiationState::reserialize(state.sdp_codec.as_ref(), &mut desc)?;
        }
        state.validate_session_description(&desc, StateChangeOp::SetRemote)?;

        let sdp_type = desc.sdp_type;
        if let Err(err) = self.apply_remote_description(state, desc, events).await {
            if state.session_error == SessionError::None {
                state.set_session_error(SessionError::Content, err.to_string());
            }
            return Err(err);
        }
        self.finish_set_description(state, sdp_type, events).await;
        Ok(())
    }

    async fn finish_set_description(
        &self,
        state: &mut NegotiationState,
        sdp_type: RTCSdpType,
        events: &mut Vec<ObserverEvent>,
    ) {
        if sdp_type == RTCSdpType::Answer {
            for channel in state.remove_stopped_transceivers() {
                self.channel_factory.destroy_channel(channel).await;
            }
            if !state.ice_credentials_to_replace.is_empty() && state.ice_restart_satisfied() {
                log::debug!("ice restart completed");
                state.ice_credentials_to_replace.clear();
            }
        }

        let was_negotiation_needed = state.is_negotiation_needed;
        state.update_negotiation_needed(events);
        if state.signaling_state == RTCSignalingState::Stable
            && was_negotiation_needed
            && state.is_negotiation_needed
        {
            state.generate_negotiation_needed_event(events);
        }
    }

    async fn apply_local_description(
        &self,
        state: &mut NegotiationState,
        desc: RTCSessionDescription,
        events: &mut Vec<ObserverEvent>,
    ) -> Result<()> {
        let sdp_type = desc.sdp_type;
        let old_local = state.local_jsep().cloned();
        let old_remote = state.remote_jsep().cloned();
        let streams_before = state.remote_stream_ids();

        if sdp_type == RTCSdpType::Answer {
            state.current_local_description = Some(desc);
            state.pending_local_description = None;
            state.current_remote_description = state.pending_remote_description.take();
        } else {
            state.pending_local_description = Some(desc);
        }
        let new = state
            .local_jsep()
            .cloned()
            .ok_or(Error::ErrSessionDescriptionInvalid)?;

        if let Err(err) = self
            .transport
            .push_down_local_description(sdp_type, &new)
            .await
        {
            state.set_session_error(SessionError::Transport, err.to_string());
            return Err(Error::ErrTransportPushdown {
                is_local: true,
                reason: err.to_string(),
            });
        }

        self.update_transceivers_and_data_channels(
            state,
            StateChangeOp::SetLocal,
            sdp_type,
            &new,
            old_local.as_ref(),
            old_remote.as_ref(),
        )
        .await?;

        if sdp_type.is_answer() {
            for t in state.transceivers.iter_mut() {
                if t.stopped {
                    continue;
                }
                let direction = match t.mid.as_ref().and_then(|mid| new.section_by_mid(mid)) {
                    Some(m) => m.direction,
                    None => continue,
                };
                let was_receiving = t.fired_direction.map(|d| d.has_recv()).unwrap_or(false);
                if !direction.has_recv() && was_receiving {
                    t.receiver.set_stream_ids(vec![]);
                    events.push(ObserverEvent::RemoveTrack(t.receiver.clone()));
                }
                t.set_current_direction(direction);
                t.set_fired_direction(Some(direction));
            }
            push_removed_streams(&streams_before, &state.remote_stream_ids(), events);
        }

        let next = check_next_signaling_state(state.signaling_state, StateChangeOp::SetLocal, sdp_type)?;
        state.change_signaling_state(next, events);
        if sdp_type == RTCSdpType::Answer {
            state.transceivers.discard_stable_states();
            state.pending_data_transport = false;
        }

        if let Some(remote) = state.remote_jsep().cloned() {
            self.use_remote_candidates(&remote).await;
        }
        state.pending_ice_restarts.clear();

        for m in new.media_sections.iter().filter(|m| !m.rejected && m.media_type.is_rtp()) {
            let stream = match m.streams.first() {
                Some(stream) => stream,
                None => continue,
            };
            let t = state
                .transceivers
                .find_by_mid(&m.mid)
                .and_then(|id| state.transceivers.get_mut(id));
            if let Some(t) = t {
                t.sender.set_stream_ids(stream.stream_ids.clone());
                if let Some(ssrc) = stream.ssrcs.first() {
                    t.sender.ssrc = *ssrc;
                }
            }
        }

        Ok(())
    }

    async fn apply_remote_description(
        &self,
        state: &mut NegotiationState,
        desc: RTCSessionDescription,
        events: &mut Vec<ObserverEvent>,
    ) -> Result<()> {
        let sdp_type = desc.sdp_type;
        let old_local = state.local_jsep().cloned();
        let old_remote = state.remote_jsep().cloned();
        let streams_before = state.remote_stream_ids();

        if sdp_type == RTCSdpType::Answer {
            state.current_remote_description = Some(desc);
            state.pending_remote_description = None;
            state.current_local_description = state.pending_local_description.take();
        } else {
            state.pending_remote_description = Some(desc);
        }
        let new = state
            .remote_jsep()
            .cloned()
            .ok_or(Error::ErrSessionDescriptionInvalid)?;

        if let Err(err) = self
            .transport
            .push_down_remote_description(sdp_type, &new)
            .await
        {
            state.set_session_error(SessionError::Transport, err.to_string());
            return Err(Error::ErrTransportPushdown {
                is_local: false,
                reason: err.to_string(),
            });
        }

        self.update_transceivers_and_data_channels(
            state,
            StateChangeOp::SetRemote,
            sdp_type,
            &new,
            old_local.as_ref(),
            old_remote.as_ref(),
        )
        .await?;

        let next = check_next_signaling_state(state.signaling_state, StateChangeOp::SetRemote, sdp_type)?;
        state.change_signaling_state(next, events);
        if sdp_type == RTCSdpType::Answer {
            state.transceivers.discard_stable_states();
            state.pending_data_transport = false;
        }

        if state.local_description().is_some() {
            self.use_remote_candidates(&new).await;
        }

        if let Some(old) = &old_remote {
            self.carry_over_remote_candidates(state, old, &new, sdp_type);
        }

        let mut now_receiving = vec![];
        let mut removed = vec![];
        for id in state.transceivers.ids() {
            let mid = match state.transceivers.get(id).and_then(|t| t.mid.clone()) {
                Some(mid) => mid,
                None => continue,
            };
            let m = match new.section_by_mid(&mid) {
                Some(m) => m,
                None => continue,
            };
            let local_direction = m.direction.reverse();

            if local_direction.has_recv() && sdp_type == RTCSdpType::Offer {
                let current = state
                    .transceivers
                    .get(id)
                    .map(|t| t.receiver.stream_ids().to_vec())
                    .unwrap_or_default();
                state
                    .transceivers
                    .stable_state(id)
                    .set_remote_stream_ids_if_unset(&current);
            }

            let t = match state.transceivers.get_mut(id) {
                Some(t) => t,
                None => continue,
            };
            let was_receiving = t.fired_direction.map(|d| d.has_recv()).unwrap_or(false);
            if local_direction.has_recv() {
                log::debug!("processing msids for mid {}: {:?}", mid, m.stream_ids());
                t.receiver.set_stream_ids(m.stream_ids());
                t.receiver.track.mid = Some(mid.clone());
                t.receiver.track.rids = m.rids_in_direction(RidDirection::Send);
                if !was_receiving {
                    log::info!("processing the addition of a remote track for mid {}", mid);
                    now_receiving.push(id);
                }
            } else if was_receiving {
                log::info!("processing the removal of a remote track for mid {}", mid);
                t.receiver.set_stream_ids(vec![]);
                removed.push(t.receiver.clone());
            }

            t.set_fired_direction(Some(local_direction));
            if sdp_type.is_answer() {
                t.set_current_direction(local_direction);
            }
            if m.rejected && !t.stopped {
                log::info!("stopping transceiver for mid {} since the media section was rejected", mid);
                t.stop_procedure();
            }
        }

        let streams_after = state.remote_stream_ids();
        for id in now_receiving {
            if let Some(t) = state.transceivers.get(id) {
                events.push(ObserverEvent::Track(t.clone()));
            }
        }
        push_added_streams(&streams_before, &streams_after, events);
        events.extend(removed.into_iter().map(ObserverEvent::RemoveTrack));
        push_removed_streams(&streams_before, &streams_after, events);

        Ok(())
    }

    /// carry_over_remote_candidates keeps the candidates of the previous
    /// remote description for sections whose ICE credentials did not change.
    /// Changed credentials in an offer are an ICE restart the answer has to
    /// follow.
    fn carry_over_remote_candidates(
        &self,
        state: &mut NegotiationState,
        old: &JsepSessionDescription,
        new: &JsepSessionDescription,
        sdp_type: RTCSdpType,
    ) {
        let mut carried = false;
        for old_m in &old.media_sections {
            let index = match new.section_index_by_mid(&old_m.mid) {
                Some(index) => index,
                None => continue,
            };
            if old_m
                .transport
                .ice_credentials_changed(&new.media_sections[index].transport)
            {
                if sdp_type == RTCSdpType::Offer {
                    log::info!("remote offer restarts ice for mid {}", old_m.mid);
                    state.pending_ice_restarts.insert(old_m.mid.clone());
                }
                continue;
            }
            if let Some(parsed) = state
                .remote_description_mut()
                .and_then(|d| d.parsed.as_mut())
            {
                for candidate in &old_m.transport.candidates {
                    carried |= parsed.add_candidate(index, candidate);
                }
            }
        }

        if carried {
            let codec = Arc::clone(&state.sdp_codec);
            if let Some(desc) = state.remote_description_mut() {
                if let Err(err) = NegotiationState::reserialize(codec.as_ref(), desc) {
                    log::warn!("failed to serialize remote description: {}", err);
                }
            }
        }
    }

    async fn use_remote_candidates(&self, remote: &JsepSessionDescription) {
        for m in &remote.media_sections {
            if m.rejected || m.transport.candidates.is_empty() {
                continue;
            }
            if let Err(err) = self
                .transport
                .add_remote_candidates(&m.mid, &m.transport.candidates)
                .await
            {
                log::warn!("failed to add remote candidates for mid {}: {}", m.mid, err);
            }
        }
    }

    async fn update_transceivers_and_data_channels(
        &self,
        state: &mut NegotiationState,
        source: StateChangeOp,
        sdp_type: RTCSdpType,
        new: &JsepSessionDescription,
        old_local: Option<&JsepSessionDescription>,
        old_remote: Option<&JsepSessionDescription>,
    ) -> Result<()> {
        for (i, m) in new.media_sections.iter().enumerate() {
            state.mid_generator.add_known(&m.mid);

            if m.media_type.is_rtp() {
                let old_local_m = old_local.and_then(|d| d.media_sections.get(i));
                let old_remote_m = old_remote.and_then(|d| d.media_sections.get(i));
                // a section that finished its rejection and is not reused
                if m.rejected
                    && old_local_m.map(|o| o.rejected).unwrap_or(false)
                    && old_remote_m.map(|o| o.rejected).unwrap_or(false)
                {
                    continue;
                }

                let id = state.associate_transceiver(source, sdp_type, i, m, old_local_m, old_remote_m)?;
                self.update_transceiver_channel(state, id, m).await?;
                continue;
            }

            if let Some(data_mid) = &state.data_mid {
                if *data_mid != m.mid {
                    log::info!("ignoring data media section with mid {}", m.mid);
                    continue;
                }
            }
            if m.rejected {
                if let Some(mid) = state.data_mid.take() {
                    log::info!("rejected data channel, mid {}", mid);
                    self.channel_factory
                        .destroy_data_channel_transport(&mid)
                        .await;
                }
                state.pending_data_transport = false;
            } else if state.data_mid.is_none() {
                log::info!("creating data channel transport, mid {}", m.mid);
                if !self
                    .channel_factory
                    .create_data_channel_transport(&m.mid)
                    .await
                {
                    return Err(Error::ErrDataChannelTransportCreationFailed(m.mid.clone()));
                }
                state.data_mid = Some(m.mid.clone());
                if sdp_type == RTCSdpType::Offer {
                    state.pending_data_transport = true;
                }
            }
        }
        Ok(())
    }

    async fn update_transceiver_channel(
        &self,
        state: &mut NegotiationState,
        id: TransceiverId,
        m: &MediaSection,
    ) -> Result<()> {
        let (kind, has_channel) = match state.transceivers.get(id) {
            Some(t) => (t.kind, t.channel.is_some()),
            None => return Err(Error::ErrTransceiverNotFound),
        };

        if m.rejected {
            if let Some(channel) = state.transceivers.get_mut(id).and_then(|t| t.channel.take()) {
                self.channel_factory.destroy_channel(channel).await;
            }
        } else if !has_channel {
            let channel = self
                .channel_factory
                .create_channel(&m.mid, kind)
                .await
                .ok_or_else(|| Error::ErrChannelCreationFailed(m.mid.clone()))?;
            if let Some(t) = state.transceivers.get_mut(id) {
                t.channel = Some(channel);
            }
        }
        Ok(())
    }

    /// rollback restores the state of the last stable negotiation.
    /// `explicit` is false for the rollback implied by a colliding remote
    /// offer, which re-evaluates negotiation-needed on its own.
    async fn rollback(
        &self,
        state: &mut NegotiationState,
        op: StateChangeOp,
        explicit: bool,
        events: &mut Vec<ObserverEvent>,
    ) -> Result<()> {
        let next = check_next_signaling_state(state.signaling_state, op, RTCSdpType::Rollback)?;
        let streams_before = state.remote_stream_ids();
        let had_remote_offer = state.signaling_state == RTCSignalingState::HaveRemoteOffer;

        let mut removed = vec![];
        for (id, stable) in state.transceivers.stable_states() {
            if let Some(ids) = stable.remote_stream_ids() {
                if let Some(t) = state.transceivers.get_mut(id) {
                    t.receiver.set_stream_ids(ids.to_vec());
                }
                if !stable.has_m_section() && !stable.newly_created() {
                    continue;
                }
            }

            let t = match state.transceivers.get_mut(id) {
                Some(t) => t,
                None => continue,
            };
            let channel = t.channel.take();
            if had_remote_offer {
                removed.push(t.receiver.clone());
            }
            if stable.newly_created() {
                if t.reused_for_addtrack {
                    t.created_by_addtrack = true;
                } else {
                    log::debug!("rollback removes transceiver {}", id);
                    state.transceivers.remove(id);
                    if let Some(channel) = channel {
                        self.channel_factory.destroy_channel(channel).await;
                    }
                    continue;
                }
            }
            t.mid = stable.mid().cloned();
            t.mline_index = stable.mline_index();
            if let Some(channel) = channel {
                self.channel_factory.destroy_channel(channel).await;
            }
        }

        if let Err(err) = self.transport.rollback_transports().await {
            log::warn!("failed to roll back transports: {}", err);
        }
        if state.pending_data_transport {
            if let Some(mid) = state.data_mid.take() {
                self.channel_factory
                    .destroy_data_channel_transport(&mid)
                    .await;
            }
            state.pending_data_transport = false;
        }
        state.transceivers.discard_stable_states();
        state.pending_local_description = None;
        state.pending_remote_description = None;
        state.change_signaling_state(next, events);

        let streams_after = state.remote_stream_ids();
        events.extend(removed.into_iter().map(ObserverEvent::RemoveTrack));
        push_added_streams(&streams_before, &streams_after, events);
        push_removed_streams(&streams_before, &streams_after, events);

        if explicit {
            state.update_negotiation_needed(events);
            if state.is_negotiation_needed {
                state.generate_negotiation_needed_event(events);
            }
        }
        Ok(())
    }

    pub(super) async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }
        let remote = state.remote_jsep().ok_or(Error::ErrNoRemoteDescription)?;
        if candidate.is_end_of_candidates() {
            return Ok(());
        }

        let index = section_index(remote, &candidate)?;
        let m = &remote.media_sections[index];
        if m.rejected {
            return Err(Error::ErrIceCandidateRejectedSection);
        }
        if let Some(ufrag) = candidate.username_fragment.as_ref().filter(|u| !u.is_empty()) {
            let expected = remote
                .transport_for(&m.mid)
                .map(|t| t.ice_ufrag.as_str())
                .unwrap_or_default();
            if ufrag != expected {
                return Err(Error::ErrIceCandidateUfragMismatch);
            }
        }
        let mid = m.mid.clone();
        let value = candidate.candidate_value().to_owned();

        let codec = Arc::clone(&state.sdp_codec);
        if let Some(desc) = state.remote_description_mut() {
            let added = desc
                .parsed
                .as_mut()
                .map(|p| p.add_candidate(index, &value))
                .unwrap_or(false);
            if !added {
                log::debug!("ignoring duplicate remote candidate for mid {}", mid);
                return Ok(());
            }
            NegotiationState::reserialize(codec.as_ref(), desc)?;
        }

        if state.local_description().is_some() {
            self.transport
                .add_remote_candidates(&mid, &[value])
                .await
                .map_err(|err| Error::ErrIceCandidateAddFailed(err.to_string()))?;
        }
        Ok(())
    }

    /// add_local_ice_candidate records a gathered candidate in the local
    /// description and hands it to the observer.
    pub(super) async fn add_local_ice_candidate(self: &Arc<Self>, candidate: RTCIceCandidateInit) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.is_closed() {
                return Err(Error::ErrConnectionClosed);
            }
            let local = match state.local_jsep() {
                Some(local) => local,
                None => {
                    log::error!("local candidate gathered without a local description");
                    return Ok(());
                }
            };

            if !candidate.is_end_of_candidates() {
                let index = section_index(local, &candidate)?;
                let value = candidate.candidate_value().to_owned();
                let codec = Arc::clone(&state.sdp_codec);
                if let Some(desc) = state.local_description_mut() {
                    let added = desc
                        .parsed
                        .as_mut()
                        .map(|p| p.add_candidate(index, &value))
                        .unwrap_or(false);
                    if added {
                        NegotiationState::reserialize(codec.as_ref(), desc)?;
                    }
                }
            }
        }
        self.queue_events(vec![ObserverEvent::IceCandidate(candidate)]);
        Ok(())
    }
}
