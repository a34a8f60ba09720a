use std::collections::{HashMap, VecDeque};

use sdp::util::ConnectionRole;
use smol_str::SmolStr;

use super::peer_connection_internal::{NegotiationState, PeerConnectionInternal};
use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::dtls_transport::dtls_role::{DTLSRole, DEFAULT_DTLS_ROLE_OFFER};
use crate::error::{Error, Result};
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::peer_connection::offer_answer_options::{RTCAnswerOptions, RTCOfferOptions};
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::{
    CryptoParams, JsepSessionDescription, MediaSection, MediaType, RidDescription, RidDirection,
    SimulcastLayer, StreamParams, DEFAULT_SCTP_PORT, SDES_CRYPTO_SUITE,
};
use crate::peer_connection::signaling_state::RTCSignalingState;
use crate::rtp_transceiver::rtp_codec::{codecs_intersection, RTPCodecType};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::RTCRtpTransceiver;

/// rejected_section is the placeholder for a section nothing answers to any
/// more. It keeps its mid so the order of sections is preserved.
fn rejected_section(mid: SmolStr, media_type: MediaType) -> MediaSection {
    let mut m = MediaSection::new(mid, media_type);
    m.rejected = true;
    m.direction = RTCRtpTransceiverDirection::Inactive;
    if media_type == MediaType::Data {
        m.sctp_port = Some(DEFAULT_SCTP_PORT);
    }
    m
}

fn data_section(mid: SmolStr, sctp_port: Option<u16>) -> MediaSection {
    let mut m = MediaSection::new(mid, MediaType::Data);
    m.sctp_port = Some(sctp_port.unwrap_or(DEFAULT_SCTP_PORT));
    m
}

/// add_sender_stream signals the sender of `t`. Without rids the sender is
/// identified by its ssrc.
fn add_sender_stream(m: &mut MediaSection, t: &RTCRtpTransceiver, cname: &str) {
    let ssrcs = if m.rids.is_empty() {
        vec![t.sender.ssrc]
    } else {
        vec![]
    };
    m.streams.push(StreamParams {
        id: t.sender.track_id(),
        stream_ids: t.sender.stream_ids().to_vec(),
        cname: cname.to_owned(),
        ssrcs,
    });
}

/// offered_section builds the section `t` asks for in an offer.
fn offered_section(t: &RTCRtpTransceiver, mid: SmolStr, cname: &str) -> MediaSection {
    let media_type = MediaType::from_codec_type(t.kind).unwrap_or(MediaType::Audio);
    let mut m = MediaSection::new(mid, media_type);
    m.rejected = t.stopping;
    m.direction = if t.stopping {
        RTCRtpTransceiverDirection::Inactive
    } else {
        t.direction
    };
    m.codecs = t.codecs();
    m.header_extensions = t.header_extensions.clone();

    // msid stays in every later offer once the transceiver sent.
    if t.stopping || (!t.direction.has_send() && !t.has_ever_been_used_to_send) {
        return m;
    }

    for (rid, paused) in t.sender.send_rids() {
        m.rids.push(RidDescription {
            rid: rid.clone(),
            direction: RidDirection::Send,
            params: String::new(),
        });
        m.simulcast.send_layers.push(SimulcastLayer { rid, paused });
    }
    add_sender_stream(&mut m, t, cname);
    m
}

/// answered_section builds the answer of `t` to an offered section.
fn answered_section(t: &RTCRtpTransceiver, offered: &MediaSection, cname: &str) -> MediaSection {
    let mut m = MediaSection::new(offered.mid.clone(), offered.media_type);
    m.codecs = codecs_intersection(&offered.codecs, &t.codecs());
    m.header_extensions = offered
        .header_extensions
        .iter()
        .filter(|e| t.header_extensions.iter().any(|l| l.uri == e.uri))
        .cloned()
        .collect();

    m.rejected = t.stopped || offered.rejected || m.codecs.is_empty();
    if m.rejected {
        m.direction = RTCRtpTransceiverDirection::Inactive;
        return m;
    }
    m.direction = t.direction.intersect(offered.direction.reverse());

    if offered.has_simulcast() {
        m.simulcast = offered.simulcast.reverse();
        m.rids = offered
            .rids
            .iter()
            .map(|r| RidDescription {
                rid: r.rid.clone(),
                direction: r.direction.reverse(),
                params: r.params.clone(),
            })
            .collect();
    }

    if t.direction.has_send() || t.has_ever_been_used_to_send {
        add_sender_stream(&mut m, t, cname);
    }
    m
}

/// bundle_of lists the accepted mids of `sections`, in order.
fn bundle_of<'a>(sections: impl Iterator<Item = &'a MediaSection>) -> Vec<SmolStr> {
    sections
        .filter(|m| !m.rejected)
        .map(|m| m.mid.clone())
        .collect()
}

impl NegotiationState {
    /// apply_legacy_offer_options turns offer_to_receive_audio/video into
    /// transceiver changes.
    pub(crate) fn apply_legacy_offer_options(&mut self, options: &RTCOfferOptions) -> Result<()> {
        let legacy = [
            (RTPCodecType::Audio, options.offer_to_receive_audio, "audio"),
            (RTPCodecType::Video, options.offer_to_receive_video, "video"),
        ];
        for (_, value, name) in &legacy {
            if matches!(value, Some(v) if *v > 1) {
                return Err(Error::ErrOfferToReceiveUnsupported(*name));
            }
        }

        for (kind, value, name) in legacy {
            let is_receiving = |t: &RTCRtpTransceiver| {
                t.kind == kind && !t.stopped && t.direction.has_recv()
            };
            match value {
                Some(0) => {
                    for t in self.transceivers.iter_mut() {
                        if is_receiving(&*t) {
                            log::info!(
                                "offer_to_receive_{}=0 removes receiving from transceiver {}",
                                name,
                                t.id
                            );
                            let direction = t.direction.with_recv(false);
                            t.set_direction_internal(direction);
                        }
                    }
                }
                Some(_) => {
                    if !self.transceivers.iter().any(is_receiving) {
                        log::info!(
                            "adding one recvonly {} transceiver for offer_to_receive_{}=1",
                            kind,
                            name
                        );
                        self.create_transceiver(
                            kind,
                            RTCRtpTransceiverDirection::Recvonly,
                            None,
                            vec![],
                            SmolStr::from(crate::rand::generate_id()),
                            SmolStr::from(crate::rand::generate_id()),
                        );
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    /// local_ice_parameters are the credentials written into the next local
    /// description.
    fn local_ice_parameters(&self, ice_restart: bool) -> RTCIceParameters {
        if ice_restart {
            return RTCIceParameters::generate();
        }
        self.local_jsep()
            .and_then(|d| d.media_sections.first())
            .filter(|m| !m.transport.ice_ufrag.is_empty())
            .map(|m| RTCIceParameters {
                username_fragment: m.transport.ice_ufrag.clone(),
                password: m.transport.ice_pwd.clone(),
            })
            .unwrap_or_else(|| self.initial_ice_parameters.clone())
    }

    /// fill_transport writes the transport attributes shared by offers and
    /// answers. Candidates gathered so far are kept unless ICE restarts.
    fn fill_transport(
        &self,
        m: &mut MediaSection,
        ice: &RTCIceParameters,
        ice_restart: bool,
        fingerprint: &Option<RTCDtlsFingerprint>,
        role: ConnectionRole,
    ) {
        let existing = self.local_jsep().and_then(|d| d.section_by_mid(&m.mid));

        m.rtcp_mux = true;
        m.transport.ice_ufrag = ice.username_fragment.clone();
        m.transport.ice_pwd = ice.password.clone();
        m.transport.connection_role = role;

        if self.setting_engine.disable_dtls {
            m.transport.fingerprint = None;
            if m.media_type.is_rtp() {
                m.cryptos = match existing {
                    Some(e) if !e.cryptos.is_empty() => e.cryptos.clone(),
                    _ => vec![CryptoParams {
                        tag: 1,
                        crypto_suite: SDES_CRYPTO_SUITE.to_owned(),
                        key_params: crate::rand::generate_sdes_key_params(),
                    }],
                };
            }
        } else {
            m.transport.fingerprint = fingerprint.clone();
        }

        if !ice_restart {
            if let Some(e) = existing {
                m.transport.candidates = e.transport.candidates.clone();
            }
        }
    }

    fn check_fingerprint(&self, fingerprint: &Option<RTCDtlsFingerprint>) -> Result<()> {
        if !self.setting_engine.disable_dtls && fingerprint.is_none() {
            return Err(Error::ErrNoLocalFingerprint);
        }
        Ok(())
    }

    fn finish_description(
        &mut self,
        sdp_type: RTCSdpType,
        media_sections: Vec<MediaSection>,
        bundle: Vec<SmolStr>,
    ) -> Result<RTCSessionDescription> {
        self.session_version += 1;
        let parsed = JsepSessionDescription {
            session_id: self.session_id,
            session_version: self.session_version,
            media_sections,
            bundle_groups: if bundle.is_empty() {
                vec![]
            } else {
                vec![bundle]
            },
            ice_lite: self.setting_engine.candidates.ice_lite,
            extmap_allow_mixed: true,
        };
        let sdp = self.sdp_codec.serialize(&parsed)?;
        Ok(RTCSessionDescription::from_parsed(sdp_type, sdp, parsed))
    }

    /// generate_offer builds an offer from the transceivers, the data
    /// channels and the previously negotiated sections. Existing sections
    /// keep their position; sections of stopped transceivers that were
    /// rejected before are recycled for new transceivers.
    pub(crate) fn generate_offer(
        &mut self,
        options: &RTCOfferOptions,
        fingerprint: Option<RTCDtlsFingerprint>,
    ) -> Result<RTCSessionDescription> {
        self.check_fingerprint(&fingerprint)?;
        let ice_restart = options.ice_restart || !self.ice_credentials_to_replace.is_empty();

        let local = self.local_jsep().cloned().unwrap_or_default();
        let remote = self.remote_jsep().cloned().unwrap_or_default();
        let current_local = self.current_local_jsep().cloned().unwrap_or_default();
        let current_remote = self.current_remote_jsep().cloned().unwrap_or_default();
        let was_rejected = |sections: &[MediaSection], i: usize| {
            sections.get(i).map(|m| m.rejected).unwrap_or(false)
        };

        let mut sections: Vec<MediaSection> = vec![];
        let mut recyclable: VecDeque<usize> = VecDeque::new();
        let count = local.media_sections.len().max(remote.media_sections.len());
        for i in 0..count {
            let existing = match local
                .media_sections
                .get(i)
                .or_else(|| remote.media_sections.get(i))
            {
                Some(m) => m,
                None => continue,
            };
            let mid = existing.mid.clone();
            let had_been_rejected = was_rejected(&current_local.media_sections, i)
                || was_rejected(&current_remote.media_sections, i);

            if !existing.media_type.is_rtp() {
                if had_been_rejected || self.data_mid.as_ref() != Some(&mid) {
                    sections.push(rejected_section(mid, MediaType::Data));
                } else {
                    sections.push(data_section(mid, existing.sctp_port));
                }
                continue;
            }

            let transceiver = self
                .transceivers
                .find_by_mid(&mid)
                .and_then(|id| self.transceivers.get_mut(id));
            match transceiver {
                Some(t) if !(had_been_rejected && t.stopping) => {
                    sections.push(offered_section(t, mid, &self.cname));
                    t.mline_index = Some(i);
                }
                _ => {
                    sections.push(rejected_section(mid, existing.media_type));
                    recyclable.push_back(i);
                }
            }
        }

        for id in self.transceivers.ids() {
            let unassociated = self
                .transceivers
                .get(id)
                .map(|t| t.mid.is_none() && !t.stopping)
                .unwrap_or(false);
            if !unassociated {
                continue;
            }
            let mid = self.mid_generator.generate();
            if let Some(t) = self.transceivers.get_mut(id) {
                let section = offered_section(t, mid, &self.cname);
                let mline_index = match recyclable.pop_front() {
                    Some(i) => {
                        sections[i] = section;
                        i
                    }
                    None => {
                        sections.push(section);
                        sections.len() - 1
                    }
                };
                t.mline_index = Some(mline_index);
            }
        }

        if self.data_mid.is_none() && !self.data_channels.is_empty() {
            let mid = self.mid_generator.generate();
            sections.push(data_section(mid, None));
        }

        let ice = self.local_ice_parameters(ice_restart);
        let role = DEFAULT_DTLS_ROLE_OFFER.to_connection_role();
        for m in sections.iter_mut() {
            self.fill_transport(m, &ice, ice_restart, &fingerprint, role);
        }

        let bundle = bundle_of(sections.iter());
        let offer = self.finish_description(RTCSdpType::Offer, sections, bundle)?;
        log::debug!(
            "created offer with {} media sections",
            offer.parsed().map(|p| p.media_sections.len()).unwrap_or(0)
        );
        self.last_offer = Some(offer.clone());
        Ok(offer)
    }

    /// generate_answer answers the pending remote offer section by section.
    /// `dtls_roles` holds the roles the transport already negotiated per mid.
    pub(crate) fn generate_answer(
        &mut self,
        fingerprint: Option<RTCDtlsFingerprint>,
        dtls_roles: &HashMap<SmolStr, DTLSRole>,
    ) -> Result<RTCSessionDescription> {
        if !matches!(
            self.signaling_state,
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveLocalPranswer
        ) {
            return Err(Error::ErrIncorrectSignalingState(self.signaling_state));
        }
        let offer = self
            .remote_jsep()
            .cloned()
            .ok_or(Error::ErrNoRemoteDescription)?;
        self.check_fingerprint(&fingerprint)?;

        let ice_restart = offer
            .media_sections
            .iter()
            .any(|m| self.pending_ice_restarts.contains(&m.mid));
        let ice = self.local_ice_parameters(ice_restart);
        let local_lite = self.setting_engine.candidates.ice_lite;

        let mut sections = Vec::with_capacity(offer.media_sections.len());
        for offered in &offer.media_sections {
            let mut m = if offered.media_type.is_rtp() {
                match self
                    .transceivers
                    .find_by_mid(&offered.mid)
                    .and_then(|id| self.transceivers.get(id))
                {
                    Some(t) => answered_section(t, offered, &self.cname),
                    None => rejected_section(offered.mid.clone(), offered.media_type),
                }
            } else if offered.rejected || self.data_mid.as_ref() != Some(&offered.mid) {
                rejected_section(offered.mid.clone(), MediaType::Data)
            } else {
                data_section(offered.mid.clone(), offered.sctp_port)
            };

            let role = match dtls_roles.get(&offered.mid) {
                Some(role @ (DTLSRole::Client | DTLSRole::Server)) => *role,
                _ if self.setting_engine.answering_dtls_role != DTLSRole::Unspecified => {
                    self.setting_engine.answering_dtls_role
                }
                _ if offer.ice_lite && !local_lite => DTLSRole::Server,
                _ => DTLSRole::answer_role(
                    offer
                        .transport_for(&offered.mid)
                        .map(|t| t.connection_role)
                        .unwrap_or(ConnectionRole::Unspecified),
                ),
            };
            self.fill_transport(&mut m, &ice, ice_restart, &fingerprint, role.to_connection_role());
            sections.push(m);
        }

        let accepted = bundle_of(sections.iter());
        let bundle = offer
            .bundle_groups
            .first()
            .map(|group| {
                group
                    .iter()
                    .filter(|mid| accepted.contains(mid))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let answer = self.finish_description(RTCSdpType::Answer, sections, bundle)?;
        self.last_answer = Some(answer.clone());
        Ok(answer)
    }
}

impl PeerConnectionInternal {
    pub(super) async fn create_offer(&self, options: RTCOfferOptions) -> Result<RTCSessionDescription> {
        let mut state = self.state.lock().await;
        if state.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }
        state.apply_legacy_offer_options(&options)?;
        state.generate_offer(&options, self.transport.local_fingerprint())
    }

    pub(super) async fn create_answer(&self, _options: RTCAnswerOptions) -> Result<RTCSessionDescription> {
        let mut state = self.state.lock().await;
        if state.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }

        let mids: Vec<SmolStr> = state
            .remote_jsep()
            .map(|d| d.media_sections.iter().map(|m| m.mid.clone()).collect())
            .unwrap_or_default();
        let mut dtls_roles = HashMap::new();
        for mid in mids {
            if let Some(role) = self.transport.get_dtls_role(&mid).await {
                dtls_roles.insert(mid, role);
            }
        }
        state.generate_answer(self.transport.local_fingerprint(), &dtls_roles)
    }
}
