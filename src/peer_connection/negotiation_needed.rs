use super::observer::ObserverEvent;
use super::peer_connection_internal::NegotiationState;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::{JsepSessionDescription, MediaSection};
use crate::peer_connection::signaling_state::RTCSignalingState;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::RTCRtpTransceiver;

/// transceiver_section finds the section negotiated under the transceiver's
/// mid. A transceiver without a mid has no section, whatever mline index it
/// was last offered at.
fn transceiver_section<'a>(
    t: &RTCRtpTransceiver,
    desc: Option<&'a JsepSessionDescription>,
) -> Option<&'a MediaSection> {
    let mid = t.mid.as_ref()?;
    desc?.section_by_mid(mid)
}

impl NegotiationState {
    /// check_if_negotiation_is_needed implements
    /// <https://w3c.github.io/webrtc-pc/#dfn-check-if-negotiation-is-needed>
    pub(crate) fn check_if_negotiation_is_needed(&self) -> bool {
        // An ICE restart is staged.
        if !self.ice_credentials_to_replace.is_empty() {
            return true;
        }

        let description = match &self.current_local_description {
            Some(description) => description,
            None => return true,
        };
        let local = match description.parsed() {
            Some(local) => local,
            None => return true,
        };

        if !self.data_channels.is_empty() && local.first_data_section().is_none() {
            return true;
        }

        let current_remote = self.current_remote_jsep();
        for t in self.transceivers.iter() {
            let local_section = transceiver_section(t, Some(local));
            let remote_section = transceiver_section(t, current_remote);

            if t.stopped {
                if let Some(local_section) = local_section {
                    let remote_rejected = remote_section.map(|m| m.rejected).unwrap_or(false);
                    if !local_section.rejected && !remote_rejected {
                        return true;
                    }
                }
                continue;
            }

            if t.stopping {
                return true;
            }

            let local_section = match local_section {
                Some(local_section) => local_section,
                None => return true,
            };

            if t.direction.has_send() {
                if local_section.streams.is_empty() {
                    return true;
                }
                let mut section_msids: Vec<_> = local_section
                    .streams
                    .iter()
                    .flat_map(|s| s.stream_ids.iter().cloned())
                    .collect();
                let mut sender_msids = t.sender.stream_ids().to_vec();
                if section_msids.len() != sender_msids.len() {
                    return true;
                }
                section_msids.sort();
                sender_msids.sort();
                if section_msids != sender_msids {
                    return true;
                }
            }

            match description.sdp_type {
                RTCSdpType::Offer => {
                    let remote_section = match (current_remote, remote_section) {
                        (Some(_), Some(remote_section)) => remote_section,
                        _ => return true,
                    };
                    if t.direction != local_section.direction
                        && t.direction != remote_section.direction.reverse()
                    {
                        return true;
                    }
                }
                RTCSdpType::Answer => {
                    let remote = match self.remote_jsep() {
                        Some(remote) => remote,
                        None => return true,
                    };
                    let offered = transceiver_section(t, Some(remote))
                        .map(|m| m.direction)
                        .unwrap_or(RTCRtpTransceiverDirection::Inactive);
                    if local_section.direction != t.direction.intersect(offered.reverse()) {
                        return true;
                    }
                }
                _ => {}
            }
        }

        false
    }

    /// update_negotiation_needed implements
    /// <https://w3c.github.io/webrtc-pc/#dfn-update-the-negotiation-needed-flag>.
    /// The flag is edge triggered: an event is only queued when it turns on.
    pub(crate) fn update_negotiation_needed(&mut self, events: &mut Vec<ObserverEvent>) {
        if self.signaling_state != RTCSignalingState::Stable {
            return;
        }

        if !self.check_if_negotiation_is_needed() {
            self.is_negotiation_needed = false;
            // Invalidates events that were not delivered yet.
            self.negotiation_needed_event_id = self.negotiation_needed_event_id.wrapping_add(1);
            return;
        }

        if self.is_negotiation_needed {
            return;
        }
        self.is_negotiation_needed = true;
        self.generate_negotiation_needed_event(events);
    }

    pub(crate) fn generate_negotiation_needed_event(&mut self, events: &mut Vec<ObserverEvent>) {
        self.negotiation_needed_event_id = self.negotiation_needed_event_id.wrapping_add(1);
        log::trace!(
            "negotiation needed event {} generated",
            self.negotiation_needed_event_id
        );
        events.push(ObserverEvent::NegotiationNeeded(
            self.negotiation_needed_event_id,
        ));
    }

    /// should_fire_negotiation_needed_event validates an event right before
    /// it reaches the application. An event raised while operations are
    /// still queued is swallowed and re-evaluated once the chain drained.
    pub(crate) fn should_fire_negotiation_needed_event(
        &mut self,
        event_id: u32,
        chain_is_empty: bool,
    ) -> bool {
        if self.is_closed() || event_id != self.negotiation_needed_event_id {
            return false;
        }

        if !chain_is_empty {
            self.is_negotiation_needed = false;
            self.update_negotiation_needed_on_empty_chain = true;
            return false;
        }

        self.signaling_state == RTCSignalingState::Stable && self.is_negotiation_needed
    }
}
