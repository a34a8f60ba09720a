use super::peer_connection_internal::NegotiationState;
use crate::error::{Error, Result};
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::{JsepSessionDescription, MediaSection, MediaType};
use crate::peer_connection::signaling_state::{check_next_signaling_state, StateChangeOp};

/// is_media_section_being_recycled reports a section offered again at an
/// index that was rejected before. Such a section may carry a new mid and a
/// new media type.
pub(crate) fn is_media_section_being_recycled(
    sdp_type: RTCSdpType,
    section: &MediaSection,
    old_one: Option<&MediaSection>,
    old_two: Option<&MediaSection>,
) -> bool {
    sdp_type == RTCSdpType::Offer
        && !section.rejected
        && (old_one.map(|m| m.rejected).unwrap_or(false)
            || old_two.map(|m| m.rejected).unwrap_or(false))
}

/// media_sections_in_same_order checks that `new` keeps the mid and media
/// type of every section of `current`, apart from recycled ones.
pub(crate) fn media_sections_in_same_order(
    current: &JsepSessionDescription,
    secondary: Option<&JsepSessionDescription>,
    new: &JsepSessionDescription,
    sdp_type: RTCSdpType,
) -> bool {
    if current.media_sections.len() > new.media_sections.len() {
        return false;
    }

    for (i, current_section) in current.media_sections.iter().enumerate() {
        let new_section = &new.media_sections[i];
        let secondary_section = secondary.and_then(|d| d.media_sections.get(i));
        if is_media_section_being_recycled(
            sdp_type,
            new_section,
            Some(current_section),
            secondary_section,
        ) {
            continue;
        }
        if new_section.mid != current_section.mid
            || new_section.media_type != current_section.media_type
        {
            return false;
        }
    }

    true
}

impl NegotiationState {
    /// validate_session_description runs every check that has to pass before
    /// a description is allowed to change the session.
    pub(crate) fn validate_session_description(
        &self,
        desc: &RTCSessionDescription,
        op: StateChangeOp,
    ) -> Result<()> {
        self.check_session_error()?;

        let parsed = desc.parsed().ok_or(Error::ErrSessionDescriptionInvalid)?;

        check_next_signaling_state(self.signaling_state, op, desc.sdp_type)?;

        let mut mids = std::collections::HashSet::new();
        for m in &parsed.media_sections {
            if m.mid.is_empty() {
                return Err(Error::ErrSessionDescriptionMissingMid);
            }
            if !mids.insert(m.mid.clone()) {
                return Err(Error::ErrSessionDescriptionDuplicateMid(m.mid.clone()));
            }
        }

        // Rejected sections and BUNDLE members other than the tag carry no
        // transport of their own.
        let disable_dtls = self.setting_engine.disable_dtls;
        let owns_transport = |m: &&MediaSection| !m.rejected && !parsed.is_bundled_non_tag(&m.mid);
        for m in parsed.media_sections.iter().filter(owns_transport) {
            if !disable_dtls {
                if m.transport.fingerprint.is_none() {
                    return Err(Error::ErrSessionDescriptionNoFingerprint);
                }
            } else if m.media_type.is_rtp() && m.cryptos.is_empty() {
                return Err(Error::ErrSessionDescriptionNoSdesCrypto);
            }
        }
        for m in parsed.media_sections.iter().filter(owns_transport) {
            if m.transport.ice_ufrag.is_empty() {
                return Err(Error::ErrSessionDescriptionMissingIceUfrag);
            }
            if m.transport.ice_pwd.is_empty() {
                return Err(Error::ErrSessionDescriptionMissingIcePwd);
            }
        }

        for group in &parsed.bundle_groups {
            let without_mux = group
                .iter()
                .filter_map(|mid| parsed.section_by_mid(mid))
                .any(|m| !m.rejected && m.media_type.is_rtp() && !m.rtcp_mux);
            if without_mux {
                return Err(Error::ErrBundleWithoutRtcpMux);
            }
        }

        if !self.configuration.rtcp_mux_policy.accepts(parsed) {
            return Err(Error::ErrRtcpMuxRequired);
        }
        if !self.configuration.bundle_policy.accepts(parsed) {
            return Err(Error::ErrMaxBundleWithoutBundleGroup);
        }

        if desc.sdp_type.is_answer() {
            let offer = match op {
                StateChangeOp::SetLocal => self.remote_jsep(),
                StateChangeOp::SetRemote => self.local_jsep(),
            };
            let matches = match offer {
                Some(offer) => {
                    offer.media_sections.len() == parsed.media_sections.len()
                        && media_sections_in_same_order(offer, None, parsed, desc.sdp_type)
                }
                None => false,
            };
            if !matches {
                return Err(Error::ErrMlineMismatchInAnswer);
            }
        } else {
            let (current, secondary) = match (self.local_jsep(), self.remote_jsep()) {
                (Some(local), remote) => (Some(local), remote),
                (None, remote) => (remote, None),
            };
            if let Some(current) = current {
                if !media_sections_in_same_order(current, secondary, parsed, desc.sdp_type) {
                    return Err(Error::ErrMlineMismatchInSubsequentOffer);
                }
            }
        }

        if self.configuration.sdp_semantics.is_unified_plan() {
            let multiple_tracks = parsed
                .media_sections
                .iter()
                .any(|m| m.media_type != MediaType::Data && m.streams.len() > 1);
            if multiple_tracks {
                return Err(Error::ErrSDPMediaSectionMultipleTrackInvalid);
            }
        }

        Ok(())
    }

    /// fill_in_missing_remote_mids names remote sections that arrived
    /// without an a=mid line.
    pub(crate) fn fill_in_missing_remote_mids(&mut self, new: &mut JsepSessionDescription) {
        for m in &new.media_sections {
            self.mid_generator.add_known(&m.mid);
        }

        for i in 0..new.media_sections.len() {
            if !new.media_sections[i].mid.is_empty() {
                continue;
            }
            let local_mid = self
                .local_jsep()
                .and_then(|d| d.media_sections.get(i))
                .map(|m| (m.mid.clone(), "from the matching local media section"));
            let remote_mid = self
                .remote_jsep()
                .and_then(|d| d.media_sections.get(i))
                .map(|m| (m.mid.clone(), "from the matching previous remote media section"));
            let (mid, source) = match local_mid.or(remote_mid) {
                Some(found) => found,
                None => (self.mid_generator.generate(), "generated just now"),
            };
            log::info!(
                "remote media section at i={} is missing an a=mid line, filling in '{}' {}",
                i,
                mid,
                source
            );
            new.media_sections[i].mid = mid;
        }
    }
}
