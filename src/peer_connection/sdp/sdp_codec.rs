use std::collections::HashMap;
use std::io::Cursor;

use sdp::description::common::{Address, Attribute, ConnectionInformation};
use sdp::description::media::{MediaDescription, MediaName, RangedPort};
use sdp::description::session::*;
use sdp::util::ConnectionRole;
use smol_str::SmolStr;

use super::*;
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use crate::rtp_transceiver::PayloadType;
use crate::{SDP_ATTRIBUTE_RID, SDP_ATTRIBUTE_SIMULCAST};

const ATTR_KEY_ICE_UFRAG: &str = "ice-ufrag";
const ATTR_KEY_ICE_PWD: &str = "ice-pwd";
const ATTR_KEY_FINGERPRINT: &str = "fingerprint";
const ATTR_KEY_CRYPTO: &str = "crypto";
const ATTR_KEY_SCTP_PORT: &str = "sctp-port";
const ATTR_KEY_EXTMAP_ALLOW_MIXED: &str = "extmap-allow-mixed";
const BUNDLE_SEMANTIC: &str = "BUNDLE";

/// SdpCodec turns SDP text into a [`JsepSessionDescription`] and back. It
/// must be a pure transform: the negotiation core calls it while holding its
/// state.
pub trait SdpCodec {
    fn serialize(&self, desc: &JsepSessionDescription) -> Result<String>;
    fn parse(&self, sdp: &str) -> Result<JsepSessionDescription>;
}

/// DefaultSdpCodec is the [`SdpCodec`] backed by the `sdp` crate.
#[derive(Default, Debug, Clone, Copy)]
pub struct DefaultSdpCodec;

impl SdpCodec for DefaultSdpCodec {
    fn serialize(&self, desc: &JsepSessionDescription) -> Result<String> {
        Ok(marshal_description(desc).marshal())
    }

    fn parse(&self, sdp: &str) -> Result<JsepSessionDescription> {
        let mut reader = Cursor::new(sdp.as_bytes());
        let parsed = SessionDescription::unmarshal(&mut reader)?;
        unmarshal_description(&parsed)
    }
}

pub(crate) fn marshal_description(desc: &JsepSessionDescription) -> SessionDescription {
    let mut d = SessionDescription::new_jsep_session_description(false);
    d.origin.session_id = desc.session_id;
    d.origin.session_version = desc.session_version;

    for group in &desc.bundle_groups {
        if group.is_empty() {
            continue;
        }
        let mids: Vec<&str> = group.iter().map(|m| m.as_str()).collect();
        d = d.with_value_attribute(
            ATTR_KEY_GROUP.to_owned(),
            format!("{} {}", BUNDLE_SEMANTIC, mids.join(" ")),
        );
    }

    if desc.ice_lite {
        // RFC 5245 S15.3
        d = d.with_property_attribute(ATTR_KEY_ICELITE.to_owned());
    }

    if desc.extmap_allow_mixed {
        // RFC 8285 6.
        d = d.with_property_attribute(ATTR_KEY_EXTMAP_ALLOW_MIXED.to_owned());
    }

    d = d.with_value_attribute(ATTR_KEY_MSID_SEMANTIC.to_owned(), " WMS *".to_owned());

    for m in &desc.media_sections {
        d = d.with_media(marshal_media_section(m));
    }

    d
}

fn new_media_description(m: &MediaSection) -> MediaDescription {
    let port = if m.rejected { 0 } else { 9 };
    let (protos, formats) = match m.media_type {
        MediaType::Data => (
            vec!["UDP".to_owned(), "DTLS".to_owned(), "SCTP".to_owned()],
            vec!["webrtc-datachannel".to_owned()],
        ),
        _ => (
            vec![
                "UDP".to_owned(),
                "TLS".to_owned(),
                "RTP".to_owned(),
                "SAVPF".to_owned(),
            ],
            vec![],
        ),
    };

    MediaDescription {
        media_name: MediaName {
            media: m.media_type.to_string(),
            port: RangedPort {
                value: port,
                range: None,
            },
            protos,
            formats,
        },
        media_title: None,
        // Connection information is included even on rejected sections, some
        // parsers refuse an m= block without it.
        connection_information: Some(ConnectionInformation {
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            address: Some(Address {
                address: "0.0.0.0".to_owned(),
                ttl: None,
                range: None,
            }),
        }),
        bandwidth: vec![],
        encryption_key: None,
        attributes: vec![],
    }
}

fn marshal_media_section(m: &MediaSection) -> MediaDescription {
    let mut media = new_media_description(m);

    let transport = &m.transport;
    if !transport.ice_ufrag.is_empty() || !transport.ice_pwd.is_empty() {
        media = media.with_ice_credentials(transport.ice_ufrag.clone(), transport.ice_pwd.clone());
    }
    if let Some(fingerprint) = &transport.fingerprint {
        media = media.with_fingerprint(
            fingerprint.algorithm.clone(),
            fingerprint.value.to_uppercase(),
        );
    }
    if transport.connection_role != ConnectionRole::Unspecified {
        media = media.with_value_attribute(
            ATTR_KEY_CONNECTION_SETUP.to_owned(),
            transport.connection_role.to_string(),
        );
    }
    media = media.with_value_attribute(ATTR_KEY_MID.to_owned(), m.mid.to_string());

    if m.media_type == MediaType::Data {
        if let Some(port) = m.sctp_port {
            media = media.with_value_attribute(ATTR_KEY_SCTP_PORT.to_owned(), port.to_string());
        }
    } else {
        for ext in &m.header_extensions {
            media = media.with_value_attribute(
                ATTR_KEY_EXT_MAP.to_owned(),
                format!("{} {}", ext.id, ext.uri),
            );
        }

        media = media.with_property_attribute(m.direction.to_string());

        for stream in &m.streams {
            if stream.stream_ids.is_empty() {
                media = media
                    .with_value_attribute(ATTR_KEY_MSID.to_owned(), format!("- {}", stream.id));
            }
            for stream_id in &stream.stream_ids {
                media = media.with_value_attribute(
                    ATTR_KEY_MSID.to_owned(),
                    format!("{} {}", stream_id, stream.id),
                );
            }
        }

        if m.rtcp_mux {
            media = media.with_property_attribute(ATTR_KEY_RTCPMUX.to_owned());
        }

        for crypto in &m.cryptos {
            media = media.with_value_attribute(
                ATTR_KEY_CRYPTO.to_owned(),
                format!("{} {} {}", crypto.tag, crypto.crypto_suite, crypto.key_params),
            );
        }

        for codec in &m.codecs {
            media = media.with_codec(
                codec.payload_type,
                codec.capability.encoding_name().to_owned(),
                codec.capability.clock_rate,
                codec.capability.channels,
                codec.capability.sdp_fmtp_line.clone(),
            );
        }
        if m.codecs.is_empty() {
            media.media_name.formats.push("0".to_owned());
        }

        for rid in &m.rids {
            let value = if rid.params.is_empty() {
                format!("{} {}", rid.rid, rid.direction)
            } else {
                format!("{} {} {}", rid.rid, rid.direction, rid.params)
            };
            media = media.with_value_attribute(SDP_ATTRIBUTE_RID.to_owned(), value);
        }
        if m.has_simulcast() {
            media = media
                .with_value_attribute(SDP_ATTRIBUTE_SIMULCAST.to_owned(), m.simulcast.marshal());
        }

        for stream in &m.streams {
            let stream_label = stream
                .stream_ids
                .first()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_owned());
            for ssrc in &stream.ssrcs {
                media = media.with_media_source(
                    *ssrc,
                    stream.cname.clone(),
                    stream_label.clone(),
                    stream.id.to_string(),
                );
            }
        }
    }

    for candidate in &transport.candidates {
        media = media.with_candidate(candidate.clone());
    }

    media
}

pub(crate) fn unmarshal_description(d: &SessionDescription) -> Result<JsepSessionDescription> {
    let mut desc = JsepSessionDescription {
        session_id: d.origin.session_id,
        session_version: d.origin.session_version,
        ice_lite: has_attribute(&d.attributes, ATTR_KEY_ICELITE),
        extmap_allow_mixed: has_attribute(&d.attributes, ATTR_KEY_EXTMAP_ALLOW_MIXED),
        ..Default::default()
    };

    for a in &d.attributes {
        if a.key != ATTR_KEY_GROUP {
            continue;
        }
        if let Some(value) = &a.value {
            let mut split = value.split_whitespace();
            if split.next() == Some(BUNDLE_SEMANTIC) {
                desc.bundle_groups.push(split.map(SmolStr::from).collect());
            }
        }
    }

    let session_transport = TransportDescription {
        ice_ufrag: d.attribute(ATTR_KEY_ICE_UFRAG).cloned().unwrap_or_default(),
        ice_pwd: d.attribute(ATTR_KEY_ICE_PWD).cloned().unwrap_or_default(),
        fingerprint: d
            .attribute(ATTR_KEY_FINGERPRINT)
            .and_then(|f| RTCDtlsFingerprint::parse(f)),
        connection_role: d
            .attribute(ATTR_KEY_CONNECTION_SETUP)
            .map(|s| ConnectionRole::from(s.as_str()))
            .unwrap_or_default(),
        candidates: vec![],
    };

    for m in &d.media_descriptions {
        desc.media_sections
            .push(unmarshal_media_section(m, &session_transport)?);
    }

    Ok(desc)
}

fn unmarshal_media_section(
    m: &MediaDescription,
    session_transport: &TransportDescription,
) -> Result<MediaSection> {
    let media_type = match m.media_name.media.as_str() {
        "audio" => MediaType::Audio,
        "video" => MediaType::Video,
        MEDIA_SECTION_APPLICATION => MediaType::Data,
        other => {
            return Err(Error::ErrSdpParse(format!(
                "unsupported media type {other}"
            )))
        }
    };

    let attr = |key: &str| -> Option<String> { m.attribute(key).flatten().map(|s| s.to_owned()) };

    let mut section = MediaSection::new(
        attr(ATTR_KEY_MID).map(SmolStr::from).unwrap_or_default(),
        media_type,
    );
    section.rejected = m.media_name.port.value == 0;
    section.direction = get_peer_direction(m);
    section.rtcp_mux = has_attribute(&m.attributes, ATTR_KEY_RTCPMUX);

    section.transport = TransportDescription {
        ice_ufrag: attr(ATTR_KEY_ICE_UFRAG).unwrap_or_else(|| session_transport.ice_ufrag.clone()),
        ice_pwd: attr(ATTR_KEY_ICE_PWD).unwrap_or_else(|| session_transport.ice_pwd.clone()),
        fingerprint: attr(ATTR_KEY_FINGERPRINT)
            .and_then(|f| RTCDtlsFingerprint::parse(&f))
            .or_else(|| session_transport.fingerprint.clone()),
        connection_role: attr(ATTR_KEY_CONNECTION_SETUP)
            .map(|s| ConnectionRole::from(s.as_str()))
            .unwrap_or(session_transport.connection_role),
        candidates: values(m, ATTR_KEY_CANDIDATE),
    };

    if media_type == MediaType::Data {
        section.sctp_port = attr(ATTR_KEY_SCTP_PORT)
            .and_then(|p| p.parse::<u16>().ok())
            .or_else(|| {
                m.media_name
                    .formats
                    .first()
                    .and_then(|f| f.parse::<u16>().ok())
            });
        return Ok(section);
    }

    section.cryptos = values(m, ATTR_KEY_CRYPTO)
        .iter()
        .filter_map(|v| parse_crypto(v))
        .collect();
    section.streams = streams_from_media_description(m);

    for value in values(m, SDP_ATTRIBUTE_RID) {
        match RidDescription::try_from(value.as_str()) {
            Ok(rid) => section.rids.push(rid),
            Err(err) => log::warn!("Failed to parse RID: {}", err),
        }
    }
    if let Some(value) = attr(SDP_ATTRIBUTE_SIMULCAST) {
        section.simulcast = SimulcastDescription::parse(&value);
    }

    section.codecs = codecs_from_media_description(m)?;
    section.header_extensions = rtp_extensions_from_media_description(m);

    Ok(section)
}

fn has_attribute(attributes: &[Attribute], key: &str) -> bool {
    attributes.iter().any(|a| a.key == key)
}

fn values(m: &MediaDescription, key: &str) -> Vec<String> {
    m.attributes
        .iter()
        .filter(|a| a.key == key)
        .filter_map(|a| a.value.clone())
        .collect()
}

/// get_peer_direction defaults to sendrecv when the section carries no
/// direction attribute.
pub(crate) fn get_peer_direction(media: &MediaDescription) -> RTCRtpTransceiverDirection {
    for a in &media.attributes {
        let direction = RTCRtpTransceiverDirection::from(a.key.as_str());
        if direction != RTCRtpTransceiverDirection::Unspecified {
            return direction;
        }
    }
    RTCRtpTransceiverDirection::Sendrecv
}

fn parse_crypto(value: &str) -> Option<CryptoParams> {
    let mut split = value.split_whitespace();
    let tag = split.next()?.parse::<u32>().ok()?;
    let crypto_suite = split.next()?.to_owned();
    let key_params = split.next()?.to_owned();
    Some(CryptoParams {
        tag,
        crypto_suite,
        key_params,
    })
}

fn stream_for_track<'a>(streams: &'a mut Vec<StreamParams>, track_id: &str) -> &'a mut StreamParams {
    let pos = match streams.iter().position(|s| s.id == track_id) {
        Some(pos) => pos,
        None => {
            streams.push(StreamParams {
                id: SmolStr::from(track_id),
                ..Default::default()
            });
            streams.len() - 1
        }
    };
    &mut streams[pos]
}

/// streams_from_media_description collects the senders of a section from
/// its `a=msid` lines, falling back to the `a=ssrc ... msid:` form.
pub(crate) fn streams_from_media_description(m: &MediaDescription) -> Vec<StreamParams> {
    let mut streams: Vec<StreamParams> = vec![];

    for value in values(m, ATTR_KEY_MSID) {
        let mut split = value.split_whitespace();
        let (stream_id, track_id) = match (split.next(), split.next()) {
            (Some(stream_id), Some(track_id)) => (stream_id, track_id),
            _ => continue,
        };
        let stream = stream_for_track(&mut streams, track_id);
        if stream_id != "-" && !stream.stream_ids.iter().any(|s| s == stream_id) {
            stream.stream_ids.push(SmolStr::from(stream_id));
        }
    }

    let mut ssrc_cnames: HashMap<SSRC, String> = HashMap::new();
    let mut ssrc_order: Vec<SSRC> = vec![];
    let mut ssrc_tracks: HashMap<SSRC, (String, String)> = HashMap::new();
    for value in values(m, ATTR_KEY_SSRC) {
        let (ssrc_str, rest) = match value.split_once(' ') {
            Some(split) => split,
            None => continue,
        };
        let ssrc = match ssrc_str.parse::<SSRC>() {
            Ok(ssrc) => ssrc,
            Err(err) => {
                log::warn!("Failed to parse SSRC: {}", err);
                continue;
            }
        };
        if !ssrc_order.contains(&ssrc) {
            ssrc_order.push(ssrc);
        }
        if let Some(cname) = rest.strip_prefix("cname:") {
            ssrc_cnames.insert(ssrc, cname.to_owned());
        } else if let Some(msid) = rest.strip_prefix("msid:") {
            let mut split = msid.split_whitespace();
            if let (Some(stream_id), Some(track_id)) = (split.next(), split.next()) {
                ssrc_tracks.insert(ssrc, (stream_id.to_owned(), track_id.to_owned()));
            }
        }
    }

    for ssrc in ssrc_order {
        let stream = match ssrc_tracks.get(&ssrc) {
            Some((stream_id, track_id)) => {
                let stream = stream_for_track(&mut streams, track_id);
                if stream_id != "-" && !stream.stream_ids.iter().any(|s| s == stream_id) {
                    stream.stream_ids.push(SmolStr::from(stream_id.as_str()));
                }
                stream
            }
            None => match streams.first_mut() {
                Some(stream) => stream,
                None => continue,
            },
        };
        if !stream.ssrcs.contains(&ssrc) {
            stream.ssrcs.push(ssrc);
        }
        if let Some(cname) = ssrc_cnames.get(&ssrc) {
            stream.cname.clone_from(cname);
        }
    }

    streams
}

pub(crate) fn codecs_from_media_description(
    m: &MediaDescription,
) -> Result<Vec<RTCRtpCodecParameters>> {
    let s = SessionDescription {
        media_descriptions: vec![m.clone()],
        ..Default::default()
    };

    let mut out = vec![];
    for payload_str in &m.media_name.formats {
        let payload_type: PayloadType = match payload_str.parse::<u8>() {
            Ok(pt) => pt,
            Err(err) => return Err(Error::ErrSdpParse(err.to_string())),
        };
        let codec = match s.get_codec_for_payload_type(payload_type) {
            Ok(codec) => codec,
            Err(err) => {
                // static payload type of a rejected or codec-less section
                if payload_type == 0 {
                    continue;
                }
                return Err(err.into());
            }
        };

        let channels = codec.encoding_parameters.parse::<u16>().unwrap_or(0);

        out.push(RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: m.media_name.media.clone() + "/" + codec.name.as_str(),
                clock_rate: codec.clock_rate,
                channels,
                sdp_fmtp_line: codec.fmtp.clone(),
            },
            payload_type,
        })
    }

    Ok(out)
}

/// rtp_extensions_from_media_description reads `a=extmap:<id>[/<dir>] <uri>`
/// lines. Malformed lines are skipped.
pub(crate) fn rtp_extensions_from_media_description(
    m: &MediaDescription,
) -> Vec<RTCRtpHeaderExtensionParameters> {
    let mut out = vec![];

    for value in values(m, ATTR_KEY_EXT_MAP) {
        let mut split = value.split_whitespace();
        let id = split
            .next()
            .and_then(|id| id.split('/').next())
            .and_then(|id| id.parse::<u16>().ok());
        match (id, split.next()) {
            (Some(id), Some(uri)) => out.push(RTCRtpHeaderExtensionParameters {
                uri: uri.to_owned(),
                id,
            }),
            _ => log::warn!("Failed to parse extmap: {}", value),
        }
    }

    out
}
