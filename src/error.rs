use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as MpscSendError;

use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::signaling_state::RTCSignalingState;

pub type Result<T> = std::result::Result<T, Error>;

/// RTCErrorType is the coarse classification every [`Error`] falls into.
/// Callers that only care about the class of a failure should match on
/// [`Error::error_type`] instead of individual variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCErrorType {
    /// The operation is illegal in the current signaling state.
    InvalidState,
    /// A description or argument is malformed.
    InvalidParameter,
    /// The feature can not be negotiated in the current mode.
    UnsupportedOperation,
    /// A legacy option value is not supported.
    UnsupportedParameter,
    /// A configuration field was changed in a way that is not allowed.
    InvalidModification,
    /// A value is outside its allowed range.
    InvalidRange,
    /// A collaborator failed while a description was being applied.
    InternalError,
}

impl fmt::Display for RTCErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCErrorType::InvalidState => "INVALID_STATE",
            RTCErrorType::InvalidParameter => "INVALID_PARAMETER",
            RTCErrorType::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            RTCErrorType::UnsupportedParameter => "UNSUPPORTED_PARAMETER",
            RTCErrorType::InvalidModification => "INVALID_MODIFICATION",
            RTCErrorType::InvalidRange => "INVALID_RANGE",
            RTCErrorType::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// ErrConnectionClosed indicates an operation executed after connection
    /// has already been closed.
    #[error("connection closed")]
    ErrConnectionClosed,

    /// ErrIncorrectSignalingState indicates that the signaling state of PeerConnection is not correct
    #[error("operation can not be run in current signaling state {0}")]
    ErrIncorrectSignalingState(RTCSignalingState),

    /// ErrNoRemoteDescription indicates that an operation was rejected because
    /// the remote description is not set
    #[error("remote description is not set")]
    ErrNoRemoteDescription,

    #[error("can't rollback from stable state")]
    ErrSignalingStateCannotRollback,

    #[error(
        "invalid proposed signaling state transition from {} applying {} {}",
        from,
        if *is_local { "local" } else { "remote" },
        applying
    )]
    ErrSignalingStateProposedTransitionInvalid {
        from: RTCSignalingState,
        applying: RTCSdpType,
        is_local: bool,
    },

    /// ErrRollbackPlanB indicates rollback was requested while running with
    /// Plan B semantics.
    #[error("rollback is not supported in Plan B")]
    ErrRollbackPlanB,

    /// ErrUnifiedPlanRequired indicates an API that only exists for Unified Plan.
    #[error("operation is only available with Unified Plan semantics")]
    ErrUnifiedPlanRequired,

    #[error("provided value is not a valid enum value of type SDPType")]
    ErrPeerConnSDPTypeInvalidValue,

    /// ErrSdpParse is returned when the SDP codec could not parse a description.
    #[error("failed to parse session description: {0}")]
    ErrSdpParse(String),

    #[error("session description is missing its media description")]
    ErrSessionDescriptionInvalid,

    #[error("a media section is missing a MID attribute")]
    ErrSessionDescriptionMissingMid,

    #[error("duplicate a=mid value '{0}'")]
    ErrSessionDescriptionDuplicateMid(SmolStr),

    #[error("called with SDP without DTLS fingerprint")]
    ErrSessionDescriptionNoFingerprint,

    #[error("called with SDP without SDES crypto")]
    ErrSessionDescriptionNoSdesCrypto,

    #[error("called with SDP without ice-ufrag")]
    ErrSessionDescriptionMissingIceUfrag,

    #[error("called with SDP without ice-pwd")]
    ErrSessionDescriptionMissingIcePwd,

    #[error("rtcp-mux must be enabled when BUNDLE is enabled")]
    ErrBundleWithoutRtcpMux,

    #[error("rtcp-mux-policy is 'require' but RTCP muxing is not enabled")]
    ErrRtcpMuxRequired,

    #[error("max-bundle configured but session description has no BUNDLE group")]
    ErrMaxBundleWithoutBundleGroup,

    #[error("the order of m-lines in answer doesn't match order in offer")]
    ErrMlineMismatchInAnswer,

    #[error("the order of m-lines in subsequent offer doesn't match order from previous offer/answer")]
    ErrMlineMismatchInSubsequentOffer,

    #[error(
        "invalid Media Section. Can not have multiple tracks in one MediaSection in UnifiedPlan"
    )]
    ErrSDPMediaSectionMultipleTrackInvalid,

    /// ErrTransceiverMediaTypeMismatch indicates a media section was matched
    /// against a transceiver of a different kind.
    #[error("transceiver for mid {mid} is {transceiver} but the media section is {section}")]
    ErrTransceiverMediaTypeMismatch {
        mid: SmolStr,
        transceiver: String,
        section: String,
    },

    /// ErrUnknownTransceiverForSection indicates a local media section has no
    /// transceiver. Local descriptions are always generated from transceivers,
    /// so this can only happen with a description not created by this session.
    #[error("unknown transceiver for media section {0}")]
    ErrUnknownTransceiverForSection(SmolStr),

    /// ErrTransceiverNotFound indicates an invalid transceiver handle.
    #[error("transceiver not found")]
    ErrTransceiverNotFound,

    #[error("failed to create channel for mid={0}")]
    ErrChannelCreationFailed(SmolStr),

    #[error("failed to create data channel transport for mid={0}")]
    ErrDataChannelTransportCreationFailed(SmolStr),

    #[error("failed to push down {} description: {}", if *is_local { "local" } else { "remote" }, reason)]
    ErrTransportPushdown { is_local: bool, reason: String },

    /// ErrSessionError is returned by every set-description call once a
    /// previous one failed after it started mutating state.
    #[error("session error {kind}: {message}")]
    ErrSessionError { kind: String, message: String },

    #[error("local certificate fingerprint is not available")]
    ErrNoLocalFingerprint,

    /// ErrNoTransportController indicates an API built without a transport
    /// controller was asked for a peer connection.
    #[error("no transport controller configured")]
    ErrNoTransportController,

    #[error("set_answering_dtls_role must DTLSRoleClient or DTLSRoleServer")]
    ErrSettingEngineSetAnsweringDTLSRole,

    #[error("candidate has neither sdpMid nor sdpMLineIndex")]
    ErrIceCandidateMissingMidAndIndex,

    #[error("candidate sdpMid {0} does not match any media section")]
    ErrIceCandidateMidNotFound(String),

    #[error("candidate sdpMLineIndex {0} is out of range")]
    ErrIceCandidateMlineIndexOutOfRange(u16),

    #[error("candidate belongs to a rejected media section")]
    ErrIceCandidateRejectedSection,

    #[error("candidate usernameFragment does not match the remote description")]
    ErrIceCandidateUfragMismatch,

    #[error("failed to add remote candidate: {0}")]
    ErrIceCandidateAddFailed(String),

    /// ErrNoTurnCredentials indicates that a TURN server URL was provided
    /// without required credentials.
    #[error("turn server credentials required")]
    ErrNoTurnCredentials,

    #[error("invalid ice server url {0}")]
    ErrInvalidIceServerUrl(String),

    /// ErrModifyingICECandidatePoolSize indicates that an attempt to modify
    /// ICECandidatePoolSize was made after a local description was set.
    #[error("ice candidate pool size cannot be modified")]
    ErrModifyingICECandidatePoolSize,

    #[error("crypto options cannot be modified")]
    ErrModifyingCryptoOptions,

    /// ErrModifyingBundlePolicy indicates that an attempt to modify
    /// BundlePolicy was made after PeerConnection has been initialized.
    #[error("bundle policy cannot be modified")]
    ErrModifyingBundlePolicy,

    /// ErrModifyingRTCPMuxPolicy indicates that an attempt to modify
    /// RTCPMuxPolicy was made after PeerConnection has been initialized.
    #[error("rtcp mux policy cannot be modified")]
    ErrModifyingRTCPMuxPolicy,

    #[error("sdp semantics cannot be modified")]
    ErrModifyingSdpSemantics,

    #[error("ice candidate pool size is out of range")]
    ErrICECandidatePoolSizeOutOfRange,

    #[error("offer_to_receive_{0} > 1 is not supported")]
    ErrOfferToReceiveUnsupported(&'static str),

    /// ErrStringSizeLimit indicates that the character size limit of string is
    /// exceeded. The limit is hardcoded to 65535 according to specifications.
    #[error("data channel label exceeds size limit")]
    ErrStringSizeLimit,

    #[error("protocol is larger then 65535 bytes")]
    ErrProtocolTooLarge,

    /// ErrRetransmitsOrPacketLifeTime indicates that an attempt to create a data
    /// channel was made with both options max_packet_life_time and max_retransmits
    /// set together.
    #[error("both max_packet_life_time and max_retransmits was set")]
    ErrRetransmitsOrPacketLifeTime,

    /// ErrExistingTrack indicates that a track already exists.
    #[error("track already exists")]
    ErrExistingTrack,

    #[error("track has invalid kind")]
    ErrTrackKindInvalid,

    #[error("the existing transceiver is stopping")]
    ErrRTPTransceiverStopping,

    #[error("transceiver has been stopped")]
    ErrRTPTransceiverStopped,

    #[error("invalid transceiver direction")]
    ErrRTPTransceiverDirectionInvalid,

    #[error("add_transceiver accepts only audio or video kinds")]
    ErrRTPTransceiverKindInvalid,

    /// ErrSenderNotCreatedByConnection indicates remove_track was called
    /// with a sender this connection does not own.
    #[error("sender was not created by this peer connection")]
    ErrSenderNotCreatedByConnection,

    #[error("codec {0} is not supported for this transceiver")]
    ErrRTPTransceiverCodecUnsupported(String),

    /// ErrRTPSenderRidNil indicates a simulcast encoding without a rid.
    #[error("Sender cannot add encoding as rid is empty")]
    ErrRTPSenderRidNil,

    #[error("Sender cannot encoding due to RID collision")]
    ErrRTPSenderRIDCollision,

    #[error("mpsc send: {0}")]
    MpscSend(String),

    #[allow(non_camel_case_types)]
    #[error("{0}")]
    new(String),
}

impl Error {
    /// error_type reports which class of failure this error belongs to.
    pub fn error_type(&self) -> RTCErrorType {
        match self {
            Error::ErrConnectionClosed
            | Error::ErrIncorrectSignalingState(_)
            | Error::ErrNoRemoteDescription
            | Error::ErrSignalingStateCannotRollback
            | Error::ErrSignalingStateProposedTransitionInvalid { .. }
            | Error::ErrRTPTransceiverStopped => RTCErrorType::InvalidState,

            Error::ErrRollbackPlanB | Error::ErrUnifiedPlanRequired => {
                RTCErrorType::UnsupportedOperation
            }

            Error::ErrOfferToReceiveUnsupported(_) => RTCErrorType::UnsupportedParameter,

            Error::ErrModifyingICECandidatePoolSize
            | Error::ErrModifyingCryptoOptions
            | Error::ErrModifyingBundlePolicy
            | Error::ErrModifyingRTCPMuxPolicy
            | Error::ErrModifyingSdpSemantics
            | Error::ErrRTPTransceiverCodecUnsupported(_) => RTCErrorType::InvalidModification,

            Error::ErrICECandidatePoolSizeOutOfRange => RTCErrorType::InvalidRange,

            Error::ErrUnknownTransceiverForSection(_)
            | Error::ErrChannelCreationFailed(_)
            | Error::ErrDataChannelTransportCreationFailed(_)
            | Error::ErrTransportPushdown { .. }
            | Error::ErrSessionError { .. }
            | Error::ErrNoLocalFingerprint
            | Error::ErrNoTransportController
            | Error::ErrIceCandidateAddFailed(_)
            | Error::MpscSend(_)
            | Error::new(_) => RTCErrorType::InternalError,

            _ => RTCErrorType::InvalidParameter,
        }
    }
}

// Because Tokio SendError is parameterized, we sadly lose the backtrace.
impl<T> From<MpscSendError<T>> for Error {
    fn from(e: MpscSendError<T>) -> Self {
        Error::MpscSend(e.to_string())
    }
}

impl From<sdp::Error> for Error {
    fn from(e: sdp::Error) -> Self {
        Error::ErrSdpParse(e.to_string())
    }
}
