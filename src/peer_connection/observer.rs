use async_trait::async_trait;
use smol_str::SmolStr;

use crate::ice_transport::ice_candidate::RTCIceCandidateInit;
use crate::peer_connection::signaling_state::RTCSignalingState;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::RTCRtpTransceiver;

/// PeerConnectionObserver receives the notifications of a peer connection.
///
/// Notifications are delivered in order from a task of their own, after the
/// operation that raised them left the operations chain. A callback may call
/// and await any method of the connection, chained ones included. Its own
/// follow-up notifications are delivered once it returned.
#[async_trait]
pub trait PeerConnectionObserver: Send + Sync {
    async fn on_signaling_state_change(&self, _state: RTCSignalingState) {}

    /// on_negotiation_needed_event carries the id to check with
    /// `should_fire_negotiation_needed_event`. Delivery already checked it
    /// once.
    async fn on_negotiation_needed_event(&self, _event_id: u32) {}

    /// on_track is fired for a transceiver that started receiving. The
    /// transceiver is a snapshot taken when the remote description applied.
    async fn on_track(&self, _transceiver: RTCRtpTransceiver) {}

    async fn on_remove_track(&self, _receiver: RTCRtpReceiver) {}

    async fn on_add_stream(&self, _stream_id: SmolStr) {}

    async fn on_remove_stream(&self, _stream_id: SmolStr) {}

    async fn on_ice_candidate(&self, _candidate: RTCIceCandidateInit) {}
}

/// ObserverEvent is a notification queued while the negotiation state is
/// locked.
#[derive(Debug, Clone)]
pub(crate) enum ObserverEvent {
    SignalingStateChange(RTCSignalingState),
    NegotiationNeeded(u32),
    Track(RTCRtpTransceiver),
    RemoveTrack(RTCRtpReceiver),
    AddStream(SmolStr),
    RemoveStream(SmolStr),
    IceCandidate(RTCIceCandidateInit),
}

impl ObserverEvent {
    pub(crate) async fn notify(self, observer: &dyn PeerConnectionObserver) {
        match self {
            ObserverEvent::SignalingStateChange(state) => {
                observer.on_signaling_state_change(state).await
            }
            ObserverEvent::NegotiationNeeded(id) => observer.on_negotiation_needed_event(id).await,
            ObserverEvent::Track(transceiver) => observer.on_track(transceiver).await,
            ObserverEvent::RemoveTrack(receiver) => observer.on_remove_track(receiver).await,
            ObserverEvent::AddStream(id) => observer.on_add_stream(id).await,
            ObserverEvent::RemoveStream(id) => observer.on_remove_stream(id).await,
            ObserverEvent::IceCandidate(candidate) => observer.on_ice_candidate(candidate).await,
        }
    }
}

/// NoopObserver ignores every notification.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoopObserver;

impl PeerConnectionObserver for NoopObserver {}
