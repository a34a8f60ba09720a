use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use portable_atomic::{AtomicBool, AtomicU8};
use smol_str::SmolStr;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::observer::{ObserverEvent, PeerConnectionObserver};
use crate::api::setting_engine::SettingEngine;
use crate::api::API;
use crate::data_channel::RTCDataChannel;
use crate::error::{Error, Result};
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::operation::{Operation, Operations};
use crate::peer_connection::sdp::sdp_codec::SdpCodec;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::{JsepSessionDescription, MidGenerator};
use crate::peer_connection::signaling_state::RTCSignalingState;
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{RTCRtpTransceiver, TransceiverId, TransceiverList};
use crate::track::track_local::TrackLocal;
use crate::transport::{MediaChannelFactory, TransportController};

/// SessionError is raised when applying a description failed after it
/// started changing the session. Every later set-description fails with it.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SessionError {
    #[default]
    None,
    Content,
    Transport,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SessionError::None => "ERROR_NONE",
            SessionError::Content => "ERROR_CONTENT",
            SessionError::Transport => "ERROR_TRANSPORT",
        };
        write!(f, "{s}")
    }
}

/// NegotiationState is everything offer/answer reads and writes. It is only
/// mutated while the state lock is held, and chained operations hold the lock
/// for their whole run.
pub(crate) struct NegotiationState {
    pub(crate) configuration: RTCConfiguration,
    pub(crate) signaling_state: RTCSignalingState,
    published_signaling_state: Arc<AtomicU8>,

    pub(crate) current_local_description: Option<RTCSessionDescription>,
    pub(crate) pending_local_description: Option<RTCSessionDescription>,
    pub(crate) current_remote_description: Option<RTCSessionDescription>,
    pub(crate) pending_remote_description: Option<RTCSessionDescription>,

    pub(crate) transceivers: TransceiverList,
    pub(crate) data_channels: Vec<RTCDataChannel>,
    /// mid of the section the data channel transport was created for
    pub(crate) data_mid: Option<SmolStr>,
    /// the data channel transport was created by a pending offer
    pub(crate) pending_data_transport: bool,
    pub(crate) mid_generator: MidGenerator,

    pub(crate) session_error: SessionError,
    pub(crate) session_error_desc: String,

    pub(crate) is_negotiation_needed: bool,
    pub(crate) negotiation_needed_event_id: u32,
    pub(crate) update_negotiation_needed_on_empty_chain: bool,

    /// mids whose remote ICE credentials changed in a pending remote offer
    pub(crate) pending_ice_restarts: HashSet<SmolStr>,
    /// local credentials the next offer has to replace
    pub(crate) ice_credentials_to_replace: Vec<RTCIceParameters>,
    pub(crate) initial_ice_parameters: RTCIceParameters,

    pub(crate) last_offer: Option<RTCSessionDescription>,
    pub(crate) last_answer: Option<RTCSessionDescription>,
    pub(crate) session_id: u64,
    pub(crate) session_version: u64,
    pub(crate) cname: String,

    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) sdp_codec: Arc<dyn SdpCodec + Send + Sync>,
}

impl NegotiationState {
    pub(crate) fn new(
        configuration: RTCConfiguration,
        published_signaling_state: Arc<AtomicU8>,
        setting_engine: Arc<SettingEngine>,
        sdp_codec: Arc<dyn SdpCodec + Send + Sync>,
    ) -> Self {
        published_signaling_state.store(RTCSignalingState::Stable as u8, Ordering::SeqCst);
        NegotiationState {
            configuration,
            signaling_state: RTCSignalingState::Stable,
            published_signaling_state,
            current_local_description: None,
            pending_local_description: None,
            current_remote_description: None,
            pending_remote_description: None,
            transceivers: TransceiverList::default(),
            data_channels: vec![],
            data_mid: None,
            pending_data_transport: false,
            mid_generator: MidGenerator::default(),
            session_error: SessionError::None,
            session_error_desc: String::new(),
            is_negotiation_needed: false,
            negotiation_needed_event_id: 0,
            update_negotiation_needed_on_empty_chain: false,
            pending_ice_restarts: HashSet::new(),
            ice_credentials_to_replace: vec![],
            initial_ice_parameters: setting_engine.initial_ice_parameters(),
            last_offer: None,
            last_answer: None,
            session_id: crate::rand::generate_session_id(),
            session_version: 0,
            cname: crate::rand::generate_id(),
            setting_engine,
            sdp_codec,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.signaling_state == RTCSignalingState::Closed
    }

    /// local_description is the pending local description if there is one,
    /// the current one otherwise.
    pub(crate) fn local_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_local_description
            .as_ref()
            .or(self.current_local_description.as_ref())
    }

    pub(crate) fn remote_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_remote_description
            .as_ref()
            .or(self.current_remote_description.as_ref())
    }

    pub(crate) fn local_description_mut(&mut self) -> Option<&mut RTCSessionDescription> {
        self.pending_local_description
            .as_mut()
            .or(self.current_local_description.as_mut())
    }

    pub(crate) fn remote_description_mut(&mut self) -> Option<&mut RTCSessionDescription> {
        self.pending_remote_description
            .as_mut()
            .or(self.current_remote_description.as_mut())
    }

    pub(crate) fn local_jsep(&self) -> Option<&JsepSessionDescription> {
        self.local_description().and_then(|d| d.parsed())
    }

    pub(crate) fn remote_jsep(&self) -> Option<&JsepSessionDescription> {
        self.remote_description().and_then(|d| d.parsed())
    }

    pub(crate) fn current_local_jsep(&self) -> Option<&JsepSessionDescription> {
        self.current_local_description
            .as_ref()
            .and_then(|d| d.parsed())
    }

    pub(crate) fn current_remote_jsep(&self) -> Option<&JsepSessionDescription> {
        self.current_remote_description
            .as_ref()
            .and_then(|d| d.parsed())
    }

    pub(crate) fn change_signaling_state(
        &mut self,
        next: RTCSignalingState,
        events: &mut Vec<ObserverEvent>,
    ) {
        if self.signaling_state == next {
            return;
        }
        log::info!(
            "signaling state changed from {} to {}",
            self.signaling_state,
            next
        );
        self.signaling_state = next;
        self.published_signaling_state
            .store(next as u8, Ordering::SeqCst);
        events.push(ObserverEvent::SignalingStateChange(next));
    }

    pub(crate) fn check_session_error(&self) -> Result<()> {
        if self.session_error == SessionError::None {
            return Ok(());
        }
        Err(Error::ErrSessionError {
            kind: self.session_error.to_string(),
            message: self.session_error_desc.clone(),
        })
    }

    pub(crate) fn set_session_error(&mut self, kind: SessionError, desc: String) {
        if kind != self.session_error {
            log::error!("session error {}: {}", kind, desc);
            self.session_error = kind;
            self.session_error_desc = desc;
        }
    }

    /// remote_stream_ids is the union of the streams all receivers belong to,
    /// in first seen order.
    pub(crate) fn remote_stream_ids(&self) -> Vec<SmolStr> {
        let mut ids: Vec<SmolStr> = vec![];
        for t in self.transceivers.iter() {
            for id in t.receiver.stream_ids() {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// create_transceiver builds a transceiver and appends it to the registry.
    pub(crate) fn create_transceiver(
        &mut self,
        kind: RTPCodecType,
        direction: RTCRtpTransceiverDirection,
        track: Option<Arc<dyn TrackLocal + Send + Sync>>,
        stream_ids: Vec<SmolStr>,
        sender_id: SmolStr,
        receiver_id: SmolStr,
    ) -> TransceiverId {
        let id = self.transceivers.next_id();
        let sender = RTCRtpSender::new(sender_id, kind, track, stream_ids);
        let receiver = RTCRtpReceiver::new(receiver_id, kind);
        self.transceivers
            .add(RTCRtpTransceiver::new(id, kind, direction, sender, receiver))
    }

    /// reserialize refreshes the SDP text of a stored description after its
    /// parsed form changed.
    pub(crate) fn reserialize(
        codec: &dyn SdpCodec,
        desc: &mut RTCSessionDescription,
    ) -> Result<()> {
        if let Some(parsed) = &desc.parsed {
            desc.sdp = codec.serialize(parsed)?;
        }
        Ok(())
    }
}

/// push_added_streams queues AddStream for streams in `after` only.
pub(crate) fn push_added_streams(
    before: &[SmolStr],
    after: &[SmolStr],
    events: &mut Vec<ObserverEvent>,
) {
    for id in after.iter().filter(|id| !before.contains(id)) {
        events.push(ObserverEvent::AddStream(id.clone()));
    }
}

/// push_removed_streams queues RemoveStream for streams in `before` only.
pub(crate) fn push_removed_streams(
    before: &[SmolStr],
    after: &[SmolStr],
    events: &mut Vec<ObserverEvent>,
) {
    for id in before.iter().filter(|id| !after.contains(id)) {
        events.push(ObserverEvent::RemoveStream(id.clone()));
    }
}

tokio::task_local! {
    /// Set while an observer callback runs on the delivery task.
    static DELIVERING: ();
}

fn is_delivering() -> bool {
    DELIVERING.try_with(|_| ()).is_ok()
}

/// Delivery is a batch of notifications handed to the delivery task.
/// `delivered` fires once every event of the batch reached the observer.
struct Delivery {
    events: Vec<ObserverEvent>,
    delivered: oneshot::Sender<()>,
}

pub(crate) struct PeerConnectionInternal {
    pub(super) state: Mutex<NegotiationState>,

    /// ops is an operations queue which will ensure the enqueued actions are
    /// executed in order. Every offer/answer operation runs on it.
    pub(super) ops: Arc<Operations>,
    pub(super) is_closed: Arc<AtomicBool>,
    pub(super) signaling_state: Arc<AtomicU8>,

    deliveries_tx: mpsc::UnboundedSender<Delivery>,
    pub(super) transport: Arc<dyn TransportController + Send + Sync>,
    pub(super) channel_factory: Arc<dyn MediaChannelFactory + Send + Sync>,
}

impl PeerConnectionInternal {
    pub(super) fn new(
        api: &API,
        configuration: RTCConfiguration,
        observer: Arc<dyn PeerConnectionObserver>,
    ) -> Result<Arc<Self>> {
        let transport = api
            .transport
            .clone()
            .ok_or(Error::ErrNoTransportController)?;

        let signaling_state = Arc::new(AtomicU8::new(RTCSignalingState::Stable as u8));
        let state = NegotiationState::new(
            configuration,
            Arc::clone(&signaling_state),
            Arc::clone(&api.setting_engine),
            Arc::clone(&api.sdp_codec),
        );

        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
        let pc = Arc::new(PeerConnectionInternal {
            state: Mutex::new(state),
            ops: Arc::new(Operations::new()),
            is_closed: Arc::new(AtomicBool::new(false)),
            signaling_state,
            deliveries_tx,
            transport,
            channel_factory: Arc::clone(&api.channel_factory),
        });

        let weak = Arc::downgrade(&pc);
        tokio::spawn(async move {
            PeerConnectionInternal::deliver(weak, observer, deliveries_rx).await;
        });

        let weak = Arc::downgrade(&pc);
        pc.ops.on_empty(Box::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(pc) = weak.upgrade() {
                    pc.on_operations_chain_empty().await;
                }
            })
        }));

        Ok(pc)
    }

    /// chain runs `f` on the operations chain and waits for its result. When
    /// the connection closed before `f` reached the head of the chain, `f` is
    /// dropped and ErrConnectionClosed is returned instead.
    ///
    /// Notifications raised by `f` are delivered after `f` left the chain.
    /// The caller resumes once they reached the observer, unless it is an
    /// observer callback itself.
    pub(super) async fn chain<T, F, Fut>(self: &Arc<Self>, description: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Self>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let weak = Arc::downgrade(self);
        let mut job = Some((f, done_tx));

        self.ops
            .enqueue(Operation::new(
                move || {
                    let weak = weak.clone();
                    let job = job.take();
                    Box::pin(async move {
                        if let Some((f, done_tx)) = job {
                            let done = match weak.upgrade() {
                                Some(pc) if !pc.is_closed.load(Ordering::SeqCst) => {
                                    let result = f(Arc::clone(&pc)).await;
                                    (result, Some(pc.send_delivery(vec![])))
                                }
                                _ => (Err(Error::ErrConnectionClosed), None),
                            };
                            let _ = done_tx.send(done);
                        }
                        false
                    })
                },
                description,
            ))
            .await?;

        let (result, delivered) = done_rx
            .await
            .unwrap_or((Err(Error::ErrConnectionClosed), None));
        if let Some(delivered) = delivered {
            PeerConnectionInternal::wait_delivered(delivered).await;
        }
        result
    }

    /// queue_events hands notifications to the delivery task without
    /// waiting. Operations running on the chain use it, so that an observer
    /// may chain further operations from its callbacks.
    pub(super) fn queue_events(&self, events: Vec<ObserverEvent>) {
        let _ = self.send_delivery(events);
    }

    fn send_delivery(&self, events: Vec<ObserverEvent>) -> oneshot::Receiver<()> {
        let (delivered, delivered_rx) = oneshot::channel();
        if let Err(err) = self.deliveries_tx.send(Delivery { events, delivered }) {
            log::warn!("dropping {} notifications, observer is gone", err.0.events.len());
        }
        delivered_rx
    }

    /// dispatch hands notifications to the observer, in order, and waits
    /// until they were delivered.
    pub(super) async fn dispatch(&self, events: Vec<ObserverEvent>) {
        let delivered = self.send_delivery(events);
        PeerConnectionInternal::wait_delivered(delivered).await;
    }

    async fn wait_delivered(delivered: oneshot::Receiver<()>) {
        // A callback waiting for its own batch would never return.
        if !is_delivering() {
            let _ = delivered.await;
        }
    }

    /// deliver runs the observer callbacks, one batch after the other.
    /// Negotiation-needed is checked again right before delivery.
    async fn deliver(
        weak: Weak<PeerConnectionInternal>,
        observer: Arc<dyn PeerConnectionObserver>,
        mut deliveries_rx: mpsc::UnboundedReceiver<Delivery>,
    ) {
        while let Some(Delivery { events, delivered }) = deliveries_rx.recv().await {
            DELIVERING
                .scope((), async {
                    for event in events {
                        match event {
                            ObserverEvent::NegotiationNeeded(event_id) => {
                                let fire = match weak.upgrade() {
                                    Some(pc) => pc.should_fire_negotiation_needed_event(event_id).await,
                                    None => false,
                                };
                                if fire {
                                    log::debug!("firing negotiation needed event {}", event_id);
                                    observer.on_negotiation_needed_event(event_id).await;
                                }
                            }
                            event => event.notify(observer.as_ref()).await,
                        }
                    }
                })
                .await;
            let _ = delivered.send(());
        }
    }

    pub(super) async fn should_fire_negotiation_needed_event(&self, event_id: u32) -> bool {
        let mut state = self.state.lock().await;
        let chain_is_empty = self.ops.is_empty();
        state.should_fire_negotiation_needed_event(event_id, chain_is_empty)
    }

    async fn on_operations_chain_empty(self: &Arc<Self>) {
        let mut events = vec![];
        {
            let mut state = self.state.lock().await;
            if state.is_closed() || !state.update_negotiation_needed_on_empty_chain {
                return;
            }
            state.update_negotiation_needed_on_empty_chain = false;
            state.update_negotiation_needed(&mut events);
        }
        // Runs on the chain runner, which callbacks may be waiting for.
        self.queue_events(events);
    }

    /// update_negotiation_needed re-evaluates the flag after a non-chained
    /// API call changed the session.
    pub(super) async fn update_negotiation_needed(&self) {
        let mut events = vec![];
        {
            let mut state = self.state.lock().await;
            state.update_negotiation_needed(&mut events);
        }
        self.dispatch(events).await;
    }
}
