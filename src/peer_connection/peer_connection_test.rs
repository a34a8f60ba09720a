use std::sync::Mutex as SyncMutex;

use async_trait::async_trait;
use portable_atomic::{AtomicBool, AtomicU64};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_test::assert_ok;

use super::*;
use crate::api::setting_engine::SettingEngine;
use crate::api::APIBuilder;
use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::dtls_transport::dtls_role::DTLSRole;
use crate::ice_transport::ice_server::RTCIceServer;
use crate::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use crate::peer_connection::policy::sdp_semantics::RTCSdpSemantics;
use crate::peer_connection::sdp::sdp_codec::{DefaultSdpCodec, SdpCodec};
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::{JsepSessionDescription, MediaType};
use crate::rtp_transceiver::RTCRtpEncodingParameters;
use crate::track::track_local::track_local_static::TrackLocalStatic;
use crate::transport::{ChannelHandle, MediaChannelFactory, TransportController};

/// MockTransport records what the negotiation core pushed down.
#[derive(Default)]
pub(crate) struct MockTransport {
    pub(crate) pushed: SyncMutex<Vec<(bool, RTCSdpType)>>,
    pub(crate) remote_candidates: SyncMutex<Vec<(String, String)>>,
    pub(crate) fail_local: AtomicBool,
    pub(crate) fail_remote: AtomicBool,
    pub(crate) rollbacks: AtomicU64,
}

#[async_trait]
impl TransportController for MockTransport {
    async fn push_down_local_description(
        &self,
        sdp_type: RTCSdpType,
        _desc: &JsepSessionDescription,
    ) -> Result<()> {
        if self.fail_local.load(Ordering::SeqCst) {
            return Err(Error::new("local transport failure".to_owned()));
        }
        self.pushed.lock().unwrap().push((true, sdp_type));
        Ok(())
    }

    async fn push_down_remote_description(
        &self,
        sdp_type: RTCSdpType,
        _desc: &JsepSessionDescription,
    ) -> Result<()> {
        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(Error::new("remote transport failure".to_owned()));
        }
        self.pushed.lock().unwrap().push((false, sdp_type));
        Ok(())
    }

    async fn add_remote_candidates(&self, mid: &str, candidates: &[String]) -> Result<()> {
        let mut remote_candidates = self.remote_candidates.lock().unwrap();
        for c in candidates {
            remote_candidates.push((mid.to_owned(), c.clone()));
        }
        Ok(())
    }

    async fn get_dtls_role(&self, _mid: &str) -> Option<DTLSRole> {
        None
    }

    fn local_fingerprint(&self) -> Option<RTCDtlsFingerprint> {
        Some(RTCDtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: "AB:CD:EF:01:23:45:67:89".to_owned(),
        })
    }

    async fn rollback_transports(&self) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// MockChannelFactory counts channels and remembers data transports.
#[derive(Default)]
pub(crate) struct MockChannelFactory {
    next: AtomicU64,
    pub(crate) live: SyncMutex<Vec<ChannelHandle>>,
    pub(crate) destroyed: AtomicU64,
    pub(crate) data_transport: SyncMutex<Option<String>>,
    pub(crate) fail: AtomicBool,
}

impl MockChannelFactory {
    pub(crate) fn created(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    pub(crate) fn live(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaChannelFactory for MockChannelFactory {
    async fn create_channel(&self, _mid: &str, _kind: RTPCodecType) -> Option<ChannelHandle> {
        if self.fail.load(Ordering::SeqCst) {
            return None;
        }
        let handle = ChannelHandle(self.next.fetch_add(1, Ordering::SeqCst));
        self.live.lock().unwrap().push(handle);
        Some(handle)
    }

    async fn destroy_channel(&self, handle: ChannelHandle) {
        self.live.lock().unwrap().retain(|h| *h != handle);
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    async fn create_data_channel_transport(&self, mid: &str) -> bool {
        *self.data_transport.lock().unwrap() = Some(mid.to_owned());
        true
    }

    async fn destroy_data_channel_transport(&self, _mid: &str) {
        *self.data_transport.lock().unwrap() = None;
    }
}

/// RecordingObserver keeps every notification as a short string.
/// Negotiation-needed ids are also sent to a channel since they are
/// delivered from a spawned task.
pub(crate) struct RecordingObserver {
    events: SyncMutex<Vec<String>>,
    negotiation_needed_tx: mpsc::UnboundedSender<u32>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl PeerConnectionObserver for RecordingObserver {
    async fn on_signaling_state_change(&self, state: RTCSignalingState) {
        self.push(format!("signaling:{state}"));
    }

    async fn on_negotiation_needed_event(&self, event_id: u32) {
        let _ = self.negotiation_needed_tx.send(event_id);
    }

    async fn on_track(&self, transceiver: RTCRtpTransceiver) {
        let mid = transceiver.mid().cloned().unwrap_or_default();
        self.push(format!("track:{mid}"));
    }

    async fn on_remove_track(&self, receiver: RTCRtpReceiver) {
        self.push(format!("remove_track:{}", receiver.kind()));
    }

    async fn on_add_stream(&self, stream_id: SmolStr) {
        self.push(format!("add_stream:{stream_id}"));
    }

    async fn on_remove_stream(&self, stream_id: SmolStr) {
        self.push(format!("remove_stream:{stream_id}"));
    }

    async fn on_ice_candidate(&self, candidate: RTCIceCandidateInit) {
        self.push(format!("ice_candidate:{}", candidate.candidate));
    }
}

pub(crate) struct TestPeer {
    pub(crate) pc: RTCPeerConnection,
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) factory: Arc<MockChannelFactory>,
    pub(crate) observer: Arc<RecordingObserver>,
    negotiation_needed_rx: mpsc::UnboundedReceiver<u32>,
}

impl TestPeer {
    /// next_negotiation_needed waits for the next delivered
    /// negotiation-needed event.
    pub(crate) async fn next_negotiation_needed(&mut self) -> Option<u32> {
        timeout(Duration::from_secs(1), self.negotiation_needed_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// drain_negotiation_needed collects whatever was delivered within a
    /// short grace period.
    pub(crate) async fn drain_negotiation_needed(&mut self) -> Vec<u32> {
        let mut ids = vec![];
        while let Ok(Some(id)) =
            timeout(Duration::from_millis(100), self.negotiation_needed_rx.recv()).await
        {
            ids.push(id);
        }
        ids
    }
}

pub(crate) async fn new_peer_with(
    setting_engine: SettingEngine,
    configuration: RTCConfiguration,
) -> Result<TestPeer> {
    let _ = env_logger::builder().is_test(true).try_init();

    let transport = Arc::new(MockTransport::default());
    let factory = Arc::new(MockChannelFactory::default());
    let (negotiation_needed_tx, negotiation_needed_rx) = mpsc::unbounded_channel();
    let observer = Arc::new(RecordingObserver {
        events: SyncMutex::new(vec![]),
        negotiation_needed_tx,
    });

    let api = APIBuilder::new()
        .with_setting_engine(setting_engine)
        .with_transport_controller(transport.clone())
        .with_media_channel_factory(factory.clone())
        .build();
    let pc = api
        .new_peer_connection(configuration, Some(observer.clone()))
        .await?;

    Ok(TestPeer {
        pc,
        transport,
        factory,
        observer,
        negotiation_needed_rx,
    })
}

pub(crate) async fn new_peer() -> Result<TestPeer> {
    new_peer_with(SettingEngine::default(), RTCConfiguration::default()).await
}

pub(crate) async fn new_pair() -> Result<(TestPeer, TestPeer)> {
    Ok((new_peer().await?, new_peer().await?))
}

/// signal_pair runs a complete offer/answer exchange. Descriptions travel as
/// SDP text only, the way they would over a signaling channel.
pub(crate) async fn signal_pair(
    pc_offer: &RTCPeerConnection,
    pc_answer: &RTCPeerConnection,
) -> Result<()> {
    let offer = pc_offer.create_offer(None).await?;
    pc_offer.set_local_description(offer.clone()).await?;
    pc_answer
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;

    let answer = pc_answer.create_answer(None).await?;
    pc_answer.set_local_description(answer.clone()).await?;
    pc_offer
        .set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
        .await
}

pub(crate) async fn close_pair_now(pc1: &RTCPeerConnection, pc2: &RTCPeerConnection) {
    let mut fail = false;
    if let Err(err) = pc1.close().await {
        log::error!("Failed to close PeerConnection: {}", err);
        fail = true;
    }
    if let Err(err) = pc2.close().await {
        log::error!("Failed to close PeerConnection: {}", err);
        fail = true;
    }

    assert!(!fail, "close_pair_now failed");
}

fn audio_track(id: &str, stream_id: &str) -> Arc<dyn TrackLocal + Send + Sync> {
    Arc::new(TrackLocalStatic::new(
        RTPCodecType::Audio,
        id.to_owned(),
        stream_id.to_owned(),
    ))
}

fn signaling(state: RTCSignalingState) -> String {
    format!("signaling:{state}")
}

fn parsed(desc: &RTCSessionDescription) -> JsepSessionDescription {
    desc.parsed().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_offer_answer_audio_video() -> Result<()> {
    let (alice, bob) = new_pair().await?;

    alice
        .pc
        .add_track(audio_track("audio", "alice_stream"))
        .await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;

    signal_pair(&alice.pc, &bob.pc).await?;

    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(bob.pc.signaling_state(), RTCSignalingState::Stable);
    assert!(alice.pc.pending_local_description().await.is_none());
    assert!(alice.pc.current_local_description().await.is_some());
    assert!(bob.pc.current_remote_description().await.is_some());

    let alice_transceivers = alice.pc.get_transceivers().await;
    assert_eq!(alice_transceivers.len(), 2);
    assert_eq!(alice_transceivers[0].mid().map(|m| m.as_str()), Some("0"));
    assert_eq!(alice_transceivers[1].mid().map(|m| m.as_str()), Some("1"));
    for t in &alice_transceivers {
        // bob created recvonly transceivers for the offered sections
        assert_eq!(
            t.current_direction(),
            Some(RTCRtpTransceiverDirection::Sendonly)
        );
    }

    let bob_transceivers = bob.pc.get_transceivers().await;
    assert_eq!(bob_transceivers.len(), 2);
    assert_eq!(bob_transceivers[0].kind(), RTPCodecType::Audio);
    assert_eq!(bob_transceivers[1].kind(), RTPCodecType::Video);
    for t in &bob_transceivers {
        assert_eq!(
            t.current_direction(),
            Some(RTCRtpTransceiverDirection::Recvonly)
        );
    }
    assert_eq!(
        bob_transceivers[0].receiver().stream_ids(),
        &[SmolStr::from("alice_stream")]
    );

    assert_eq!(alice.pc.get_senders().await.len(), 2);
    assert_eq!(bob.pc.get_receivers().await.len(), 2);
    assert_eq!(alice.factory.live(), 2);
    assert_eq!(bob.factory.live(), 2);
    assert_eq!(
        alice.transport.pushed.lock().unwrap().clone(),
        vec![(true, RTCSdpType::Offer), (false, RTCSdpType::Answer)]
    );

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_remote_offer_notification_order() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_track(audio_track("audio", "alice_stream"))
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    alice.pc.set_local_description(offer.clone()).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;

    assert_eq!(
        bob.observer.events(),
        vec![
            signaling(RTCSignalingState::HaveRemoteOffer),
            "track:0".to_owned(),
            "add_stream:alice_stream".to_owned(),
        ]
    );

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_operations_run_in_call_order() -> Result<()> {
    let alice = new_peer().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    // The empty offer refers to the offer created by the call issued first.
    let (offer, applied) = tokio::join!(
        alice.pc.create_offer(None),
        alice.pc.set_local_description(RTCSessionDescription {
            sdp_type: RTCSdpType::Offer,
            ..Default::default()
        }),
    );
    let offer = offer?;
    applied?;

    let local = alice
        .pc
        .local_description()
        .await
        .ok_or(Error::ErrSessionDescriptionInvalid)?;
    assert_eq!(local.sdp, offer.sdp);
    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::HaveLocalOffer);

    alice.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_back_to_back_operations_complete_in_order() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp.clone())?)
        .await?;
    let answer = bob.pc.create_answer(None).await?;
    bob.pc.set_local_description(answer.clone()).await?;

    // each call only succeeds when the previous one already completed
    let (local, remote, candidate) = tokio::join!(
        alice.pc.set_local_description(offer),
        alice
            .pc
            .set_remote_description(RTCSessionDescription::answer(answer.sdp)?),
        alice.pc.add_ice_candidate(RTCIceCandidateInit {
            candidate: "candidate:1 1 udp 2130706431 192.168.1.2 5000 typ host".to_owned(),
            sdp_mid: Some("0".to_owned()),
            ..Default::default()
        }),
    );
    local?;
    remote?;
    candidate?;

    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(alice.transport.remote_candidates.lock().unwrap().len(), 1);

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

/// AnsweringObserver answers every remote offer from inside the signaling
/// state callback.
struct AnsweringObserver {
    internal: SyncMutex<Option<std::sync::Weak<PeerConnectionInternal>>>,
    answered_tx: mpsc::UnboundedSender<Result<()>>,
}

#[async_trait]
impl PeerConnectionObserver for AnsweringObserver {
    async fn on_signaling_state_change(&self, state: RTCSignalingState) {
        if state != RTCSignalingState::HaveRemoteOffer {
            return;
        }
        let internal = self
            .internal
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|weak| weak.upgrade());
        if let Some(internal) = internal {
            let pc = RTCPeerConnection { internal };
            let result = async {
                let answer = pc.create_answer(None).await?;
                pc.set_local_description(answer).await
            }
            .await;
            let _ = self.answered_tx.send(result);
        }
    }
}

#[tokio::test]
async fn test_observer_chains_operations_from_callback() -> Result<()> {
    let bob = new_peer().await?;
    bob.pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let (answered_tx, mut answered_rx) = mpsc::unbounded_channel();
    let observer = Arc::new(AnsweringObserver {
        internal: SyncMutex::new(None),
        answered_tx,
    });
    let api = APIBuilder::new()
        .with_transport_controller(Arc::new(MockTransport::default()))
        .with_media_channel_factory(Arc::new(MockChannelFactory::default()))
        .build();
    let alice = api
        .new_peer_connection(RTCConfiguration::default(), Some(observer.clone()))
        .await?;
    *observer.internal.lock().unwrap() = Some(Arc::downgrade(&alice.internal));

    let offer = bob.pc.create_offer(None).await?;
    bob.pc.set_local_description(offer.clone()).await?;
    let applied = timeout(
        Duration::from_secs(3),
        alice.set_remote_description(RTCSessionDescription::offer(offer.sdp)?),
    )
    .await;
    assert!(applied.is_ok(), "set_remote_description never finished");
    assert_ok!(applied.unwrap());

    let answered = timeout(Duration::from_secs(3), answered_rx.recv()).await;
    assert!(matches!(answered, Ok(Some(Ok(())))));
    assert_eq!(alice.signaling_state(), RTCSignalingState::Stable);

    let answer = alice.current_local_description().await;
    assert!(answer.is_some());
    if let Some(answer) = answer {
        bob.pc
            .set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
            .await?;
    }
    assert_eq!(bob.pc.signaling_state(), RTCSignalingState::Stable);

    close_pair_now(&alice, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_transitions_leave_state_unchanged() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let result = bob.pc.create_answer(None).await;
    assert_eq!(
        result.err(),
        Some(Error::ErrIncorrectSignalingState(RTCSignalingState::Stable))
    );

    let result = bob
        .pc
        .set_local_description(RTCSessionDescription::rollback())
        .await;
    assert_eq!(result, Err(Error::ErrSignalingStateCannotRollback));

    let offer = alice.pc.create_offer(None).await?;
    alice.pc.set_local_description(offer.clone()).await?;

    // an offer applied as an answer from stable
    let result = bob
        .pc
        .set_remote_description(RTCSessionDescription::answer(offer.sdp.clone())?)
        .await;
    assert!(
        matches!(
            result,
            Err(Error::ErrSignalingStateProposedTransitionInvalid { .. })
        ),
        "{result:?}"
    );
    assert_eq!(bob.pc.signaling_state(), RTCSignalingState::Stable);
    assert!(bob.pc.remote_description().await.is_none());

    // the refusal did not poison the session
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;
    assert_eq!(bob.pc.signaling_state(), RTCSignalingState::HaveRemoteOffer);

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_pranswer_then_answer() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    alice.pc.set_local_description(offer.clone()).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;

    let answer = bob.pc.create_answer(None).await?;
    bob.pc
        .set_local_description(RTCSessionDescription {
            sdp_type: RTCSdpType::Pranswer,
            sdp: answer.sdp.clone(),
            ..Default::default()
        })
        .await?;
    assert_eq!(bob.pc.signaling_state(), RTCSignalingState::HaveLocalPranswer);
    alice
        .pc
        .set_remote_description(RTCSessionDescription::pranswer(answer.sdp.clone())?)
        .await?;
    assert_eq!(
        alice.pc.signaling_state(),
        RTCSignalingState::HaveRemotePranswer
    );

    let answer = bob.pc.create_answer(None).await?;
    bob.pc.set_local_description(answer.clone()).await?;
    alice
        .pc
        .set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
        .await?;
    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(bob.pc.signaling_state(), RTCSignalingState::Stable);
    assert!(bob.pc.current_local_description().await.is_some());

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_local_rollback_restores_stable_state() -> Result<()> {
    let mut alice = new_peer().await?;
    let t = alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    let first = alice.next_negotiation_needed().await;
    assert!(first.is_some());

    let offer = alice.pc.create_offer(None).await?;
    alice.pc.set_local_description(offer).await?;
    assert_eq!(alice.factory.live(), 1);

    alice
        .pc
        .set_local_description(RTCSessionDescription::rollback())
        .await?;

    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::Stable);
    assert!(alice.pc.local_description().await.is_none());
    assert_eq!(alice.factory.live(), 0);
    assert_eq!(alice.transport.rollbacks.load(Ordering::SeqCst), 1);

    let transceivers = alice.pc.get_transceivers().await;
    assert_eq!(transceivers.len(), 1, "application transceivers survive");
    assert_eq!(transceivers[0].id(), t.id());
    assert!(transceivers[0].mid().is_none());

    // negotiation is still needed, and a new event says so
    let again = alice.next_negotiation_needed().await;
    assert!(again.is_some());
    assert_ne!(again, first);

    alice.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_remote_rollback_removes_created_transceivers() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_track(audio_track("audio", "alice_stream"))
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;
    assert_eq!(bob.pc.get_transceivers().await.len(), 1);
    bob.observer.clear();

    bob.pc
        .set_remote_description(RTCSessionDescription::rollback())
        .await?;

    assert_eq!(bob.pc.signaling_state(), RTCSignalingState::Stable);
    assert!(bob.pc.get_transceivers().await.is_empty());
    assert!(bob.pc.remote_description().await.is_none());
    assert_eq!(bob.factory.live(), 0);
    assert_eq!(
        bob.observer.events(),
        vec![
            signaling(RTCSignalingState::Stable),
            "remove_track:audio".to_owned(),
            "remove_stream:alice_stream".to_owned(),
        ]
    );

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_rollback_keeps_addtrack_transceiver_reused_by_remote() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_track(audio_track("alice_audio", "alice_stream"))
        .await?;
    bob.pc
        .add_track(audio_track("bob_audio", "bob_stream"))
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;

    // the transceiver bob created by add_track answers the section
    let transceivers = bob.pc.get_transceivers().await;
    assert_eq!(transceivers.len(), 1);
    assert_eq!(transceivers[0].mid().map(|m| m.as_str()), Some("0"));

    bob.pc
        .set_remote_description(RTCSessionDescription::rollback())
        .await?;
    let transceivers = bob.pc.get_transceivers().await;
    assert_eq!(transceivers.len(), 1);
    assert!(transceivers[0].mid().is_none());
    assert!(transceivers[0].sender().track().is_some());

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_implicit_rollback_on_glare() -> Result<()> {
    let alice = new_peer_with(
        SettingEngine::default(),
        RTCConfiguration {
            enable_implicit_rollback: true,
            ..Default::default()
        },
    )
    .await?;
    let bob = new_peer().await?;
    alice
        .pc
        .add_track(audio_track("alice_audio", "alice_stream"))
        .await?;
    bob.pc
        .add_track(audio_track("bob_audio", "bob_stream"))
        .await?;

    let alice_offer = alice.pc.create_offer(None).await?;
    alice.pc.set_local_description(alice_offer).await?;
    let bob_offer = bob.pc.create_offer(None).await?;
    bob.pc.set_local_description(bob_offer.clone()).await?;

    alice
        .pc
        .set_remote_description(RTCSessionDescription::offer(bob_offer.sdp.clone())?)
        .await?;
    assert_eq!(
        alice.pc.signaling_state(),
        RTCSignalingState::HaveRemoteOffer
    );
    assert!(alice.pc.pending_local_description().await.is_none());

    let answer = alice.pc.create_answer(None).await?;
    alice.pc.set_local_description(answer.clone()).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
        .await?;
    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(bob.pc.signaling_state(), RTCSignalingState::Stable);

    // without the switch the same collision is refused
    let carol = new_peer().await?;
    carol
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    let carol_offer = carol.pc.create_offer(None).await?;
    carol.pc.set_local_description(carol_offer).await?;
    let result = carol
        .pc
        .set_remote_description(RTCSessionDescription::offer(bob_offer.sdp)?)
        .await;
    assert!(
        matches!(
            result,
            Err(Error::ErrSignalingStateProposedTransitionInvalid { .. })
        ),
        "{result:?}"
    );
    assert_eq!(carol.pc.signaling_state(), RTCSignalingState::HaveLocalOffer);

    close_pair_now(&alice.pc, &bob.pc).await;
    carol.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_transport_failure_sets_session_error() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    bob.transport.fail_remote.store(true, Ordering::SeqCst);
    let result = bob
        .pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp.clone())?)
        .await;
    assert!(
        matches!(
            result,
            Err(Error::ErrTransportPushdown {
                is_local: false,
                ..
            })
        ),
        "{result:?}"
    );

    bob.transport.fail_remote.store(false, Ordering::SeqCst);
    let result = bob
        .pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await;
    match result {
        Err(Error::ErrSessionError { kind, .. }) => assert_eq!(kind, "ERROR_TRANSPORT"),
        other => panic!("expected a session error, got {other:?}"),
    }

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_channel_creation_failure_sets_content_error() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    bob.factory.fail.store(true, Ordering::SeqCst);
    let result = bob
        .pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp.clone())?)
        .await;
    assert_eq!(result, Err(Error::ErrChannelCreationFailed("0".into())));

    let result = bob
        .pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await;
    assert!(
        matches!(result, Err(Error::ErrSessionError { .. })),
        "{result:?}"
    );

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_negotiation_needed_is_edge_triggered() -> Result<()> {
    let (mut alice, bob) = new_pair().await?;

    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;

    let ids = alice.drain_negotiation_needed().await;
    assert_eq!(ids.len(), 1, "one event while the flag stays set: {ids:?}");
    assert!(alice.pc.should_fire_negotiation_needed_event(ids[0]).await);
    assert!(!alice.pc.should_fire_negotiation_needed_event(ids[0] + 1).await);

    signal_pair(&alice.pc, &bob.pc).await?;
    assert!(!alice.pc.should_fire_negotiation_needed_event(ids[0]).await);
    assert!(alice.drain_negotiation_needed().await.is_empty());

    // a renegotiation reason raises a new event
    let t = alice.pc.get_transceivers().await;
    alice
        .pc
        .set_transceiver_direction(t[0].id(), RTCRtpTransceiverDirection::Recvonly)
        .await?;
    let next = alice.next_negotiation_needed().await;
    assert!(next.is_some());
    assert_ne!(next, Some(ids[0]));
    signal_pair(&alice.pc, &bob.pc).await?;
    alice.drain_negotiation_needed().await;

    // toggling back and forth fires at most once
    alice
        .pc
        .set_transceiver_direction(t[0].id(), RTCRtpTransceiverDirection::Sendrecv)
        .await?;
    alice
        .pc
        .set_transceiver_direction(t[0].id(), RTCRtpTransceiverDirection::Recvonly)
        .await?;
    assert!(alice.drain_negotiation_needed().await.len() <= 1);

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_reoffer_without_changes_is_idempotent() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_track(audio_track("audio", "alice_stream"))
        .await?;
    signal_pair(&alice.pc, &bob.pc).await?;

    let current = alice
        .pc
        .current_local_description()
        .await
        .ok_or(Error::ErrSessionDescriptionInvalid)?;
    let created = alice.factory.created();
    let bob_created = bob.factory.created();

    signal_pair(&alice.pc, &bob.pc).await?;

    let next = alice
        .pc
        .current_local_description()
        .await
        .ok_or(Error::ErrSessionDescriptionInvalid)?;
    let (current, next) = (parsed(&current), parsed(&next));
    assert_eq!(current.media_sections.len(), next.media_sections.len());
    for (a, b) in current.media_sections.iter().zip(next.media_sections.iter()) {
        assert_eq!(a.mid, b.mid);
        assert_eq!(a.direction, b.direction);
        assert_eq!(a.transport.ice_ufrag, b.transport.ice_ufrag);
    }
    assert!(next.session_version > current.session_version);
    assert_eq!(alice.factory.created(), created);
    assert_eq!(bob.factory.created(), bob_created);
    assert_eq!(bob.pc.get_transceivers().await.len(), 1);

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_ice_restart() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    signal_pair(&alice.pc, &bob.pc).await?;

    let ufrag_of = |desc: &RTCSessionDescription| {
        parsed(desc)
            .media_sections
            .first()
            .map(|m| m.transport.ice_ufrag.clone())
            .unwrap_or_default()
    };
    let alice_before = alice
        .pc
        .current_local_description()
        .await
        .map(|d| ufrag_of(&d));
    let bob_before = bob
        .pc
        .current_local_description()
        .await
        .map(|d| ufrag_of(&d));

    alice.pc.restart_ice().await;
    {
        let state = alice.pc.internal.state.lock().await;
        assert_eq!(state.ice_credentials_to_replace.len(), 1);
    }

    let offer = alice.pc.create_offer(None).await?;
    assert_ne!(Some(ufrag_of(&offer)), alice_before);
    alice.pc.set_local_description(offer.clone()).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;
    {
        let state = bob.pc.internal.state.lock().await;
        assert!(state.pending_ice_restarts.contains("0"));
    }

    let answer = bob.pc.create_answer(None).await?;
    assert_ne!(Some(ufrag_of(&answer)), bob_before);
    bob.pc.set_local_description(answer.clone()).await?;
    alice
        .pc
        .set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
        .await?;

    let state = alice.pc.internal.state.lock().await;
    assert!(state.ice_credentials_to_replace.is_empty());
    drop(state);
    let state = bob.pc.internal.state.lock().await;
    assert!(state.pending_ice_restarts.is_empty());
    drop(state);

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_set_configuration() -> Result<()> {
    let (alice, bob) = new_pair().await?;

    let result = alice
        .pc
        .set_configuration(RTCConfiguration {
            bundle_policy: RTCBundlePolicy::MaxBundle,
            ..Default::default()
        })
        .await;
    assert_eq!(result, Err(Error::ErrModifyingBundlePolicy));

    // before a local description the pool size may change
    alice
        .pc
        .set_configuration(RTCConfiguration {
            ice_candidate_pool_size: 2,
            ..Default::default()
        })
        .await?;
    assert_eq!(alice.pc.get_configuration().await.ice_candidate_pool_size, 2);

    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    signal_pair(&alice.pc, &bob.pc).await?;

    let result = alice
        .pc
        .set_configuration(RTCConfiguration {
            ice_candidate_pool_size: 3,
            ..Default::default()
        })
        .await;
    assert_eq!(result, Err(Error::ErrModifyingICECandidatePoolSize));

    // new ICE servers take effect through an ICE restart
    alice
        .pc
        .set_configuration(RTCConfiguration {
            ice_candidate_pool_size: 2,
            ice_servers: vec![RTCIceServer {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                ..Default::default()
            }],
            ..Default::default()
        })
        .await?;
    {
        let state = alice.pc.internal.state.lock().await;
        assert!(!state.ice_credentials_to_replace.is_empty());
    }

    alice.pc.close().await?;
    let result = alice
        .pc
        .set_configuration(RTCConfiguration::default())
        .await;
    assert_eq!(result, Err(Error::ErrConnectionClosed));

    bob.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_unspecified_policies_take_defaults() -> Result<()> {
    let alice = new_peer_with(
        SettingEngine::default(),
        RTCConfiguration {
            bundle_policy: RTCBundlePolicy::Unspecified,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Unspecified,
            sdp_semantics: RTCSdpSemantics::Unspecified,
            ..Default::default()
        },
    )
    .await?;
    let bob = new_peer().await?;

    let configuration = alice.pc.get_configuration().await;
    assert_eq!(configuration.bundle_policy, RTCBundlePolicy::Balanced);
    assert_eq!(configuration.rtcp_mux_policy, RTCRtcpMuxPolicy::Require);
    assert_eq!(configuration.sdp_semantics, RTCSdpSemantics::UnifiedPlan);

    // spelling out the defaults is not a modification
    assert_ok!(
        alice
            .pc
            .set_configuration(RTCConfiguration {
                bundle_policy: RTCBundlePolicy::Balanced,
                rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
                ..Default::default()
            })
            .await
    );
    assert_eq!(
        alice
            .pc
            .set_configuration(RTCConfiguration {
                bundle_policy: RTCBundlePolicy::MaxBundle,
                ..Default::default()
            })
            .await,
        Err(Error::ErrModifyingBundlePolicy)
    );

    // rtcp-mux is required by default
    bob.pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    let offer = bob.pc.create_offer(None).await?;
    let mut munged = parsed(&offer);
    munged.bundle_groups.clear();
    for m in munged.media_sections.iter_mut() {
        m.rtcp_mux = false;
    }
    let sdp = DefaultSdpCodec.serialize(&munged)?;
    assert_eq!(
        alice
            .pc
            .set_remote_description(RTCSessionDescription::offer(sdp)?)
            .await,
        Err(Error::ErrRtcpMuxRequired)
    );
    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::Stable);

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_close() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    signal_pair(&alice.pc, &bob.pc).await?;
    assert_eq!(alice.factory.live(), 1);
    alice.observer.clear();

    alice.pc.close().await?;
    // a second close is a no-op
    assert_ok!(alice.pc.close().await);

    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::Closed);
    assert_eq!(
        alice.observer.events(),
        vec![signaling(RTCSignalingState::Closed)]
    );
    assert_eq!(alice.factory.live(), 0);
    assert!(alice.pc.get_transceivers().await.iter().all(|t| t.stopped()));

    assert_eq!(
        alice.pc.create_offer(None).await.err(),
        Some(Error::ErrConnectionClosed)
    );
    assert_eq!(
        alice
            .pc
            .add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .err(),
        Some(Error::ErrConnectionClosed)
    );

    bob.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_close_fails_queued_operations() -> Result<()> {
    let alice = new_peer().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let pc = Arc::new(alice.pc);
    let mut handles = vec![];
    for _ in 0..8 {
        let pc = Arc::clone(&pc);
        handles.push(tokio::spawn(async move { pc.create_offer(None).await }));
    }
    pc.close().await?;

    for handle in handles {
        let result = timeout(Duration::from_secs(1), handle)
            .await
            .expect("queued operation was left waiting")
            .expect("operation task panicked");
        match result {
            Ok(_) | Err(Error::ErrConnectionClosed) => {}
            Err(err) => panic!("unexpected error {err}"),
        }
    }
    assert_eq!(
        pc.create_offer(None).await.err(),
        Some(Error::ErrConnectionClosed)
    );

    Ok(())
}

#[tokio::test]
async fn test_add_ice_candidate() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let candidate = |mid: Option<&str>, index: Option<u16>| RTCIceCandidateInit {
        candidate: "candidate:1 1 udp 2130706431 192.168.1.1 5000 typ host".to_owned(),
        sdp_mid: mid.map(|m| m.to_owned()),
        sdp_mline_index: index,
        username_fragment: None,
    };

    assert_eq!(
        bob.pc.add_ice_candidate(candidate(Some("0"), None)).await,
        Err(Error::ErrNoRemoteDescription)
    );

    signal_pair(&alice.pc, &bob.pc).await?;

    assert_ok!(bob.pc.add_ice_candidate(candidate(Some("0"), None)).await);
    // a duplicate is ignored
    assert_ok!(bob.pc.add_ice_candidate(candidate(None, Some(0))).await);
    assert_eq!(
        bob.transport.remote_candidates.lock().unwrap().clone(),
        vec![(
            "0".to_owned(),
            "1 1 udp 2130706431 192.168.1.1 5000 typ host".to_owned()
        )]
    );
    let remote = bob
        .pc
        .remote_description()
        .await
        .ok_or(Error::ErrNoRemoteDescription)?;
    assert!(remote.sdp.contains("192.168.1.1 5000 typ host"));

    assert_eq!(
        bob.pc.add_ice_candidate(candidate(Some("9"), None)).await,
        Err(Error::ErrIceCandidateMidNotFound("9".to_owned()))
    );
    assert_eq!(
        bob.pc.add_ice_candidate(candidate(None, Some(5))).await,
        Err(Error::ErrIceCandidateMlineIndexOutOfRange(5))
    );
    assert_eq!(
        bob.pc.add_ice_candidate(candidate(None, None)).await,
        Err(Error::ErrIceCandidateMissingMidAndIndex)
    );

    let mut wrong_ufrag = candidate(Some("0"), None);
    wrong_ufrag.username_fragment = Some("nope".to_owned());
    assert_eq!(
        bob.pc.add_ice_candidate(wrong_ufrag).await,
        Err(Error::ErrIceCandidateUfragMismatch)
    );

    // end of candidates
    assert_ok!(
        bob.pc
            .add_ice_candidate(RTCIceCandidateInit::default())
            .await
    );

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_add_local_ice_candidate() -> Result<()> {
    let alice = new_peer().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let candidate = RTCIceCandidateInit {
        candidate: "candidate:2 1 udp 2130706431 10.0.0.1 6000 typ host".to_owned(),
        sdp_mid: Some("0".to_owned()),
        ..Default::default()
    };

    // without a local description the candidate goes nowhere
    alice.pc.add_local_ice_candidate(candidate.clone()).await?;
    assert!(alice.observer.events().is_empty());

    let offer = alice.pc.create_offer(None).await?;
    alice.pc.set_local_description(offer).await?;
    alice.observer.clear();

    alice.pc.add_local_ice_candidate(candidate.clone()).await?;
    assert_eq!(
        alice.observer.events(),
        vec![format!("ice_candidate:{}", candidate.candidate)]
    );
    let local = alice
        .pc
        .local_description()
        .await
        .ok_or(Error::ErrSessionDescriptionInvalid)?;
    assert!(local.sdp.contains("10.0.0.1 6000 typ host"));

    alice.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_stopped_transceiver_is_removed_and_section_recycled() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    let audio = alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    signal_pair(&alice.pc, &bob.pc).await?;

    alice.pc.stop_transceiver(audio.id()).await?;
    let offer = alice.pc.create_offer(None).await?;
    let sections = parsed(&offer).media_sections;
    assert_eq!(sections.len(), 1);
    assert!(sections[0].rejected);

    alice.pc.set_local_description(offer.clone()).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;
    let answer = bob.pc.create_answer(None).await?;
    assert!(parsed(&answer).media_sections[0].rejected);
    bob.pc.set_local_description(answer.clone()).await?;
    alice
        .pc
        .set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
        .await?;

    assert!(alice.pc.get_transceivers().await.is_empty());
    assert!(bob.pc.get_transceivers().await.is_empty());
    assert_eq!(alice.factory.live(), 0);
    assert_eq!(bob.factory.live(), 0);

    // the rejected m-line is reused for a new transceiver with a new mid
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;
    let offer = alice.pc.create_offer(None).await?;
    let sections = parsed(&offer).media_sections;
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].media_type, MediaType::Video);
    assert!(!sections[0].rejected);
    assert_ne!(sections[0].mid.as_str(), "0");

    alice.pc.set_local_description(offer.clone()).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;
    let answer = bob.pc.create_answer(None).await?;
    bob.pc.set_local_description(answer.clone()).await?;
    alice
        .pc
        .set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
        .await?;

    let bob_transceivers = bob.pc.get_transceivers().await;
    assert_eq!(bob_transceivers.len(), 1);
    assert_eq!(bob_transceivers[0].kind(), RTPCodecType::Video);
    assert_eq!(bob_transceivers[0].mid(), Some(&sections[0].mid));

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_unassociated_transceiver_at_rejected_index_stays_needed() -> Result<()> {
    let (mut alice, bob) = new_pair().await?;
    let audio = bob
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    signal_pair(&bob.pc, &alice.pc).await?;

    // bob stops the only transceiver, so m-line 0 is rejected on both sides
    bob.pc.stop_transceiver(audio.id()).await?;
    signal_pair(&bob.pc, &alice.pc).await?;
    assert!(alice.pc.get_transceivers().await.is_empty());
    alice.drain_negotiation_needed().await;

    alice
        .pc
        .add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Inactive,
                ..Default::default()
            }),
        )
        .await?;
    assert!(alice.next_negotiation_needed().await.is_some());

    // an offer that is never applied must not settle the transceiver
    let offer = alice.pc.create_offer(None).await?;
    assert_eq!(parsed(&offer).media_sections.len(), 1);
    let transceivers = alice.pc.get_transceivers().await;
    assert_eq!(transceivers.len(), 1);
    assert!(transceivers[0].mid().is_none());
    assert!(alice.pc.internal.state.lock().await.check_if_negotiation_is_needed());

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_answer_without_simulcast_disables_layers() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    let layer = |rid: &str| RTCRtpEncodingParameters {
        rid: rid.into(),
        ..Default::default()
    };
    alice
        .pc
        .add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendonly,
                send_encodings: vec![layer("hi"), layer("lo")],
                stream_ids: vec!["alice_stream".to_owned()],
            }),
        )
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    assert!(parsed(&offer).media_sections[0].has_simulcast());
    alice.pc.set_local_description(offer.clone()).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;
    let answer = bob.pc.create_answer(None).await?;
    bob.pc.set_local_description(answer.clone()).await?;

    // an endpoint that does not understand simulcast drops the lines
    let mut munged = parsed(&answer);
    for m in munged.media_sections.iter_mut() {
        m.simulcast = Default::default();
        m.rids.clear();
    }
    let sdp = DefaultSdpCodec.serialize(&munged)?;
    alice
        .pc
        .set_remote_description(RTCSessionDescription::answer(sdp)?)
        .await?;

    let transceivers = alice.pc.get_transceivers().await;
    let encodings = transceivers[0].sender().send_encodings();
    assert_eq!(encodings.len(), 1);
    assert!(encodings[0].rid.is_empty());

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_data_channel_negotiation() -> Result<()> {
    let (mut alice, bob) = new_pair().await?;

    alice.pc.create_data_channel("chat", None).await?;
    assert!(alice.next_negotiation_needed().await.is_some());
    // only the first channel changes what is negotiated
    alice.pc.create_data_channel("files", None).await?;
    assert_eq!(alice.pc.data_channels().await.len(), 2);

    let offer = alice.pc.create_offer(None).await?;
    let sections = parsed(&offer).media_sections;
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].media_type, MediaType::Data);

    signal_pair(&alice.pc, &bob.pc).await?;
    let negotiated = alice
        .pc
        .current_local_description()
        .await
        .map(|desc| parsed(&desc))
        .unwrap_or_default();
    let data_section = negotiated.first_data_section();
    assert!(data_section.is_some());
    let mid = data_section.map(|m| m.mid.to_string()).unwrap_or_default();
    assert_eq!(
        alice.factory.data_transport.lock().unwrap().clone(),
        Some(mid.clone())
    );
    assert_eq!(bob.factory.data_transport.lock().unwrap().clone(), Some(mid));

    alice.pc.close().await?;
    assert_eq!(alice.factory.data_transport.lock().unwrap().clone(), None);
    bob.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_legacy_offer_to_receive() -> Result<()> {
    let alice = new_peer().await?;

    let offer = alice
        .pc
        .create_offer(Some(RTCOfferOptions {
            offer_to_receive_audio: Some(1),
            ..Default::default()
        }))
        .await?;
    let sections = parsed(&offer).media_sections;
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].media_type, MediaType::Audio);
    assert_eq!(sections[0].direction, RTCRtpTransceiverDirection::Recvonly);

    let result = alice
        .pc
        .create_offer(Some(RTCOfferOptions {
            offer_to_receive_video: Some(2),
            ..Default::default()
        }))
        .await;
    assert_eq!(
        result.err(),
        Some(Error::ErrOfferToReceiveUnsupported("video"))
    );

    alice.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_add_and_remove_track() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    let track = audio_track("audio", "alice_stream");

    let sender = alice.pc.add_track(Arc::clone(&track)).await?;
    assert_eq!(sender.id(), "audio");
    assert_eq!(sender.stream_ids(), &[SmolStr::from("alice_stream")]);
    assert_eq!(
        alice.pc.add_track(Arc::clone(&track)).await.err(),
        Some(Error::ErrExistingTrack)
    );

    alice.pc.remove_track(&sender).await?;
    let transceivers = alice.pc.get_transceivers().await;
    assert_eq!(
        transceivers[0].direction(),
        RTCRtpTransceiverDirection::Recvonly
    );
    // removing again is a no-op
    alice.pc.remove_track(&sender).await?;

    let foreign = bob.pc.add_track(audio_track("other", "")).await?;
    assert_eq!(
        alice.pc.remove_track(&foreign).await,
        Err(Error::ErrSenderNotCreatedByConnection)
    );

    // the transceiver never sent, so the track can be attached again
    alice.pc.add_track(track).await?;
    let transceivers = alice.pc.get_transceivers().await;
    assert_eq!(transceivers.len(), 1);
    assert_eq!(
        transceivers[0].direction(),
        RTCRtpTransceiverDirection::Sendrecv
    );

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_add_track_reuses_remote_transceiver() -> Result<()> {
    let (alice, bob) = new_pair().await?;
    alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let offer = alice.pc.create_offer(None).await?;
    bob.pc
        .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
        .await?;
    let created = bob.pc.get_transceivers().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].direction(), RTCRtpTransceiverDirection::Recvonly);

    bob.pc.add_track(audio_track("bob_audio", "bob_stream")).await?;
    let transceivers = bob.pc.get_transceivers().await;
    assert_eq!(transceivers.len(), 1);
    assert_eq!(transceivers[0].id(), created[0].id());
    assert_eq!(
        transceivers[0].direction(),
        RTCRtpTransceiverDirection::Sendrecv
    );

    let answer = bob.pc.create_answer(None).await?;
    assert_eq!(
        parsed(&answer).media_sections[0].direction,
        RTCRtpTransceiverDirection::Sendrecv
    );

    close_pair_now(&alice.pc, &bob.pc).await;
    Ok(())
}

#[tokio::test]
async fn test_transceiver_operations_validate_arguments() -> Result<()> {
    let alice = new_peer().await?;

    assert_eq!(
        alice
            .pc
            .add_transceiver_from_kind(RTPCodecType::Unspecified, None)
            .await
            .err(),
        Some(Error::ErrRTPTransceiverKindInvalid)
    );

    let t = alice
        .pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Sendrecv);
    assert_eq!(
        alice
            .pc
            .set_transceiver_direction(t.id(), RTCRtpTransceiverDirection::Unspecified)
            .await,
        Err(Error::ErrRTPTransceiverDirectionInvalid)
    );

    let unsupported = RTCRtpCodecParameters {
        capability: crate::rtp_transceiver::rtp_codec::RTCRtpCodecCapability {
            mime_type: "audio/AMR".to_owned(),
            clock_rate: 8000,
            ..Default::default()
        },
        payload_type: 96,
    };
    assert_eq!(
        alice
            .pc
            .set_codec_preferences(t.id(), vec![unsupported])
            .await,
        Err(Error::ErrRTPTransceiverCodecUnsupported("audio/AMR".to_owned()))
    );
    let mut preferred = default_codecs(RTPCodecType::Audio);
    preferred.truncate(1);
    alice
        .pc
        .set_codec_preferences(t.id(), preferred.clone())
        .await?;
    let offer = alice.pc.create_offer(None).await?;
    assert_eq!(parsed(&offer).media_sections[0].codecs, preferred);

    alice.pc.stop_transceiver(t.id()).await?;
    assert_eq!(
        alice
            .pc
            .set_transceiver_direction(t.id(), RTCRtpTransceiverDirection::Sendonly)
            .await,
        Err(Error::ErrRTPTransceiverStopped)
    );
    // stopping twice is fine
    alice.pc.stop_transceiver(t.id()).await?;

    alice.pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_plan_b_refuses_rollback() -> Result<()> {
    let alice = new_peer_with(
        SettingEngine::default(),
        RTCConfiguration {
            sdp_semantics: RTCSdpSemantics::PlanB,
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(
        alice
            .pc
            .add_transceiver_from_kind(RTPCodecType::Audio, None)
            .await
            .err(),
        Some(Error::ErrUnifiedPlanRequired)
    );
    alice
        .pc
        .add_track(audio_track("audio", "alice_stream"))
        .await?;
    let offer = alice.pc.create_offer(None).await?;
    alice.pc.set_local_description(offer).await?;

    let result = alice
        .pc
        .set_local_description(RTCSessionDescription::rollback())
        .await;
    assert_eq!(result, Err(Error::ErrRollbackPlanB));
    assert_eq!(
        result.unwrap_err().error_type(),
        crate::error::RTCErrorType::UnsupportedOperation
    );
    assert_eq!(alice.pc.signaling_state(), RTCSignalingState::HaveLocalOffer);

    alice.pc.close().await?;
    Ok(())
}
