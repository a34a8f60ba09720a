
pub mod setting_engine;

use std::sync::Arc;

use setting_engine::*;

use crate::error::Result;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::observer::{NoopObserver, PeerConnectionObserver};
use crate::peer_connection::sdp::sdp_codec::{DefaultSdpCodec, SdpCodec};
use crate::peer_connection::RTCPeerConnection;
use crate::transport::{CountingChannelFactory, MediaChannelFactory, TransportController};

/// API bundles the collaborators every PeerConnection created from it
/// shares: the setting engine, the transport controller, the media channel
/// factory and the SDP codec.
pub struct API {
    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) transport: Option<Arc<dyn TransportController + Send + Sync>>,
    pub(crate) channel_factory: Arc<dyn MediaChannelFactory + Send + Sync>,
    pub(crate) sdp_codec: Arc<dyn SdpCodec + Send + Sync>,
}

impl API {
    /// new_peer_connection creates a new PeerConnection with the provided
    /// configuration against the received API object. Notifications go to
    /// `observer`, or nowhere when it is None.
    pub async fn new_peer_connection(
        &self,
        configuration: RTCConfiguration,
        observer: Option<Arc<dyn PeerConnectionObserver>>,
    ) -> Result<RTCPeerConnection> {
        let observer = observer.unwrap_or_else(|| Arc::new(NoopObserver));
        RTCPeerConnection::new(self, configuration, observer)
    }

    /// Returns the internal [`SettingEngine`].
    pub fn setting_engine(&self) -> Arc<SettingEngine> {
        Arc::clone(&self.setting_engine)
    }
}

#[derive(Default)]
pub struct APIBuilder {
    setting_engine: Option<Arc<SettingEngine>>,
    transport: Option<Arc<dyn TransportController + Send + Sync>>,
    channel_factory: Option<Arc<dyn MediaChannelFactory + Send + Sync>>,
    sdp_codec: Option<Arc<dyn SdpCodec + Send + Sync>>,
}

impl APIBuilder {
    pub fn new() -> Self {
        APIBuilder::default()
    }

    pub fn build(mut self) -> API {
        API {
            setting_engine: if let Some(setting_engine) = self.setting_engine.take() {
                setting_engine
            } else {
                Arc::new(SettingEngine::default())
            },
            transport: self.transport.take(),
            channel_factory: if let Some(channel_factory) = self.channel_factory.take() {
                channel_factory
            } else {
                Arc::new(CountingChannelFactory::default())
            },
            sdp_codec: if let Some(sdp_codec) = self.sdp_codec.take() {
                sdp_codec
            } else {
                Arc::new(DefaultSdpCodec)
            },
        }
    }

    /// WithSettingEngine allows providing a SettingEngine to the API.
    /// Settings should not be changed after passing the engine to an API.
    pub fn with_setting_engine(mut self, setting_engine: SettingEngine) -> Self {
        self.setting_engine = Some(Arc::new(setting_engine));
        self
    }

    /// with_transport_controller installs the transport descriptions are
    /// pushed down to. A PeerConnection cannot be created without one.
    pub fn with_transport_controller(
        mut self,
        transport: Arc<dyn TransportController + Send + Sync>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// with_media_channel_factory installs the factory media channels and
    /// the data channel transport are created with.
    pub fn with_media_channel_factory(
        mut self,
        channel_factory: Arc<dyn MediaChannelFactory + Send + Sync>,
    ) -> Self {
        self.channel_factory = Some(channel_factory);
        self
    }

    /// with_sdp_codec replaces the SDP parser/serializer.
    pub fn with_sdp_codec(mut self, sdp_codec: Arc<dyn SdpCodec + Send + Sync>) -> Self {
        self.sdp_codec = Some(sdp_codec);
        self
    }
}
