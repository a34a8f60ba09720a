pub mod data_channel_init;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use data_channel_init::RTCDataChannelInit;

const MAX_LABEL_LENGTH: usize = 65535;
const MAX_PROTOCOL_LENGTH: usize = 65535;

/// DataChannel represents a WebRTC DataChannel as far as negotiation is
/// concerned: while at least one exists, offers carry an application
/// section and the data channel transport is kept alive.
///
/// ## Specifications
///
/// * [MDN]
/// * [W3C]
///
/// [MDN]: https://developer.mozilla.org/en-US/docs/Web/API/RTCDataChannel
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-rtcdatachannel
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCDataChannel {
    pub(crate) label: String,
    pub(crate) ordered: bool,
    pub(crate) max_packet_lifetime: Option<u16>,
    pub(crate) max_retransmits: Option<u16>,
    pub(crate) protocol: String,
    pub(crate) negotiated: bool,
    pub(crate) id: Option<u16>,
}

impl RTCDataChannel {
    /// new applies the creation steps of
    /// <https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api>.
    pub(crate) fn new(label: &str, options: Option<RTCDataChannelInit>) -> Result<Self> {
        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #5)
        if label.len() > MAX_LABEL_LENGTH {
            return Err(Error::ErrStringSizeLimit);
        }

        let mut d = RTCDataChannel {
            label: label.to_owned(),
            ordered: true,
            ..Default::default()
        };

        if let Some(options) = options {
            // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #9)
            if let Some(ordered) = options.ordered {
                d.ordered = ordered;
            }
            d.max_packet_lifetime = options.max_packet_life_time;
            d.max_retransmits = options.max_retransmits;

            if let Some(protocol) = options.protocol {
                // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #11)
                if protocol.len() > MAX_PROTOCOL_LENGTH {
                    return Err(Error::ErrProtocolTooLarge);
                }
                d.protocol = protocol;
            }

            d.negotiated = options.negotiated.is_some();
            d.id = options.negotiated;
        }

        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #16)
        if d.max_packet_lifetime.is_some() && d.max_retransmits.is_some() {
            return Err(Error::ErrRetransmitsOrPacketLifeTime);
        }

        Ok(d)
    }

    /// label represents a label that can be used to distinguish this
    /// DataChannel object from other DataChannel objects.
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Ordered returns true if the DataChannel is ordered, and false if
    /// out-of-order delivery is allowed.
    pub fn ordered(&self) -> bool {
        self.ordered
    }

    pub fn max_packet_lifetime(&self) -> Option<u16> {
        self.max_packet_lifetime
    }

    pub fn max_retransmits(&self) -> Option<u16> {
        self.max_retransmits
    }

    pub fn protocol(&self) -> &str {
        self.protocol.as_str()
    }

    /// negotiated reports a channel the application negotiated out-of-band.
    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    /// id is the stream id. In-band channels get one once the SCTP transport
    /// is up, which is outside negotiation.
    pub fn id(&self) -> Option<u16> {
        self.id
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_data_channel_defaults() -> Result<()> {
        let d = RTCDataChannel::new("chat", None)?;
        assert_eq!(d.label(), "chat");
        assert!(d.ordered());
        assert!(!d.negotiated());
        assert_eq!(d.id(), None);
        Ok(())
    }

    #[test]
    fn test_data_channel_options() -> Result<()> {
        let d = RTCDataChannel::new(
            "files",
            Some(RTCDataChannelInit {
                ordered: Some(false),
                max_retransmits: Some(3),
                protocol: Some("binary".to_owned()),
                negotiated: Some(7),
                ..Default::default()
            }),
        )?;
        assert!(!d.ordered());
        assert_eq!(d.max_retransmits(), Some(3));
        assert_eq!(d.protocol(), "binary");
        assert!(d.negotiated());
        assert_eq!(d.id(), Some(7));
        Ok(())
    }

    #[test]
    fn test_data_channel_invalid_options() {
        let label = "a".repeat(MAX_LABEL_LENGTH + 1);
        assert_eq!(
            RTCDataChannel::new(&label, None),
            Err(Error::ErrStringSizeLimit)
        );

        assert_eq!(
            RTCDataChannel::new(
                "both",
                Some(RTCDataChannelInit {
                    max_packet_life_time: Some(10),
                    max_retransmits: Some(3),
                    ..Default::default()
                })
            ),
            Err(Error::ErrRetransmitsOrPacketLifeTime)
        );
    }
}
