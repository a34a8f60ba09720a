use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// ICECredentialType indicates the type of credentials used to connect to
/// an ICE server.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCIceCredentialType {
    Unspecified,

    /// ICECredential::Password describes username and password based
    /// credentials as described in <https://tools.ietf.org/html/rfc5389>.
    #[default]
    #[serde(rename = "password")]
    Password,

    /// ICECredential::Oauth describes token based credential as described
    /// in <https://tools.ietf.org/html/rfc7635>.
    #[serde(rename = "oauth")]
    Oauth,
}

impl fmt::Display for RTCIceCredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCIceCredentialType::Password => write!(f, "password"),
            RTCIceCredentialType::Oauth => write!(f, "oauth"),
            _ => write!(f, "{}", crate::UNSPECIFIED_STR),
        }
    }
}

/// ICEServer describes a single STUN and TURN server that can be used by
/// the ICEAgent to establish a connection with a peer.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
    pub credential_type: RTCIceCredentialType,
}

const SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

impl RTCIceServer {
    /// validate checks the url schemes and that TURN servers carry
    /// credentials. Resolving the urls is left to the transport.
    pub(crate) fn validate(&self) -> Result<()> {
        for url in &self.urls {
            let scheme = SCHEMES
                .iter()
                .find(|s| url.starts_with(*s))
                .ok_or_else(|| Error::ErrInvalidIceServerUrl(url.clone()))?;
            if url.len() == scheme.len() {
                return Err(Error::ErrInvalidIceServerUrl(url.clone()));
            }

            // https://www.w3.org/TR/webrtc/#set-the-configuration (step #11.3.2)
            if scheme.starts_with("turn")
                && (self.username.is_empty() || self.credential.is_empty())
            {
                return Err(Error::ErrNoTurnCredentials);
            }
        }
        Ok(())
    }
}
