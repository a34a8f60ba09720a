
use crate::dtls_transport::dtls_role::DTLSRole;
use crate::error::{Error, Result};
use crate::ice_transport::ice_parameters::RTCIceParameters;

#[derive(Default, Clone)]
pub struct Candidates {
    pub ice_lite: bool,
    pub username_fragment: String,
    pub password: String,
}

/// SettingEngine allows influencing behavior in ways that are not
/// supported by the WebRTC API. This allows us to support additional
/// use-cases without deviating from the WebRTC API elsewhere.
#[derive(Default, Clone)]
pub struct SettingEngine {
    pub(crate) candidates: Candidates,
    pub(crate) answering_dtls_role: DTLSRole,
    pub(crate) disable_dtls: bool,
}

impl SettingEngine {
    /// set_lite configures whether or not the ice agent should be a lite agent
    pub fn set_lite(&mut self, lite: bool) {
        self.candidates.ice_lite = lite;
    }

    /// set_answering_dtls_role sets the dtls_transport role that is selected when offering
    /// The dtls_transport role controls if the WebRTC Client as a client or server. This
    /// may be useful when interacting with non-compliant clients or debugging issues.
    ///
    /// DTLSRoleActive:
    ///   Act as dtls_transport Client, send the ClientHello and starts the handshake
    /// DTLSRolePassive:
    ///   Act as dtls_transport Server, wait for ClientHello
    pub fn set_answering_dtls_role(&mut self, role: DTLSRole) -> Result<()> {
        if role != DTLSRole::Client && role != DTLSRole::Server {
            return Err(Error::ErrSettingEngineSetAnsweringDTLSRole);
        }
        self.answering_dtls_role = role;
        Ok(())
    }

    /// set_ice_credentials sets a static ufrag/pwd to be used by the first
    /// local description. An ICE restart always generates new ones.
    pub fn set_ice_credentials(&mut self, username_fragment: String, password: String) {
        self.candidates.username_fragment = username_fragment;
        self.candidates.password = password;
    }

    /// disable_dtls switches the session to SDES keying: descriptions carry
    /// `a=crypto` lines instead of a certificate fingerprint.
    pub fn disable_dtls(&mut self, is_disabled: bool) {
        self.disable_dtls = is_disabled;
    }

    /// initial_ice_parameters are the credentials of the first local
    /// description, the configured ones or freshly generated.
    pub(crate) fn initial_ice_parameters(&self) -> RTCIceParameters {
        if self.candidates.username_fragment.is_empty() || self.candidates.password.is_empty() {
            RTCIceParameters::generate()
        } else {
            RTCIceParameters {
                username_fragment: self.candidates.username_fragment.clone(),
                password: self.candidates.password.clone(),
            }
        }
    }
}
