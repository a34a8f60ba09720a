use serde::{Deserialize, Serialize};

use crate::rand::{generate_pwd, generate_ufrag};

/// ICEParameters includes the ICE username fragment
/// and password and other ICE-related parameters.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RTCIceParameters {
    pub username_fragment: String,
    pub password: String,
}

impl RTCIceParameters {
    /// generate creates a fresh pair of local credentials.
    pub(crate) fn generate() -> Self {
        RTCIceParameters {
            username_fragment: generate_ufrag(),
            password: generate_pwd(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username_fragment.is_empty() && self.password.is_empty()
    }
}
