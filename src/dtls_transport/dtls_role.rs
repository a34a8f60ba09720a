use std::fmt;

use sdp::util::ConnectionRole;
use serde::{Deserialize, Serialize};

use crate::peer_connection::sdp::JsepSessionDescription;

/// DtlsRole indicates the role of the DTLS transport.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DTLSRole {
    #[default]
    Unspecified = 0,

    /// DTLSRoleAuto defines the DTLS role is determined based on
    /// the resolved ICE role: the ICE controlled role acts as the DTLS
    /// client and the ICE controlling role acts as the DTLS server.
    #[serde(rename = "auto")]
    Auto = 1,

    /// DTLSRoleClient defines the DTLS client role.
    #[serde(rename = "client")]
    Client = 2,

    /// DTLSRoleServer defines the DTLS server role.
    #[serde(rename = "server")]
    Server = 3,
}

/// <https://tools.ietf.org/html/rfc5763>
/// The answerer MUST use either a
/// setup attribute value of setup:active or setup:passive.  Note that
/// if the answerer uses setup:passive, then the DTLS handshake will
/// not begin until the answerer is received, which adds additional
/// latency. setup:active allows the answer and the DTLS handshake to
/// occur in parallel.  Thus, setup:active is RECOMMENDED.
pub(crate) const DEFAULT_DTLS_ROLE_ANSWER: DTLSRole = DTLSRole::Client;

/// The endpoint that is the offerer MUST use the setup attribute
/// value of setup:actpass and be prepared to receive a client_hello
/// before it receives the answer.
pub(crate) const DEFAULT_DTLS_ROLE_OFFER: DTLSRole = DTLSRole::Auto;

impl fmt::Display for DTLSRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DTLSRole::Auto => write!(f, "auto"),
            DTLSRole::Client => write!(f, "client"),
            DTLSRole::Server => write!(f, "server"),
            _ => write!(f, "{}", crate::UNSPECIFIED_STR),
        }
    }
}

impl From<ConnectionRole> for DTLSRole {
    fn from(role: ConnectionRole) -> Self {
        match role {
            ConnectionRole::Active => DTLSRole::Client,
            ConnectionRole::Passive => DTLSRole::Server,
            _ => DTLSRole::Auto,
        }
    }
}

/// Iterate a SessionDescription from a remote to determine if an explicit
/// role can been determined from it. The decision is made from the first role we we parse.
/// If no role can be found we return DTLSRoleAuto
impl From<&JsepSessionDescription> for DTLSRole {
    fn from(session_description: &JsepSessionDescription) -> Self {
        session_description
            .media_sections
            .iter()
            .map(|m| m.transport.connection_role)
            .find(|role| *role != ConnectionRole::Unspecified)
            .map(DTLSRole::from)
            .unwrap_or(DTLSRole::Auto)
    }
}

impl DTLSRole {
    pub(crate) fn to_connection_role(self) -> ConnectionRole {
        match self {
            DTLSRole::Client => ConnectionRole::Active,
            DTLSRole::Server => ConnectionRole::Passive,
            DTLSRole::Auto => ConnectionRole::Actpass,
            _ => ConnectionRole::Unspecified,
        }
    }

    /// answer_role picks the role an answerer takes for an offered setup
    /// attribute.
    pub(crate) fn answer_role(offered: ConnectionRole) -> DTLSRole {
        match offered {
            ConnectionRole::Active => DTLSRole::Server,
            ConnectionRole::Passive => DTLSRole::Client,
            _ => DEFAULT_DTLS_ROLE_ANSWER,
        }
    }
}
