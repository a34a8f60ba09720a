use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer_connection::sdp::JsepSessionDescription;

/// BundlePolicy affects which media tracks are negotiated if the remote
/// endpoint is not bundle-aware. Offers always carry a BUNDLE group with
/// every active section; the policy decides what a description without one
/// means.
///
/// ## Specifications
///
/// * [W3C]
///
/// [W3C]: https://w3c.github.io/webrtc-pc/#rtcbundlepolicy-enum
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum RTCBundlePolicy {
    #[default]
    Unspecified = 0,

    /// Balanced gathers for each media type in use.
    #[serde(rename = "balanced")]
    Balanced = 1,

    /// MaxCompat gathers for each track.
    #[serde(rename = "max-compat")]
    MaxCompat = 2,

    /// MaxBundle gathers for one track only. A description that does not
    /// bundle its active sections cannot be applied.
    #[serde(rename = "max-bundle")]
    MaxBundle = 3,
}

const BUNDLE_POLICY_BALANCED_STR: &str = "balanced";
const BUNDLE_POLICY_MAX_COMPAT_STR: &str = "max-compat";
const BUNDLE_POLICY_MAX_BUNDLE_STR: &str = "max-bundle";

impl From<&str> for RTCBundlePolicy {
    fn from(raw: &str) -> Self {
        match raw {
            BUNDLE_POLICY_BALANCED_STR => RTCBundlePolicy::Balanced,
            BUNDLE_POLICY_MAX_COMPAT_STR => RTCBundlePolicy::MaxCompat,
            BUNDLE_POLICY_MAX_BUNDLE_STR => RTCBundlePolicy::MaxBundle,
            _ => RTCBundlePolicy::Unspecified,
        }
    }
}

impl fmt::Display for RTCBundlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCBundlePolicy::Balanced => write!(f, "{BUNDLE_POLICY_BALANCED_STR}"),
            RTCBundlePolicy::MaxCompat => write!(f, "{BUNDLE_POLICY_MAX_COMPAT_STR}"),
            RTCBundlePolicy::MaxBundle => write!(f, "{BUNDLE_POLICY_MAX_BUNDLE_STR}"),
            _ => write!(f, "{}", crate::UNSPECIFIED_STR),
        }
    }
}

impl RTCBundlePolicy {
    /// accepts reports whether a description satisfies the policy.
    pub(crate) fn accepts(&self, desc: &JsepSessionDescription) -> bool {
        if *self != RTCBundlePolicy::MaxBundle {
            return true;
        }
        let has_active = desc.media_sections.iter().any(|m| !m.rejected);
        !has_active || desc.bundle_groups.iter().any(|g| !g.is_empty())
    }
}
