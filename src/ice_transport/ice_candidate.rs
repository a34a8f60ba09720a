use serde::{Deserialize, Serialize};

/// ICECandidateInit is used to serialize ice candidates
///
/// A candidate is routed to its media section by `sdp_mid` first, then by
/// `sdp_mline_index`.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
}

impl RTCIceCandidateInit {
    /// candidate_value strips the `a=candidate:` prefix, leaving the value
    /// stored in the SDP attribute.
    pub(crate) fn candidate_value(&self) -> &str {
        let c = self.candidate.trim();
        let c = c.strip_prefix("a=").unwrap_or(c);
        c.strip_prefix("candidate:").unwrap_or(c)
    }

    /// is_end_of_candidates reports the empty candidate that signals the end
    /// of a generation.
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}
