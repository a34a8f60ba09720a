pub mod track_local_static;

use std::fmt;

use crate::rtp_transceiver::rtp_codec::RTPCodecType;

/// TrackLocal is an interface that controls how the user can send media.
/// The negotiation core only needs its identity: the id signaled in
/// `a=msid`, the media stream it belongs to, and its kind.
pub trait TrackLocal: fmt::Debug {
    /// id is the unique identifier for this Track. This should be unique for the
    /// stream, but doesn't have to globally unique. A common example would be 'audio' or 'video'
    /// and stream_id would be 'desktop' or 'webcam'
    fn id(&self) -> &str;

    /// stream_id is the group this track belongs too. This must be unique.
    /// An empty stream id signals a track without an associated stream.
    fn stream_id(&self) -> &str;

    /// kind controls if this TrackLocal is audio or video
    fn kind(&self) -> RTPCodecType;
}
