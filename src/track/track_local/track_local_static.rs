use super::*;

/// TrackLocalStatic is a TrackLocal with a fixed identity.
#[derive(Debug, Clone)]
pub struct TrackLocalStatic {
    kind: RTPCodecType,
    id: String,
    stream_id: String,
}

impl TrackLocalStatic {
    pub fn new(kind: RTPCodecType, id: String, stream_id: String) -> Self {
        TrackLocalStatic {
            kind,
            id,
            stream_id,
        }
    }
}

impl TrackLocal for TrackLocalStatic {
    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn stream_id(&self) -> &str {
        self.stream_id.as_str()
    }

    fn kind(&self) -> RTPCodecType {
        self.kind
    }
}
