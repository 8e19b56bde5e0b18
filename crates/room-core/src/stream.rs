//! Media stream owned by a participant

use softphone_core::MediaStream;

/// A media stream attached to one participant
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    media: MediaStream,
    /// Call id of the owning participant
    participant: String,
}

impl Stream {
    pub fn new(media: MediaStream, participant: impl Into<String>) -> Self {
        Self {
            media,
            participant: participant.into(),
        }
    }

    /// Identifier of the underlying media stream
    pub fn id(&self) -> &str {
        &self.media.id
    }

    pub fn media(&self) -> &MediaStream {
        &self.media
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    /// Turn the video back on for rendering; remote video arrives disabled
    pub fn attach(&self) {
        for track in self.media.video_tracks() {
            track.set_enabled(true);
        }
    }

    /// Stop every track of the stream
    pub fn detach(&self) {
        Self::detach_stream(&self.media);
    }

    pub fn detach_stream(media: &MediaStream) {
        media.stop_all();
    }
}
