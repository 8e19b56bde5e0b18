//! Media handles
//!
//! Capture and rendering live outside this crate. These types are the
//! handles the transport and the application exchange: a [`MediaTrack`] is a
//! cheaply cloneable reference to one track, a [`MediaStream`] groups tracks
//! under the identifier the remote side announced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: MediaKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    ended_tx: watch::Sender<bool>,
}

/// Handle to one audio or video track
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        let (ended_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                kind,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                ended_tx,
            }),
        }
    }

    pub fn audio(id: impl Into<String>) -> Self {
        Self::new(id, MediaKind::Audio)
    }

    pub fn video(id: impl Into<String>) -> Self {
        Self::new(id, MediaKind::Video)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Stop the track from our side. Does not count as a natural end.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Signal that the source ended on its own (e.g. the user closed the
    /// shared window from the browser bar)
    pub fn end(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.ended_tx.send_replace(true);
    }

    pub fn has_ended(&self) -> bool {
        *self.inner.ended_tx.borrow()
    }

    /// Resolve once [`MediaTrack::end`] has been called on any clone
    pub async fn ended(&self) {
        let mut rx = self.inner.ended_tx.subscribe();
        // The sender lives in `inner`, which we hold, so this cannot fail.
        let _ = rx.wait_for(|ended| *ended).await;
    }

    /// Two handles refer to the same underlying track
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.same_track(other)
    }
}

/// A set of tracks announced under one stream identifier
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self { id: id.into(), tracks }
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(MediaKind::Video)
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(MediaKind::Audio)
    }

    pub fn first_video_track(&self) -> Option<MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == MediaKind::Video).cloned()
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == MediaKind::Video)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    fn tracks_of(&self, kind: MediaKind) -> Vec<MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == kind).cloned().collect()
    }
}

/// Constraints handed to the display capture collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConstraints {
    pub video: bool,
    pub audio: bool,
    /// Preferred frame rate, if any
    pub frame_rate: Option<u32>,
}

impl Default for DisplayConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: false,
            frame_rate: None,
        }
    }
}

/// What to share: capture with constraints, or an already acquired stream
#[derive(Debug, Clone)]
pub enum ScreenShareSource {
    Constraints(DisplayConstraints),
    Stream(MediaStream),
}

impl Default for ScreenShareSource {
    fn default() -> Self {
        ScreenShareSource::Constraints(DisplayConstraints::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn ended_resolves_after_natural_end() {
        let track = MediaTrack::video("screen");
        let watcher = track.clone();
        let handle = tokio::spawn(async move { watcher.ended().await });

        track.end();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should finish")
            .expect("watcher should not panic");
        assert!(track.has_ended());
        assert!(track.is_stopped());
    }

    #[test]
    fn stop_is_not_a_natural_end() {
        let track = MediaTrack::audio("mic");
        track.stop();
        assert!(track.is_stopped());
        assert!(!track.has_ended());
    }

    #[test]
    fn stream_splits_tracks_by_kind() {
        let stream = MediaStream::new(
            "s1",
            vec![MediaTrack::audio("a"), MediaTrack::video("v"), MediaTrack::video("v2")],
        );
        assert_eq!(stream.audio_tracks().len(), 1);
        assert_eq!(stream.video_tracks().len(), 2);
        assert_eq!(stream.first_video_track().map(|t| t.id().to_string()), Some("v".to_string()));

        stream.stop_all();
        assert!(stream.tracks.iter().all(MediaTrack::is_stopped));
    }
}
