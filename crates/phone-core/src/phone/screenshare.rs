//! Screen sharing over the outgoing video sender of a call

use tracing::{debug, info, warn};

use super::{Phone, ScreenShare};
use crate::call::{CallSession, CallSessionOverrides};
use crate::events::PhoneEvent;
use crate::media::{MediaStream, ScreenShareSource};

impl Phone {
    pub fn is_screen_sharing(&self) -> bool {
        self.state.lock().screen_share.is_some()
    }

    /// Stream currently shared, if any
    pub fn screen_share_stream(&self) -> Option<MediaStream> {
        self.state
            .lock()
            .screen_share
            .as_ref()
            .map(|share| share.stream.clone())
    }

    /// Replace the outgoing video of a call with a display capture.
    ///
    /// Returns `None` when the user cancels the capture, when the captured
    /// stream has no video track, or when no call resolves. When the shared
    /// source ends on its own, `ScreenShareEnding` is emitted and the
    /// application is expected to call [`Phone::stop_screen_sharing`].
    pub async fn start_screen_sharing(
        &self,
        source: ScreenShareSource,
        call: Option<&CallSession>,
    ) -> Option<MediaStream> {
        let Some((call_id, session)) = self.resolve(call) else {
            warn!("No call to share the screen on");
            return None;
        };

        let stream = match source {
            ScreenShareSource::Stream(stream) => stream,
            ScreenShareSource::Constraints(constraints) => {
                let Some(media) = self.media.as_ref() else {
                    warn!("No display capture available");
                    return None;
                };
                match media.display_media(&constraints).await {
                    Some(stream) => stream,
                    None => {
                        info!(%call_id, "Screen share cancelled");
                        return None;
                    }
                }
            }
        };

        let Some(screen_track) = stream.first_video_track() else {
            warn!(%call_id, stream_id = %stream.id, "Display stream has no video track");
            return None;
        };
        info!(%call_id, stream_id = %stream.id, "Starting screen share");

        // A new share replaces the previous one but keeps the camera track
        // the first one saved.
        let saved = self
            .state
            .lock()
            .screen_share
            .as_ref()
            .map(|previous| (previous.local_stream.clone(), previous.local_video.clone(), previous.had_video_sender));
        let (local_stream, local_video, previous_had_sender) = match saved {
            Some(saved) => saved,
            None => {
                let local_stream = session.local_stream();
                let local_video = local_stream.as_ref().and_then(MediaStream::first_video_track);
                (local_stream, local_video, false)
            }
        };

        let had_video_sender = match session.replace_video_track(Some(screen_track.clone())).await {
            Ok(had_sender) => had_sender || previous_had_sender,
            Err(e) => {
                // The previous share, if any, stays in place
                warn!(%call_id, error = %e, "Failed to replace video track");
                return None;
            }
        };

        let previous = self.state.lock().screen_share.take();
        if let Some(previous) = previous {
            debug!(%call_id, stream_id = %previous.stream.id, "Replacing previous screen share");
            previous.watcher.abort();
            previous.stream.stop_all();
        }

        let sharing = self.refresh(call_id, session.as_ref(), CallSessionOverrides::screensharing(true));

        let watcher = {
            let emitter = self.emitter.clone();
            let call = sharing.clone();
            let stream = stream.clone();
            tokio::spawn(async move {
                screen_track.ended().await;
                debug!(call_id = %call.call_id, "Shared source ended");
                emitter.emit(PhoneEvent::ScreenShareEnding { call, stream });
            })
        };

        self.state.lock().screen_share = Some(ScreenShare {
            call_id: Some(call_id),
            stream: stream.clone(),
            local_video,
            local_stream,
            had_video_sender,
            watcher,
        });

        self.emit(PhoneEvent::ScreenShareStarted {
            call: sharing,
            stream: stream.clone(),
        });

        Some(stream)
    }

    /// End the current screen share.
    ///
    /// With `restore_local` the camera track the share replaced goes back on
    /// the video sender; otherwise the local video is stopped.
    pub async fn stop_screen_sharing(&self, restore_local: bool, call: Option<&CallSession>) -> bool {
        let Some(share) = self.state.lock().screen_share.take() else {
            return false;
        };
        info!(call_id = ?share.call_id, restore_local, "Stopping screen share");

        share.watcher.abort();
        for track in share.stream.video_tracks() {
            track.stop();
        }

        let target = self.resolve(call).or_else(|| {
            share
                .call_id
                .and_then(|id| self.registry.session(id).map(|session| (id, session)))
        });

        if restore_local {
            if let (true, Some((call_id, session))) = (share.had_video_sender, &target) {
                if let Err(e) = session.replace_video_track(share.local_video.clone()).await {
                    warn!(%call_id, error = %e, "Failed to restore local video");
                }
            }
        } else if let Some(local_stream) = &share.local_stream {
            for track in local_stream.video_tracks() {
                track.stop();
            }
        }

        let ended = target.map(|(call_id, session)| {
            self.refresh(call_id, session.as_ref(), CallSessionOverrides::screensharing(false))
        });
        self.emit(PhoneEvent::ScreenShareEnded { call: ended });

        true
    }
}
