//! Local controls of the room call and the status broadcast that follows them

use serde_json::Value;
use softphone_core::{CallSession, MediaStream, ScreenShareSource};
use tracing::{info, warn};

use super::Room;
use crate::participant::{Participant, ParticipantStatus};
use crate::signal::{chat_body, signal_body, Signal, JSON_CONTENT_TYPE};

impl Room {
    fn room_call(&self, operation: &str) -> Option<CallSession> {
        let call = self.call_session();
        if call.is_none() {
            warn!(operation, extension = %self.options.extension, "Room has no call");
        }
        call
    }

    pub async fn mute(&self) -> bool {
        let Some(call) = self.room_call("mute") else { return false };
        if !self.phone.mute(Some(&call), true).await {
            return false;
        }
        self.update_local(|local| local.audio_muted = true).await;
        true
    }

    pub async fn unmute(&self) -> bool {
        let Some(call) = self.room_call("unmute") else { return false };
        if !self.phone.unmute(Some(&call), true).await {
            return false;
        }
        self.update_local(|local| local.audio_muted = false).await;
        true
    }

    pub async fn turn_camera_on(&self) -> bool {
        let Some(call) = self.room_call("turn_camera_on") else { return false };
        if !self.phone.turn_camera_on(Some(&call)).await {
            return false;
        }
        self.update_local(|local| local.video_muted = false).await;
        true
    }

    pub async fn turn_camera_off(&self) -> bool {
        let Some(call) = self.room_call("turn_camera_off") else { return false };
        if !self.phone.turn_camera_off(Some(&call)).await {
            return false;
        }
        self.update_local(|local| local.video_muted = true).await;
        true
    }

    /// Share a display source on the room call.
    ///
    /// `None` when the user cancelled the capture or the share could not
    /// start.
    pub async fn start_screen_sharing(&self, source: ScreenShareSource) -> Option<MediaStream> {
        let call = self.room_call("start_screen_sharing")?;
        let Some(stream) = self.phone.start_screen_sharing(source, Some(&call)).await else {
            warn!(extension = %self.options.extension, "Screen share cancelled");
            return None;
        };
        self.update_local(|local| local.screensharing = true).await;
        Some(stream)
    }

    pub async fn stop_screen_sharing(&self, restore_local: bool) -> bool {
        let Some(call) = self.room_call("stop_screen_sharing") else { return false };
        if !self.phone.stop_screen_sharing(restore_local, Some(&call)).await {
            return false;
        }
        self.update_local(|local| local.screensharing = false).await;
        true
    }

    pub async fn send_dtmf(&self, tone: &str) -> bool {
        let Some(call) = self.room_call("send_dtmf") else { return false };
        self.phone.send_key(Some(&call), tone).await
    }

    pub async fn send_message(&self, body: &str, content_type: &str) -> bool {
        let Some(call) = self.room_call("send_message") else { return false };
        self.phone.send_message(Some(&call), body, content_type).await
    }

    pub async fn send_chat(&self, content: &Value) -> bool {
        self.send_message(&chat_body(content), JSON_CONTENT_TYPE).await
    }

    pub async fn send_signal(&self, content: &Value) -> bool {
        self.send_message(&signal_body(content), JSON_CONTENT_TYPE).await
    }

    /// Leave the room: hang up the room call and stop listening
    pub async fn disconnect(&self) {
        let call = {
            let mut info = self.info.write();
            if !info.connected {
                return;
            }
            info.connected = false;
            info.call.take()
        };
        info!(extension = %self.options.extension, "Leaving room");

        self.stop_pump();
        if let Some(call) = call {
            self.phone.hangup(Some(&call)).await;
        }
        self.release();
    }

    // ===== STATUS =====

    pub(crate) async fn update_local<F>(&self, update: F)
    where
        F: FnOnce(&mut Participant) + Send,
    {
        let updated = self.state.lock().update_local(update);
        if let Some((status, event)) = updated {
            self.emit(event);
            self.broadcast_status(status).await;
        }
    }

    pub(crate) async fn broadcast_status(&self, status: ParticipantStatus) {
        self.send_signal_value(&Signal::update(status)).await;
    }

    pub(crate) async fn send_signal_value(&self, signal: &Signal) -> bool {
        match serde_json::to_value(signal) {
            Ok(content) => self.send_signal(&content).await,
            Err(e) => {
                warn!(error = %e, "Could not encode signal");
                false
            }
        }
    }
}
