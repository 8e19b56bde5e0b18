//! In-call controls, devices and registration lifecycle
//!
//! Every control taking an `Option<&CallSession>` resolves its target with
//! the registry's resolution rule and is a no-op returning `false`/`None`
//! when nothing resolves. Transport failures are logged, never returned.

use tracing::{debug, error, info, warn};

use super::config::clamp_volume;
use super::recovery::{retry_with_backoff, RetryConfig};
use super::Phone;
use crate::call::{CallSession, CallSessionOverrides};
use crate::error::{PhoneError, PhoneResult};
use crate::events::PhoneEvent;

impl Phone {
    // ===== HOLD / RESUME =====

    pub async fn hold(&self, call: Option<&CallSession>, with_event: bool) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        info!(%call_id, "Hold");
        self.hold_session(call_id, &session, with_event).await
    }

    pub async fn unhold(&self, call: Option<&CallSession>, with_event: bool) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        info!(%call_id, "Unhold");

        if let Err(e) = session.unhold().await {
            warn!(%call_id, error = %e, "Failed to unhold call");
            return false;
        }
        let call = self.refresh(call_id, session.as_ref(), CallSessionOverrides::held(false));
        if with_event {
            self.emit(PhoneEvent::Unheld(call));
        }
        true
    }

    /// Take a held call back, holding whichever other call is current
    pub async fn resume(&self, call: Option<&CallSession>) -> Option<CallSession> {
        let (call_id, session) = self.resolve(call)?;
        info!(%call_id, "Resume");

        if !self.hold_current_for(Some(call_id), true).await {
            return None;
        }

        if let Err(e) = session.unhold().await {
            warn!(%call_id, error = %e, "Failed to resume call");
            return None;
        }
        let resumed = self.refresh(call_id, session.as_ref(), CallSessionOverrides::held(false));
        self.emit(PhoneEvent::Resumed(resumed.clone()));
        self.state.lock().current = Some(call_id);

        Some(resumed)
    }

    /// Make a tracked call current without touching the transport
    pub fn set_active_call(&self, call: &CallSession) -> bool {
        match self.resolve(Some(call)) {
            Some((call_id, _)) => {
                self.state.lock().current = Some(call_id);
                true
            }
            None => false,
        }
    }

    // ===== AUDIO / VIDEO =====

    pub async fn mute(&self, call: Option<&CallSession>, with_event: bool) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        info!(%call_id, "Mute");

        if let Err(e) = session.mute().await {
            warn!(%call_id, error = %e, "Failed to mute call");
            return false;
        }
        let call = self.refresh(call_id, session.as_ref(), CallSessionOverrides::muted(true));
        if with_event {
            self.emit(PhoneEvent::Muted(call));
        }
        true
    }

    pub async fn unmute(&self, call: Option<&CallSession>, with_event: bool) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        info!(%call_id, "Unmute");

        if let Err(e) = session.unmute().await {
            warn!(%call_id, error = %e, "Failed to unmute call");
            return false;
        }
        let call = self.refresh(call_id, session.as_ref(), CallSessionOverrides::muted(false));
        if with_event {
            self.emit(PhoneEvent::Unmuted(call));
        }
        true
    }

    pub async fn turn_camera_on(&self, call: Option<&CallSession>) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        info!(%call_id, "Camera on");

        if let Err(e) = session.set_camera(true).await {
            warn!(%call_id, error = %e, "Failed to turn camera on");
            return false;
        }
        let call = self.refresh(call_id, session.as_ref(), CallSessionOverrides::video_muted(false));
        self.emit(PhoneEvent::CameraResumed(call));
        true
    }

    pub async fn turn_camera_off(&self, call: Option<&CallSession>) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        info!(%call_id, "Camera off");

        if let Err(e) = session.set_camera(false).await {
            warn!(%call_id, error = %e, "Failed to turn camera off");
            return false;
        }
        let call = self.refresh(call_id, session.as_ref(), CallSessionOverrides::video_muted(true));
        self.emit(PhoneEvent::CameraDisabled(call));
        true
    }

    /// Send a DTMF tone
    pub async fn send_key(&self, call: Option<&CallSession>, tone: &str) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        debug!(%call_id, tone, "Sending DTMF");

        match session.send_dtmf(tone).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%call_id, tone, error = %e, "Failed to send DTMF");
                false
            }
        }
    }

    /// Send an in-dialog message
    pub async fn send_message(&self, call: Option<&CallSession>, body: &str, content_type: &str) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        debug!(%call_id, content_type, len = body.len(), "Sending message");

        match session.message(body, content_type).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%call_id, error = %e, "Failed to send message");
                false
            }
        }
    }

    // ===== DEVICES =====

    pub async fn change_audio_device(&self, device_id: &str) {
        info!(device_id, "Changing audio output device");
        self.config.write().audio_output_device = Some(device_id.to_string());
        if let Err(e) = self.transport.change_audio_output_device(device_id).await {
            warn!(device_id, error = %e, "Failed to change audio output device");
        }
    }

    pub fn change_ring_device(&self, device_id: &str) {
        self.config.write().audio_ring_device = Some(device_id.to_string());
    }

    /// `volume` is clamped into 0.0..=1.0
    pub async fn change_audio_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        self.config.write().audio_output_volume = volume;
        if let Err(e) = self.transport.change_audio_output_volume(volume).await {
            warn!(volume, error = %e, "Failed to change audio output volume");
        }
    }

    /// `volume` is clamped into 0.0..=1.0
    pub fn change_ring_volume(&self, volume: f32) {
        self.config.write().audio_ring_volume = clamp_volume(volume);
    }

    pub async fn change_audio_input_device(&self, device_id: &str) -> bool {
        info!(device_id, "Changing audio input device");
        let session = self.resolve(None).map(|(_, session)| session);
        match self.transport.change_audio_input_device(device_id, session).await {
            Ok(()) => true,
            Err(e) => {
                warn!(device_id, error = %e, "Failed to change audio input device");
                false
            }
        }
    }

    pub async fn change_video_input_device(&self, device_id: &str) -> bool {
        info!(device_id, "Changing video input device");
        let session = self.resolve(None).map(|(_, session)| session);
        match self.transport.change_video_input_device(device_id, session).await {
            Ok(()) => true,
            Err(e) => {
                warn!(device_id, error = %e, "Failed to change video input device");
                false
            }
        }
    }

    pub fn enable_ringing(&self) {
        self.config.write().ringing_enabled = true;
    }

    pub fn disable_ringing(&self) {
        self.config.write().ringing_enabled = false;
    }

    pub fn is_ringing_enabled(&self) -> bool {
        self.config.read().ringing_enabled
    }

    // ===== REGISTRATION =====

    pub async fn register(&self) -> bool {
        info!("Registering");
        match self.transport.register().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Registration failed");
                false
            }
        }
    }

    /// Register, retrying transient transport failures
    pub async fn register_with_retry(&self) -> PhoneResult<()> {
        let transport = self.transport.clone();
        retry_with_backoff("register", RetryConfig::quick(), move || {
            let transport = transport.clone();
            async move { transport.register().await.map_err(PhoneError::from) }
        })
        .await
        .map_err(|e| match e {
            PhoneError::Transport(inner) => PhoneError::registration_failed(inner.to_string()),
            other => other,
        })
    }

    pub async fn unregister(&self) -> bool {
        info!("Unregistering");
        match self.transport.unregister().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Unregistration failed");
                false
            }
        }
    }

    pub fn is_registered(&self) -> bool {
        self.transport.is_registered()
    }

    /// Stop the user agent, keeping calls and subscriptions
    pub async fn stop(&self) {
        info!("Stopping transport");
        if let Err(e) = self.transport.stop().await {
            warn!(error = %e, "Failed to stop transport");
        }
    }

    /// Unregister, close the transport and forget every call
    pub async fn close(&self) {
        info!("Closing phone");
        self.unregister().await;
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Failed to close transport");
        }
        self.stop_event_loop();

        let screen_share = {
            let mut state = self.state.lock();
            state.current = None;
            state.should_send_reinvite = false;
            state.accepted.clear();
            state.accepted_notified.clear();
            state.rejected.clear();
            state.ignored.clear();
            state.screen_share.take()
        };
        if let Some(share) = screen_share {
            share.watcher.abort();
            share.stream.stop_all();
        }
        self.registry.clear();
    }

    pub async fn reconnect(&self) -> bool {
        info!("Reconnecting");
        match self.transport.attempt_reconnection().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Reconnection attempt failed");
                false
            }
        }
    }

    /// Start the transport heartbeat unless one already runs
    pub fn start_heartbeat(&self) {
        if self.transport.has_heartbeat() {
            return;
        }
        debug!("Starting heartbeat");
        self.transport.start_heartbeat();
    }

    pub fn stop_heartbeat(&self) {
        debug!("Stopping heartbeat");
        self.transport.stop_heartbeat();
    }

    pub fn user_agent(&self) -> String {
        self.transport.user_agent()
    }
}
