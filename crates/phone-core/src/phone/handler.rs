//! Transport event bindings
//!
//! Transport notifications are the only source of protocol state changes.
//! They are processed strictly in arrival order, either by the task started
//! with [`Phone::bind_transport_events`] or by feeding
//! [`Phone::handle_transport_event`] directly.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Phone;
use crate::call::{derive_call_session, CallSession, CallSessionOverrides, LiveSession, SessionState};
use crate::events::PhoneEvent;
use crate::media::{MediaKind, MediaStream, MediaTrack};
use crate::transport::{SipSession, TransportEvent, ANSWER_MODE_HEADER};

impl Phone {
    /// Process transport events on a background task until the channel
    /// closes, the phone is dropped or [`Phone::close`] is called
    pub fn bind_transport_events(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let phone = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(phone) = phone.upgrade() else {
                    break;
                };
                phone.handle_transport_event(event).await;
            }
            debug!("Transport event loop finished");
        });

        if let Some(previous) = self.event_loop.lock().replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn stop_event_loop(&self) {
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
    }

    pub async fn handle_transport_event(&self, event: TransportEvent) {
        debug!(event = event.name(), "Transport event");

        match event {
            TransportEvent::Invite { session, wants_video } => self.on_invite(session, wants_video).await,
            TransportEvent::StateChanged { session, state } => self.on_state_changed(session, state).await,
            TransportEvent::Accepted { session } => self.on_call_accepted(session, true).await,
            TransportEvent::Registered => self.on_registered().await,
            TransportEvent::Unregistered => {
                info!("Unregistered");
                self.emit(PhoneEvent::Unregistered);
            }
            TransportEvent::Connected => {
                info!("Transport connected");
                self.stop_heartbeat();
            }
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::Reinvite { session } => {
                info!(sip_call_id = %session.id(), "Reinvite received");
                let call = self.observe(session.as_ref(), CallSessionOverrides::none());
                self.emit(PhoneEvent::Reinvite(call));
            }
            TransportEvent::RemoteTrack { session, stream, track } => {
                self.on_remote_track(session.as_ref(), stream, track)
            }
            TransportEvent::RemoteStreamRemoved { stream } => self.emit(PhoneEvent::RemoveStream(stream)),
            TransportEvent::SessionDescription { session, kind, sdp } => {
                self.emit(PhoneEvent::SessionDescription {
                    sip_call_id: session.id(),
                    kind,
                    sdp,
                });
            }
            TransportEvent::Message(message) => self.emit(PhoneEvent::Message(message)),
            TransportEvent::VideoInputChange(stream) => self.emit(PhoneEvent::VideoInputChange(stream)),
        }
    }

    async fn on_invite(&self, session: Arc<dyn SipSession>, wants_video: bool) {
        let sip_call_id = session.id();
        if self.registry.find_by_sip_id(&sip_call_id).is_some() {
            debug!(%sip_call_id, "Duplicate invite ignored");
            return;
        }

        let auto_answer = session.request_header(ANSWER_MODE_HEADER).as_deref() == Some("Auto");
        let (with_video, hold_current, ringing_enabled) = {
            let config = self.config.read();
            (
                config.allow_video && wants_video,
                config.hold_current_on_invite,
                config.ringing_enabled,
            )
        };

        let call = derive_call_session(
            None,
            &LiveSession::capture(session.as_ref()),
            CallSessionOverrides::incoming(with_video, auto_answer),
        );
        info!(
            call_id = %call.call_id,
            %sip_call_id,
            number = %call.number,
            with_video,
            auto_answer,
            "Incoming call"
        );

        self.registry.insert(call.clone(), session);
        self.registry.enqueue_incoming(call.call_id);

        if self.has_active_call() {
            if hold_current {
                // The outcome does not matter here: the invite stays queued
                self.hold_current_for(Some(call.call_id), false).await;
            }
            self.emit(PhoneEvent::TerminateSound { call_id: Some(call.call_id) });
            self.emit(PhoneEvent::PlayInboundCallSignalSound(self.output_cue(Some(call.call_id))));
        } else if ringing_enabled {
            self.emit(PhoneEvent::TerminateSound { call_id: Some(call.call_id) });
            self.emit(PhoneEvent::PlayRingSound(self.ring_cue(Some(call.call_id))));
        }

        self.emit(PhoneEvent::Incoming(call));
    }

    async fn on_state_changed(&self, session: Arc<dyn SipSession>, state: SessionState) {
        debug!(sip_call_id = %session.id(), %state, "Session state changed");

        match state {
            SessionState::Establishing => {
                // Answering an invitation also goes through Establishing
                if session.is_invitation() {
                    return;
                }
                let call = self.observe(session.as_ref(), CallSessionOverrides::progress());
                self.emit(PhoneEvent::Progress(call));
            }
            SessionState::Established => self.on_call_accepted(session, false).await,
            SessionState::Terminated => self.on_call_terminated(session.as_ref()),
            SessionState::Initial => {}
        }
    }

    /// A call became established, from either the accepted notification or
    /// the Established state change. Whichever comes second is a no-op.
    async fn on_call_accepted(&self, session: Arc<dyn SipSession>, restore_audio_device: bool) {
        let sip_call_id = session.id();
        let camera_enabled = session.has_video();

        let call_id = match self.registry.find_by_sip_id(&sip_call_id) {
            Some(call_id) => call_id,
            None => {
                let call = derive_call_session(
                    None,
                    &LiveSession::capture(session.as_ref()),
                    CallSessionOverrides::accepted(camera_enabled),
                );
                let call_id = call.call_id;
                self.registry.insert(call, session.clone());
                call_id
            }
        };

        // Answering may already have stored an established snapshot, so only
        // the notified set tells whether `Accepted` went out
        if !self.state.lock().accepted_notified.insert(call_id) {
            debug!(%call_id, %sip_call_id, "Call already accepted");
            return;
        }

        let call = self.refresh(call_id, session.as_ref(), CallSessionOverrides::accepted(camera_enabled));
        info!(%call_id, %sip_call_id, camera_enabled, "Call accepted");

        self.state.lock().current = Some(call_id);
        self.registry.dequeue_incoming(call_id);

        if restore_audio_device {
            let device = self.config.read().audio_output_device.clone();
            if let Some(device) = device {
                if let Err(e) = self.transport.change_audio_output_device(&device).await {
                    warn!(%call_id, device = %device, error = %e, "Failed to restore audio output device");
                }
            }
        }

        self.emit(PhoneEvent::TerminateSound { call_id: Some(call_id) });
        self.emit(PhoneEvent::Accepted(call));
    }

    fn on_call_terminated(&self, session: &dyn SipSession) {
        let sip_call_id = session.id();
        let live = LiveSession::capture(session);

        let ended = match self.registry.find_by_sip_id(&sip_call_id) {
            Some(call_id) => {
                info!(%call_id, %sip_call_id, "Call terminated");
                let ended = self.refresh(call_id, session, CallSessionOverrides::none());
                self.cleanup_call(call_id);
                self.registry.take_terminating(&sip_call_id);
                ended
            }
            None => {
                // Hung up locally, cleanup already ran
                let parked = self.registry.take_terminating(&sip_call_id);
                debug!(%sip_call_id, parked = parked.is_some(), "Untracked call terminated");
                derive_call_session(parked.as_ref(), &live, CallSessionOverrides::none())
            }
        };

        self.emit(PhoneEvent::CallEnded(ended));
    }

    async fn on_registered(&self) {
        info!("Registered");
        self.stop_heartbeat();
        self.emit(PhoneEvent::Registered);

        let reinvite = {
            let mut state = self.state.lock();
            if state.should_send_reinvite && state.current.is_some() {
                state.should_send_reinvite = false;
                true
            } else {
                false
            }
        };

        // Media must be renegotiated when the network changed under a call
        if reinvite {
            self.send_reinvite(None).await;
        }
    }

    fn on_disconnected(&self) {
        info!("Transport disconnected");
        self.emit(PhoneEvent::Unregistered);
        self.start_heartbeat();
        self.state.lock().should_send_reinvite = true;
    }

    fn on_remote_track(&self, session: &dyn SipSession, stream: MediaStream, track: MediaTrack) {
        debug!(
            sip_call_id = %session.id(),
            stream_id = %stream.id,
            track_id = %track.id(),
            kind = ?track.kind(),
            "Remote track"
        );
        self.emit(PhoneEvent::Track {
            sip_call_id: session.id(),
            stream: stream.clone(),
            track: track.clone(),
        });

        match track.kind() {
            MediaKind::Audio => self.emit(PhoneEvent::AudioStream(stream)),
            MediaKind::Video => {
                track.set_enabled(false);
                self.emit(PhoneEvent::VideoStream {
                    sip_call_id: session.id(),
                    stream,
                    stream_id: track.id().to_string(),
                });
            }
        }
    }

    /// Snapshot of a session, stored when the session is tracked
    fn observe(&self, session: &dyn SipSession, overrides: CallSessionOverrides) -> CallSession {
        match self.registry.find_by_sip_id(&session.id()) {
            Some(call_id) => self.refresh(call_id, session, overrides),
            None => derive_call_session(None, &LiveSession::capture(session), overrides),
        }
    }
}
