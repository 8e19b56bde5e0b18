//! Placing, answering and ending calls, and call queries

use tracing::{debug, error, info, warn};

use super::types::{CallCapabilities, PhoneStats};
use super::Phone;
use crate::call::{derive_call_session, CallId, CallSession, CallSessionOverrides, LiveSession};
use crate::events::PhoneEvent;
use crate::media::MediaStream;

impl Phone {
    // ===== CALL LIFECYCLE =====

    /// Dial `number`.
    ///
    /// Registers first when the transport is not registered, and puts the
    /// current call on hold before dialing. Returns `None` when the number is
    /// empty, registration fails, the current call cannot be held (with the
    /// `Abort` policy) or the transport refuses the call.
    pub async fn make_call(&self, number: &str, camera_enabled: bool, video_only: bool) -> Option<CallSession> {
        let number = number.trim();
        if number.is_empty() {
            warn!("Refusing to dial an empty number");
            return None;
        }
        info!(number, camera_enabled, video_only, "Making call");

        if !self.transport.is_registered() {
            if let Err(e) = self.register_with_retry().await {
                error!(number, error = %e, "Could not register before dialing");
                return None;
            }
        }

        if !self.hold_current_for(None, true).await {
            return None;
        }

        let with_video = self.config.read().allow_video && camera_enabled;
        let session = match self.transport.call(number, with_video, video_only).await {
            Ok(session) => session,
            Err(e) => {
                warn!(number, error = %e, "Failed to place call");
                return None;
            }
        };

        let call = derive_call_session(
            None,
            &LiveSession::capture(session.as_ref()),
            CallSessionOverrides::outgoing(camera_enabled),
        );
        info!(call_id = %call.call_id, sip_call_id = %call.sip_call_id, "Call placed");
        self.registry.insert(call.clone(), session);

        self.emit(PhoneEvent::PlayProgressSound(self.output_cue(Some(call.call_id))));
        self.state.lock().current = Some(call.call_id);
        self.emit(PhoneEvent::Outgoing(call.clone()));

        Some(call)
    }

    /// Answer an inbound call.
    ///
    /// A call is answered at most once: later calls return `None` without
    /// touching the transport. `Answered` is emitted before the transport
    /// confirms; `Accepted` follows from the transport notifications.
    pub async fn accept(&self, call: &CallSession, camera_enabled: bool) -> Option<CallSession> {
        info!(call_id = %call.call_id, camera_enabled, "Accepting call");

        let Some((call_id, session)) = self.resolve(Some(call)) else {
            warn!(call_id = %call.call_id, "Cannot accept an unknown call");
            return None;
        };

        if !self.state.lock().accepted.insert(call_id) {
            debug!(%call_id, "Call already accepted");
            return None;
        }

        if !self.hold_current_for(Some(call_id), false).await {
            self.state.lock().accepted.remove(&call_id);
            return None;
        }

        self.state.lock().should_send_reinvite = false;
        let answered = self.registry.call(call_id).unwrap_or_else(|| call.clone());
        self.emit(PhoneEvent::Answered(answered));

        let with_video = self.config.read().allow_video && camera_enabled;
        if let Err(e) = session.answer(with_video).await {
            warn!(%call_id, error = %e, "Failed to answer call");
            self.state.lock().accepted.remove(&call_id);
            return None;
        }

        self.state.lock().current = Some(call_id);
        self.registry.dequeue_incoming(call_id);

        Some(self.refresh(call_id, session.as_ref(), CallSessionOverrides::accepted(with_video)))
    }

    /// Decline an inbound call. Repeated calls are no-ops.
    pub async fn reject(&self, call: &CallSession) {
        info!(call_id = %call.call_id, "Rejecting call");

        let Some((call_id, session)) = self.resolve(Some(call)) else {
            debug!(call_id = %call.call_id, "Nothing to reject");
            return;
        };

        {
            let mut state = self.state.lock();
            if !state.rejected.insert(call_id) {
                debug!(%call_id, "Call already rejected");
                return;
            }
            state.should_send_reinvite = false;
        }

        self.emit(PhoneEvent::TerminateSound { call_id: Some(call_id) });

        if let Err(e) = session.hangup().await {
            warn!(%call_id, error = %e, "Failed to reject call");
        }
    }

    /// Silence local ringing for an inbound call. The call itself keeps
    /// ringing on the remote side.
    pub fn ignore(&self, call: &CallSession) -> Option<CallSession> {
        let Some((call_id, _)) = self.resolve(Some(call)) else {
            debug!(call_id = %call.call_id, "Nothing to ignore");
            return None;
        };

        if !self.state.lock().ignored.insert(call_id) {
            debug!(%call_id, "Call already ignored");
            return None;
        }
        info!(%call_id, "Ignoring call");

        self.emit(PhoneEvent::TerminateSound { call_id: Some(call_id) });

        let mut ignored = self.registry.call(call_id)?;
        ignored.ignored = true;
        self.registry.update(ignored.clone());
        Some(ignored)
    }

    /// End a call.
    ///
    /// Returns `false` when no tracked call matches, which means the caller's
    /// view is out of sync with the phone.
    pub async fn hangup(&self, call: Option<&CallSession>) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            error!(
                call_id = ?call.map(|c| c.call_id),
                "Call is unknown to the phone"
            );
            return false;
        };
        info!(%call_id, sip_call_id = %session.id(), "Hanging up call");

        if let Some(snapshot) = self.registry.call(call_id) {
            self.registry.park_terminating(snapshot);
        }
        self.cleanup_call(call_id);

        if let Err(e) = session.hangup().await {
            warn!(%call_id, error = %e, "Transport failed to hang up call");
        }

        self.state.lock().should_send_reinvite = false;
        true
    }

    /// Blind transfer to `target`
    pub async fn transfer(&self, call: Option<&CallSession>, target: &str) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        info!(%call_id, target, "Transferring call");

        match session.transfer(target).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%call_id, target, error = %e, "Failed to transfer call");
                false
            }
        }
    }

    /// Attended transfer: ask the remote party of `destination` to connect
    /// directly to the remote party of `source`
    pub async fn indirect_transfer(&self, source: &CallSession, destination: &CallSession) -> bool {
        let (Some((source_id, source_session)), Some((destination_id, destination_session))) =
            (self.resolve(Some(source)), self.resolve(Some(destination)))
        else {
            warn!(
                source = %source.call_id,
                destination = %destination.call_id,
                "Cannot transfer between unknown calls"
            );
            return false;
        };
        info!(%source_id, %destination_id, "Indirect transfer");

        match destination_session.refer(source_session.as_ref()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%source_id, %destination_id, error = %e, "Indirect transfer failed");
                false
            }
        }
    }

    /// Renegotiate media of a call, e.g. after the local address changed
    pub async fn send_reinvite(&self, call: Option<&CallSession>) -> bool {
        let Some((call_id, session)) = self.resolve(call) else {
            return false;
        };
        info!(%call_id, "Sending reinvite");

        match session.reinvite().await {
            Ok(()) => true,
            Err(e) => {
                error!(%call_id, error = %e, "Reinvite failed");
                false
            }
        }
    }

    /// Forget a call and play the cues that follow its end.
    ///
    /// Shared by local hang-up and the terminated notification.
    pub(crate) fn cleanup_call(&self, call_id: CallId) -> Option<CallSession> {
        let removed = self.registry.remove(call_id);

        let (ignored, has_current) = {
            let mut state = self.state.lock();
            if state.current == Some(call_id) {
                state.current = None;
            }
            let ignored = state.ignored.contains(&call_id);
            state.forget(call_id);
            (ignored, state.current.is_some())
        };

        self.emit(PhoneEvent::TerminateSound { call_id: Some(call_id) });
        if !ignored {
            self.emit(PhoneEvent::PlayHangupSound(self.output_cue(Some(call_id))));
        }

        if !has_current && self.registry.incoming_len() > 0 {
            let next = self.registry.oldest_incoming();
            self.emit(PhoneEvent::PlayRingSound(self.ring_cue(next)));
        }

        removed
    }

    // ===== QUERIES =====

    pub fn current_call_session(&self) -> Option<CallSession> {
        self.current_id().and_then(|id| self.registry.call(id))
    }

    pub fn has_active_call(&self) -> bool {
        self.current_id().is_some()
    }

    pub fn call_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_current_call(&self, call: &CallSession) -> bool {
        match (self.current_id(), self.resolve(Some(call))) {
            (Some(current), Some((call_id, _))) => current == call_id,
            _ => false,
        }
    }

    pub fn call_session(&self, call_id: CallId) -> Option<CallSession> {
        self.registry.call(call_id)
    }

    /// Every tracked call, oldest first
    pub fn call_sessions(&self) -> Vec<CallSession> {
        self.registry.calls()
    }

    pub fn has_incoming_call_session(&self) -> bool {
        self.registry.incoming_len() > 0
    }

    /// Oldest unanswered inbound call
    pub fn incoming_call_session(&self) -> Option<CallSession> {
        self.registry.oldest_incoming().and_then(|id| self.registry.call(id))
    }

    pub fn is_call_using_video(&self, call: &CallSession) -> bool {
        self.resolve(Some(call))
            .map(|(_, session)| session.has_video())
            .unwrap_or(false)
    }

    pub fn local_stream_for_call(&self, call: Option<&CallSession>) -> Option<MediaStream> {
        self.resolve(call).and_then(|(_, session)| session.local_stream())
    }

    pub fn remote_streams_for_call(&self, call: &CallSession) -> Vec<MediaStream> {
        self.resolve(Some(call))
            .map(|(_, session)| session.remote_streams())
            .unwrap_or_default()
    }

    pub fn capabilities(&self) -> CallCapabilities {
        CallCapabilities::default()
    }

    pub fn stats(&self) -> PhoneStats {
        PhoneStats {
            registered: self.transport.is_registered(),
            total_calls: self.registry.len(),
            incoming_calls: self.registry.incoming_len(),
            has_active_call: self.has_active_call(),
            screen_sharing: self.is_screen_sharing(),
        }
    }
}
