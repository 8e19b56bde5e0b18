//! Phone events, membership notifications and signals received by the room

use serde_json::Value;
use softphone_core::{retry_with_backoff, DescriptionKind, PhoneEvent, RetryConfig};
use tracing::{debug, error, info, warn};

use super::{ConferenceEvent, Room};
use crate::events::RoomEvent;
use crate::sdp::parse_label_mappings;
use crate::signal::{parse_message, RoomMessage, Signal};

impl Room {
    pub(crate) async fn handle_phone_event(&self, event: PhoneEvent) {
        match event {
            PhoneEvent::Message(message) if message.is_message() => {
                self.on_message(&message.body).await;
            }
            PhoneEvent::SessionDescription {
                sip_call_id,
                kind: DescriptionKind::Offer,
                sdp,
            } => {
                if !self.is_room_session(&sip_call_id) {
                    return;
                }
                let mappings = parse_label_mappings(&sdp);
                debug!(labels = mappings.len(), "Offer labels");
                let events = self.state.lock().apply_labels(mappings);
                self.emit_all(events);
            }
            PhoneEvent::AudioStream(stream) => {
                self.state.lock().set_audio_stream(stream.clone());
                self.emit(RoomEvent::AudioStream(stream));
            }
            PhoneEvent::VideoStream {
                sip_call_id,
                stream,
                stream_id,
            } => {
                if !self.is_room_session(&sip_call_id) {
                    debug!(%sip_call_id, stream_id = %stream_id, "Video of another call");
                    return;
                }
                self.emit(RoomEvent::VideoStream {
                    stream: stream.clone(),
                    stream_id: stream_id.clone(),
                });
                let events = self.state.lock().add_video_stream(stream, &stream_id);
                self.emit_all(events);
            }
            PhoneEvent::RemoveStream(stream) => {
                self.emit(RoomEvent::RemoveStream(stream.clone()));
                let events = self.state.lock().remove_stream(&stream);
                self.emit_all(events);
            }
            PhoneEvent::ScreenShareEnded { call } => {
                if call.as_ref().is_some_and(|call| !self.is_room_call(call)) {
                    return;
                }
                self.emit(RoomEvent::ScreenShareEnded);
                let sharing = self
                    .state
                    .lock()
                    .local_participant()
                    .is_some_and(|local| local.screensharing);
                if sharing {
                    self.update_local(|local| local.screensharing = false).await;
                }
            }
            PhoneEvent::VideoInputChange(stream) => {
                let events = self.state.lock().set_local_video(stream);
                self.emit_all(events);
            }
            PhoneEvent::CallEnded(call) if self.is_room_call(&call) => {
                info!(extension = %self.options.extension, "Room call ended");
                let was_connected = {
                    let mut info = self.info.write();
                    info.call = None;
                    std::mem::replace(&mut info.connected, false)
                };
                if was_connected {
                    self.release();
                }
            }
            _ => {}
        }
    }

    pub(crate) async fn handle_conference_event(&self, event: ConferenceEvent) {
        match event {
            ConferenceEvent::CallCreated { call_id } => {
                let mut info = self.info.write();
                if info.call_id.is_none() {
                    debug!(%call_id, "Bridge channel created");
                    info.call_id = Some(call_id);
                }
            }
            ConferenceEvent::ParticipantJoined(entry) if entry.is_user(&self.options.user_uuid) => {
                self.on_local_join().await;
            }
            ConferenceEvent::ParticipantJoined(entry) => {
                debug!(call_id = %entry.call_id, "Participant joined");
                let events = self.state.lock().add_remote(&entry);
                self.emit_all(events);
            }
            ConferenceEvent::ParticipantLeft(entry) => {
                debug!(call_id = %entry.call_id, "Participant left");
                let events = self.state.lock().remove_participant(&entry.call_id);
                self.emit_all(events);
            }
        }
    }

    /// The local user is in the conference: load the roster, then exchange
    /// status with the peers
    async fn on_local_join(&self) {
        let source_id = self.source_id();
        let roster = retry_with_backoff("fetch_roster", RetryConfig::quick(), || {
            self.directory.get_conference_participants_as_user(&source_id)
        })
        .await;
        let roster = match roster {
            Ok(roster) => roster,
            Err(e) => {
                error!(source_id = %source_id, error = %e, "Could not load conference participants");
                return;
            }
        };

        let local_video = self
            .call_session()
            .and_then(|call| self.phone.local_stream_for_call(Some(&call)))
            .filter(|stream| stream.has_video());
        let call_id = self.call_id();
        let join = self
            .state
            .lock()
            .join_local(&roster.items, call_id.as_deref(), &self.options.extra, local_video);
        self.emit_all(join.events);

        if let Some(origin) = join.request_from {
            self.broadcast_status(origin.clone()).await;
            self.send_signal_value(&Signal::request_all(origin)).await;
        }
    }

    async fn on_message(&self, body: &str) {
        let Some((value, message)) = parse_message(body) else {
            debug!("Dropping message that is not JSON");
            return;
        };

        match message {
            RoomMessage::Signal(content) => self.on_signal(content).await,
            RoomMessage::Chat(content) => self.emit(RoomEvent::Chat(content)),
            RoomMessage::Talking(channel) => {
                let events = self.state.lock().set_talking(&channel.id, channel.is_talking());
                self.emit_all(events);
            }
            RoomMessage::Other => {}
        }

        self.emit(RoomEvent::Message(value));
    }

    async fn on_signal(&self, content: Value) {
        match serde_json::from_value::<Signal>(content.clone()) {
            Ok(Signal::ParticipantUpdate { status }) => {
                // Applied locally only; answering an update would echo forever
                let events = self.state.lock().apply_status(&status);
                self.emit_all(events);
            }
            Ok(request @ Signal::ParticipantRequest { .. }) => {
                let local = self.state.lock().local_participant().map(|local| local.status());
                if let Some(local) = local.filter(|local| request.targets(&local.call_id)) {
                    self.broadcast_status(local).await;
                }
                if let Signal::ParticipantRequest { origin, .. } = request {
                    let events = self.state.lock().apply_status(&origin);
                    self.emit_all(events);
                }
            }
            Err(e) => warn!(error = %e, "Uncaught signal"),
        }

        self.emit(RoomEvent::Signal(content));
    }
}
