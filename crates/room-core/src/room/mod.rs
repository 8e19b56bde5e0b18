//! Conference room bridged through one phone call
//!
//! [`Room::connect`] dials the conference extension, waits for the bridge to
//! accept, and resolves the conference in the directory. From then on a pump
//! task feeds phone events and membership notifications into the room.

mod controls;
mod handlers;
mod options;

pub use options::{ConferenceEvent, RoomOptions, DEFAULT_ACCEPT_TIMEOUT, DEFAULT_SOURCE_NAME};

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use softphone_core::{
    retry_with_backoff, with_timeout, CallSession, ErrorContext, EventEmitter, MediaStream, Phone,
    PhoneError, PhoneEvent, PhoneResult, RetryConfig, SubscriptionId,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::association::RoomState;
use crate::directory::{find_conference, ConferenceDirectory};
use crate::events::{RoomEvent, RoomEventKind};
use crate::participant::Participant;

/// Identity and connection of the room
#[derive(Debug, Default)]
struct RoomInfo {
    connected: bool,
    /// The call bridging this endpoint into the conference
    call: Option<CallSession>,
    /// Bridge channel id of the room call, as seen in the roster
    call_id: Option<String>,
    source_id: String,
    name: String,
}

/// Events that arrived while the room call was being set up
#[derive(Default)]
struct Backlog {
    phone: Vec<PhoneEvent>,
    conference: Vec<ConferenceEvent>,
}

/// A joined conference room
pub struct Room {
    phone: Arc<Phone>,
    directory: Arc<dyn ConferenceDirectory>,
    options: RoomOptions,
    info: RwLock<RoomInfo>,
    state: Mutex<RoomState>,
    emitter: EventEmitter<RoomEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Room {
    /// Dial the conference and join it.
    ///
    /// Fails when the call cannot be placed, is not accepted within the
    /// accept timeout, or the extension matches no conference. The room call
    /// is hung up on failure.
    pub async fn connect(
        phone: Arc<Phone>,
        directory: Arc<dyn ConferenceDirectory>,
        mut conference_events: mpsc::UnboundedReceiver<ConferenceEvent>,
        options: RoomOptions,
    ) -> PhoneResult<Arc<Room>> {
        options.validate()?;
        info!(extension = %options.extension, camera = options.camera, "Connecting to room");

        // Subscribe before dialing so no event of the room call is missed
        let mut phone_events = phone.subscribe_events();

        let Some(call) = phone.make_call(&options.extension, options.camera, false).await else {
            return Err(PhoneError::call_failed(format!(
                "could not dial conference {}",
                options.extension
            )));
        };

        let mut backlog = Backlog::default();
        let accepted = with_timeout(
            "room_accept",
            options.accept_timeout,
            wait_for_accept(&call, &mut phone_events, &mut conference_events, &mut backlog),
        )
        .await;
        let (call, room_call_id) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(extension = %options.extension, error = %e, "Room call was not accepted");
                phone.hangup(Some(&call)).await;
                return Err(e);
            }
        };

        let contact = retry_with_backoff("find_conference", RetryConfig::default(), || {
            find_conference(directory.as_ref(), &options.source_name, &options.extension)
        })
        .await
        .with_context(|| format!("Resolving conference {}", options.extension));
        let contact = match contact {
            Ok(contact) => contact,
            Err(e) => {
                phone.hangup(Some(&call)).await;
                return Err(e);
            }
        };

        info!(
            extension = %options.extension,
            conference = %contact.name,
            source_id = %contact.source_id,
            call_id = ?room_call_id,
            "Connected to room"
        );

        let room = Arc::new(Room {
            phone,
            directory,
            options,
            info: RwLock::new(RoomInfo {
                connected: true,
                call: Some(call),
                call_id: room_call_id,
                source_id: contact.source_id,
                name: contact.name,
            }),
            state: Mutex::new(RoomState::new()),
            emitter: EventEmitter::new(),
            pump: Mutex::new(None),
        });
        room.spawn_pump(phone_events, conference_events, backlog);

        Ok(room)
    }

    fn spawn_pump(
        self: &Arc<Self>,
        mut phone_events: broadcast::Receiver<PhoneEvent>,
        mut conference_events: mpsc::UnboundedReceiver<ConferenceEvent>,
        backlog: Backlog,
    ) {
        // An abort only lands once the task yields, so a closed room stops
        // handling right away
        fn live(weak: &Weak<Room>) -> Option<Arc<Room>> {
            weak.upgrade().filter(|room| room.is_connected())
        }

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            for event in backlog.phone {
                let Some(room) = live(&weak) else { return };
                room.handle_phone_event(event).await;
            }
            for event in backlog.conference {
                let Some(room) = live(&weak) else { return };
                room.handle_conference_event(event).await;
            }

            let mut conference_open = true;
            loop {
                tokio::select! {
                    event = phone_events.recv() => match event {
                        Ok(event) => {
                            let Some(room) = live(&weak) else { break };
                            room.handle_phone_event(event).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Room fell behind phone events");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    event = conference_events.recv(), if conference_open => match event {
                        Some(event) => {
                            let Some(room) = live(&weak) else { break };
                            room.handle_conference_event(event).await;
                        }
                        None => {
                            debug!("Conference membership feed closed");
                            conference_open = false;
                        }
                    },
                }
            }
            debug!("Room pump stopped");
        });

        if let Some(previous) = self.pump.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_pump(&self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }

    /// Stop listening, drop every participant and report the room closed.
    ///
    /// May run on the pump itself; the abort lands at its next await.
    fn release(&self) {
        self.stop_pump();
        self.state.lock().clear();
        self.emit(RoomEvent::Disconnected);
    }

    // ===== EVENTS =====

    pub fn events(&self) -> &EventEmitter<RoomEvent> {
        &self.emitter
    }

    pub fn on<F>(&self, kind: RoomEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&RoomEvent) + Send + Sync + 'static,
    {
        self.emitter.subscribe(kind, handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.emitter.unsubscribe(id)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent> {
        self.emitter.subscribe_stream()
    }

    fn emit(&self, event: RoomEvent) {
        self.emitter.emit(event);
    }

    fn emit_all(&self, events: Vec<RoomEvent>) {
        for event in events {
            self.emitter.emit(event);
        }
    }

    // ===== QUERIES =====

    pub fn is_connected(&self) -> bool {
        self.info.read().connected
    }

    /// Whether phone and membership events still reach the room
    pub fn is_listening(&self) -> bool {
        self.pump.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn extension(&self) -> &str {
        &self.options.extension
    }

    pub fn options(&self) -> &RoomOptions {
        &self.options
    }

    /// Conference name from the directory
    pub fn name(&self) -> String {
        self.info.read().name.clone()
    }

    /// Conference identifier used for roster lookups
    pub fn source_id(&self) -> String {
        self.info.read().source_id.clone()
    }

    /// Bridge channel id of the room call, once the bridge reported it
    pub fn call_id(&self) -> Option<String> {
        self.info.read().call_id.clone()
    }

    /// Latest snapshot of the room call
    pub fn call_session(&self) -> Option<CallSession> {
        let call = self.info.read().call.clone()?;
        self.phone.call_session(call.call_id).or(Some(call))
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.state.lock().participants().to_vec()
    }

    pub fn participant(&self, call_id: &str) -> Option<Participant> {
        self.state.lock().participant(call_id).cloned()
    }

    pub fn local_participant(&self) -> Option<Participant> {
        self.state.lock().local_participant().cloned()
    }

    pub fn audio_stream(&self) -> Option<MediaStream> {
        self.state.lock().audio_stream().cloned()
    }

    fn is_room_call(&self, call: &CallSession) -> bool {
        self.info
            .read()
            .call
            .as_ref()
            .is_some_and(|room_call| room_call.call_id == call.call_id)
    }

    fn is_room_session(&self, sip_call_id: &str) -> bool {
        self.info
            .read()
            .call
            .as_ref()
            .is_some_and(|room_call| room_call.sip_call_id == sip_call_id)
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

/// Wait until the room call is accepted, keeping the first bridge channel id
/// and everything else for later replay
async fn wait_for_accept(
    call: &CallSession,
    phone_events: &mut broadcast::Receiver<PhoneEvent>,
    conference_events: &mut mpsc::UnboundedReceiver<ConferenceEvent>,
    backlog: &mut Backlog,
) -> PhoneResult<(CallSession, Option<String>)> {
    let mut room_call_id = None;
    let mut conference_open = true;

    loop {
        tokio::select! {
            event = phone_events.recv() => match event {
                Ok(PhoneEvent::Accepted(accepted)) if accepted.call_id == call.call_id => {
                    debug!(call_id = %call.call_id, "Room call accepted");
                    return Ok((accepted, room_call_id));
                }
                Ok(PhoneEvent::CallEnded(ended)) if ended.call_id == call.call_id => {
                    return Err(PhoneError::call_failed("room call ended before it was accepted"));
                }
                Ok(event) => backlog.phone.push(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed phone events while joining the room");
                }
                Err(RecvError::Closed) => {
                    return Err(PhoneError::internal_error("phone event stream closed"));
                }
            },
            event = conference_events.recv(), if conference_open => match event {
                Some(ConferenceEvent::CallCreated { call_id }) if room_call_id.is_none() => {
                    debug!(%call_id, "Bridge channel created");
                    room_call_id = Some(call_id);
                }
                Some(event) => backlog.conference.push(event),
                None => conference_open = false,
            },
        }
    }
}
