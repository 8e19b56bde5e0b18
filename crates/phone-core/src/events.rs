//! Event fan-out for phone and room consumers
//!
//! [`EventEmitter`] delivers every event synchronously to its subscribers,
//! in subscription order, over a snapshot of the subscriber list. Handlers
//! may therefore subscribe or unsubscribe while an event is being delivered.
//! After the synchronous handlers ran, the event is also published on a
//! tokio broadcast channel for async consumers such as the room pump.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::call::{CallId, CallSession};
use crate::media::{MediaStream, MediaTrack};
use crate::transport::{DescriptionKind, SipMessage};

/// Capacity of the broadcast side of an emitter
const BROADCAST_CAPACITY: usize = 256;

/// An event type that can be filtered by kind
pub trait Event: Clone + Send + Sync + 'static {
    type Kind: Copy + Eq + std::fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Identifier returned by the subscribe methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscription<E: Event> {
    id: SubscriptionId,
    kind: Option<E::Kind>,
    once: bool,
    handler: Handler<E>,
}

impl<E: Event> Clone for Subscription<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kind: self.kind,
            once: self.once,
            handler: self.handler.clone(),
        }
    }
}

impl<E: Event> Subscription<E> {
    fn should_receive(&self, event: &E) -> bool {
        self.kind.map_or(true, |kind| kind == event.kind())
    }
}

/// Ordered observer registry
pub struct EventEmitter<E: Event> {
    subscriptions: RwLock<Vec<Subscription<E>>>,
    event_tx: broadcast::Sender<E>,
}

impl<E: Event> EventEmitter<E> {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            subscriptions: RwLock::new(Vec::new()),
            event_tx,
        }
    }

    /// Receive events of one kind
    pub fn subscribe<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.add(Some(kind), false, Arc::new(handler))
    }

    /// Receive every event
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.add(None, false, Arc::new(handler))
    }

    /// Receive the next event of one kind, then unsubscribe
    pub fn once<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.add(Some(kind), true, Arc::new(handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        if let Some(pos) = subscriptions.iter().position(|s| s.id == id) {
            subscriptions.remove(pos);
            true
        } else {
            false
        }
    }

    /// Async receiver of every event emitted from now on
    pub fn subscribe_stream(&self) -> broadcast::Receiver<E> {
        self.event_tx.subscribe()
    }

    pub fn emit(&self, event: E) {
        let snapshot = self.subscriptions.read().clone();

        for subscription in snapshot.iter().filter(|s| s.should_receive(&event)) {
            if subscription.once && !self.unsubscribe(subscription.id) {
                // Already consumed by a re-entrant emit
                continue;
            }
            (subscription.handler)(&event);
        }

        // No receivers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    fn add(&self, kind: Option<E::Kind>, once: bool, handler: Handler<E>) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscriptions.write().push(Subscription {
            id,
            kind,
            once,
            handler,
        });
        id
    }
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where and how loud a sound cue should play
#[derive(Debug, Clone, PartialEq)]
pub struct SoundCue {
    pub call_id: Option<CallId>,
    pub device_id: Option<String>,
    pub volume: f32,
}

/// Events emitted by the phone
#[derive(Debug, Clone)]
pub enum PhoneEvent {
    Registered,
    Unregistered,

    Progress(CallSession),
    Incoming(CallSession),
    Outgoing(CallSession),
    /// Emitted when accept is requested, before the transport confirms
    Answered(CallSession),
    Accepted(CallSession),
    Held(CallSession),
    Unheld(CallSession),
    Resumed(CallSession),
    Muted(CallSession),
    Unmuted(CallSession),
    CameraResumed(CallSession),
    CameraDisabled(CallSession),
    CallEnded(CallSession),

    ScreenShareStarted {
        call: CallSession,
        stream: MediaStream,
    },
    /// The shared source ended on its own; the application is expected to
    /// call stop_screen_sharing
    ScreenShareEnding {
        call: CallSession,
        stream: MediaStream,
    },
    ScreenShareEnded {
        call: Option<CallSession>,
    },

    Message(SipMessage),
    Reinvite(CallSession),
    Track {
        sip_call_id: String,
        stream: MediaStream,
        track: MediaTrack,
    },
    AudioStream(MediaStream),
    VideoStream {
        sip_call_id: String,
        stream: MediaStream,
        stream_id: String,
    },
    RemoveStream(MediaStream),
    SessionDescription {
        sip_call_id: String,
        kind: DescriptionKind,
        sdp: String,
    },
    VideoInputChange(MediaStream),

    TerminateSound {
        call_id: Option<CallId>,
    },
    PlayRingSound(SoundCue),
    PlayInboundCallSignalSound(SoundCue),
    PlayHangupSound(SoundCue),
    PlayProgressSound(SoundCue),
}

/// Discriminant of [`PhoneEvent`], used to filter subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhoneEventKind {
    Registered,
    Unregistered,
    Progress,
    Incoming,
    Outgoing,
    Answered,
    Accepted,
    Held,
    Unheld,
    Resumed,
    Muted,
    Unmuted,
    CameraResumed,
    CameraDisabled,
    CallEnded,
    ScreenShareStarted,
    ScreenShareEnding,
    ScreenShareEnded,
    Message,
    Reinvite,
    Track,
    AudioStream,
    VideoStream,
    RemoveStream,
    SessionDescription,
    VideoInputChange,
    TerminateSound,
    PlayRingSound,
    PlayInboundCallSignalSound,
    PlayHangupSound,
    PlayProgressSound,
}

impl Event for PhoneEvent {
    type Kind = PhoneEventKind;

    fn kind(&self) -> PhoneEventKind {
        match self {
            PhoneEvent::Registered => PhoneEventKind::Registered,
            PhoneEvent::Unregistered => PhoneEventKind::Unregistered,
            PhoneEvent::Progress(_) => PhoneEventKind::Progress,
            PhoneEvent::Incoming(_) => PhoneEventKind::Incoming,
            PhoneEvent::Outgoing(_) => PhoneEventKind::Outgoing,
            PhoneEvent::Answered(_) => PhoneEventKind::Answered,
            PhoneEvent::Accepted(_) => PhoneEventKind::Accepted,
            PhoneEvent::Held(_) => PhoneEventKind::Held,
            PhoneEvent::Unheld(_) => PhoneEventKind::Unheld,
            PhoneEvent::Resumed(_) => PhoneEventKind::Resumed,
            PhoneEvent::Muted(_) => PhoneEventKind::Muted,
            PhoneEvent::Unmuted(_) => PhoneEventKind::Unmuted,
            PhoneEvent::CameraResumed(_) => PhoneEventKind::CameraResumed,
            PhoneEvent::CameraDisabled(_) => PhoneEventKind::CameraDisabled,
            PhoneEvent::CallEnded(_) => PhoneEventKind::CallEnded,
            PhoneEvent::ScreenShareStarted { .. } => PhoneEventKind::ScreenShareStarted,
            PhoneEvent::ScreenShareEnding { .. } => PhoneEventKind::ScreenShareEnding,
            PhoneEvent::ScreenShareEnded { .. } => PhoneEventKind::ScreenShareEnded,
            PhoneEvent::Message(_) => PhoneEventKind::Message,
            PhoneEvent::Reinvite(_) => PhoneEventKind::Reinvite,
            PhoneEvent::Track { .. } => PhoneEventKind::Track,
            PhoneEvent::AudioStream(_) => PhoneEventKind::AudioStream,
            PhoneEvent::VideoStream { .. } => PhoneEventKind::VideoStream,
            PhoneEvent::RemoveStream(_) => PhoneEventKind::RemoveStream,
            PhoneEvent::SessionDescription { .. } => PhoneEventKind::SessionDescription,
            PhoneEvent::VideoInputChange(_) => PhoneEventKind::VideoInputChange,
            PhoneEvent::TerminateSound { .. } => PhoneEventKind::TerminateSound,
            PhoneEvent::PlayRingSound(_) => PhoneEventKind::PlayRingSound,
            PhoneEvent::PlayInboundCallSignalSound(_) => PhoneEventKind::PlayInboundCallSignalSound,
            PhoneEvent::PlayHangupSound(_) => PhoneEventKind::PlayHangupSound,
            PhoneEvent::PlayProgressSound(_) => PhoneEventKind::PlayProgressSound,
        }
    }
}

impl PhoneEvent {
    /// The call snapshot carried by the event, if any
    pub fn call_session(&self) -> Option<&CallSession> {
        match self {
            PhoneEvent::Progress(call)
            | PhoneEvent::Incoming(call)
            | PhoneEvent::Outgoing(call)
            | PhoneEvent::Answered(call)
            | PhoneEvent::Accepted(call)
            | PhoneEvent::Held(call)
            | PhoneEvent::Unheld(call)
            | PhoneEvent::Resumed(call)
            | PhoneEvent::Muted(call)
            | PhoneEvent::Unmuted(call)
            | PhoneEvent::CameraResumed(call)
            | PhoneEvent::CameraDisabled(call)
            | PhoneEvent::CallEnded(call)
            | PhoneEvent::Reinvite(call)
            | PhoneEvent::ScreenShareStarted { call, .. }
            | PhoneEvent::ScreenShareEnding { call, .. } => Some(call),
            PhoneEvent::ScreenShareEnded { call } => call.as_ref(),
            _ => None,
        }
    }

    pub fn call_id(&self) -> Option<CallId> {
        match self {
            PhoneEvent::TerminateSound { call_id } => *call_id,
            PhoneEvent::PlayRingSound(cue)
            | PhoneEvent::PlayInboundCallSignalSound(cue)
            | PhoneEvent::PlayHangupSound(cue)
            | PhoneEvent::PlayProgressSound(cue) => cue.call_id,
            other => other.call_session().map(|call| call.call_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Box<dyn Fn(&PhoneEvent) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_handlers = log.clone();
        let make = move |name: &'static str| -> Box<dyn Fn(&PhoneEvent) + Send + Sync> {
            let log = log_for_handlers.clone();
            Box::new(move |event: &PhoneEvent| log.lock().push(format!("{name}:{:?}", event.kind())))
        };
        (log, make)
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let emitter = EventEmitter::<PhoneEvent>::new();
        let (log, make) = recorder();

        emitter.subscribe(PhoneEventKind::Registered, make("first"));
        emitter.subscribe_all(make("second"));
        emitter.subscribe(PhoneEventKind::Unregistered, make("other"));

        emitter.emit(PhoneEvent::Registered);

        assert_eq!(
            *log.lock(),
            vec!["first:Registered".to_string(), "second:Registered".to_string()]
        );
    }

    #[test]
    fn once_handlers_fire_a_single_time() {
        let emitter = EventEmitter::<PhoneEvent>::new();
        let (log, make) = recorder();

        emitter.once(PhoneEventKind::Registered, make("once"));
        emitter.emit(PhoneEvent::Registered);
        emitter.emit(PhoneEvent::Registered);

        assert_eq!(log.lock().len(), 1);
        assert_eq!(emitter.subscription_count(), 0);
    }

    #[test]
    fn unsubscribing_during_emission_is_safe() {
        let emitter = Arc::new(EventEmitter::<PhoneEvent>::new());
        let (log, make) = recorder();

        let target: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let emitter_ref = emitter.clone();
        let target_ref = target.clone();
        emitter.subscribe_all(move |_| {
            if let Some(id) = target_ref.lock().take() {
                emitter_ref.unsubscribe(id);
            }
        });
        let second = emitter.subscribe_all(make("second"));
        *target.lock() = Some(second);

        // Snapshot delivery: the removed handler still sees this event
        emitter.emit(PhoneEvent::Registered);
        emitter.emit(PhoneEvent::Unregistered);

        assert_eq!(*log.lock(), vec!["second:Registered".to_string()]);
        assert_eq!(emitter.subscription_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_receives_after_handlers() {
        let emitter = EventEmitter::<PhoneEvent>::new();
        let mut rx = emitter.subscribe_stream();

        emitter.emit(PhoneEvent::TerminateSound { call_id: None });

        let event = rx.recv().await.expect("event should be broadcast");
        assert_eq!(event.kind(), PhoneEventKind::TerminateSound);
    }
}
