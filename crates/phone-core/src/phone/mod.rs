//! Call-session orchestration
//!
//! [`Phone`] owns the session registry, applies the call lifecycle to every
//! tracked call and emits [`PhoneEvent`]s. Its operations are split across
//! submodules as `impl Phone` blocks:
//!
//! - **`calls`** - placing, answering, rejecting and ending calls, queries
//! - **`controls`** - hold/resume, mute, camera, DTMF, devices, registration
//! - **`screenshare`** - replacing the outgoing video with a display capture
//! - **`handler`** - reactions to [`TransportEvent`]s
//!
//! # Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use softphone_core::{PhoneBuilder, PhoneConfig, PhoneEvent, PhoneEventKind, Transport, TransportEvent};
//! # async fn example(
//! #     transport: Arc<dyn Transport>,
//! #     events: tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let phone = PhoneBuilder::new()
//!     .config(PhoneConfig::new().with_video(true))
//!     .transport(transport)
//!     .build()?;
//! phone.bind_transport_events(events);
//!
//! phone.on(PhoneEventKind::Incoming, |event| {
//!     if let PhoneEvent::Incoming(call) = event {
//!         println!("{} is calling", call.display_name);
//!     }
//! });
//!
//! if let Some(call) = phone.make_call("1000", false, false).await {
//!     phone.mute(Some(&call), true).await;
//!     phone.hangup(Some(&call)).await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`TransportEvent`]: crate::transport::TransportEvent

pub mod builder;
pub mod calls;
pub mod config;
pub mod controls;
pub mod handler;
pub mod recovery;
pub mod registry;
pub mod screenshare;
pub mod types;


use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::call::{derive_call_session, CallId, CallSession, CallSessionOverrides, LiveSession};
use crate::events::{Event, EventEmitter, PhoneEvent, PhoneEventKind, SoundCue, SubscriptionId};
use crate::media::{MediaStream, MediaTrack};
use crate::transport::{MediaDevices, SipSession, Transport};

pub use builder::PhoneBuilder;
pub use config::{HoldFailurePolicy, PhoneConfig};
pub use recovery::{retry_with_backoff, with_timeout, ErrorContext, RetryConfig};
pub use registry::SessionRegistry;
pub use types::{CallCapabilities, PhoneStats};

/// A screen share in progress
struct ScreenShare {
    call_id: Option<CallId>,
    stream: MediaStream,
    /// Camera track the share replaced
    local_video: Option<MediaTrack>,
    local_stream: Option<MediaStream>,
    had_video_sender: bool,
    watcher: JoinHandle<()>,
}

/// Mutable orchestration state besides the registry
#[derive(Default)]
struct PhoneState {
    current: Option<CallId>,
    accepted: HashSet<CallId>,
    /// Calls whose `Accepted` event went out
    accepted_notified: HashSet<CallId>,
    rejected: HashSet<CallId>,
    ignored: HashSet<CallId>,
    /// Renegotiate media of the current call once registered again
    should_send_reinvite: bool,
    screen_share: Option<ScreenShare>,
}

impl PhoneState {
    fn forget(&mut self, call_id: CallId) {
        self.accepted.remove(&call_id);
        self.accepted_notified.remove(&call_id);
        self.rejected.remove(&call_id);
        self.ignored.remove(&call_id);
    }
}

/// Softphone call orchestrator
pub struct Phone {
    transport: Arc<dyn Transport>,
    media: Option<Arc<dyn MediaDevices>>,
    config: RwLock<PhoneConfig>,
    registry: SessionRegistry,
    state: Mutex<PhoneState>,
    emitter: Arc<EventEmitter<PhoneEvent>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Phone {
    pub fn new(
        config: PhoneConfig,
        transport: Arc<dyn Transport>,
        media: Option<Arc<dyn MediaDevices>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            media,
            config: RwLock::new(config),
            registry: SessionRegistry::new(),
            state: Mutex::new(PhoneState::default()),
            emitter: Arc::new(EventEmitter::new()),
            event_loop: Mutex::new(None),
        })
    }

    pub fn config(&self) -> PhoneConfig {
        self.config.read().clone()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventEmitter<PhoneEvent> {
        &self.emitter
    }

    /// Subscribe a synchronous handler to one kind of event
    pub fn on<F>(&self, kind: PhoneEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PhoneEvent) + Send + Sync + 'static,
    {
        self.emitter.subscribe(kind, handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.emitter.unsubscribe(id)
    }

    /// Async receiver of every event emitted from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<PhoneEvent> {
        self.emitter.subscribe_stream()
    }

    fn emit(&self, event: PhoneEvent) {
        debug!(event = ?event.kind(), call_id = ?event.call_id(), "Emitting phone event");
        self.emitter.emit(event);
    }

    fn current_id(&self) -> Option<CallId> {
        self.state.lock().current
    }

    fn resolve(&self, call: Option<&CallSession>) -> Option<(CallId, Arc<dyn SipSession>)> {
        let current = self.current_id();
        self.registry.resolve(call, current)
    }

    /// Derive and store the next snapshot of a tracked call
    fn refresh(
        &self,
        call_id: CallId,
        session: &dyn SipSession,
        overrides: CallSessionOverrides,
    ) -> CallSession {
        let previous = self.registry.call(call_id);
        let mut next = derive_call_session(previous.as_ref(), &LiveSession::capture(session), overrides);
        // Keep the registry key even if the snapshot went missing
        next.call_id = call_id;
        self.registry.update(next.clone());
        next
    }

    fn output_cue(&self, call_id: Option<CallId>) -> SoundCue {
        let config = self.config.read();
        SoundCue {
            call_id,
            device_id: config.audio_output_device.clone(),
            volume: config.audio_output_volume,
        }
    }

    fn ring_cue(&self, call_id: Option<CallId>) -> SoundCue {
        let config = self.config.read();
        SoundCue {
            call_id,
            device_id: config.ring_device(),
            volume: config.audio_ring_volume,
        }
    }

    /// Hold one call through the transport and record it in its snapshot
    async fn hold_session(&self, call_id: CallId, session: &Arc<dyn SipSession>, with_event: bool) -> bool {
        debug!(%call_id, sip_call_id = %session.id(), with_event, "Holding call");
        if let Err(e) = session.hold().await {
            warn!(%call_id, error = %e, "Failed to hold call");
            return false;
        }
        let call = self.refresh(call_id, session.as_ref(), CallSessionOverrides::held(true));
        if with_event {
            self.emit(PhoneEvent::Held(call));
        }
        true
    }

    /// Put the current call on hold before another call takes its place.
    ///
    /// Returns whether the caller may go on with the switch, according to
    /// the configured [`HoldFailurePolicy`].
    async fn hold_current_for(&self, incoming: Option<CallId>, with_event: bool) -> bool {
        let Some(current) = self.current_id().filter(|id| Some(*id) != incoming) else {
            return true;
        };
        let Some(session) = self.registry.session(current) else {
            return true;
        };
        if session.is_held() {
            return true;
        }
        if self.hold_session(current, &session, with_event).await {
            return true;
        }
        match self.config.read().hold_failure_policy {
            HoldFailurePolicy::Abort => {
                warn!(%current, "Could not hold the current call, abandoning the switch");
                false
            }
            HoldFailurePolicy::Proceed => {
                warn!(%current, "Could not hold the current call, switching anyway");
                true
            }
        }
    }
}

impl std::fmt::Debug for Phone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phone")
            .field("calls", &self.registry.len())
            .field("current", &self.current_id())
            .field("registered", &self.transport.is_registered())
            .finish()
    }
}
