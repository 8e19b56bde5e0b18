//! softphone-core: call orchestration for softphone clients
//!
//! This crate turns the sessions of a signaling transport into a stable,
//! queryable call model and an ordered stream of application events.
//!
//! ## Layering
//! ```text
//! application -> softphone-core (Phone) -> Transport / SipSession
//!                      |
//!                      +-> softphone-room (conference rooms)
//! ```
//!
//! softphone-core focuses on:
//! - Call lifecycle: placing, answering, rejecting, ignoring, ending calls
//! - In-call controls: hold/resume, mute, camera, DTMF, transfer, screen share
//! - Device and ringing preferences with sound cue events
//! - Reacting to transport notifications in arrival order
//!
//! The signaling protocol itself lives behind the [`Transport`] and
//! [`SipSession`] traits.

pub mod call;
pub mod error;
pub mod events;
pub mod media;
pub mod phone;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Public API exports
pub use call::{
    derive_call_session, CallDirection, CallId, CallSession, CallSessionOverrides, LiveSession, SessionState,
};
pub use error::{PhoneError, PhoneResult, TransportError, TransportResult};
pub use events::{Event, EventEmitter, PhoneEvent, PhoneEventKind, SoundCue, SubscriptionId};
pub use media::{DisplayConstraints, MediaKind, MediaStream, MediaTrack, ScreenShareSource};
pub use phone::{
    retry_with_backoff, with_timeout, CallCapabilities, ErrorContext, HoldFailurePolicy, Phone, PhoneBuilder,
    PhoneConfig, PhoneStats, RetryConfig, SessionRegistry,
};
pub use transport::{
    DescriptionKind, MediaDevices, RemoteIdentity, SipMessage, SipSession, Transport, TransportEvent,
    ANSWER_MODE_HEADER,
};

/// softphone-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
