//! Collaborator interfaces of the signaling layer
//!
//! The phone never speaks the signaling protocol itself. It drives a
//! [`Transport`] (the registered client) and the [`SipSession`] objects that
//! transport hands out, and it reacts to the [`TransportEvent`]s the transport
//! publishes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::call::SessionState;
use crate::error::TransportResult;
use crate::media::{DisplayConstraints, MediaStream, MediaTrack};

/// Request header carrying the auto-answer hint on an inbound invite
pub const ANSWER_MODE_HEADER: &str = "Answer-Mode";

/// Remote party of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    /// User part of the remote URI
    pub number: String,
    pub display_name: Option<String>,
}

impl RemoteIdentity {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// One signaling dialog with its negotiated media
#[async_trait]
pub trait SipSession: Send + Sync + std::fmt::Debug {
    /// Protocol identifier of the dialog
    fn id(&self) -> String;
    fn state(&self) -> SessionState;
    /// The dialog was created by a remote invite
    fn is_invitation(&self) -> bool;
    fn remote_identity(&self) -> RemoteIdentity;
    fn request_header(&self, name: &str) -> Option<String>;
    fn is_held(&self) -> bool;
    fn wants_video(&self) -> bool;
    fn has_video(&self) -> bool;
    fn local_stream(&self) -> Option<MediaStream>;
    fn remote_streams(&self) -> Vec<MediaStream>;

    async fn answer(&self, with_video: bool) -> TransportResult<()>;
    async fn hangup(&self) -> TransportResult<()>;
    async fn hold(&self) -> TransportResult<()>;
    async fn unhold(&self) -> TransportResult<()>;
    async fn mute(&self) -> TransportResult<()>;
    async fn unmute(&self) -> TransportResult<()>;
    async fn set_camera(&self, enabled: bool) -> TransportResult<()>;
    async fn send_dtmf(&self, tone: &str) -> TransportResult<()>;
    async fn transfer(&self, target: &str) -> TransportResult<()>;
    /// Ask the remote side of `self` to connect directly to `other`
    async fn refer(&self, other: &dyn SipSession) -> TransportResult<()>;
    async fn reinvite(&self) -> TransportResult<()>;
    async fn message(&self, body: &str, content_type: &str) -> TransportResult<()>;
    /// Swap the track of the outgoing video sender. Returns whether a video
    /// sender existed.
    async fn replace_video_track(&self, track: Option<MediaTrack>) -> TransportResult<bool>;
}

/// The registered signaling client
#[async_trait]
pub trait Transport: Send + Sync {
    async fn register(&self) -> TransportResult<()>;
    async fn unregister(&self) -> TransportResult<()>;
    fn is_registered(&self) -> bool;

    fn has_heartbeat(&self) -> bool;
    fn start_heartbeat(&self);
    fn stop_heartbeat(&self);
    async fn attempt_reconnection(&self) -> TransportResult<()>;

    /// Stop the user agent without closing the socket
    async fn stop(&self) -> TransportResult<()>;
    async fn close(&self) -> TransportResult<()>;

    async fn call(
        &self,
        number: &str,
        with_video: bool,
        video_only: bool,
    ) -> TransportResult<Arc<dyn SipSession>>;

    async fn change_audio_output_device(&self, device_id: &str) -> TransportResult<()>;
    async fn change_audio_output_volume(&self, volume: f32) -> TransportResult<()>;
    async fn change_audio_input_device(
        &self,
        device_id: &str,
        session: Option<Arc<dyn SipSession>>,
    ) -> TransportResult<()>;
    async fn change_video_input_device(
        &self,
        device_id: &str,
        session: Option<Arc<dyn SipSession>>,
    ) -> TransportResult<()>;

    fn user_agent(&self) -> String;
}

/// Capture collaborator for display (screen/window) media
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// `None` when the user cancelled or capture was denied
    async fn display_media(&self, constraints: &DisplayConstraints) -> Option<MediaStream>;
}

/// Which side of an offer/answer exchange a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptionKind {
    Offer,
    Answer,
}

/// An out-of-dialog or in-dialog message received by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipMessage {
    /// Request method, e.g. `MESSAGE`
    pub method: String,
    pub body: String,
    pub content_type: Option<String>,
}

impl SipMessage {
    pub fn new(method: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            body: body.into(),
            content_type: None,
        }
    }

    pub fn is_message(&self) -> bool {
        self.method.eq_ignore_ascii_case("MESSAGE")
    }
}

/// Everything the transport reports to the phone
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Invite {
        session: Arc<dyn SipSession>,
        wants_video: bool,
    },
    StateChanged {
        session: Arc<dyn SipSession>,
        state: SessionState,
    },
    Accepted {
        session: Arc<dyn SipSession>,
    },
    Registered,
    Unregistered,
    Connected,
    Disconnected,
    Reinvite {
        session: Arc<dyn SipSession>,
    },
    RemoteTrack {
        session: Arc<dyn SipSession>,
        stream: MediaStream,
        track: MediaTrack,
    },
    RemoteStreamRemoved {
        stream: MediaStream,
    },
    SessionDescription {
        session: Arc<dyn SipSession>,
        kind: DescriptionKind,
        sdp: String,
    },
    Message(SipMessage),
    VideoInputChange(MediaStream),
}

impl TransportEvent {
    /// Short name used in log fields
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Invite { .. } => "invite",
            TransportEvent::StateChanged { .. } => "state_changed",
            TransportEvent::Accepted { .. } => "accepted",
            TransportEvent::Registered => "registered",
            TransportEvent::Unregistered => "unregistered",
            TransportEvent::Connected => "connected",
            TransportEvent::Disconnected => "disconnected",
            TransportEvent::Reinvite { .. } => "reinvite",
            TransportEvent::RemoteTrack { .. } => "remote_track",
            TransportEvent::RemoteStreamRemoved { .. } => "remote_stream_removed",
            TransportEvent::SessionDescription { .. } => "session_description",
            TransportEvent::Message(_) => "message",
            TransportEvent::VideoInputChange(_) => "video_input_change",
        }
    }
}
