//! Call session model
//!
//! A [`CallSession`] is the displayable, queryable state of one call. It is a
//! plain value: every transition produces a new snapshot through
//! [`derive_call_session`], which combines the previous snapshot, what the
//! protocol session currently reports, and the explicit overrides of the
//! transition being applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transport::SipSession;

/// Internal call identifier, stable for the lifetime of a call
pub type CallId = Uuid;

/// Protocol-level state of a signaling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Initial,
    Establishing,
    Established,
    Terminated,
}

impl SessionState {
    pub fn is_established(&self) -> bool {
        matches!(self, SessionState::Established)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Initial => "Initial",
            SessionState::Establishing => "Establishing",
            SessionState::Established => "Established",
            SessionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Which side placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// We are the caller
    Outgoing,
    /// We are the callee
    Incoming,
}

/// One call as seen by the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    /// Internal identifier, never reassigned
    pub call_id: CallId,
    /// Identifier of the protocol session currently carrying the call
    pub sip_call_id: String,
    /// Last protocol state observed
    pub sip_status: SessionState,
    pub display_name: String,
    /// Remote number (user part of the remote identity)
    pub number: String,
    pub direction: CallDirection,
    pub start_time: DateTime<Utc>,
    pub answered: bool,
    pub ringing: bool,
    pub muted: bool,
    /// The call is on hold
    pub paused: bool,
    pub camera_enabled: bool,
    pub video_muted: bool,
    pub screensharing: bool,
    pub auto_answer: bool,
    /// Local ringing was silenced by the user
    pub ignored: bool,
}

impl CallSession {
    pub fn is_incoming(&self) -> bool {
        self.direction == CallDirection::Incoming
    }

    pub fn is_caller(&self) -> bool {
        self.direction == CallDirection::Outgoing
    }

    pub fn is_on_hold(&self) -> bool {
        self.paused
    }

    /// Whether `id` names this call, either by internal or protocol identifier
    pub fn is_id(&self, id: &str) -> bool {
        self.sip_call_id == id || self.call_id.to_string() == id
    }
}

/// What a protocol session reports about itself at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSession {
    pub sip_call_id: String,
    pub state: SessionState,
    pub number: String,
    pub display_name: Option<String>,
    pub held: bool,
    pub wants_video: bool,
}

impl LiveSession {
    /// Snapshot the queryable parts of a protocol session
    pub fn capture(session: &dyn SipSession) -> Self {
        let identity = session.remote_identity();
        Self {
            sip_call_id: session.id(),
            state: session.state(),
            number: identity.number,
            display_name: identity.display_name,
            held: session.is_held(),
            wants_video: session.wants_video(),
        }
    }
}

/// Explicit field values applied by a transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSessionOverrides {
    pub incoming: Option<bool>,
    pub ringing: Option<bool>,
    pub camera_enabled: Option<bool>,
    pub auto_answer: Option<bool>,
    pub muted: Option<bool>,
    pub held: Option<bool>,
    pub video_muted: Option<bool>,
    pub screensharing: Option<bool>,
    pub ignored: Option<bool>,
}

impl CallSessionOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn incoming(camera_enabled: bool, auto_answer: bool) -> Self {
        Self {
            incoming: Some(true),
            ringing: Some(true),
            camera_enabled: Some(camera_enabled),
            auto_answer: Some(auto_answer),
            ..Self::default()
        }
    }

    pub fn outgoing(camera_enabled: bool) -> Self {
        Self {
            incoming: Some(false),
            ringing: Some(true),
            camera_enabled: Some(camera_enabled),
            ..Self::default()
        }
    }

    /// Progress notifications only reach the caller side
    pub fn progress() -> Self {
        Self {
            incoming: Some(false),
            ringing: Some(true),
            ..Self::default()
        }
    }

    pub fn accepted(camera_enabled: bool) -> Self {
        Self {
            ringing: Some(false),
            camera_enabled: Some(camera_enabled),
            ..Self::default()
        }
    }

    pub fn held(held: bool) -> Self {
        Self {
            held: Some(held),
            ..Self::default()
        }
    }

    pub fn muted(muted: bool) -> Self {
        Self {
            muted: Some(muted),
            ..Self::default()
        }
    }

    pub fn video_muted(video_muted: bool) -> Self {
        Self {
            video_muted: Some(video_muted),
            ..Self::default()
        }
    }

    pub fn screensharing(screensharing: bool) -> Self {
        Self {
            screensharing: Some(screensharing),
            ..Self::default()
        }
    }

    pub fn ignored() -> Self {
        Self {
            ignored: Some(true),
            ..Self::default()
        }
    }
}

/// Build the next snapshot of a call.
///
/// Identity and start time come from `previous` when there is one. Protocol
/// facts (state, remote identity, hold status) come from `live`. Sticky user
/// choices (mute, camera, direction) carry over from `previous`, and
/// `overrides` wins over everything else. `ringing` is only ever true while a
/// transition explicitly says so.
pub fn derive_call_session(
    previous: Option<&CallSession>,
    live: &LiveSession,
    overrides: CallSessionOverrides,
) -> CallSession {
    let direction = match overrides.incoming {
        Some(true) => CallDirection::Incoming,
        Some(false) => CallDirection::Outgoing,
        None => previous.map(|p| p.direction).unwrap_or(CallDirection::Incoming),
    };

    let display_name = live
        .display_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| live.number.clone());

    CallSession {
        call_id: previous.map(|p| p.call_id).unwrap_or_else(Uuid::new_v4),
        sip_call_id: live.sip_call_id.clone(),
        sip_status: live.state,
        display_name,
        number: live.number.clone(),
        direction,
        start_time: previous.map(|p| p.start_time).unwrap_or_else(Utc::now),
        answered: live.state.is_established(),
        ringing: overrides.ringing.unwrap_or(false),
        muted: overrides
            .muted
            .unwrap_or_else(|| previous.map(|p| p.muted).unwrap_or(false)),
        paused: overrides.held.unwrap_or(live.held),
        camera_enabled: overrides
            .camera_enabled
            .unwrap_or_else(|| previous.map(|p| p.camera_enabled).unwrap_or(live.wants_video)),
        video_muted: overrides
            .video_muted
            .unwrap_or_else(|| previous.map(|p| p.video_muted).unwrap_or(false)),
        screensharing: overrides
            .screensharing
            .unwrap_or_else(|| previous.map(|p| p.screensharing).unwrap_or(false)),
        auto_answer: overrides
            .auto_answer
            .unwrap_or_else(|| previous.map(|p| p.auto_answer).unwrap_or(false)),
        ignored: overrides
            .ignored
            .unwrap_or_else(|| previous.map(|p| p.ignored).unwrap_or(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(state: SessionState) -> LiveSession {
        LiveSession {
            sip_call_id: "sip-1".to_string(),
            state,
            number: "1000".to_string(),
            display_name: None,
            held: false,
            wants_video: true,
        }
    }

    #[test]
    fn outgoing_snapshot_is_ringing_caller() {
        let call = derive_call_session(
            None,
            &live(SessionState::Establishing),
            CallSessionOverrides::outgoing(false),
        );

        assert!(call.is_caller());
        assert!(call.ringing);
        assert!(!call.answered);
        assert!(!call.camera_enabled);
        assert_eq!(call.display_name, "1000");
        assert_eq!(call.sip_status, SessionState::Establishing);
    }

    #[test]
    fn identity_and_sticky_flags_survive_transitions() {
        let first = derive_call_session(
            None,
            &live(SessionState::Establishing),
            CallSessionOverrides::outgoing(true),
        );
        let muted = derive_call_session(
            Some(&first),
            &live(SessionState::Established),
            CallSessionOverrides::muted(true),
        );
        let next = derive_call_session(
            Some(&muted),
            &live(SessionState::Established),
            CallSessionOverrides::none(),
        );

        assert_eq!(next.call_id, first.call_id);
        assert_eq!(next.start_time, first.start_time);
        assert!(next.is_caller());
        assert!(next.muted);
        assert!(next.camera_enabled);
        assert!(next.answered);
        assert!(!next.ringing);
    }

    #[test]
    fn camera_defaults_to_what_the_session_wants() {
        let call = derive_call_session(None, &live(SessionState::Initial), CallSessionOverrides::none());
        assert!(call.camera_enabled);
        assert!(call.is_incoming());
    }

    #[test]
    fn display_name_prefers_remote_identity() {
        let mut session = live(SessionState::Initial);
        session.display_name = Some("Alice".to_string());
        let call = derive_call_session(None, &session, CallSessionOverrides::incoming(false, true));

        assert_eq!(call.display_name, "Alice");
        assert!(call.auto_answer);
        assert!(call.is_id("sip-1"));
        assert!(call.is_id(&call.call_id.to_string()));
    }
}
