//! softphone-room: conference rooms on top of a softphone call
//!
//! A [`Room`] joins a conference by dialing its extension through a
//! [`softphone_core::Phone`], then keeps a participant list in sync with the
//! bridge's membership feed and attaches incoming video to the participant
//! it belongs to.
//!
//! ## Stream association
//! ```text
//! offer labels (call id -> track id) --+
//! remote video (track id) -------------+--> participant.video_streams
//! membership feed (call id) -----------+
//! ```
//! The three facts arrive in any order; see [`association`].
//!
//! Participants exchange their status (mute, camera, screen share) as JSON
//! signals in in-dialog messages of the room call.

pub mod association;
pub mod directory;
pub mod events;
pub mod participant;
pub mod room;
pub mod sdp;
pub mod signal;
pub mod stream;

pub use association::{LocalJoin, RoomState};
pub use directory::{
    find_conference, ConferenceContact, ConferenceDirectory, ContactNumber, DirectorySource, ParticipantRoster,
    RosterEntry,
};
pub use events::{RoomEvent, RoomEventKind};
pub use participant::{Participant, ParticipantRole, ParticipantStatus};
pub use room::{ConferenceEvent, Room, RoomOptions, DEFAULT_ACCEPT_TIMEOUT, DEFAULT_SOURCE_NAME};
pub use sdp::{parse_label_mappings, LabelMapping};
pub use signal::{
    parse_message, RoomMessage, Signal, TalkingChannel, JSON_CONTENT_TYPE, SIGNAL_TYPE_PARTICIPANT_REQUEST,
    SIGNAL_TYPE_PARTICIPANT_UPDATE,
};
pub use stream::Stream;
