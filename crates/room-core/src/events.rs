//! Events emitted by a room

use serde_json::Value;
use softphone_core::{Event, MediaStream};

use crate::participant::Participant;
use crate::stream::Stream;

#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// The local user is in the room. Fired once per join.
    Joined {
        local: Option<Participant>,
        participants: Vec<Participant>,
    },
    ParticipantJoined(Participant),
    /// `None` when the leaving call id was not known to the room
    ParticipantLeft(Option<Participant>),
    /// Fired on the leaving participant before it is removed
    ParticipantDisconnected(Participant),
    StreamSubscribed {
        call_id: String,
        stream: Stream,
    },
    StreamUnsubscribed {
        call_id: String,
        stream: MediaStream,
    },
    Talking {
        call_id: String,
        talking: bool,
    },
    ParticipantUpdated(Participant),
    /// Every JSON message body received on the room call
    Message(Value),
    Chat(Value),
    Signal(Value),
    AudioStream(MediaStream),
    VideoStream {
        stream: MediaStream,
        stream_id: String,
    },
    RemoveStream(MediaStream),
    ScreenShareEnded,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomEventKind {
    Joined,
    ParticipantJoined,
    ParticipantLeft,
    ParticipantDisconnected,
    StreamSubscribed,
    StreamUnsubscribed,
    Talking,
    ParticipantUpdated,
    Message,
    Chat,
    Signal,
    AudioStream,
    VideoStream,
    RemoveStream,
    ScreenShareEnded,
    Disconnected,
}

impl Event for RoomEvent {
    type Kind = RoomEventKind;

    fn kind(&self) -> RoomEventKind {
        match self {
            RoomEvent::Joined { .. } => RoomEventKind::Joined,
            RoomEvent::ParticipantJoined(_) => RoomEventKind::ParticipantJoined,
            RoomEvent::ParticipantLeft(_) => RoomEventKind::ParticipantLeft,
            RoomEvent::ParticipantDisconnected(_) => RoomEventKind::ParticipantDisconnected,
            RoomEvent::StreamSubscribed { .. } => RoomEventKind::StreamSubscribed,
            RoomEvent::StreamUnsubscribed { .. } => RoomEventKind::StreamUnsubscribed,
            RoomEvent::Talking { .. } => RoomEventKind::Talking,
            RoomEvent::ParticipantUpdated(_) => RoomEventKind::ParticipantUpdated,
            RoomEvent::Message(_) => RoomEventKind::Message,
            RoomEvent::Chat(_) => RoomEventKind::Chat,
            RoomEvent::Signal(_) => RoomEventKind::Signal,
            RoomEvent::AudioStream(_) => RoomEventKind::AudioStream,
            RoomEvent::VideoStream { .. } => RoomEventKind::VideoStream,
            RoomEvent::RemoveStream(_) => RoomEventKind::RemoveStream,
            RoomEvent::ScreenShareEnded => RoomEventKind::ScreenShareEnded,
            RoomEvent::Disconnected => RoomEventKind::Disconnected,
        }
    }
}
