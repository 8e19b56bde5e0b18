//! Participant and stream bookkeeping of a room
//!
//! Three facts arrive independently and in any order: the label map of an
//! offer (participant call id to track id), a remote video stream keyed by
//! its track id, and a participant joining. Streams whose owner is not known
//! yet wait in `pending_streams`; participants whose label is not known yet
//! wait in `pending_participants`. Whichever fact arrives last completes the
//! association.
//!
//! [`RoomState`] performs no I/O. Every mutation returns the events it
//! produced so the caller can emit them once the state lock is released.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use softphone_core::MediaStream;
use tracing::{debug, info};

use crate::directory::RosterEntry;
use crate::events::RoomEvent;
use crate::participant::{Participant, ParticipantStatus};
use crate::sdp::LabelMapping;
use crate::stream::Stream;

/// Result of the local user's own join
#[derive(Debug, Default)]
pub struct LocalJoin {
    pub events: Vec<RoomEvent>,
    /// Status of the local participant when it was established by this
    /// join; peers must then be asked for their status
    pub request_from: Option<ParticipantStatus>,
}

#[derive(Debug, Default)]
pub struct RoomState {
    participants: Vec<Participant>,
    local_call_id: Option<String>,
    /// Participant call id to remote track id
    stream_ids: HashMap<String, String>,
    /// Remote video waiting for its participant, by track id
    pending_streams: HashMap<String, MediaStream>,
    /// Participants waiting for their label
    pending_participants: HashSet<String>,
    audio_stream: Option<MediaStream>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, call_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.call_id == call_id)
    }

    fn participant_mut(&mut self, call_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.call_id == call_id)
    }

    pub fn local_participant(&self) -> Option<&Participant> {
        self.local_call_id.as_deref().and_then(|id| self.participant(id))
    }

    pub fn local_participant_mut(&mut self) -> Option<&mut Participant> {
        let call_id = self.local_call_id.clone()?;
        self.participant_mut(&call_id)
    }

    pub fn audio_stream(&self) -> Option<&MediaStream> {
        self.audio_stream.as_ref()
    }

    pub fn set_audio_stream(&mut self, stream: MediaStream) {
        self.audio_stream = Some(stream);
    }

    pub fn stream_id_for(&self, call_id: &str) -> Option<&str> {
        self.stream_ids.get(call_id).map(String::as_str)
    }

    pub fn is_pending_stream(&self, stream_id: &str) -> bool {
        self.pending_streams.contains_key(stream_id)
    }

    pub fn is_pending_participant(&self, call_id: &str) -> bool {
        self.pending_participants.contains(call_id)
    }

    fn call_id_for_stream(&self, stream_id: &str) -> Option<String> {
        self.stream_ids
            .iter()
            .find(|(_, id)| id.as_str() == stream_id)
            .map(|(call_id, _)| call_id.clone())
    }

    // ===== ASSOCIATION =====

    /// Record the labels of an offer and complete waiting associations
    pub fn apply_labels(&mut self, mappings: Vec<LabelMapping>) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        for LabelMapping { label, stream_id } in mappings {
            debug!(call_id = %label, %stream_id, "Stream label");
            self.stream_ids.insert(label.clone(), stream_id);
            if self.pending_participants.contains(&label) {
                events.extend(self.associate(&label));
            }
        }
        events
    }

    /// A remote video arrived, keyed by its track id
    pub fn add_video_stream(&mut self, stream: MediaStream, stream_id: &str) -> Vec<RoomEvent> {
        self.pending_streams.insert(stream_id.to_string(), stream);

        match self.call_id_for_stream(stream_id) {
            Some(call_id) if self.participant(&call_id).is_some() => self.associate(&call_id),
            _ => Vec::new(),
        }
    }

    /// Attach the waiting video of `call_id` when every fact is known
    pub fn associate(&mut self, call_id: &str) -> Vec<RoomEvent> {
        let Some(stream_id) = self.stream_ids.get(call_id).cloned() else {
            self.pending_participants.insert(call_id.to_string());
            return Vec::new();
        };
        let Some(local_call_id) = self.local_call_id.as_deref() else {
            // Not in the room yet; the local join associates everyone again
            self.pending_participants.insert(call_id.to_string());
            return Vec::new();
        };
        if local_call_id == call_id {
            return Vec::new();
        }
        let Some(media) = self.pending_streams.remove(&stream_id) else {
            return Vec::new();
        };
        let Some(participant) = self.participant_mut(call_id) else {
            self.pending_streams.insert(stream_id, media);
            return Vec::new();
        };

        let stream = Stream::new(media, call_id);
        participant.add_video_stream(stream.clone());
        self.pending_participants.remove(call_id);
        info!(call_id, stream_id = %stream.id(), "Stream associated");

        vec![RoomEvent::StreamSubscribed {
            call_id: call_id.to_string(),
            stream,
        }]
    }

    /// Detach a removed remote stream from whoever owns it
    pub fn remove_stream(&mut self, stream: &MediaStream) -> Vec<RoomEvent> {
        let Some(owner) = self.participants.iter_mut().find(|p| p.has_stream(&stream.id)) else {
            return Vec::new();
        };
        owner.remove_stream(&stream.id);
        vec![RoomEvent::StreamUnsubscribed {
            call_id: owner.call_id.clone(),
            stream: stream.clone(),
        }]
    }

    // ===== MEMBERSHIP =====

    /// The local user joined: replace the participant list with the roster.
    ///
    /// The roster entry whose call id is `room_call_id` becomes the local
    /// participant; it is only established once.
    pub fn join_local(
        &mut self,
        roster: &[RosterEntry],
        room_call_id: Option<&str>,
        extra: &Map<String, Value>,
        local_video: Option<MediaStream>,
    ) -> LocalJoin {
        let room_call_id = room_call_id.filter(|id| !id.is_empty());
        let participants: Vec<Participant> = roster
            .iter()
            .map(|entry| {
                if Some(entry.call_id.as_str()) == room_call_id {
                    Participant::local(entry, extra.clone())
                } else {
                    Participant::remote(entry)
                }
            })
            .collect();
        self.participants = participants;

        let mut join = LocalJoin::default();
        let local = self
            .participants
            .iter()
            .find(|p| p.is_local())
            .map(|p| p.call_id.clone())
            .filter(|_| self.local_call_id.is_none());
        if let Some(local) = local {
            info!(call_id = %local, participants = self.participants.len(), "Joined room");
            self.local_call_id = Some(local);
            if let Some(video) = local_video {
                join.events.extend(self.set_local_video(video));
            }
            join.request_from = self.local_participant().map(Participant::status);
        }

        let call_ids: Vec<String> = self.participants.iter().map(|p| p.call_id.clone()).collect();
        for call_id in call_ids {
            join.events.extend(self.associate(&call_id));
            if let Some(participant) = self.participant(&call_id).filter(|p| !p.is_local()) {
                join.events.push(RoomEvent::ParticipantJoined(participant.clone()));
            }
        }

        join.events.push(RoomEvent::Joined {
            local: self.local_participant().cloned(),
            participants: self.participants.clone(),
        });
        join
    }

    /// Another participant joined. Known call ids are ignored.
    pub fn add_remote(&mut self, entry: &RosterEntry) -> Vec<RoomEvent> {
        if self.participant(&entry.call_id).is_some() {
            debug!(call_id = %entry.call_id, "Participant already in room");
            return Vec::new();
        }
        self.participants.push(Participant::remote(entry));

        let mut events = self.associate(&entry.call_id);
        if let Some(participant) = self.participant(&entry.call_id) {
            events.push(RoomEvent::ParticipantJoined(participant.clone()));
        }
        events
    }

    pub fn remove_participant(&mut self, call_id: &str) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        let left = match self.participants.iter().position(|p| p.call_id == call_id) {
            Some(pos) => {
                let left = self.participants.remove(pos);
                events.push(RoomEvent::ParticipantDisconnected(left.clone()));
                Some(left)
            }
            None => None,
        };
        self.pending_participants.remove(call_id);
        if self.local_call_id.as_deref() == Some(call_id) {
            self.local_call_id = None;
        }

        events.push(RoomEvent::ParticipantLeft(left));
        events
    }

    // ===== STATUS =====

    /// The local participant shows `stream` as its video
    pub fn set_local_video(&mut self, stream: MediaStream) -> Vec<RoomEvent> {
        let Some(local) = self.local_participant_mut() else {
            return Vec::new();
        };
        let stream = Stream::new(stream, local.call_id.clone());
        local.set_video_stream(stream.clone());
        vec![RoomEvent::StreamSubscribed {
            call_id: local.call_id.clone(),
            stream,
        }]
    }

    pub fn set_talking(&mut self, call_id: &str, talking: bool) -> Vec<RoomEvent> {
        let Some(participant) = self.participant_mut(call_id) else {
            return Vec::new();
        };
        participant.talking = talking;
        vec![RoomEvent::Talking {
            call_id: call_id.to_string(),
            talking,
        }]
    }

    /// Apply a status received from a peer, without broadcasting it again
    pub fn apply_status(&mut self, status: &ParticipantStatus) -> Vec<RoomEvent> {
        let Some(participant) = self.participant_mut(&status.call_id) else {
            debug!(call_id = %status.call_id, "Status for unknown participant");
            return Vec::new();
        };
        participant.apply_status(status);
        vec![RoomEvent::ParticipantUpdated(participant.clone())]
    }

    /// Change the local participant and return its new status to broadcast
    pub fn update_local<F>(&mut self, update: F) -> Option<(ParticipantStatus, RoomEvent)>
    where
        F: FnOnce(&mut Participant),
    {
        let local = self.local_participant_mut()?;
        update(local);
        Some((local.status(), RoomEvent::ParticipantUpdated(local.clone())))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RoomEventKind;
    use softphone_core::{Event, MediaTrack};

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry::new("X").with_user("me"),
            RosterEntry::new("Y").with_user("other"),
        ]
    }

    fn joined(state: &mut RoomState) -> LocalJoin {
        state.join_local(&roster(), Some("X"), &Map::new(), None)
    }

    fn labels() -> Vec<LabelMapping> {
        vec![LabelMapping {
            label: "Y".to_string(),
            stream_id: "track-y".to_string(),
        }]
    }

    fn video() -> MediaStream {
        MediaStream::new("stream-y", vec![MediaTrack::video("track-y")])
    }

    fn kinds(events: &[RoomEvent]) -> Vec<RoomEventKind> {
        events.iter().map(|e| e.kind()).collect()
    }

    fn video_ids(state: &RoomState, call_id: &str) -> Vec<String> {
        state
            .participant(call_id)
            .map(|p| p.video_streams.iter().map(|s| s.id().to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn local_join_partitions_roster() {
        let mut state = RoomState::new();
        let join = joined(&mut state);

        assert_eq!(state.local_participant().map(|p| p.call_id.as_str()), Some("X"));
        assert_eq!(state.participants().len(), 2);
        assert!(!state.participant("Y").expect("Y").is_local());
        assert_eq!(join.request_from.map(|s| s.call_id), Some("X".to_string()));
        assert_eq!(
            kinds(&join.events),
            vec![RoomEventKind::ParticipantJoined, RoomEventKind::Joined]
        );
    }

    #[test]
    fn local_participant_is_established_once() {
        let mut state = RoomState::new();
        joined(&mut state);
        let again = joined(&mut state);

        assert!(again.request_from.is_none());
        assert_eq!(state.participants().iter().filter(|p| p.is_local()).count(), 1);
    }

    #[test]
    fn labels_then_stream_then_join() {
        let mut state = RoomState::new();
        assert!(state.apply_labels(labels()).is_empty());
        assert!(state.add_video_stream(video(), "track-y").is_empty());
        let join = joined(&mut state);

        assert!(kinds(&join.events).contains(&RoomEventKind::StreamSubscribed));
        assert_eq!(video_ids(&state, "Y"), vec!["stream-y"]);
        assert!(!state.is_pending_stream("track-y"));
        assert!(!state.is_pending_participant("Y"));
    }

    #[test]
    fn stream_then_join_then_labels() {
        let mut state = RoomState::new();
        assert!(state.add_video_stream(video(), "track-y").is_empty());
        joined(&mut state);
        assert!(state.is_pending_participant("Y"));
        assert!(video_ids(&state, "Y").is_empty());

        let events = state.apply_labels(labels());
        assert_eq!(kinds(&events), vec![RoomEventKind::StreamSubscribed]);
        assert_eq!(video_ids(&state, "Y"), vec!["stream-y"]);
        assert!(!state.is_pending_stream("track-y"));
        assert!(!state.is_pending_participant("Y"));
    }

    #[test]
    fn join_then_labels_then_stream() {
        let mut state = RoomState::new();
        joined(&mut state);
        assert!(state.apply_labels(labels()).is_empty());

        let events = state.add_video_stream(video(), "track-y");
        assert_eq!(kinds(&events), vec![RoomEventKind::StreamSubscribed]);
        assert_eq!(video_ids(&state, "Y"), vec!["stream-y"]);
    }

    #[test]
    fn remote_before_local_join_waits() {
        let mut state = RoomState::new();
        state.apply_labels(labels());
        state.add_video_stream(video(), "track-y");
        state.add_remote(&RosterEntry::new("Y"));
        assert!(video_ids(&state, "Y").is_empty());

        joined(&mut state);
        assert_eq!(video_ids(&state, "Y"), vec!["stream-y"]);
    }

    #[test]
    fn local_streams_are_not_associated() {
        let mut state = RoomState::new();
        state.apply_labels(vec![LabelMapping {
            label: "X".to_string(),
            stream_id: "track-x".to_string(),
        }]);
        state.add_video_stream(MediaStream::new("stream-x", vec![]), "track-x");
        joined(&mut state);

        assert!(video_ids(&state, "X").is_empty());
        assert!(state.is_pending_stream("track-x"));
    }

    #[test]
    fn remote_join_is_idempotent() {
        let mut state = RoomState::new();
        joined(&mut state);

        let events = state.add_remote(&RosterEntry::new("Z"));
        assert_eq!(kinds(&events), vec![RoomEventKind::ParticipantJoined]);
        assert!(state.add_remote(&RosterEntry::new("Z")).is_empty());
        assert!(state.add_remote(&RosterEntry::new("Y")).is_empty());
        assert_eq!(state.participants().len(), 3);
    }

    #[test]
    fn leaving_disconnects_then_removes() {
        let mut state = RoomState::new();
        joined(&mut state);

        let events = state.remove_participant("Y");
        assert_eq!(
            kinds(&events),
            vec![RoomEventKind::ParticipantDisconnected, RoomEventKind::ParticipantLeft]
        );
        assert!(state.participant("Y").is_none());

        let events = state.remove_participant("nobody");
        assert!(matches!(events.as_slice(), [RoomEvent::ParticipantLeft(None)]));
    }

    #[test]
    fn removed_stream_is_detached_from_owner() {
        let mut state = RoomState::new();
        joined(&mut state);
        state.apply_labels(labels());
        state.add_video_stream(video(), "track-y");

        let events = state.remove_stream(&video());
        assert_eq!(kinds(&events), vec![RoomEventKind::StreamUnsubscribed]);
        assert!(video_ids(&state, "Y").is_empty());
        assert!(state.remove_stream(&video()).is_empty());
    }

    #[test]
    fn local_video_replaces_streams() {
        let mut state = RoomState::new();
        state.join_local(&roster(), Some("X"), &Map::new(), Some(MediaStream::new("cam-1", vec![])));
        state.set_local_video(MediaStream::new("cam-2", vec![]));

        assert_eq!(video_ids(&state, "X"), vec!["cam-2"]);
        assert_eq!(state.local_participant().expect("local").streams.len(), 1);
    }

    #[test]
    fn status_and_talking_updates() {
        let mut state = RoomState::new();
        joined(&mut state);

        let events = state.set_talking("Y", true);
        assert_eq!(kinds(&events), vec![RoomEventKind::Talking]);
        assert!(state.participant("Y").expect("Y").talking);
        assert!(state.set_talking("nobody", true).is_empty());

        let status = ParticipantStatus {
            call_id: "Y".to_string(),
            video_muted: true,
            ..ParticipantStatus::default()
        };
        assert_eq!(kinds(&state.apply_status(&status)), vec![RoomEventKind::ParticipantUpdated]);
        assert!(state.participant("Y").expect("Y").video_muted);

        let (status, _) = state.update_local(|p| p.audio_muted = true).expect("local");
        assert!(status.audio_muted);
        assert_eq!(status.call_id, "X");
    }
}
