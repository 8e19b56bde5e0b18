//! Conference participants and the status they exchange

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::directory::RosterEntry;
use crate::stream::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantRole {
    /// This endpoint
    Local,
    Remote,
}

/// Status a participant broadcasts to its peers over the signal channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParticipantStatus {
    pub call_id: String,
    pub name: String,
    pub number: String,
    pub is_talking: bool,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub screensharing: bool,
    /// Application defined fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One member of a conference room
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub call_id: String,
    pub user_uuid: Option<String>,
    pub name: String,
    pub number: String,
    pub role: ParticipantRole,
    pub talking: bool,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub screensharing: bool,
    pub streams: Vec<Stream>,
    pub video_streams: Vec<Stream>,
    pub extra: Map<String, Value>,
}

impl Participant {
    pub fn from_roster(entry: &RosterEntry, role: ParticipantRole) -> Self {
        let number = entry.caller_id_number.clone().unwrap_or_default();
        Self {
            call_id: entry.call_id.clone(),
            user_uuid: entry.user_uuid.clone(),
            name: entry.caller_id_name.clone().unwrap_or_else(|| number.clone()),
            number,
            role,
            talking: false,
            audio_muted: entry.muted,
            video_muted: false,
            screensharing: false,
            streams: Vec::new(),
            video_streams: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn local(entry: &RosterEntry, extra: Map<String, Value>) -> Self {
        Self {
            extra,
            ..Self::from_roster(entry, ParticipantRole::Local)
        }
    }

    pub fn remote(entry: &RosterEntry) -> Self {
        Self::from_roster(entry, ParticipantRole::Remote)
    }

    pub fn is_local(&self) -> bool {
        self.role == ParticipantRole::Local
    }

    pub fn status(&self) -> ParticipantStatus {
        ParticipantStatus {
            call_id: self.call_id.clone(),
            name: self.name.clone(),
            number: self.number.clone(),
            is_talking: self.talking,
            audio_muted: self.audio_muted,
            video_muted: self.video_muted,
            screensharing: self.screensharing,
            extra: self.extra.clone(),
        }
    }

    /// Apply a status received from the participant itself. Identity fields
    /// are kept; empty names never overwrite known ones.
    pub fn apply_status(&mut self, status: &ParticipantStatus) {
        if !status.name.is_empty() {
            self.name = status.name.clone();
        }
        self.talking = status.is_talking;
        self.audio_muted = status.audio_muted;
        self.video_muted = status.video_muted;
        self.screensharing = status.screensharing;
        for (key, value) in &status.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    pub fn add_video_stream(&mut self, stream: Stream) {
        self.streams.push(stream.clone());
        self.video_streams.push(stream);
    }

    /// The local video replaces whatever was shown before
    pub fn set_video_stream(&mut self, stream: Stream) {
        self.streams = vec![stream.clone()];
        self.video_streams = vec![stream];
    }

    pub fn has_stream(&self, stream_id: &str) -> bool {
        self.streams.iter().any(|s| s.id() == stream_id)
    }

    pub fn remove_stream(&mut self, stream_id: &str) -> Option<Stream> {
        self.video_streams.retain(|s| s.id() != stream_id);
        let pos = self.streams.iter().position(|s| s.id() == stream_id)?;
        Some(self.streams.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use softphone_core::MediaStream;

    #[test]
    fn status_round_trips_through_signal_json() {
        let entry = RosterEntry::new("X").with_caller_id("Ann", "1001");
        let mut extra = Map::new();
        extra.insert("avatar".to_string(), json!("ann.png"));
        let mut local = Participant::local(&entry, extra);
        local.video_muted = true;

        let value = serde_json::to_value(local.status()).expect("serialize");
        assert_eq!(value["callId"], "X");
        assert_eq!(value["videoMuted"], true);
        assert_eq!(value["avatar"], "ann.png");

        let mut remote_view = Participant::remote(&RosterEntry::new("X"));
        let status: ParticipantStatus = serde_json::from_value(value).expect("deserialize");
        remote_view.apply_status(&status);
        assert_eq!(remote_view.name, "Ann");
        assert!(remote_view.video_muted);
        assert_eq!(remote_view.extra.get("avatar"), Some(&json!("ann.png")));
        assert!(!remote_view.is_local());
    }

    #[test]
    fn partial_status_uses_defaults() {
        let status: ParticipantStatus =
            serde_json::from_value(json!({"callId": "Y", "audioMuted": true})).expect("deserialize");
        assert_eq!(status.call_id, "Y");
        assert!(status.audio_muted);
        assert!(!status.screensharing);
        assert!(status.extra.is_empty());
    }

    #[test]
    fn removing_a_stream_clears_both_lists() {
        let mut participant = Participant::remote(&RosterEntry::new("Y"));
        participant.add_video_stream(Stream::new(MediaStream::new("s1", vec![]), "Y"));
        participant.add_video_stream(Stream::new(MediaStream::new("s2", vec![]), "Y"));

        let removed = participant.remove_stream("s1").expect("removed");
        assert_eq!(removed.id(), "s1");
        assert!(!participant.has_stream("s1"));
        assert_eq!(participant.video_streams.len(), 1);
        assert!(participant.remove_stream("s1").is_none());
    }
}
