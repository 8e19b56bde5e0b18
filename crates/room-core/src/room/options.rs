use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use softphone_core::{PhoneError, PhoneResult};

use crate::directory::RosterEntry;

/// Directory source consulted when none is configured
pub const DEFAULT_SOURCE_NAME: &str = "default";

/// How long to wait for the conference bridge to accept the room call
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for joining a conference room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomOptions {
    /// Conference extension to dial
    pub extension: String,
    /// Join with the camera on
    pub camera: bool,
    /// Identifies the local user in membership notifications
    pub user_uuid: String,
    /// Directory source holding the conference contact
    pub source_name: String,
    pub accept_timeout: Duration,
    /// Application fields added to the local participant status
    pub extra: Map<String, Value>,
}

impl RoomOptions {
    pub fn new(extension: impl Into<String>, user_uuid: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            camera: false,
            user_uuid: user_uuid.into(),
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            extra: Map::new(),
        }
    }

    pub fn with_camera(mut self, camera: bool) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = source_name.into();
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn validate(&self) -> PhoneResult<()> {
        if self.extension.trim().is_empty() {
            return Err(PhoneError::InvalidConfiguration {
                field: "extension".to_string(),
                reason: "Conference extension cannot be empty".to_string(),
            });
        }
        if self.user_uuid.is_empty() {
            return Err(PhoneError::MissingConfiguration {
                field: "user_uuid".to_string(),
            });
        }
        if self.accept_timeout.is_zero() {
            return Err(PhoneError::InvalidConfiguration {
                field: "accept_timeout".to_string(),
                reason: "Accept timeout must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Notification from the conference membership feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConferenceEvent {
    /// The bridge created a channel for the room call
    CallCreated { call_id: String },
    ParticipantJoined(RosterEntry),
    ParticipantLeft(RosterEntry),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_validation() {
        let options = RoomOptions::new("8000", "me");
        assert_eq!(options.source_name, DEFAULT_SOURCE_NAME);
        assert_eq!(options.accept_timeout, DEFAULT_ACCEPT_TIMEOUT);
        assert!(!options.camera);
        assert!(options.validate().is_ok());

        let err = RoomOptions::new(" ", "me").validate().unwrap_err();
        assert!(matches!(err, PhoneError::InvalidConfiguration { ref field, .. } if field == "extension"));

        let err = RoomOptions::new("8000", "").validate().unwrap_err();
        assert!(matches!(err, PhoneError::MissingConfiguration { .. }));

        let err = RoomOptions::new("8000", "me")
            .with_accept_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PhoneError::InvalidConfiguration { .. }));
    }
}
