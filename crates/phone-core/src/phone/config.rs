use serde::{Deserialize, Serialize};

use crate::error::{PhoneError, PhoneResult};

/// What to do when holding the current call fails while switching to
/// another one (placing, accepting or resuming a call)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HoldFailurePolicy {
    /// Abandon the switch. The current call stays current.
    #[default]
    Abort,
    /// Log the failure and switch anyway
    Proceed,
}

/// Configuration for the phone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Negotiate video when the remote side offers it
    pub allow_video: bool,
    /// Speaker used for call audio
    pub audio_output_device: Option<String>,
    /// Speaker used for ring cues, falls back to the output device
    pub audio_ring_device: Option<String>,
    /// 0.0..=1.0
    pub audio_output_volume: f32,
    /// 0.0..=1.0
    pub audio_ring_volume: f32,
    /// Play ring cues for inbound calls
    pub ringing_enabled: bool,
    /// User agent string announced by the transport
    pub user_agent: String,
    /// Put the current call on hold when another call comes in
    pub hold_current_on_invite: bool,
    pub hold_failure_policy: HoldFailurePolicy,
}

impl PhoneConfig {
    pub fn new() -> Self {
        Self {
            allow_video: false,
            audio_output_device: None,
            audio_ring_device: None,
            audio_output_volume: 1.0,
            audio_ring_volume: 1.0,
            ringing_enabled: true,
            user_agent: format!("softphone-core/{}", env!("CARGO_PKG_VERSION")),
            hold_current_on_invite: true,
            hold_failure_policy: HoldFailurePolicy::Abort,
        }
    }

    pub fn with_video(mut self, allow_video: bool) -> Self {
        self.allow_video = allow_video;
        self
    }

    pub fn with_audio_output_device(mut self, device_id: impl Into<String>) -> Self {
        self.audio_output_device = Some(device_id.into());
        self
    }

    pub fn with_audio_ring_device(mut self, device_id: impl Into<String>) -> Self {
        self.audio_ring_device = Some(device_id.into());
        self
    }

    pub fn with_audio_output_volume(mut self, volume: f32) -> Self {
        self.audio_output_volume = clamp_volume(volume);
        self
    }

    pub fn with_audio_ring_volume(mut self, volume: f32) -> Self {
        self.audio_ring_volume = clamp_volume(volume);
        self
    }

    pub fn with_ringing(mut self, enabled: bool) -> Self {
        self.ringing_enabled = enabled;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_hold_current_on_invite(mut self, hold: bool) -> Self {
        self.hold_current_on_invite = hold;
        self
    }

    pub fn with_hold_failure_policy(mut self, policy: HoldFailurePolicy) -> Self {
        self.hold_failure_policy = policy;
        self
    }

    /// Device ring cues play on
    pub fn ring_device(&self) -> Option<String> {
        self.audio_ring_device
            .clone()
            .or_else(|| self.audio_output_device.clone())
    }

    /// Reject values a deserialized config may carry but the setters never produce
    pub fn validate(&self) -> PhoneResult<()> {
        for (field, volume) in [
            ("audio_output_volume", self.audio_output_volume),
            ("audio_ring_volume", self.audio_ring_volume),
        ] {
            if !(0.0..=1.0).contains(&volume) {
                return Err(PhoneError::InvalidConfiguration {
                    field: field.to_string(),
                    reason: format!("{volume} is outside 0.0..=1.0"),
                });
            }
        }
        if self.user_agent.trim().is_empty() {
            return Err(PhoneError::MissingConfiguration {
                field: "user_agent".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp a volume into 0.0..=1.0, mapping NaN to silence
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
