//! Phone builder
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use softphone_core::{PhoneBuilder, HoldFailurePolicy, Transport};
//! # fn example(transport: Arc<dyn Transport>) -> softphone_core::PhoneResult<()> {
//! let phone = PhoneBuilder::new()
//!     .transport(transport)
//!     .allow_video(true)
//!     .audio_output_device("default")
//!     .hold_failure_policy(HoldFailurePolicy::Proceed)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use super::config::{HoldFailurePolicy, PhoneConfig};
use super::Phone;
use crate::error::{PhoneError, PhoneResult};
use crate::transport::{MediaDevices, Transport};

/// Fluent builder for [`Phone`]
pub struct PhoneBuilder {
    config: PhoneConfig,
    transport: Option<Arc<dyn Transport>>,
    media: Option<Arc<dyn MediaDevices>>,
}

impl PhoneBuilder {
    pub fn new() -> Self {
        Self {
            config: PhoneConfig::default(),
            transport: None,
            media: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: PhoneConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Display capture used by screen sharing
    pub fn media_devices(mut self, media: Arc<dyn MediaDevices>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn allow_video(mut self, allow: bool) -> Self {
        self.config.allow_video = allow;
        self
    }

    pub fn audio_output_device(mut self, device_id: impl Into<String>) -> Self {
        self.config = self.config.with_audio_output_device(device_id);
        self
    }

    pub fn audio_ring_device(mut self, device_id: impl Into<String>) -> Self {
        self.config = self.config.with_audio_ring_device(device_id);
        self
    }

    pub fn ringing(mut self, enabled: bool) -> Self {
        self.config.ringing_enabled = enabled;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn hold_current_on_invite(mut self, hold: bool) -> Self {
        self.config.hold_current_on_invite = hold;
        self
    }

    pub fn hold_failure_policy(mut self, policy: HoldFailurePolicy) -> Self {
        self.config.hold_failure_policy = policy;
        self
    }

    /// Validate the configuration and create the phone
    pub fn build(self) -> PhoneResult<Arc<Phone>> {
        let transport = self.transport.ok_or_else(|| PhoneError::MissingConfiguration {
            field: "transport".to_string(),
        })?;
        self.config.validate()?;

        Ok(Phone::new(self.config, transport, self.media))
    }
}

impl Default for PhoneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    #[test]
    fn build_requires_a_transport() {
        let err = PhoneBuilder::new().build().expect_err("transport is required");
        assert!(matches!(err, PhoneError::MissingConfiguration { ref field } if field == "transport"));
    }

    #[test]
    fn build_applies_settings() {
        let phone = PhoneBuilder::new()
            .transport(Arc::new(FakeTransport::new()))
            .allow_video(true)
            .audio_output_device("speaker")
            .ringing(false)
            .hold_failure_policy(HoldFailurePolicy::Proceed)
            .build()
            .expect("valid builder");

        let config = phone.config();
        assert!(config.allow_video);
        assert_eq!(config.ring_device().as_deref(), Some("speaker"));
        assert!(!config.ringing_enabled);
        assert_eq!(config.hold_failure_policy, HoldFailurePolicy::Proceed);
    }

    #[test]
    fn build_rejects_empty_user_agent() {
        let err = PhoneBuilder::new()
            .transport(Arc::new(FakeTransport::new()))
            .user_agent("  ")
            .build()
            .expect_err("empty user agent");
        assert_eq!(err.category(), "configuration");
    }
}
