//! Plain data returned by phone queries

use serde::{Deserialize, Serialize};

/// Operations available on calls placed through this phone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCapabilities {
    pub accept: bool,
    pub decline: bool,
    pub mute: bool,
    pub hold: bool,
    pub transfer: bool,
    pub send_key: bool,
    pub add_participant: bool,
    pub record: bool,
    pub merge: bool,
}

impl Default for CallCapabilities {
    fn default() -> Self {
        Self {
            accept: true,
            decline: true,
            mute: true,
            hold: true,
            transfer: true,
            send_key: true,
            add_participant: false,
            record: true,
            merge: true,
        }
    }
}

/// Counters describing the phone at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneStats {
    pub registered: bool,
    pub total_calls: usize,
    pub incoming_calls: usize,
    pub has_active_call: bool,
    pub screen_sharing: bool,
}
