//! Common types used throughout PinSync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A category of remote event history.
///
/// Selects which paginated collection a sync run pulls from. The serialized
/// form is the remote API's `domain` query value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventDomain {
    /// Questions asked of the device assistant and its answers.
    #[serde(rename = "AI_MIC")]
    AiMic,
    /// Phone calls placed or received on the device.
    #[serde(rename = "CALLS")]
    PhoneCall,
    /// Live translation sessions.
    #[serde(rename = "TRANSLATION")]
    Translation,
    /// Music playback requests.
    #[serde(rename = "MUSIC")]
    Music,
}

impl EventDomain {
    /// All domains, in the order they are synced by default.
    pub const ALL: [EventDomain; 4] = [
        EventDomain::AiMic,
        EventDomain::PhoneCall,
        EventDomain::Translation,
        EventDomain::Music,
    ];

    /// Value sent as the `domain` query parameter.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            EventDomain::AiMic => "AI_MIC",
            EventDomain::PhoneCall => "CALLS",
            EventDomain::Translation => "TRANSLATION",
            EventDomain::Music => "MUSIC",
        }
    }

    /// Local entity variant that events of this domain decode into.
    pub fn kind(&self) -> EventKind {
        match self {
            EventDomain::AiMic => EventKind::AiMic,
            EventDomain::PhoneCall => EventKind::PhoneCall,
            EventDomain::Translation => EventKind::Translation,
            EventDomain::Music => EventKind::Music,
        }
    }
}

impl fmt::Display for EventDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventDomain::AiMic => "ai-mic",
            EventDomain::PhoneCall => "phone-call",
            EventDomain::Translation => "translation",
            EventDomain::Music => "music",
        };
        f.write_str(name)
    }
}

impl FromStr for EventDomain {
    type Err = crate::Error;

    /// Accepts both the wire names and the kebab-case display names.
    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai_mic" | "ai-mic" | "aimic" | "mic" => Ok(EventDomain::AiMic),
            "calls" | "phone-call" | "phone_call" | "call" => Ok(EventDomain::PhoneCall),
            "translation" => Ok(EventDomain::Translation),
            "music" => Ok(EventDomain::Music),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown event domain: {}",
                other
            ))),
        }
    }
}

/// Tag identifying one of the four local entity variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AiMic,
    PhoneCall,
    Translation,
    Music,
}

impl EventKind {
    /// All entity variants.
    pub const ALL: [EventKind; 4] = [
        EventKind::AiMic,
        EventKind::PhoneCall,
        EventKind::Translation,
        EventKind::Music,
    ];

    /// Stable name used as the storage discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AiMic => "ai_mic",
            EventKind::PhoneCall => "phone_call",
            EventKind::Translation => "translation",
            EventKind::Music => "music",
        }
    }

    /// Parse a storage discriminator back into a kind.
    pub fn from_storage_name(name: &str) -> crate::Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| crate::Error::Store(format!("Unknown event kind: {}", name)))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
