//! Local event entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pinsync_common::EventKind;

/// A question put to the device assistant and its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMicEvent {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub request: String,
    pub response: String,
}

/// A phone call placed or received on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneCallEvent {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    /// Display names or numbers of the other parties.
    pub peers: Vec<String>,
    pub duration_secs: Option<u64>,
    pub outgoing: bool,
}

/// One translated utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationEvent {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub origin_language: String,
    pub target_language: String,
    pub original_text: String,
    pub translated_text: String,
}

/// A music playback request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicEvent {
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub track_title: String,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    /// What the user asked for, when playback came from a voice request.
    pub prompt: Option<String>,
    pub length_secs: Option<u64>,
}

/// Any locally persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalEvent {
    AiMic(AiMicEvent),
    PhoneCall(PhoneCallEvent),
    Translation(TranslationEvent),
    Music(MusicEvent),
}

impl LocalEvent {
    /// Entity variant tag.
    pub fn kind(&self) -> EventKind {
        match self {
            LocalEvent::AiMic(_) => EventKind::AiMic,
            LocalEvent::PhoneCall(_) => EventKind::PhoneCall,
            LocalEvent::Translation(_) => EventKind::Translation,
            LocalEvent::Music(_) => EventKind::Music,
        }
    }

    /// Identifier mirrored from the remote envelope.
    pub fn uuid(&self) -> Uuid {
        match self {
            LocalEvent::AiMic(e) => e.uuid,
            LocalEvent::PhoneCall(e) => e.uuid,
            LocalEvent::Translation(e) => e.uuid,
            LocalEvent::Music(e) => e.uuid,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            LocalEvent::AiMic(e) => e.created_at,
            LocalEvent::PhoneCall(e) => e.created_at,
            LocalEvent::Translation(e) => e.created_at,
            LocalEvent::Music(e) => e.created_at,
        }
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        match self {
            LocalEvent::AiMic(e) => format!("{} -> {}", e.request, e.response),
            LocalEvent::PhoneCall(e) => {
                let direction = if e.outgoing { "to" } else { "from" };
                let peers = if e.peers.is_empty() {
                    "unknown".to_string()
                } else {
                    e.peers.join(", ")
                };
                match e.duration_secs {
                    Some(secs) => format!("call {} {} ({}s)", direction, peers, secs),
                    None => format!("call {} {}", direction, peers),
                }
            }
            LocalEvent::Translation(e) => format!(
                "[{} -> {}] {} / {}",
                e.origin_language, e.target_language, e.original_text, e.translated_text
            ),
            LocalEvent::Music(e) => match &e.artist_name {
                Some(artist) => format!("{} - {}", artist, e.track_title),
                None => e.track_title.clone(),
            },
        }
    }
}
