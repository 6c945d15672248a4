//! Envelope decoders, one per local entity variant.
//!
//! Every decoder is a pure function of the envelope: same input, same
//! entity, no side effects. A missing or mistyped required field is a
//! `Decode` error; optional fields fall back to their defaults.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use pinsync_common::{Error, Result};
use pinsync_remote::EventEnvelope;
use pinsync_store::{AiMicEvent, LocalEvent, MusicEvent, PhoneCallEvent, TranslationEvent};

/// Signature shared by all decoders.
pub type DecodeFn = fn(&EventEnvelope) -> Result<LocalEvent>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiMicPayload {
    request: String,
    response: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallPeer {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhoneCallPayload {
    #[serde(default)]
    peers: Vec<CallPeer>,
    #[serde(default)]
    duration_seconds: Option<u64>,
    #[serde(default)]
    outgoing: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslationPayload {
    origin_language: String,
    target_language: String,
    original_text: String,
    translated_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MusicPayload {
    track_title: String,
    #[serde(default)]
    artist_name: Option<String>,
    #[serde(default)]
    album_name: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    length_seconds: Option<u64>,
}

fn payload<T: DeserializeOwned>(envelope: &EventEnvelope) -> Result<T> {
    if envelope.event_data.is_null() {
        return Err(Error::Decode(format!(
            "Event {} has no payload",
            envelope.id
        )));
    }
    T::deserialize(&envelope.event_data)
        .map_err(|e| Error::Decode(format!("Event {}: {}", envelope.id, e)))
}

/// Decode a mic interaction.
pub fn decode_ai_mic(envelope: &EventEnvelope) -> Result<LocalEvent> {
    let data: AiMicPayload = payload(envelope)?;
    Ok(LocalEvent::AiMic(AiMicEvent {
        uuid: envelope.id,
        created_at: envelope.event_creation_time,
        request: data.request,
        response: data.response,
    }))
}

/// Decode a phone call. Peers with neither a name nor a number are dropped.
pub fn decode_phone_call(envelope: &EventEnvelope) -> Result<LocalEvent> {
    let data: PhoneCallPayload = payload(envelope)?;
    let peers = data
        .peers
        .into_iter()
        .filter_map(|peer| peer.display_name.or(peer.phone_number))
        .collect();

    Ok(LocalEvent::PhoneCall(PhoneCallEvent {
        uuid: envelope.id,
        created_at: envelope.event_creation_time,
        peers,
        duration_secs: data.duration_seconds,
        outgoing: data.outgoing,
    }))
}

/// Decode a translation.
pub fn decode_translation(envelope: &EventEnvelope) -> Result<LocalEvent> {
    let data: TranslationPayload = payload(envelope)?;
    Ok(LocalEvent::Translation(TranslationEvent {
        uuid: envelope.id,
        created_at: envelope.event_creation_time,
        origin_language: data.origin_language,
        target_language: data.target_language,
        original_text: data.original_text,
        translated_text: data.translated_text,
    }))
}

/// Decode a music request.
pub fn decode_music(envelope: &EventEnvelope) -> Result<LocalEvent> {
    let data: MusicPayload = payload(envelope)?;
    Ok(LocalEvent::Music(MusicEvent {
        uuid: envelope.id,
        created_at: envelope.event_creation_time,
        track_title: data.track_title,
        artist_name: data.artist_name,
        album_name: data.album_name,
        prompt: data.prompt,
        length_secs: data.length_seconds,
    }))
}
