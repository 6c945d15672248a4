//! Per-domain sync strategies.
//!
//! A strategy ties a remote domain to the local entity kind it fills and
//! the decoder that converts between them. The engine is driven entirely by
//! the strategy value it is handed.

use std::fmt;

use pinsync_common::{EventDomain, EventKind};

use crate::decoder::{self, DecodeFn};

/// Everything the engine needs to know about one domain.
#[derive(Clone, Copy)]
pub struct SyncStrategy {
    pub domain: EventDomain,
    pub kind: EventKind,
    pub decode: DecodeFn,
}

/// The four shipped strategies, in `EventDomain::ALL` order.
pub static STRATEGIES: [SyncStrategy; 4] = [
    SyncStrategy {
        domain: EventDomain::AiMic,
        kind: EventKind::AiMic,
        decode: decoder::decode_ai_mic,
    },
    SyncStrategy {
        domain: EventDomain::PhoneCall,
        kind: EventKind::PhoneCall,
        decode: decoder::decode_phone_call,
    },
    SyncStrategy {
        domain: EventDomain::Translation,
        kind: EventKind::Translation,
        decode: decoder::decode_translation,
    },
    SyncStrategy {
        domain: EventDomain::Music,
        kind: EventKind::Music,
        decode: decoder::decode_music,
    },
];

impl fmt::Debug for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStrategy")
            .field("domain", &self.domain)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SyncStrategy {
    /// Strategy for a domain.
    pub fn for_domain(domain: EventDomain) -> &'static SyncStrategy {
        match domain {
            EventDomain::AiMic => &STRATEGIES[0],
            EventDomain::PhoneCall => &STRATEGIES[1],
            EventDomain::Translation => &STRATEGIES[2],
            EventDomain::Music => &STRATEGIES[3],
        }
    }
}
