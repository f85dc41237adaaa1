use crate::model::{CardKey, CardPriceState, Snapshot};
use crate::sanitizer::PriceSanitizer;
use crate::utils::parse_datetime;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Cards in an ingest file: either a list, or a map keyed by the legacy
/// `"Name #Number"` format.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestCards {
    List(Vec<CardPriceState>),
    Keyed(BTreeMap<String, CardPriceState>),
}

#[derive(Debug, Deserialize)]
struct IngestDocument {
    #[serde(default)]
    timestamp: Option<String>,
    cards: IngestCards,
}

/// Parses a price dump. A missing or unparseable timestamp falls back to `now`.
pub fn parse_ingest(json: &str, now: DateTime<Utc>) -> Result<(DateTime<Utc>, Vec<CardPriceState>), serde_json::Error> {
    let doc: IngestDocument = serde_json::from_str(json)?;
    let timestamp = match doc.timestamp.as_deref() {
        Some(text) => parse_datetime(text).unwrap_or_else(|| {
            warn!("Invalid snapshot timestamp '{}', using now", text);
            now
        }),
        None => now,
    };

    let states = match doc.cards {
        IngestCards::List(states) => states,
        IngestCards::Keyed(map) => map
            .into_iter()
            .map(|(legacy, state)| migrate_legacy(&legacy, state))
            .collect(),
    };
    Ok((timestamp, states))
}

/// Fills a missing card number from a legacy `"Name #Number"` key.
fn migrate_legacy(legacy: &str, mut state: CardPriceState) -> CardPriceState {
    if state.card.number.is_empty() {
        if let Some((_, number)) = legacy.rsplit_once('#') {
            state.card.number = number.trim().to_string();
        }
    }
    let migrated = CardKey::from_legacy(legacy);
    if migrated != state.card.key() {
        debug!("Legacy key '{}' resolved to {}", legacy, state.card.key());
    }
    state
}

/// Sanitizes the states and keys them canonically. Later duplicates win;
/// cards with no valid price are dropped.
pub fn build_snapshot(timestamp: DateTime<Utc>, states: Vec<CardPriceState>, sanitizer: &PriceSanitizer) -> Snapshot {
    let total = states.len();
    let mut cards = BTreeMap::new();
    for state in states {
        if let Some(clean) = sanitizer.sanitize_state(&state) {
            if let Some(previous) = cards.insert(clean.card.key(), clean) {
                debug!("Duplicate entry for {}, keeping the later one", previous.card.key());
            }
        }
    }
    info!("Snapshot at {}: {} of {} cards kept", timestamp, cards.len(), total);
    Snapshot { timestamp, cards }
}
