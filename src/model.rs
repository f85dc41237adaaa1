// Core structs: cards, price snapshots, history entries, alerts and errors
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Canonical card key: `"{number}-{name}"`, trimmed, lowercased, with inner
/// whitespace collapsed. Every card-keyed map in the crate uses this format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardKey(String);

impl CardKey {
    pub fn new(number: &str, name: &str) -> Self {
        Self(format!("{}-{}", squash(number), squash(name)))
    }

    /// Migrates a legacy `"Name #Number"` key into the canonical form.
    /// Keys without a `#` are treated as a bare name with no number.
    pub fn from_legacy(legacy: &str) -> Self {
        match legacy.rsplit_once('#') {
            Some((name, number)) => Self::new(number, name),
            None => Self::new("", legacy),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn squash(part: &str) -> String {
    part.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    HoloRare,
    UltraRare,
    SecretRare,
    Promo,
    #[default]
    Unknown,
}

impl Rarity {
    /// Lenient parse: case, spaces, dashes and underscores are ignored.
    pub fn parse(text: &str) -> Self {
        let folded: String = text
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match folded.as_str() {
            "common" | "c" => Rarity::Common,
            "uncommon" | "u" => Rarity::Uncommon,
            "rare" | "r" => Rarity::Rare,
            "holorare" | "holo" | "rareholo" => Rarity::HoloRare,
            "ultrarare" | "ultra" | "ur" => Rarity::UltraRare,
            "secretrare" | "secret" | "sr" => Rarity::SecretRare,
            "promo" => Rarity::Promo,
            _ => Rarity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::HoloRare => "holo_rare",
            Rarity::UltraRare => "ultra_rare",
            Rarity::SecretRare => "secret_rare",
            Rarity::Promo => "promo",
            Rarity::Unknown => "unknown",
        }
    }
}

impl From<String> for Rarity {
    fn from(text: String) -> Self {
        Rarity::parse(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub name: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub set_name: String,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl Card {
    pub fn key(&self) -> CardKey {
        CardKey::new(&self.number, &self.name)
    }

    pub fn display_name(&self) -> String {
        if self.number.is_empty() {
            self.name.clone()
        } else {
            format!("{} #{}", self.name, self.number)
        }
    }
}

/// Known prices for one card. `None` means unknown or rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardPrices {
    pub raw: Option<f64>,
    pub psa9: Option<f64>,
    pub psa95: Option<f64>,
    pub psa10: Option<f64>,
    pub bgs10: Option<f64>,
    pub cgc95: Option<f64>,
    pub bgs95: Option<f64>,
}

impl CardPrices {
    pub fn all_unknown(&self) -> bool {
        [
            self.raw, self.psa9, self.psa95, self.psa10, self.bgs10, self.cgc95, self.bgs95,
        ]
        .iter()
        .all(Option::is_none)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub psa10: u32,
    pub total_graded: u32,
}

impl Population {
    pub fn psa10_rate(&self) -> f64 {
        if self.total_graded == 0 {
            0.0
        } else {
            self.psa10 as f64 / self.total_graded as f64
        }
    }
}

/// Price state of one card at one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardPriceState {
    pub card: Card,
    #[serde(default)]
    pub prices: CardPrices,
    #[serde(default)]
    pub population: Option<Population>,
    #[serde(default)]
    pub listing_url: Option<String>,
}

/// One point of a card's price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub raw: Option<f64>,
    pub psa9: Option<f64>,
    pub psa95: Option<f64>,
    pub psa10: Option<f64>,
    pub bgs10: Option<f64>,
}

impl PriceSample {
    pub fn from_state(timestamp: DateTime<Utc>, state: &CardPriceState) -> Self {
        Self {
            timestamp,
            raw: state.prices.raw,
            psa9: state.prices.psa9,
            psa95: state.prices.psa95,
            psa10: state.prices.psa10,
            bgs10: state.prices.bgs10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub cards: BTreeMap<CardKey, CardPriceState>,
}

impl Snapshot {
    /// Builds the price series for one card across chronologically sorted snapshots.
    pub fn samples_for(snapshots: &[Snapshot], key: &CardKey) -> Vec<PriceSample> {
        let mut samples: Vec<PriceSample> = snapshots
            .iter()
            .filter_map(|s| {
                s.cards
                    .get(key)
                    .map(|state| PriceSample::from_state(s.timestamp, state))
            })
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        samples
    }
}

/// One persisted observation from a ranking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub card: Card,
    pub raw_price: f64,
    pub psa10_price: f64,
    pub delta_usd: f64,
    pub score: f64,
    pub notes: String,
}

/// Scoring input: a card with its sanitized prices and optional market data.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub card: Card,
    pub prices: CardPrices,
    pub population: Option<Population>,
    pub listing_url: Option<String>,
    pub volatility: Option<f64>,
}

impl Row {
    pub fn from_state(state: &CardPriceState) -> Self {
        Self {
            card: state.card.clone(),
            prices: state.prices.clone(),
            population: state.population,
            listing_url: state.listing_url.clone(),
            volatility: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub row: Row,
    pub score: f64,
    pub break_even_usd: f64,
    pub net_profit_usd: f64,
    pub why: Option<String>,
}

/// A live auction listing returned by an auction source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub title: String,
    pub current_bid: f64,
    pub shipping_cost: f64,
    pub end_time: DateTime<Utc>,
    pub bid_count: u32,
    pub seller_rating: f64,
    pub url: String,
}

/// Direction of a price series under the ±2% normalized-slope rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// Per-card direction used by history reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Submit,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Severity for a percentage move: ≥30 high, ≥15 medium, otherwise low.
    pub fn from_pct(pct: f64) -> Self {
        let magnitude = pct.abs();
        if magnitude >= 30.0 {
            Severity::High
        } else if magnitude >= 15.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    PriceDrop,
    PriceIncrease,
    NewOpportunity,
    VolatilitySpike,
    VolatilityLow,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertType::PriceDrop => "PRICE_DROP",
            AlertType::PriceIncrease => "PRICE_INCREASE",
            AlertType::NewOpportunity => "NEW_OPPORTUNITY",
            AlertType::VolatilitySpike => "VOLATILITY_SPIKE",
            AlertType::VolatilityLow => "VOLATILITY_LOW",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub card_key: CardKey,
    pub card_name: String,
    pub message: String,
    pub details: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub action_items: Vec<String>,
}

/// Result of an analysis that needs a minimum amount of data.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis<T> {
    Ready(T),
    InsufficientData { required: usize, available: usize },
}

impl<T> Analysis<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Analysis::Ready(value) => Some(value),
            Analysis::InsufficientData { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Analysis::Ready(_))
    }
}

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid response")]
    InvalidResponse(String),
    #[error(transparent)]
    Parse(#[from] ParserError),
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("HTML parse error: {0}")]
    HtmlParseError(String),
    #[error("missing field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Telegram API error: {0}")]
    ApiError(String),
    #[error("Telegram unreachable")]
    Unreachable,
    #[error("notifier not configured")]
    NotConfigured,
}

#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("auction source is not configured")]
    NotConfigured,
    #[error("auction source failed: {0}")]
    Source(#[from] ScraperError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_key_is_number_then_name() {
        let key = CardKey::new(" 4/102 ", "Charizard  Holo");
        assert_eq!(key.as_str(), "4/102-charizard holo");
    }

    #[test]
    fn legacy_key_migrates_to_canonical_form() {
        assert_eq!(CardKey::from_legacy("Charizard #4/102"), CardKey::new("4/102", "Charizard"));
        assert_eq!(CardKey::from_legacy("Pikachu").as_str(), "-pikachu");
    }

    #[test]
    fn rarity_parse_is_lenient() {
        assert_eq!(Rarity::parse("Holo Rare"), Rarity::HoloRare);
        assert_eq!(Rarity::parse("secret_rare"), Rarity::SecretRare);
        assert_eq!(Rarity::parse("mystery"), Rarity::Unknown);
    }

    #[test]
    fn card_without_rarity_defaults_to_unknown() {
        assert_eq!(Rarity::default(), Rarity::Unknown);
        let card: Card = serde_json::from_str(r#"{"name": "Eevee"}"#).unwrap();
        assert_eq!(card.rarity, Rarity::Unknown);
    }

    #[test]
    fn severity_ladder() {
        assert_eq!(Severity::from_pct(-30.0), Severity::High);
        assert_eq!(Severity::from_pct(15.0), Severity::Medium);
        assert_eq!(Severity::from_pct(14.9), Severity::Low);
        assert!(Severity::High > Severity::Medium);
    }

    #[test]
    fn population_rate_handles_empty() {
        assert_eq!(Population::default().psa10_rate(), 0.0);
        let pop = Population { psa10: 25, total_graded: 100 };
        assert!((pop.psa10_rate() - 0.25).abs() < 1e-9);
    }
}
