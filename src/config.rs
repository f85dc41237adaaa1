use crate::model::Rarity;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Costs shared by every ROI and profit calculation.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Marketplace selling fee as a fraction (0.13 = 13%).
    pub selling_fee_pct: f64,
    pub grading_cost: f64,
    pub shipping_cost: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            selling_fee_pct: 0.13,
            grading_cost: 25.0,
            shipping_cost: 5.0,
        }
    }
}

impl CostConfig {
    /// Everything paid before a graded copy can be sold.
    pub fn acquisition_cost(&self, raw_price: f64) -> f64 {
        raw_price + self.grading_cost + self.shipping_cost
    }

    /// ROI in percent of buying raw, grading and selling the PSA 10 after fees.
    pub fn roi(&self, raw_price: f64, psa10_price: f64) -> f64 {
        let cost = self.acquisition_cost(raw_price);
        if cost <= 0.0 {
            return 0.0;
        }
        (psa10_price * (1.0 - self.selling_fee_pct) - cost) / cost * 100.0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    pub min_price: f64,
    pub penny_cards: bool,
    /// Entries override the default ladder per rarity; unlisted rarities keep their default cap.
    #[serde(deserialize_with = "merge_rarity_caps")]
    pub rarity_caps: HashMap<Rarity, f64>,
}

fn merge_rarity_caps<'de, D>(deserializer: D) -> Result<HashMap<Rarity, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::<Rarity, f64>::deserialize(deserializer)?;
    let mut caps = default_rarity_caps();
    caps.extend(overrides);
    Ok(caps)
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            min_price: 0.05,
            penny_cards: false,
            rarity_caps: default_rarity_caps(),
        }
    }
}

pub fn default_rarity_caps() -> HashMap<Rarity, f64> {
    HashMap::from([
        (Rarity::Common, 500.0),
        (Rarity::Uncommon, 1_000.0),
        (Rarity::Rare, 2_500.0),
        (Rarity::Promo, 5_000.0),
        (Rarity::HoloRare, 5_000.0),
        (Rarity::UltraRare, 10_000.0),
        (Rarity::SecretRare, 15_000.0),
        (Rarity::Unknown, 30_000.0),
    ])
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub min_raw_price: f64,
    pub min_delta: f64,
    pub allow_thin_premium: bool,
    pub japanese_weight: f64,
    pub track_volatility: bool,
    pub max_set_age_years: Option<f64>,
    pub top_n: usize,
    pub explain: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_raw_price: 5.0,
            min_delta: 50.0,
            allow_thin_premium: false,
            japanese_weight: 1.1,
            track_volatility: false,
            max_set_age_years: None,
            top_n: 25,
            explain: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Percentage move that triggers PRICE_DROP / PRICE_INCREASE.
    pub price_change_threshold: f64,
    /// ROI percentage a card must cross to raise NEW_OPPORTUNITY.
    pub opportunity_roi_threshold: f64,
    pub volatility_high_pct: f64,
    pub volatility_low_pct: f64,
    pub volatility_low_min_price: f64,
    pub min_severity: crate::model::Severity,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            price_change_threshold: 10.0,
            opportunity_roi_threshold: 20.0,
            volatility_high_pct: 25.0,
            volatility_low_pct: 2.0,
            volatility_low_min_price: 50.0,
            min_severity: crate::model::Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub min_buy_roi: f64,
    pub sell_growth_pct: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            min_buy_roi: 20.0,
            sell_growth_pct: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceLevel {
    pub name: String,
    pub max_declared_value: f64,
    pub cost_per_card: f64,
    pub turnaround_days: u32,
    pub min_cards: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub service_levels: Vec<ServiceLevel>,
    pub batch_shipping_cost: f64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            service_levels: default_service_levels(),
            batch_shipping_cost: 20.0,
        }
    }
}

pub fn default_service_levels() -> Vec<ServiceLevel> {
    let level = |name: &str, max: f64, cost: f64, days: u32, min_cards: usize| ServiceLevel {
        name: name.to_string(),
        max_declared_value: max,
        cost_per_card: cost,
        turnaround_days: days,
        min_cards,
    };
    vec![
        level("Value", 499.0, 24.99, 65, 20),
        level("Regular", 1_499.0, 74.99, 30, 1),
        level("Express", 2_499.0, 149.0, 15, 1),
        level("Super Express", 4_999.0, 299.0, 5, 1),
        level("Walk Through", 9_999.0, 499.0, 2, 1),
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    pub enabled: bool,
    pub category: String,
    pub window_minutes: u32,
    pub max_bid: f64,
    pub min_profit_score: f64,
    pub ebay_fee_pct: f64,
    pub grading_cost: f64,
    pub grading_shipping: f64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            category: "183454".to_string(),
            window_minutes: 120,
            max_bid: 500.0,
            min_profit_score: 30.0,
            ebay_fee_pct: 0.13,
            grading_cost: 25.0,
            grading_shipping: 10.0,
        }
    }
}

/// A card the auction scanner looks for.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetCard {
    pub name: String,
    #[serde(default)]
    pub set_name: String,
    #[serde(default)]
    pub number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    pub report_dir: String,
    pub check_interval_seconds: u64,
    pub telegram: Option<TelegramConfig>,
    pub costs: CostConfig,
    pub sanitizer: SanitizerConfig,
    pub scoring: ScoringConfig,
    pub alerts: AlertConfig,
    pub market: MarketConfig,
    pub bulk: BulkConfig,
    pub auction: AuctionConfig,
    pub targets: Vec<TargetCard>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "data.db".to_string(),
            report_dir: "reports".to_string(),
            check_interval_seconds: 900,
            telegram: None,
            costs: CostConfig::default(),
            sanitizer: SanitizerConfig::default(),
            scoring: ScoringConfig::default(),
            alerts: AlertConfig::default(),
            market: MarketConfig::default(),
            bulk: BulkConfig::default(),
            auction: AuctionConfig::default(),
            targets: Vec::new(),
        }
    }
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let json = r#"{
            "database_path": "cards.db",
            "costs": { "grading_cost": 19.0 },
            "sanitizer": { "rarity_caps": { "Holo Rare": 7500.0 } },
            "targets": [{ "name": "Charizard", "number": "4/102" }]
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.database_path, "cards.db");
        assert_eq!(config.costs.grading_cost, 19.0);
        assert_eq!(config.costs.selling_fee_pct, 0.13);
        assert_eq!(config.sanitizer.rarity_caps.get(&Rarity::HoloRare), Some(&7500.0));
        assert_eq!(config.sanitizer.rarity_caps.get(&Rarity::Common), Some(&500.0));
        assert_eq!(config.sanitizer.rarity_caps.get(&Rarity::SecretRare), Some(&15_000.0));
        assert_eq!(config.sanitizer.rarity_caps.len(), default_rarity_caps().len());
        assert_eq!(config.bulk.service_levels.len(), 5);
        assert_eq!(config.targets[0].set_name, "");
    }

    #[test]
    fn service_ladder_is_ascending() {
        let levels = default_service_levels();
        assert!(levels
            .windows(2)
            .all(|w| w[0].max_declared_value < w[1].max_declared_value));
    }
}
