use crate::config::{AlertConfig, CostConfig};
use crate::model::{Alert, AlertType, CardKey, Severity, Snapshot};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::info;

/// Price movement of one card between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDelta {
    pub card_key: CardKey,
    pub card_name: String,
    pub timestamp: DateTime<Utc>,
    pub raw_old: Option<f64>,
    pub raw_new: Option<f64>,
    pub psa10_old: Option<f64>,
    pub psa10_new: Option<f64>,
}

impl PriceDelta {
    pub fn raw_pct(&self) -> Option<f64> {
        pct_change(self.raw_old?, self.raw_new?)
    }

    pub fn psa10_pct(&self) -> Option<f64> {
        pct_change(self.psa10_old?, self.psa10_new?)
    }
}

fn pct_change(old: f64, new: f64) -> Option<f64> {
    (old > 0.0).then(|| (new - old) / old * 100.0)
}

fn details(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Stateless alert classifier over price deltas and snapshot pairs.
pub struct AlertEngine {
    config: AlertConfig,
    costs: CostConfig,
}

impl AlertEngine {
    pub fn new(config: AlertConfig, costs: CostConfig) -> Self {
        Self { config, costs }
    }

    /// Deltas for every card present in both snapshots.
    pub fn compute_deltas(old: &Snapshot, new: &Snapshot) -> Vec<PriceDelta> {
        new.cards
            .iter()
            .filter_map(|(key, current)| {
                let previous = old.cards.get(key)?;
                Some(PriceDelta {
                    card_key: key.clone(),
                    card_name: current.card.display_name(),
                    timestamp: new.timestamp,
                    raw_old: previous.prices.raw,
                    raw_new: current.prices.raw,
                    psa10_old: previous.prices.psa10,
                    psa10_new: current.prices.psa10,
                })
            })
            .collect()
    }

    /// PRICE_DROP on raw and PRICE_INCREASE on PSA 10, sharing one threshold.
    pub fn generate_alerts(&self, deltas: &[PriceDelta]) -> Vec<Alert> {
        let threshold = self.config.price_change_threshold;
        let mut alerts = Vec::new();

        for delta in deltas {
            if let Some(pct) = delta.raw_pct().filter(|p| *p <= -threshold) {
                alerts.push(Alert {
                    alert_type: AlertType::PriceDrop,
                    severity: Severity::from_pct(pct),
                    card_key: delta.card_key.clone(),
                    card_name: delta.card_name.clone(),
                    message: format!(
                        "{} raw price dropped {:.1}% to ${:.2}",
                        delta.card_name,
                        pct.abs(),
                        delta.raw_new.unwrap_or_default()
                    ),
                    details: details(vec![
                        ("old_price", json!(delta.raw_old)),
                        ("new_price", json!(delta.raw_new)),
                        ("change_pct", json!(pct)),
                    ]),
                    timestamp: delta.timestamp,
                    action_items: vec![
                        "Check raw listings for underpriced copies".to_string(),
                        "Re-run ROI with the new raw price".to_string(),
                    ],
                });
            }

            if let Some(pct) = delta.psa10_pct().filter(|p| *p >= threshold) {
                alerts.push(Alert {
                    alert_type: AlertType::PriceIncrease,
                    severity: Severity::from_pct(pct),
                    card_key: delta.card_key.clone(),
                    card_name: delta.card_name.clone(),
                    message: format!(
                        "{} PSA 10 rose {:.1}% to ${:.2}",
                        delta.card_name,
                        pct,
                        delta.psa10_new.unwrap_or_default()
                    ),
                    details: details(vec![
                        ("old_price", json!(delta.psa10_old)),
                        ("new_price", json!(delta.psa10_new)),
                        ("change_pct", json!(pct)),
                    ]),
                    timestamp: delta.timestamp,
                    action_items: vec![
                        "Consider submitting raw copies on hand".to_string(),
                        "List existing PSA 10 copies".to_string(),
                    ],
                });
            }
        }

        self.finalize(alerts)
    }

    /// True only for an upward crossing of the opportunity threshold.
    pub fn opportunity_crossed(&self, old_roi: f64, new_roi: f64) -> bool {
        let threshold = self.config.opportunity_roi_threshold;
        old_roi < threshold && new_roi >= threshold
    }

    pub fn check_new_opportunities(&self, old: &Snapshot, new: &Snapshot) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for (key, current) in &new.cards {
            let Some(previous) = old.cards.get(key) else {
                continue;
            };
            let (Some(old_raw), Some(old_psa10), Some(raw), Some(psa10)) = (
                previous.prices.raw,
                previous.prices.psa10,
                current.prices.raw,
                current.prices.psa10,
            ) else {
                continue;
            };

            let old_roi = self.costs.roi(old_raw, old_psa10);
            let new_roi = self.costs.roi(raw, psa10);
            if !self.opportunity_crossed(old_roi, new_roi) {
                continue;
            }

            let severity = if new_roi >= 100.0 {
                Severity::High
            } else if new_roi >= 50.0 {
                Severity::Medium
            } else {
                Severity::Low
            };
            let name = current.card.display_name();
            alerts.push(Alert {
                alert_type: AlertType::NewOpportunity,
                severity,
                card_key: key.clone(),
                card_name: name.clone(),
                message: format!("{} ROI crossed {:.0}% (now {:.1}%)", name, self.config.opportunity_roi_threshold, new_roi),
                details: details(vec![
                    ("old_roi", json!(old_roi)),
                    ("new_roi", json!(new_roi)),
                    ("raw_price", json!(raw)),
                    ("psa10_price", json!(psa10)),
                ]),
                timestamp: new.timestamp,
                action_items: vec![
                    format!("Buy raw at or below ${:.2}", raw),
                    "Inspect centering and surface before purchase".to_string(),
                ],
            });
        }
        self.finalize(alerts)
    }

    /// Spike / calm detection from the PSA 10 change between two snapshots.
    pub fn check_volatility_alerts(&self, old: &Snapshot, new: &Snapshot) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for delta in Self::compute_deltas(old, new) {
            let (Some(old_price), Some(change)) = (delta.psa10_old, delta.psa10_pct()) else {
                continue;
            };
            let change = change.abs();

            let (alert_type, severity, message, action) = if change > self.config.volatility_high_pct {
                (
                    AlertType::VolatilitySpike,
                    Severity::from_pct(change),
                    format!("{} PSA 10 moved {:.1}% in one poll", delta.card_name, change),
                    "Wait for the price to settle before acting",
                )
            } else if change < self.config.volatility_low_pct
                && old_price >= self.config.volatility_low_min_price
            {
                (
                    AlertType::VolatilityLow,
                    Severity::Low,
                    format!("{} PSA 10 is stable ({:.1}% move)", delta.card_name, change),
                    "Stable pricing: safe window for submissions",
                )
            } else {
                continue;
            };

            alerts.push(Alert {
                alert_type,
                severity,
                card_key: delta.card_key.clone(),
                card_name: delta.card_name.clone(),
                message,
                details: details(vec![
                    ("old_price", json!(delta.psa10_old)),
                    ("new_price", json!(delta.psa10_new)),
                    ("change_pct", json!(change)),
                ]),
                timestamp: delta.timestamp,
                action_items: vec![action.to_string()],
            });
        }
        self.finalize(alerts)
    }

    /// Every check for a pair of consecutive snapshots.
    pub fn scan(&self, old: &Snapshot, new: &Snapshot) -> Vec<Alert> {
        let mut alerts = self.generate_alerts(&Self::compute_deltas(old, new));
        alerts.extend(self.check_new_opportunities(old, new));
        alerts.extend(self.check_volatility_alerts(old, new));
        let alerts = self.finalize(alerts);
        info!("Alert scan produced {} alerts", alerts.len());
        alerts
    }

    /// Drops alerts below the minimum severity, then orders by severity and recency.
    pub fn finalize(&self, alerts: Vec<Alert>) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = alerts
            .into_iter()
            .filter(|a| a.severity >= self.config.min_severity)
            .collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Card, CardPriceState, CardPrices, Rarity};
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn no_costs() -> CostConfig {
        CostConfig {
            selling_fee_pct: 0.0,
            grading_cost: 0.0,
            shipping_cost: 0.0,
        }
    }

    fn engine(config: AlertConfig) -> AlertEngine {
        AlertEngine::new(config, no_costs())
    }

    fn snapshot(day: i64, cards: &[(&str, f64, f64)]) -> Snapshot {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::days(day);
        let cards: BTreeMap<_, _> = cards
            .iter()
            .map(|(name, raw, psa10)| {
                let card = Card {
                    name: name.to_string(),
                    number: "7".into(),
                    set_name: "Fossil".into(),
                    rarity: Rarity::Rare,
                    release_date: None,
                };
                let state = CardPriceState {
                    card: card.clone(),
                    prices: CardPrices { raw: Some(*raw), psa10: Some(*psa10), ..Default::default() },
                    population: None,
                    listing_url: None,
                };
                (card.key(), state)
            })
            .collect();
        Snapshot { timestamp, cards }
    }

    fn delta(name: &str, raw: (f64, f64), psa10: (f64, f64), day: i64) -> PriceDelta {
        PriceDelta {
            card_key: CardKey::new("7", name),
            card_name: name.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::days(day),
            raw_old: Some(raw.0),
            raw_new: Some(raw.1),
            psa10_old: Some(psa10.0),
            psa10_new: Some(psa10.1),
        }
    }

    #[test]
    fn drop_and_increase_with_severity() {
        let e = engine(AlertConfig::default());
        let alerts = e.generate_alerts(&[
            delta("Gengar", (100.0, 65.0), (500.0, 500.0), 0),
            delta("Lapras", (100.0, 100.0), (500.0, 590.0), 0),
            delta("Ditto", (100.0, 89.0), (500.0, 500.0), 0),
            delta("Quiet", (100.0, 95.0), (500.0, 505.0), 0),
        ]);
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].alert_type, AlertType::PriceDrop);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[1].alert_type, AlertType::PriceIncrease);
        assert_eq!(alerts[1].severity, Severity::Medium);
        assert_eq!(alerts[2].severity, Severity::Low);
    }

    #[test]
    fn opportunity_fires_only_on_upward_crossing() {
        let e = engine(AlertConfig::default());
        // no costs: ROI = (psa10 - raw) / raw
        let old = snapshot(0, &[("Eevee", 100.0, 115.0)]);
        let new = snapshot(1, &[("Eevee", 100.0, 125.0)]);

        let alerts = e.check_new_opportunities(&old, &new);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::NewOpportunity);
        assert_eq!(alerts[0].card_key, CardKey::new("7", "Eevee"));

        assert!(e.check_new_opportunities(&new, &old).is_empty());
        assert!(e.opportunity_crossed(15.0, 25.0));
        assert!(!e.opportunity_crossed(25.0, 15.0));
        assert!(!e.opportunity_crossed(25.0, 30.0));
    }

    #[test]
    fn volatility_spike_and_low_respect_price_floor() {
        let e = engine(AlertConfig::default());
        let old = snapshot(0, &[("Spiky", 10.0, 100.0), ("Calm", 10.0, 200.0), ("Cheap", 1.0, 20.0)]);
        let new = snapshot(1, &[("Spiky", 10.0, 140.0), ("Calm", 10.0, 201.0), ("Cheap", 1.0, 20.1)]);
        let alerts = e.check_volatility_alerts(&old, &new);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].alert_type, AlertType::VolatilitySpike);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[1].alert_type, AlertType::VolatilityLow);
        assert_eq!(alerts[1].card_key, CardKey::new("7", "Calm"));
    }

    #[test]
    fn min_severity_filter_and_recency_tiebreak() {
        let e = engine(AlertConfig {
            min_severity: Severity::Medium,
            ..Default::default()
        });
        let alerts = e.generate_alerts(&[
            delta("Older", (100.0, 80.0), (500.0, 500.0), 0),
            delta("Newer", (100.0, 80.0), (500.0, 500.0), 3),
            delta("Minor", (100.0, 88.0), (500.0, 500.0), 5),
        ]);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].card_name, "Newer");
        assert_eq!(alerts[1].card_name, "Older");
    }

    #[test]
    fn scan_combines_all_checks() {
        let e = engine(AlertConfig::default());
        let old = snapshot(0, &[("Eevee", 100.0, 115.0)]);
        let new = snapshot(1, &[("Eevee", 100.0, 125.0)]);
        let kinds: Vec<_> = e.scan(&old, &new).iter().map(|a| a.alert_type).collect();
        // +8.7% PSA 10: no increase alert, no spike, no calm
        assert_eq!(kinds, vec![AlertType::NewOpportunity]);
    }
}
