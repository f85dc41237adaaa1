use crate::analyzer::history::{SeasonalAnalysis, seasonal_from_points};
use crate::analyzer::trend::TrendCalculator;
use crate::config::{CostConfig, MarketConfig};
use crate::model::{Action, CardKey, PriceSample, Snapshot, Trend};
use tracing::{debug, info};

/// Share of the most recent raw points used to pick an entry price.
const ENTRY_WINDOW: f64 = 0.3;
/// How far back (as a share of the series) growth is measured for SELL.
const GROWTH_LOOKBACK: f64 = 0.7;
const ENTRY_MARKUP: f64 = 1.02;

#[derive(Debug, Clone, PartialEq)]
pub struct MarketRecommendation {
    pub card_key: CardKey,
    pub card_name: String,
    pub action: Action,
    pub confidence: f64,
    pub trend: Trend,
    pub entry_price: Option<f64>,
    pub target_price: Option<f64>,
    pub current_raw: f64,
    pub current_psa10: f64,
    pub roi: f64,
    pub reasoning: String,
}

/// Buy/sell/hold timing from multi-snapshot histories.
pub struct MarketAnalyzer {
    config: MarketConfig,
    costs: CostConfig,
}

impl MarketAnalyzer {
    pub fn new(config: MarketConfig, costs: CostConfig) -> Self {
        Self { config, costs }
    }

    /// Classifies one card's history. Needs at least two raw and two PSA 10
    /// points; returns HOLD when no rule matches.
    pub fn analyze_card(
        &self,
        key: &CardKey,
        card_name: &str,
        history: &[PriceSample],
    ) -> Option<MarketRecommendation> {
        let mut history = history.to_vec();
        history.sort_by_key(|s| s.timestamp);

        let raw: Vec<f64> = history.iter().filter_map(|s| s.raw).collect();
        let psa10: Vec<f64> = history.iter().filter_map(|s| s.psa10).collect();
        if raw.len() < 2 || psa10.len() < 2 {
            debug!("Not enough history for {} ({} raw, {} psa10)", key, raw.len(), psa10.len());
            return None;
        }

        let raw_trend = TrendCalculator::series_trend(&raw);
        let psa10_trend = TrendCalculator::series_trend(&psa10);
        let current_raw = *raw.last()?;
        let current_psa10 = *psa10.last()?;

        let mut rec = MarketRecommendation {
            card_key: key.clone(),
            card_name: card_name.to_string(),
            action: Action::Hold,
            confidence: 50.0,
            trend: Trend::Flat,
            entry_price: None,
            target_price: None,
            current_raw,
            current_psa10,
            roi: self.costs.roi(current_raw, current_psa10),
            reasoning: "No actionable signal".to_string(),
        };

        if raw_trend == Trend::Down && psa10_trend != Trend::Down {
            rec.action = Action::Buy;
            rec.trend = raw_trend;
            rec.confidence = TrendCalculator::confidence(&raw, &psa10);
            rec.entry_price = Some(entry_price(&raw));
            rec.reasoning = "Raw price falling while PSA 10 holds".to_string();
        } else if psa10_trend == Trend::Up && raw_trend != Trend::Up {
            rec.action = Action::Submit;
            rec.trend = psa10_trend;
            rec.confidence = TrendCalculator::confidence(&psa10, &raw);
            rec.reasoning = "PSA 10 rising faster than raw; grade existing copies".to_string();
        } else if psa10_trend == Trend::Up && recent_growth(&psa10) > self.config.sell_growth_pct {
            rec.action = Action::Sell;
            rec.trend = psa10_trend;
            rec.confidence = TrendCalculator::confidence(&psa10, &raw);
            rec.target_price = Some(current_psa10);
            rec.reasoning = format!(
                "PSA 10 up {:.1}% over the recent window",
                recent_growth(&psa10)
            );
        }

        Some(rec)
    }

    /// Runs `analyze_card` for every card in the latest snapshot and keeps
    /// actionable results, most confident first. BUY also needs enough ROI.
    pub fn analyze_market(&self, snapshots: &[Snapshot]) -> Vec<MarketRecommendation> {
        let Some(latest) = snapshots.iter().max_by_key(|s| s.timestamp) else {
            return Vec::new();
        };

        let mut recommendations: Vec<MarketRecommendation> = latest
            .cards
            .iter()
            .filter_map(|(key, state)| {
                let samples = Snapshot::samples_for(snapshots, key);
                self.analyze_card(key, &state.card.display_name(), &samples)
            })
            .filter(|rec| match rec.action {
                Action::Hold => false,
                Action::Buy => rec.roi > self.config.min_buy_roi,
                Action::Submit | Action::Sell => true,
            })
            .collect();

        recommendations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        info!(
            "Market analysis: {} actionable cards out of {}",
            recommendations.len(),
            latest.cards.len()
        );
        recommendations
    }

    /// Monthly PSA 10 averages for one card across all snapshots.
    pub fn seasonal_analysis(&self, snapshots: &[Snapshot], key: &CardKey) -> Option<SeasonalAnalysis> {
        let points: Vec<_> = Snapshot::samples_for(snapshots, key)
            .into_iter()
            .filter_map(|s| s.psa10.map(|p| (s.timestamp, p)))
            .collect();
        seasonal_from_points(&points)
    }
}

fn entry_price(raw: &[f64]) -> f64 {
    let window = ((raw.len() as f64 * ENTRY_WINDOW).ceil() as usize).clamp(1, raw.len());
    let recent_min = raw[raw.len() - window..]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    recent_min * ENTRY_MARKUP
}

fn recent_growth(series: &[f64]) -> f64 {
    let last_idx = series.len() - 1;
    let back = ((series.len() as f64 * GROWTH_LOOKBACK) as usize).min(last_idx);
    let base = series[last_idx - back];
    if base <= 0.0 {
        return 0.0;
    }
    (series[last_idx] - base) / base * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Card, CardPriceState, CardPrices, Rarity};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn samples(raw: &[f64], psa10: &[f64]) -> Vec<PriceSample> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        raw.iter()
            .zip(psa10)
            .enumerate()
            .map(|(i, (r, p))| PriceSample {
                timestamp: start + Duration::days(i as i64),
                raw: Some(*r),
                psa9: None,
                psa95: None,
                psa10: Some(*p),
                bgs10: None,
            })
            .collect()
    }

    fn analyzer() -> MarketAnalyzer {
        MarketAnalyzer::new(MarketConfig::default(), CostConfig::default())
    }

    fn key() -> CardKey {
        CardKey::new("4", "Charizard")
    }

    #[test]
    fn raw_down_psa_flat_is_buy() {
        let history = samples(&[100.0, 92.0, 85.0, 80.0, 74.0], &[600.0, 600.0, 601.0, 600.0, 600.0]);
        let rec = analyzer().analyze_card(&key(), "Charizard", &history).unwrap();
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.trend, Trend::Down);
        // last 30% of 5 points -> 2 points, min 74
        assert!((rec.entry_price.unwrap() - 74.0 * 1.02).abs() < 1e-9);
    }

    #[test]
    fn psa_up_raw_flat_is_submit() {
        let history = samples(&[50.0, 50.0, 50.0, 50.0], &[300.0, 340.0, 380.0, 420.0]);
        let rec = analyzer().analyze_card(&key(), "Charizard", &history).unwrap();
        assert_eq!(rec.action, Action::Submit);
    }

    #[test]
    fn both_up_with_strong_growth_is_sell() {
        let history = samples(&[50.0, 60.0, 70.0, 80.0], &[300.0, 340.0, 380.0, 420.0]);
        let rec = analyzer().analyze_card(&key(), "Charizard", &history).unwrap();
        assert_eq!(rec.action, Action::Sell);
        assert_eq!(rec.target_price, Some(420.0));
    }

    #[test]
    fn flat_history_is_hold() {
        let history = samples(&[50.0, 50.0, 50.0], &[300.0, 300.0, 300.0]);
        let rec = analyzer().analyze_card(&key(), "Charizard", &history).unwrap();
        assert_eq!(rec.action, Action::Hold);
        assert_eq!(rec.confidence, 50.0);
        assert_eq!(rec.trend, Trend::Flat);
    }

    #[test]
    fn single_point_gives_no_recommendation() {
        let history = samples(&[50.0], &[300.0]);
        assert!(analyzer().analyze_card(&key(), "Charizard", &history).is_none());
    }

    fn snapshot(day: i64, cards: &[(&str, f64, f64)]) -> Snapshot {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(day);
        let cards: BTreeMap<_, _> = cards
            .iter()
            .map(|(name, raw, psa10)| {
                let card = Card {
                    name: name.to_string(),
                    number: "1".into(),
                    set_name: "Base".into(),
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

    #[test]
    fn market_scan_requires_roi_for_buy() {
        let snapshots = vec![
            snapshot(0, &[("Cheap", 100.0, 120.0), ("Juicy", 100.0, 400.0), ("Still", 10.0, 50.0)]),
            snapshot(1, &[("Cheap", 90.0, 120.0), ("Juicy", 90.0, 400.0), ("Still", 10.0, 50.0)]),
            snapshot(2, &[("Cheap", 80.0, 120.0), ("Juicy", 80.0, 400.0), ("Still", 10.0, 50.0)]),
        ];
        let recs = analyzer().analyze_market(&snapshots);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].card_name, "Juicy #1");
        assert_eq!(recs[0].action, Action::Buy);
    }

    #[test]
    fn market_results_sorted_by_confidence() {
        let snapshots = vec![
            snapshot(0, &[("Diverge", 10.0, 300.0), ("Submit", 50.0, 300.0)]),
            snapshot(1, &[("Diverge", 9.0, 330.0), ("Submit", 50.0, 340.0)]),
            snapshot(2, &[("Diverge", 8.0, 360.0), ("Submit", 50.0, 380.0)]),
        ];
        let recs = analyzer().analyze_market(&snapshots);
        assert_eq!(recs.len(), 2);
        assert!(recs[0].confidence >= recs[1].confidence);
        assert_eq!(recs[0].action, Action::Buy);
    }
}
