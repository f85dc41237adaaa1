use crate::config::{CostConfig, ScoringConfig};
use crate::model::{HistoryEntry, Row, ScoredRow};
use crate::utils::{contains_japanese, parse_release_date};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// PSA 9 / PSA 10 ratio above which the grading premium is too thin.
pub const THIN_PREMIUM_RATIO: f64 = 0.75;
const VOLATILITY_LIMIT: f64 = 0.2;
const VOLATILITY_PENALTY: f64 = 0.9;
const QUALITY_MIN_GRADED: u32 = 100;

/// Scarcity bonus keyed on the PSA 10 population.
pub fn population_bonus(psa10_pop: u32) -> f64 {
    match psa10_pop {
        0 => 0.0,
        1..=10 => 15.0,
        11..=50 => 10.0,
        51..=200 => 5.0,
        201..=500 => 2.0,
        501..=1000 => 1.0,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossgradeCandidate {
    pub row: Row,
    /// "CGC 9.5" or "BGS 9.5", whichever slab is cheaper.
    pub source_grade: &'static str,
    pub source_price: f64,
    pub psa10_price: f64,
    pub profit: f64,
    pub roi: f64,
}

/// Composite opportunity score and ranking.
pub struct ScoringEngine {
    config: ScoringConfig,
    costs: CostConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, costs: CostConfig) -> Self {
        Self { config, costs }
    }

    /// Applies the row filters and computes the score; `None` if filtered out.
    pub fn score_row(&self, row: &Row) -> Option<ScoredRow> {
        let name = row.card.display_name();
        let (Some(raw), Some(psa10)) = (row.prices.raw, row.prices.psa10) else {
            debug!("{}: missing raw or PSA 10 price", name);
            return None;
        };
        if raw < self.config.min_raw_price {
            debug!("{}: raw {:.2} below minimum", name, raw);
            return None;
        }
        if psa10 <= raw {
            debug!("{}: no grading spread", name);
            return None;
        }
        if psa10 - raw < self.config.min_delta {
            debug!("{}: delta {:.2} below minimum", name, psa10 - raw);
            return None;
        }
        if let Some(psa9) = row.prices.psa9 {
            if !self.config.allow_thin_premium && psa9 / psa10 > THIN_PREMIUM_RATIO {
                debug!("{}: thin premium ({:.2})", name, psa9 / psa10);
                return None;
            }
        }

        let total_cost = self.costs.acquisition_cost(raw);
        let selling_fees = psa10 * self.costs.selling_fee_pct;
        let net_profit = psa10 - total_cost - selling_fees;
        let break_even = total_cost / (1.0 - self.costs.selling_fee_pct);

        let mut why = vec![format!("profit {:.2}", net_profit)];
        let mut score = net_profit;

        if let Some(psa9) = row.prices.psa9 {
            let lift = (1.0 - psa9 / psa10) * 10.0;
            score += lift;
            why.push(format!("+ lift {:.2}", lift));
        }
        if let Some(pop) = row.population {
            let bonus = population_bonus(pop.psa10);
            if bonus > 0.0 {
                score += bonus;
                why.push(format!("+ pop {:.0}", bonus));
            }
            if pop.total_graded >= QUALITY_MIN_GRADED {
                let quality = pop.psa10_rate() * 5.0;
                score += quality;
                why.push(format!("+ quality {:.2}", quality));
            }
        }
        if contains_japanese(&row.card.name) {
            score *= self.config.japanese_weight;
            why.push(format!("x jp {:.2}", self.config.japanese_weight));
        }
        if self.config.track_volatility && row.volatility.is_some_and(|v| v > VOLATILITY_LIMIT) {
            score *= VOLATILITY_PENALTY;
            why.push(format!("x vol {:.2}", VOLATILITY_PENALTY));
        }

        Some(ScoredRow {
            row: row.clone(),
            score,
            break_even_usd: break_even,
            net_profit_usd: net_profit,
            why: self.config.explain.then(|| why.join(" ")),
        })
    }

    /// Sets older than the configured maximum age, judged by their release date.
    pub fn expired_sets(&self, rows: &[Row], now: DateTime<Utc>) -> HashSet<String> {
        let Some(max_age) = self.config.max_set_age_years else {
            return HashSet::new();
        };
        let mut release: HashMap<&str, chrono::NaiveDate> = HashMap::new();
        for row in rows {
            if let Some(date) = row.card.release_date.as_deref().and_then(parse_release_date) {
                release.entry(row.card.set_name.as_str()).or_insert(date);
            }
        }
        release
            .into_iter()
            .filter(|(_, date)| {
                let age_years = (now.date_naive() - *date).num_days() as f64 / 365.25;
                age_years > max_age
            })
            .map(|(set, _)| set.to_string())
            .collect()
    }

    /// Filters, scores, sorts by score and keeps the top N.
    pub fn rank(&self, rows: &[Row], now: DateTime<Utc>) -> Vec<ScoredRow> {
        let expired = self.expired_sets(rows, now);
        let mut scored: Vec<ScoredRow> = rows
            .iter()
            .filter(|r| !expired.contains(&r.card.set_name))
            .filter_map(|r| self.score_row(r))
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.config.top_n);
        info!("Ranked {} of {} rows", scored.len(), rows.len());
        scored
    }

    /// Slabs graded 9.5 by CGC or BGS that would profit from a PSA 10 crossover.
    pub fn crossgrade_candidates(&self, rows: &[Row]) -> Vec<CrossgradeCandidate> {
        let mut candidates: Vec<CrossgradeCandidate> = rows
            .iter()
            .filter_map(|row| {
                let psa10 = row.prices.psa10?;
                let (source_grade, source_price) = [("CGC 9.5", row.prices.cgc95), ("BGS 9.5", row.prices.bgs95)]
                    .into_iter()
                    .filter_map(|(label, price)| price.map(|p| (label, p)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))?;
                let cost = self.costs.acquisition_cost(source_price);
                let profit = psa10 * (1.0 - self.costs.selling_fee_pct) - cost;
                (profit > 0.0).then(|| CrossgradeCandidate {
                    row: row.clone(),
                    source_grade,
                    source_price,
                    psa10_price: psa10,
                    profit,
                    roi: profit / cost * 100.0,
                })
            })
            .collect();
        candidates.sort_by(|a, b| b.profit.total_cmp(&a.profit));
        candidates
    }
}

/// History log entries for one ranking run.
pub fn to_history_entries(scored: &[ScoredRow], now: DateTime<Utc>) -> Vec<HistoryEntry> {
    scored
        .iter()
        .filter_map(|s| {
            let raw = s.row.prices.raw?;
            let psa10 = s.row.prices.psa10?;
            Some(HistoryEntry {
                timestamp: now,
                card: s.row.card.clone(),
                raw_price: raw,
                psa10_price: psa10,
                delta_usd: psa10 - raw,
                score: s.score,
                notes: s.why.clone().unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Card, CardPrices, Population, Rarity};
    use chrono::TimeZone;

    fn row(name: &str, raw: f64, psa9: Option<f64>, psa10: f64) -> Row {
        Row {
            card: Card {
                name: name.to_string(),
                number: "25".into(),
                set_name: "Base Set".into(),
                rarity: Rarity::Rare,
                release_date: Some("1999-01-09".into()),
            },
            prices: CardPrices {
                raw: Some(raw),
                psa9,
                psa10: Some(psa10),
                ..Default::default()
            },
            population: None,
            listing_url: None,
            volatility: None,
        }
    }

    fn no_fee_costs() -> CostConfig {
        CostConfig {
            selling_fee_pct: 0.0,
            grading_cost: 20.0,
            shipping_cost: 5.0,
        }
    }

    fn engine(config: ScoringConfig) -> ScoringEngine {
        ScoringEngine::new(config, no_fee_costs())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn population_steps() {
        assert_eq!(population_bonus(0), 0.0);
        assert_eq!(population_bonus(10), 15.0);
        assert_eq!(population_bonus(50), 10.0);
        assert_eq!(population_bonus(200), 5.0);
        assert_eq!(population_bonus(500), 2.0);
        assert_eq!(population_bonus(1000), 1.0);
        assert_eq!(population_bonus(1001), 0.0);
    }

    #[test]
    fn filters_reject_bad_rows() {
        let e = engine(ScoringConfig::default());
        assert!(e.score_row(&row("Cheap", 2.0, None, 300.0)).is_none());
        assert!(e.score_row(&row("Inverted", 100.0, None, 90.0)).is_none());
        assert!(e.score_row(&row("Narrow", 100.0, None, 120.0)).is_none());
        assert!(e.score_row(&row("Thin", 100.0, Some(240.0), 300.0)).is_none());

        let mut missing = row("Missing", 100.0, None, 300.0);
        missing.prices.psa10 = None;
        assert!(e.score_row(&missing).is_none());

        let lenient = engine(ScoringConfig { allow_thin_premium: true, ..Default::default() });
        assert!(lenient.score_row(&row("Thin", 100.0, Some(240.0), 300.0)).is_some());
    }

    #[test]
    fn score_components_add_up() {
        let e = engine(ScoringConfig { explain: true, ..Default::default() });
        let mut r = row("Pikachu", 100.0, Some(150.0), 300.0);
        r.population = Some(Population { psa10: 40, total_graded: 200 });
        let scored = e.score_row(&r).unwrap();
        // profit 300 - 125 = 175, lift 5, pop 10, quality 0.2 * 5 = 1
        assert!((scored.net_profit_usd - 175.0).abs() < 1e-9);
        assert!((scored.score - 191.0).abs() < 1e-9);
        assert!((scored.break_even_usd - 125.0).abs() < 1e-9);
        let why = scored.why.unwrap();
        assert!(why.contains("pop 10"));
        assert!(why.contains("quality 1.00"));
    }

    #[test]
    fn japanese_weight_and_volatility_penalty() {
        let e = engine(ScoringConfig {
            japanese_weight: 1.2,
            track_volatility: true,
            ..Default::default()
        });
        let mut r = row("ピカチュウ", 100.0, None, 300.0);
        r.volatility = Some(0.5);
        let scored = e.score_row(&r).unwrap();
        assert!((scored.score - 175.0 * 1.2 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn rank_sorts_truncates_and_drops_old_sets() {
        let e = engine(ScoringConfig { top_n: 2, ..Default::default() });
        let rows = vec![
            row("A", 100.0, None, 300.0),
            row("B", 100.0, None, 500.0),
            row("C", 100.0, None, 400.0),
        ];
        let ranked = e.rank(&rows, now());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].row.card.name, "B");
        assert_eq!(ranked[1].row.card.name, "C");

        let strict = engine(ScoringConfig { max_set_age_years: Some(10.0), ..Default::default() });
        assert!(strict.rank(&rows, now()).is_empty());
    }

    #[test]
    fn crossgrade_uses_cheapest_slab() {
        let e = engine(ScoringConfig::default());
        let mut r = row("Lugia", 100.0, None, 900.0);
        r.prices.cgc95 = Some(500.0);
        r.prices.bgs95 = Some(450.0);
        let mut losing = row("Ho-Oh", 100.0, None, 300.0);
        losing.prices.cgc95 = Some(400.0);

        let found = e.crossgrade_candidates(&[r, losing]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_grade, "BGS 9.5");
        assert!((found[0].profit - (900.0 - 475.0)).abs() < 1e-9);
    }

    #[test]
    fn history_entries_from_scored_rows() {
        let e = engine(ScoringConfig::default());
        let ranked = e.rank(&[row("A", 100.0, None, 300.0)], now());
        let entries = to_history_entries(&ranked, now());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].delta_usd, 200.0);
        assert_eq!(entries[0].timestamp, now());
    }
}
