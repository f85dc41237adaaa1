use crate::config::{BulkConfig, ServiceLevel};
use crate::model::Card;
use std::fmt::Write;
use tracing::{info, warn};

/// PSA service levels sorted by ascending declared-value bound.
#[derive(Debug, Clone)]
pub struct ServiceLadder {
    levels: Vec<ServiceLevel>,
}

impl ServiceLadder {
    pub fn new(mut levels: Vec<ServiceLevel>) -> Self {
        levels.sort_by(|a, b| a.max_declared_value.total_cmp(&b.max_declared_value));
        Self { levels }
    }

    pub fn from_config(cfg: &BulkConfig) -> Self {
        Self::new(cfg.service_levels.clone())
    }

    pub fn levels(&self) -> &[ServiceLevel] {
        &self.levels
    }

    pub fn top(&self) -> Option<&ServiceLevel> {
        self.levels.last()
    }

    /// Cheapest level covering the declared value, falling back to the top tier.
    pub fn find_service_level(&self, declared_value: f64) -> Option<&ServiceLevel> {
        self.levels
            .iter()
            .find(|l| declared_value <= l.max_declared_value)
            .or_else(|| self.top())
    }
}

/// Coarse grade estimate from the historical PSA 10 rate.
pub fn estimate_grade(psa10_rate: f64) -> f64 {
    if psa10_rate > 0.30 {
        9.7
    } else if psa10_rate > 0.20 {
        9.5
    } else if psa10_rate > 0.10 {
        9.3
    } else {
        9.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionCard {
    pub card: Card,
    pub raw_price: f64,
    pub psa10_price: f64,
    pub psa9_price: Option<f64>,
    pub psa10_rate: f64,
    pub expected_grade: f64,
    /// Probability-weighted resale value across PSA 10 and the fallback grade.
    pub expected_value: f64,
    pub declared_value: f64,
}

impl SubmissionCard {
    pub fn new(card: Card, raw_price: f64, psa10_price: f64, psa9_price: Option<f64>, psa10_rate: f64) -> Self {
        let rate = psa10_rate.clamp(0.0, 1.0);
        let fallback = psa9_price.unwrap_or(raw_price);
        Self {
            card,
            raw_price,
            psa10_price,
            psa9_price,
            psa10_rate: rate,
            expected_grade: estimate_grade(rate),
            expected_value: rate * psa10_price + (1.0 - rate) * fallback,
            declared_value: psa10_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionBatch {
    pub service_level: ServiceLevel,
    pub cards: Vec<SubmissionCard>,
    pub total_value: f64,
    pub grading_cost: f64,
    pub shipping_cost: f64,
    pub total_cost: f64,
    pub estimated_profit: f64,
    pub roi: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionPlan {
    pub batches: Vec<SubmissionBatch>,
    /// Service levels whose batch fell short of the minimum card count.
    pub discarded: Vec<(String, usize)>,
    /// Cards above the top tier's declared-value bound.
    pub oversized: Vec<SubmissionCard>,
}

/// Groups cards into one batch per service level.
pub struct BulkOptimizer<'a> {
    ladder: &'a ServiceLadder,
    batch_shipping_cost: f64,
    selling_fee_pct: f64,
}

impl<'a> BulkOptimizer<'a> {
    pub fn new(ladder: &'a ServiceLadder, batch_shipping_cost: f64, selling_fee_pct: f64) -> Self {
        Self {
            ladder,
            batch_shipping_cost,
            selling_fee_pct,
        }
    }

    pub fn optimize_submission(&self, cards: &[SubmissionCard]) -> SubmissionPlan {
        let mut sorted = cards.to_vec();
        sorted.sort_by(|a, b| b.psa10_price.total_cmp(&a.psa10_price));

        let mut plan = SubmissionPlan::default();
        let mut groups: Vec<Vec<SubmissionCard>> = vec![Vec::new(); self.ladder.levels().len()];
        let ceiling = self.ladder.top().map(|l| l.max_declared_value).unwrap_or(0.0);

        for card in sorted {
            if card.declared_value > ceiling {
                warn!(
                    "{} declared at {:.2} exceeds every service level",
                    card.card.display_name(),
                    card.declared_value
                );
                plan.oversized.push(card);
                continue;
            }
            if let Some(idx) = self
                .ladder
                .levels()
                .iter()
                .position(|l| card.declared_value <= l.max_declared_value)
            {
                groups[idx].push(card);
            }
        }

        for (level, group) in self.ladder.levels().iter().zip(groups) {
            if group.is_empty() {
                continue;
            }
            if group.len() < level.min_cards {
                info!(
                    "Discarding {} batch: {} cards, needs {}",
                    level.name,
                    group.len(),
                    level.min_cards
                );
                plan.discarded.push((level.name.clone(), group.len()));
                continue;
            }
            plan.batches.push(self.build_batch(level, group));
        }
        plan
    }

    fn build_batch(&self, level: &ServiceLevel, cards: Vec<SubmissionCard>) -> SubmissionBatch {
        let total_value: f64 = cards.iter().map(|c| c.declared_value).sum();
        let proceeds: f64 = cards
            .iter()
            .map(|c| c.expected_value * (1.0 - self.selling_fee_pct))
            .sum();
        let raw_cost: f64 = cards.iter().map(|c| c.raw_price).sum();
        let grading_cost = level.cost_per_card * cards.len() as f64;
        let total_cost = raw_cost + grading_cost + self.batch_shipping_cost;
        let estimated_profit = proceeds - total_cost;
        let roi = if total_cost > 0.0 {
            estimated_profit / total_cost * 100.0
        } else {
            0.0
        };

        SubmissionBatch {
            service_level: level.clone(),
            cards,
            total_value,
            grading_cost,
            shipping_cost: self.batch_shipping_cost,
            total_cost,
            estimated_profit,
            roi,
        }
    }
}

/// Plain-text submission form for one batch.
pub fn generate_submission_form(batch: &SubmissionBatch) -> String {
    let level = &batch.service_level;
    let mut form = String::new();
    let _ = writeln!(form, "PSA SUBMISSION FORM");
    let _ = writeln!(form, "Service level: {} (max declared ${:.2})", level.name, level.max_declared_value);
    let _ = writeln!(form, "Turnaround: {} days", level.turnaround_days);
    let _ = writeln!(form, "Cards: {}", batch.cards.len());
    let _ = writeln!(form, "{}", "-".repeat(60));
    for (i, c) in batch.cards.iter().enumerate() {
        let _ = writeln!(
            form,
            "{:>3}. {:<32} {:<16} declared ${:>9.2}  est. grade {:.1}",
            i + 1,
            c.card.display_name(),
            c.card.set_name,
            c.declared_value,
            c.expected_grade
        );
    }
    let _ = writeln!(form, "{}", "-".repeat(60));
    let _ = writeln!(form, "Total declared value: ${:.2}", batch.total_value);
    let _ = writeln!(form, "Grading fees: ${:.2}", batch.grading_cost);
    let _ = writeln!(form, "Shipping: ${:.2}", batch.shipping_cost);
    let _ = writeln!(form, "Total cost: ${:.2}", batch.total_cost);
    let _ = writeln!(form, "Estimated profit: ${:.2} (ROI {:.1}%)", batch.estimated_profit, batch.roi);
    form
}
