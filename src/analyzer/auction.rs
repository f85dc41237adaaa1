use crate::config::{AuctionConfig, TargetCard};
use crate::model::{Auction, AuctionError};
use crate::scraper::AuctionSource;
use crate::utils::contains_japanese;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Auctions closer than this to ending are skipped.
pub const MIN_MINUTES_LEFT: i64 = 10;

const CHARACTER_PREMIUMS: &[(&str, f64)] = &[
    ("charizard", 1.5),
    ("umbreon", 1.3),
    ("lugia", 1.3),
    ("rayquaza", 1.25),
    ("pikachu", 1.2),
    ("mewtwo", 1.2),
    ("blastoise", 1.2),
    ("gengar", 1.15),
    ("venusaur", 1.15),
];
const HOLO_PREMIUM: f64 = 1.3;
const RARE_PREMIUM: f64 = 1.1;
const EX_PREMIUM: f64 = 1.2;
const FIRST_EDITION_PREMIUM: f64 = 2.0;
const JAPANESE_PREMIUM: f64 = 1.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuctionOpportunity {
    pub auction: Auction,
    pub target_name: String,
    pub match_strength: f64,
    pub estimated_value: f64,
    pub total_cost: f64,
    pub profit_score: f64,
    pub minutes_left: i64,
    pub risk: RiskLevel,
    pub risk_factors: Vec<String>,
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '/')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// How well an auction title matches a target card. The card name is
/// required; set words and the card number only strengthen the match.
pub fn match_strength(title: &str, target: &TargetCard) -> Option<f64> {
    let lowered = title.to_lowercase();
    if target.name.trim().is_empty() || !lowered.contains(&target.name.trim().to_lowercase()) {
        return None;
    }
    let title_words = words(title);
    let mut strength = 1.0;

    let set_words: Vec<String> = words(&target.set_name)
        .into_iter()
        .filter(|w| w.len() > 2)
        .collect();
    if !set_words.is_empty() {
        let overlap = set_words.iter().filter(|w| title_words.contains(w)).count();
        strength += 0.5 * overlap as f64 / set_words.len() as f64;
    }

    let number = target.number.trim().to_lowercase();
    let has_number = !number.is_empty()
        && title_words
            .iter()
            .any(|w| *w == number || w.split('/').next() == Some(number.as_str()));
    if has_number {
        strength += 0.5;
    } else if title_words.iter().any(|w| w == "pokemon") {
        strength += 0.1;
    }

    Some(strength)
}

/// Keyword multiplier applied to the current bid. Every matching premium compounds.
pub fn value_multiplier(title: &str) -> f64 {
    let lowered = title.to_lowercase();
    let title_words = words(title);
    let mut multiplier = 1.0;

    for (name, premium) in CHARACTER_PREMIUMS {
        if title_words.iter().any(|w| w == name) {
            multiplier *= premium;
        }
    }
    if title_words.iter().any(|w| w.starts_with("holo")) {
        multiplier *= HOLO_PREMIUM;
    }
    if title_words.iter().any(|w| w == "rare") {
        multiplier *= RARE_PREMIUM;
    }
    if title_words.iter().any(|w| w == "ex") {
        multiplier *= EX_PREMIUM;
    }
    if lowered.contains("1st edition") || lowered.contains("first edition") {
        multiplier *= FIRST_EDITION_PREMIUM;
    }
    if title_words.iter().any(|w| w == "japanese" || w == "japan") || contains_japanese(title) {
        multiplier *= JAPANESE_PREMIUM;
    }
    multiplier
}

/// Scores ending auctions against a list of wanted cards.
pub struct AuctionAnalyzer {
    source: Option<Arc<dyn AuctionSource>>,
    config: AuctionConfig,
}

impl AuctionAnalyzer {
    pub fn new(config: AuctionConfig, source: Option<Arc<dyn AuctionSource>>) -> Self {
        Self { source, config }
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    fn total_cost(&self, auction: &Auction) -> f64 {
        auction.current_bid
            + auction.shipping_cost
            + self.config.grading_cost
            + self.config.grading_shipping
    }

    pub fn profit_score(&self, estimated_value: f64, total_cost: f64) -> f64 {
        if total_cost <= 0.0 {
            return 0.0;
        }
        (estimated_value * (1.0 - self.config.ebay_fee_pct) - total_cost) / total_cost * 100.0
    }

    pub fn assess_risk(auction: &Auction, profit_score: f64, minutes_left: i64) -> (RiskLevel, Vec<String>) {
        let mut factors = Vec::new();
        if auction.bid_count > 5 {
            factors.push(format!("{} bids already", auction.bid_count));
        }
        if auction.seller_rating < 95.0 {
            factors.push(format!("seller rating {:.1}%", auction.seller_rating));
        }
        if profit_score > 200.0 {
            factors.push("profit looks too good to be true".to_string());
        }
        if minutes_left < 30 {
            factors.push(format!("ends in {} min", minutes_left));
        }
        let level = match factors.len() {
            0 => RiskLevel::Low,
            1 | 2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };
        (level, factors)
    }

    /// Scores one auction for one target; `None` when it doesn't qualify.
    pub fn evaluate(&self, auction: &Auction, target: &TargetCard, now: DateTime<Utc>) -> Option<AuctionOpportunity> {
        let strength = match_strength(&auction.title, target)?;

        let minutes_left = (auction.end_time - now).num_minutes();
        if minutes_left < MIN_MINUTES_LEFT {
            debug!("Skipping '{}': ends in {} min", auction.title, minutes_left);
            return None;
        }
        if auction.current_bid > self.config.max_bid {
            debug!("Skipping '{}': bid {:.2} over ceiling", auction.title, auction.current_bid);
            return None;
        }

        let estimated_value = auction.current_bid * value_multiplier(&auction.title);
        let total_cost = self.total_cost(auction);
        let profit_score = self.profit_score(estimated_value, total_cost);
        if profit_score < self.config.min_profit_score {
            return None;
        }

        let (risk, risk_factors) = Self::assess_risk(auction, profit_score, minutes_left);
        Some(AuctionOpportunity {
            auction: auction.clone(),
            target_name: target.name.clone(),
            match_strength: strength,
            estimated_value,
            total_cost,
            profit_score,
            minutes_left,
            risk,
            risk_factors,
        })
    }

    /// Queries the source once and scores every auction against every target.
    /// Each auction is attributed to its strongest matching target.
    pub async fn find_opportunities(
        &self,
        targets: &[TargetCard],
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionOpportunity>, AuctionError> {
        let source = self.source.as_ref().ok_or(AuctionError::NotConfigured)?;
        let auctions = source
            .find_ending_auctions(self.config.window_minutes, &self.config.category)
            .await?;
        info!("Fetched {} ending auctions", auctions.len());

        let mut opportunities: Vec<AuctionOpportunity> = auctions
            .iter()
            .filter_map(|auction| {
                targets
                    .iter()
                    .filter_map(|t| self.evaluate(auction, t, now))
                    .max_by(|a, b| a.match_strength.total_cmp(&b.match_strength))
            })
            .collect();
        opportunities.sort_by(|a, b| b.profit_score.total_cmp(&a.profit_score));
        Ok(opportunities)
    }
}
