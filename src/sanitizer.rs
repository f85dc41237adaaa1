// Price validation in front of every scoring path
use crate::config::SanitizerConfig;
use crate::model::{CardPriceState, CardPrices, Rarity, Row};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Literal values that only show up as placeholder or test data in feeds.
pub const JUNK_PRICES: [f64; 3] = [69420.69, 12345.67, 99999.99];

const PENNY_MIN_PRICE: f64 = 0.01;
const FALLBACK_CAP: f64 = 30_000.0;

#[derive(Debug, Clone)]
pub struct PriceSanitizer {
    min_price: f64,
    caps: HashMap<Rarity, f64>,
}

impl PriceSanitizer {
    pub fn new(cfg: &SanitizerConfig) -> Self {
        let min_price = if cfg.penny_cards {
            PENNY_MIN_PRICE
        } else {
            cfg.min_price
        };
        Self {
            min_price,
            caps: cfg.rarity_caps.clone(),
        }
    }

    pub fn cap_for(&self, rarity: Rarity) -> f64 {
        self.caps
            .get(&rarity)
            .or_else(|| self.caps.get(&Rarity::Unknown))
            .copied()
            .unwrap_or(FALLBACK_CAP)
    }

    /// Returns the price if it is usable, `None` otherwise. Prices above the
    /// rarity cap are rejected, never clamped.
    pub fn sanitize(&self, price: f64, rarity: Rarity) -> Option<f64> {
        if !price.is_finite() || price < 0.0 {
            debug!("Rejected non-finite or negative price {}", price);
            return None;
        }
        if price < self.min_price {
            debug!("Rejected price {:.2} below minimum {:.2}", price, self.min_price);
            return None;
        }
        if is_junk(price) {
            debug!("Rejected placeholder price {:.2}", price);
            return None;
        }
        let cap = self.cap_for(rarity);
        if price > cap {
            debug!("Rejected price {:.2} above {:?} cap {:.2}", price, rarity, cap);
            return None;
        }
        Some(price)
    }

    pub fn sanitize_prices(&self, prices: &CardPrices, rarity: Rarity) -> CardPrices {
        let check = |p: Option<f64>| p.and_then(|v| self.sanitize(v, rarity));
        CardPrices {
            raw: check(prices.raw),
            psa9: check(prices.psa9),
            psa95: check(prices.psa95),
            psa10: check(prices.psa10),
            bgs10: check(prices.bgs10),
            cgc95: check(prices.cgc95),
            bgs95: check(prices.bgs95),
        }
    }

    /// Sanitizes a card state; `None` when no price survives.
    pub fn sanitize_state(&self, state: &CardPriceState) -> Option<CardPriceState> {
        let prices = self.sanitize_prices(&state.prices, state.card.rarity);
        if prices.all_unknown() {
            warn!("Dropping {}: no valid prices", state.card.display_name());
            return None;
        }
        Some(CardPriceState {
            prices,
            ..state.clone()
        })
    }

    pub fn sanitize_row(&self, row: &Row) -> Option<Row> {
        let prices = self.sanitize_prices(&row.prices, row.card.rarity);
        if prices.all_unknown() {
            warn!("Dropping row {}: no valid prices", row.card.display_name());
            return None;
        }
        Some(Row {
            prices,
            ..row.clone()
        })
    }

    pub fn sanitize_rows(&self, rows: &[Row]) -> Vec<Row> {
        rows.iter().filter_map(|r| self.sanitize_row(r)).collect()
    }
}

fn is_junk(price: f64) -> bool {
    let cents = (price * 100.0).round();
    JUNK_PRICES.iter().any(|j| (j * 100.0).round() == cents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Card;

    fn sanitizer() -> PriceSanitizer {
        PriceSanitizer::new(&SanitizerConfig::default())
    }

    fn row(raw: Option<f64>, psa10: Option<f64>) -> Row {
        Row {
            card: Card {
                name: "Umbreon".into(),
                number: "215".into(),
                set_name: "Evolving Skies".into(),
                rarity: Rarity::Common,
                release_date: None,
            },
            prices: CardPrices { raw, psa10, ..Default::default() },
            population: None,
            listing_url: None,
            volatility: None,
        }
    }

    #[test]
    fn cap_boundary_is_inclusive() {
        let s = sanitizer();
        assert_eq!(s.sanitize(500.00, Rarity::Common), Some(500.00));
        assert_eq!(s.sanitize(500.01, Rarity::Common), None);
    }

    #[test]
    fn partial_cap_override_keeps_other_caps() {
        let cfg: SanitizerConfig = serde_json::from_str(r#"{"rarity_caps": {"Holo Rare": 7500.0}}"#).unwrap();
        let s = PriceSanitizer::new(&cfg);
        assert_eq!(s.cap_for(Rarity::HoloRare), 7500.0);
        assert_eq!(s.cap_for(Rarity::Common), 500.0);
        assert_eq!(s.sanitize(600.0, Rarity::Common), None);
        assert_eq!(s.sanitize(7000.0, Rarity::HoloRare), Some(7000.0));
    }

    #[test]
    fn minimum_boundary_is_inclusive() {
        let s = sanitizer();
        assert_eq!(s.sanitize(0.05, Rarity::Common), Some(0.05));
        assert_eq!(s.sanitize(0.04, Rarity::Common), None);
    }

    #[test]
    fn penny_mode_lowers_minimum() {
        let s = PriceSanitizer::new(&SanitizerConfig {
            penny_cards: true,
            ..Default::default()
        });
        assert_eq!(s.sanitize(0.01, Rarity::Common), Some(0.01));
        assert_eq!(s.sanitize(0.009, Rarity::Common), None);
    }

    #[test]
    fn junk_values_rejected_for_every_rarity() {
        let s = sanitizer();
        for rarity in [Rarity::Common, Rarity::SecretRare, Rarity::Unknown] {
            assert_eq!(s.sanitize(69420.69, rarity), None);
        }
        assert_eq!(s.sanitize(12345.67, Rarity::Unknown), None);
        assert_eq!(s.sanitize(12345.68, Rarity::Unknown), Some(12345.68));
    }

    #[test]
    fn non_finite_and_negative_rejected() {
        let s = sanitizer();
        assert_eq!(s.sanitize(f64::NAN, Rarity::Rare), None);
        assert_eq!(s.sanitize(f64::INFINITY, Rarity::Rare), None);
        assert_eq!(s.sanitize(-3.0, Rarity::Rare), None);
    }

    #[test]
    fn row_dropped_only_when_every_price_invalid() {
        let s = sanitizer();
        let rows = vec![
            row(Some(10.0), Some(900.0)),
            row(Some(f64::NAN), Some(69420.69)),
        ];
        let kept = s.sanitize_rows(&rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].prices.raw, Some(10.0));
        // psa10 over the common cap is blanked but the row survives
        assert_eq!(kept[0].prices.psa10, None);
    }
}
