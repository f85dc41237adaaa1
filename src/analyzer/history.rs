// Trend, momentum, seasonal and performance reports over the history log
use crate::analyzer::trend::{
    DELTA_DIRECTION_THRESHOLD, PRICE_DIRECTION_THRESHOLD, TrendCalculator, mean,
};
use crate::model::{Analysis, CardDirection, CardKey, HistoryEntry};
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;
use tracing::debug;

pub const MIN_TREND_POINTS: usize = 2;
pub const MIN_MOMENTUM_POINTS: usize = 5;
pub const MIN_REPORT_ENTRIES: usize = 5;
const TOP_MOVERS: usize = 5;
/// Short average must clear the long one by this share to count as a cross.
const CROSS_MARGIN: f64 = 0.02;

#[derive(Debug, Clone, PartialEq)]
pub struct CardTrend {
    pub card_key: CardKey,
    pub card_name: String,
    pub observations: usize,
    pub first_psa10: f64,
    pub last_psa10: f64,
    pub change_pct: f64,
    pub slope: f64,
    /// Slope as a percentage of the average PSA 10 price, per observation.
    pub slope_pct: f64,
    pub r_squared: f64,
    pub direction: CardDirection,
    pub delta_direction: CardDirection,
    pub avg_score: f64,
    pub volatility: f64,
    pub support: Vec<f64>,
    pub resistance: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaSignal {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverages {
    pub card_key: CardKey,
    pub short_window: usize,
    pub long_window: usize,
    pub short: f64,
    pub long: Option<f64>,
    pub signal: MaSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentumSignal {
    StrongUp,
    Up,
    Sideways,
    Down,
    StrongDown,
}

impl MomentumSignal {
    fn from_pct(pct: f64) -> Self {
        if pct > 10.0 {
            MomentumSignal::StrongUp
        } else if pct > 2.0 {
            MomentumSignal::Up
        } else if pct < -10.0 {
            MomentumSignal::StrongDown
        } else if pct < -2.0 {
            MomentumSignal::Down
        } else {
            MomentumSignal::Sideways
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumAnalysis {
    pub card_key: CardKey,
    pub recent_momentum: f64,
    pub overall_momentum: f64,
    /// Recent window momentum minus the window before it, when one exists.
    pub acceleration: Option<f64>,
    pub signal: MomentumSignal,
}

/// Moving-average and momentum results for one card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardIndicators {
    pub card_key: CardKey,
    pub card_name: String,
    pub moving_averages: Analysis<MovingAverages>,
    pub momentum: Analysis<MomentumAnalysis>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalAnalysis {
    /// Average price keyed by calendar month (1 = January).
    pub monthly_averages: BTreeMap<u32, f64>,
    pub best_month: u32,
    pub worst_month: u32,
    pub delta_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_entries: usize,
    pub unique_cards: usize,
    pub avg_score: f64,
    pub avg_delta: f64,
    pub top_gainers: Vec<CardTrend>,
    pub top_losers: Vec<CardTrend>,
    pub most_volatile: Vec<CardTrend>,
    pub up_count: usize,
    pub down_count: usize,
    pub stable_count: usize,
}

pub fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "Unknown",
    }
}

/// Groups prices by calendar month and compares the best and worst month.
pub fn seasonal_from_points(points: &[(DateTime<Utc>, f64)]) -> Option<SeasonalAnalysis> {
    let mut buckets: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for (timestamp, price) in points {
        if *price > 0.0 {
            buckets.entry(timestamp.month()).or_default().push(*price);
        }
    }
    if buckets.is_empty() {
        return None;
    }

    let monthly_averages: BTreeMap<u32, f64> = buckets
        .into_iter()
        .map(|(month, prices)| (month, mean(&prices)))
        .collect();

    let (best_month, best) = monthly_averages
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(m, v)| (*m, *v))?;
    let (worst_month, worst) = monthly_averages
        .iter()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(m, v)| (*m, *v))?;

    Some(SeasonalAnalysis {
        monthly_averages,
        best_month,
        worst_month,
        delta_pct: (best - worst) / worst * 100.0,
    })
}

/// Aggregates the persisted history log into reports.
pub struct HistoryAnalyzer {
    pub short_window: usize,
    pub long_window: usize,
    pub momentum_window: usize,
}

impl Default for HistoryAnalyzer {
    fn default() -> Self {
        Self {
            short_window: 7,
            long_window: 30,
            momentum_window: MIN_MOMENTUM_POINTS,
        }
    }
}

impl HistoryAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries per card, each list in chronological order.
    pub fn group_by_card(entries: &[HistoryEntry]) -> BTreeMap<CardKey, Vec<&HistoryEntry>> {
        let mut grouped: BTreeMap<CardKey, Vec<&HistoryEntry>> = BTreeMap::new();
        for entry in entries {
            grouped.entry(entry.card.key()).or_default().push(entry);
        }
        for list in grouped.values_mut() {
            list.sort_by_key(|e| e.timestamp);
        }
        grouped
    }

    fn psa10_series(entries: &[&HistoryEntry]) -> Vec<f64> {
        entries
            .iter()
            .map(|e| e.psa10_price)
            .filter(|p| *p > 0.0)
            .collect()
    }

    fn card_series(entries: &[HistoryEntry], key: &CardKey) -> Vec<f64> {
        let grouped = Self::group_by_card(entries);
        grouped
            .get(key)
            .map(|list| Self::psa10_series(list))
            .unwrap_or_default()
    }

    /// Trend for one card's chronologically sorted entries.
    pub fn card_trend(key: &CardKey, entries: &[&HistoryEntry]) -> Option<CardTrend> {
        let series = Self::psa10_series(entries);
        if series.len() < MIN_TREND_POINTS {
            return None;
        }
        let fit = TrendCalculator::regression_over_index(&series);
        let avg = mean(&series);
        let slope_pct = if avg > 0.0 { fit.slope / avg * 100.0 } else { 0.0 };

        let deltas: Vec<f64> = entries.iter().map(|e| e.delta_usd).collect();
        let delta_fit = TrendCalculator::regression_over_index(&deltas);
        let avg_delta = mean(&deltas).abs();
        let delta_pct = if avg_delta > 0.0 {
            delta_fit.slope / avg_delta * 100.0
        } else {
            0.0
        };

        let first = series[0];
        let last = series[series.len() - 1];
        let (support, resistance) = TrendCalculator::support_resistance(&series);
        let scores: Vec<f64> = entries.iter().map(|e| e.score).collect();

        Some(CardTrend {
            card_key: key.clone(),
            card_name: entries.last()?.card.display_name(),
            observations: series.len(),
            first_psa10: first,
            last_psa10: last,
            change_pct: (last - first) / first * 100.0,
            slope: fit.slope,
            slope_pct,
            r_squared: fit.r_squared,
            direction: TrendCalculator::classify_direction(slope_pct, PRICE_DIRECTION_THRESHOLD),
            delta_direction: TrendCalculator::classify_direction(delta_pct, DELTA_DIRECTION_THRESHOLD),
            avg_score: mean(&scores),
            volatility: TrendCalculator::volatility(&series),
            support,
            resistance,
        })
    }

    /// Trend per card with enough points, largest gain first.
    pub fn card_trends(&self, entries: &[HistoryEntry]) -> Vec<CardTrend> {
        let mut trends: Vec<CardTrend> = Self::group_by_card(entries)
            .iter()
            .filter_map(|(key, list)| Self::card_trend(key, list))
            .collect();
        trends.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));
        debug!("Computed {} card trends from {} entries", trends.len(), entries.len());
        trends
    }

    pub fn moving_averages(&self, entries: &[HistoryEntry], key: &CardKey) -> Analysis<MovingAverages> {
        let series = Self::card_series(entries, key);
        let Some(short) = TrendCalculator::moving_average(&series, self.short_window) else {
            return Analysis::InsufficientData {
                required: self.short_window,
                available: series.len(),
            };
        };
        let long = TrendCalculator::moving_average(&series, self.long_window);

        let signal = match long {
            Some(long) if short > long * (1.0 + CROSS_MARGIN) => MaSignal::Bullish,
            Some(long) if short < long * (1.0 - CROSS_MARGIN) => MaSignal::Bearish,
            _ => MaSignal::Neutral,
        };

        Analysis::Ready(MovingAverages {
            card_key: key.clone(),
            short_window: self.short_window,
            long_window: self.long_window,
            short,
            long,
            signal,
        })
    }

    pub fn momentum(&self, entries: &[HistoryEntry], key: &CardKey) -> Analysis<MomentumAnalysis> {
        let series = Self::card_series(entries, key);
        let window = self.momentum_window.max(2);
        if series.len() < window {
            return Analysis::InsufficientData {
                required: window,
                available: series.len(),
            };
        }

        let recent_start = series.len() - window;
        let recent = TrendCalculator::momentum(&series[recent_start..]).unwrap_or(0.0);
        let overall = TrendCalculator::momentum(&series).unwrap_or(0.0);
        // the prior window shares its last point with the first point of the recent one
        let acceleration = (recent_start + 1 >= window)
            .then(|| TrendCalculator::momentum(&series[recent_start + 1 - window..=recent_start]))
            .flatten()
            .map(|prior| recent - prior);

        Analysis::Ready(MomentumAnalysis {
            card_key: key.clone(),
            recent_momentum: recent,
            overall_momentum: overall,
            acceleration,
            signal: MomentumSignal::from_pct(recent),
        })
    }

    /// Indicators for every card in the log, including cards without enough
    /// entries yet.
    pub fn indicators(&self, entries: &[HistoryEntry]) -> Vec<CardIndicators> {
        Self::group_by_card(entries)
            .iter()
            .filter_map(|(key, list)| {
                Some(CardIndicators {
                    card_key: key.clone(),
                    card_name: list.last()?.card.display_name(),
                    moving_averages: self.moving_averages(entries, key),
                    momentum: self.momentum(entries, key),
                })
            })
            .collect()
    }

    /// Seasonality of PSA 10 prices across the whole log.
    pub fn seasonal(&self, entries: &[HistoryEntry]) -> Option<SeasonalAnalysis> {
        let points: Vec<(DateTime<Utc>, f64)> = entries
            .iter()
            .map(|e| (e.timestamp, e.psa10_price))
            .collect();
        seasonal_from_points(&points)
    }

    pub fn performance_report(&self, entries: &[HistoryEntry]) -> Analysis<PerformanceReport> {
        if entries.len() < MIN_REPORT_ENTRIES {
            return Analysis::InsufficientData {
                required: MIN_REPORT_ENTRIES,
                available: entries.len(),
            };
        }

        let trends = self.card_trends(entries);
        let count = |dir: CardDirection| trends.iter().filter(|t| t.direction == dir).count();

        let top_gainers: Vec<CardTrend> = trends
            .iter()
            .filter(|t| t.change_pct > 0.0)
            .take(TOP_MOVERS)
            .cloned()
            .collect();
        let top_losers: Vec<CardTrend> = trends
            .iter()
            .rev()
            .filter(|t| t.change_pct < 0.0)
            .take(TOP_MOVERS)
            .cloned()
            .collect();
        let mut most_volatile = trends.clone();
        most_volatile.sort_by(|a, b| b.volatility.total_cmp(&a.volatility));
        most_volatile.truncate(TOP_MOVERS);

        let scores: Vec<f64> = entries.iter().map(|e| e.score).collect();
        let deltas: Vec<f64> = entries.iter().map(|e| e.delta_usd).collect();
        let period_start = entries.iter().map(|e| e.timestamp).min().unwrap_or_else(Utc::now);
        let period_end = entries.iter().map(|e| e.timestamp).max().unwrap_or_else(Utc::now);

        Analysis::Ready(PerformanceReport {
            period_start,
            period_end,
            total_entries: entries.len(),
            unique_cards: Self::group_by_card(entries).len(),
            avg_score: mean(&scores),
            avg_delta: mean(&deltas),
            up_count: count(CardDirection::Up),
            down_count: count(CardDirection::Down),
            stable_count: count(CardDirection::Stable),
            top_gainers,
            top_losers,
            most_volatile,
        })
    }
}
