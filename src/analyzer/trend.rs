use crate::model::{CardDirection, Trend};

/// Normalized slope (percent of the average per step) beyond which a series counts as moving.
pub const TREND_THRESHOLD_PCT: f64 = 2.0;
/// Per-card price direction threshold used by history reports.
pub const PRICE_DIRECTION_THRESHOLD: f64 = 1.0;
/// Per-card delta direction threshold used by history reports.
pub const DELTA_DIRECTION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrendResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

pub struct TrendCalculator;

impl TrendCalculator {
    /// Ordinary least squares fit of `ys` against `xs`.
    /// Fewer than two points, mismatched lengths or constant `xs` give a zero result.
    pub fn linear_regression(xs: &[f64], ys: &[f64]) -> TrendResult {
        if xs.len() != ys.len() || xs.len() < 2 {
            return TrendResult::default();
        }
        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (x, y) in xs.iter().zip(ys) {
            sxy += (x - mean_x) * (y - mean_y);
            sxx += (x - mean_x).powi(2);
        }
        if sxx == 0.0 {
            return TrendResult::default();
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
        let ss_res: f64 = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum();
        let r_squared = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

        TrendResult {
            slope,
            intercept,
            r_squared,
        }
    }

    /// Regression using the index position as the time axis.
    pub fn regression_over_index(series: &[f64]) -> TrendResult {
        let xs: Vec<f64> = (0..series.len()).map(|i| i as f64).collect();
        Self::linear_regression(&xs, series)
    }

    pub fn classify_trend(slope: f64, avg_value: f64) -> Trend {
        if avg_value <= 0.0 {
            return Trend::Flat;
        }
        let normalized = slope / avg_value * 100.0;
        if normalized > TREND_THRESHOLD_PCT {
            Trend::Up
        } else if normalized < -TREND_THRESHOLD_PCT {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    /// Regression plus classification for a whole series.
    pub fn series_trend(series: &[f64]) -> Trend {
        if series.len() < 2 {
            return Trend::Flat;
        }
        let fit = Self::regression_over_index(series);
        Self::classify_trend(fit.slope, mean(series))
    }

    pub fn classify_direction(pct: f64, threshold: f64) -> CardDirection {
        if pct > threshold {
            CardDirection::Up
        } else if pct < -threshold {
            CardDirection::Down
        } else {
            CardDirection::Stable
        }
    }

    /// Average of the last `window` points; `None` until enough points exist.
    pub fn moving_average(series: &[f64], window: usize) -> Option<f64> {
        if window == 0 || series.len() < window {
            return None;
        }
        Some(mean(&series[series.len() - window..]))
    }

    /// Percent change from the first to the last element.
    pub fn momentum(series: &[f64]) -> Option<f64> {
        let (first, last) = (series.first()?, series.last()?);
        if series.len() < 2 || *first <= 0.0 {
            return None;
        }
        Some((last - first) / first * 100.0)
    }

    /// Population variance of the series. This is reported as "volatility"
    /// everywhere in the crate; it is not a standard deviation.
    pub fn volatility(series: &[f64]) -> f64 {
        if series.is_empty() {
            return 0.0;
        }
        let avg = mean(series);
        series.iter().map(|p| (p - avg).powi(2)).sum::<f64>() / series.len() as f64
    }

    /// Strict local minima become support, strict local maxima resistance.
    pub fn support_resistance(series: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut support = Vec::new();
        let mut resistance = Vec::new();
        for w in series.windows(3) {
            if w[1] < w[0] && w[1] < w[2] {
                support.push(w[1]);
            } else if w[1] > w[0] && w[1] > w[2] {
                resistance.push(w[1]);
            }
        }
        (support, resistance)
    }

    /// Confidence (0..=100) in a signal built from two series. Diverging
    /// trends add 30, the volatility of `series_a` moves it by ±10.
    pub fn confidence(series_a: &[f64], series_b: &[f64]) -> f64 {
        let mut confidence: f64 = 50.0;

        let trend_a = Self::series_trend(series_a);
        let trend_b = Self::series_trend(series_b);
        let opposite = matches!(
            (trend_a, trend_b),
            (Trend::Up, Trend::Down) | (Trend::Down, Trend::Up)
        );
        if opposite {
            confidence += 30.0;
        }

        let vol = Self::volatility(series_a);
        if vol < 10.0 {
            confidence += 10.0;
        } else if vol > 30.0 {
            confidence -= 10.0;
        }

        confidence.clamp(0.0, 100.0)
    }
}

pub fn mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        0.0
    } else {
        series.iter().sum::<f64>() / series.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_on_perfect_line() {
        let fit = TrendCalculator::linear_regression(&[0.0, 1.0, 2.0, 3.0], &[1.0, 3.0, 5.0, 7.0]);
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn regression_degenerate_inputs() {
        assert_eq!(TrendCalculator::linear_regression(&[1.0], &[2.0]), TrendResult::default());
        assert_eq!(
            TrendCalculator::linear_regression(&[2.0, 2.0, 2.0], &[1.0, 5.0, 9.0]),
            TrendResult::default()
        );
    }

    #[test]
    fn monotonic_series_classification() {
        assert_eq!(TrendCalculator::series_trend(&[100.0, 110.0, 120.0, 130.0]), Trend::Up);
        assert_eq!(TrendCalculator::series_trend(&[130.0, 120.0, 110.0, 100.0]), Trend::Down);
        assert_eq!(TrendCalculator::series_trend(&[50.0, 50.0, 50.0]), Trend::Flat);
    }

    #[test]
    fn classify_trend_threshold() {
        assert_eq!(TrendCalculator::classify_trend(2.5, 100.0), Trend::Up);
        assert_eq!(TrendCalculator::classify_trend(-2.5, 100.0), Trend::Down);
        assert_eq!(TrendCalculator::classify_trend(1.9, 100.0), Trend::Flat);
        assert_eq!(TrendCalculator::classify_trend(5.0, 0.0), Trend::Flat);
    }

    #[test]
    fn moving_average_needs_full_window() {
        let series = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(TrendCalculator::moving_average(&series, 2), Some(3.5));
        assert_eq!(TrendCalculator::moving_average(&series, 5), None);
    }

    #[test]
    fn momentum_first_to_last() {
        assert_eq!(TrendCalculator::momentum(&[100.0, 90.0, 125.0]), Some(25.0));
        assert_eq!(TrendCalculator::momentum(&[100.0]), None);
        assert_eq!(TrendCalculator::momentum(&[0.0, 10.0]), None);
    }

    #[test]
    fn volatility_is_population_variance() {
        // mean 5, squared deviations 9+1+1+9 = 20, /4
        assert_eq!(TrendCalculator::volatility(&[2.0, 4.0, 6.0, 8.0]), 5.0);
        assert_eq!(TrendCalculator::volatility(&[]), 0.0);
    }

    #[test]
    fn support_and_resistance_use_strict_neighbours() {
        let (support, resistance) =
            TrendCalculator::support_resistance(&[10.0, 8.0, 12.0, 12.0, 9.0, 11.0]);
        assert_eq!(support, vec![8.0, 9.0]);
        assert!(resistance.is_empty());
    }

    #[test]
    fn diverging_series_are_more_confident() {
        let raw_down = [10.0, 9.5, 9.0, 8.5, 8.0];
        let psa_up = [100.0, 110.0, 120.0, 130.0, 140.0];
        let raw_up = [8.0, 8.5, 9.0, 9.5, 10.0];

        let diverging = TrendCalculator::confidence(&raw_down, &psa_up);
        let aligned = TrendCalculator::confidence(&raw_up, &psa_up);
        assert!(diverging > 70.0);
        assert!(aligned < diverging);
    }

    #[test]
    fn confidence_penalizes_volatile_series() {
        let noisy = [10.0, 40.0, 5.0, 60.0, 20.0];
        assert_eq!(TrendCalculator::confidence(&noisy, &noisy), 40.0);
    }
}
