// Tabular report builders and CSV/text rendering
use crate::analyzer::auction::AuctionOpportunity;
use crate::analyzer::history::{CardIndicators, CardTrend, PerformanceReport};
use crate::model::Analysis;
use crate::analyzer::market::MarketRecommendation;
use crate::analyzer::scoring::CrossgradeCandidate;
use crate::model::{Row, ScoredRow};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Ordered rows of string cells under a header row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn money(value: f64) -> String {
    format!("{:.2}", value)
}

fn opt_money(value: Option<f64>) -> String {
    value.map(money).unwrap_or_else(|| "-".to_string())
}

fn pct(value: f64) -> String {
    format!("{:.1}", value)
}

/// Raw vs PSA 10 spread for every row with both prices.
pub fn delta_report(rows: &[Row]) -> Table {
    let mut table = Table::new(&["card", "set", "raw", "psa10", "delta", "delta_pct"]);
    for row in rows {
        let (Some(raw), Some(psa10)) = (row.prices.raw, row.prices.psa10) else {
            continue;
        };
        let delta = psa10 - raw;
        let delta_pct = if raw > 0.0 { delta / raw * 100.0 } else { 0.0 };
        table.push(vec![
            row.card.display_name(),
            row.card.set_name.clone(),
            money(raw),
            money(psa10),
            money(delta),
            pct(delta_pct),
        ]);
    }
    table
}

pub fn multi_grade_report(rows: &[Row]) -> Table {
    let mut table = Table::new(&["card", "set", "raw", "psa9", "psa9.5", "psa10", "bgs10", "cgc9.5", "bgs9.5"]);
    for row in rows {
        let p = &row.prices;
        table.push(vec![
            row.card.display_name(),
            row.card.set_name.clone(),
            opt_money(p.raw),
            opt_money(p.psa9),
            opt_money(p.psa95),
            opt_money(p.psa10),
            opt_money(p.bgs10),
            opt_money(p.cgc95),
            opt_money(p.bgs95),
        ]);
    }
    table
}

/// Ranked opportunities. The `why` column is filled only when explanations are on.
pub fn ranked_report(scored: &[ScoredRow]) -> Table {
    let mut table = Table::new(&[
        "rank", "card", "set", "raw", "psa10", "break_even", "net_profit", "score", "url", "why",
    ]);
    for (i, s) in scored.iter().enumerate() {
        table.push(vec![
            (i + 1).to_string(),
            s.row.card.display_name(),
            s.row.card.set_name.clone(),
            opt_money(s.row.prices.raw),
            opt_money(s.row.prices.psa10),
            money(s.break_even_usd),
            money(s.net_profit_usd),
            format!("{:.1}", s.score),
            s.row.listing_url.clone().unwrap_or_default(),
            s.why.clone().unwrap_or_default(),
        ]);
    }
    table
}

pub fn crossgrade_report(candidates: &[CrossgradeCandidate]) -> Table {
    let mut table = Table::new(&["card", "source_grade", "source_price", "psa10", "profit", "roi_pct"]);
    for c in candidates {
        table.push(vec![
            c.row.card.display_name(),
            c.source_grade.to_string(),
            money(c.source_price),
            money(c.psa10_price),
            money(c.profit),
            pct(c.roi),
        ]);
    }
    table
}

pub fn trend_report(trends: &[CardTrend]) -> Table {
    let mut table = Table::new(&[
        "card", "observations", "first_psa10", "last_psa10", "change_pct", "direction", "r_squared", "volatility",
    ]);
    for t in trends {
        table.push(vec![
            t.card_name.clone(),
            t.observations.to_string(),
            money(t.first_psa10),
            money(t.last_psa10),
            pct(t.change_pct),
            format!("{:?}", t.direction).to_uppercase(),
            format!("{:.3}", t.r_squared),
            money(t.volatility),
        ]);
    }
    table
}

/// Moving averages and momentum per card. Cards short of data show how many
/// entries each indicator still needs.
pub fn indicator_report(indicators: &[CardIndicators]) -> Table {
    let mut table = Table::new(&[
        "card", "short_ma", "long_ma", "ma_signal", "recent_momentum_pct", "overall_momentum_pct", "acceleration",
        "momentum_signal",
    ]);
    for ind in indicators {
        let mut row = vec![ind.card_name.clone()];
        match &ind.moving_averages {
            Analysis::Ready(ma) => row.extend([
                money(ma.short),
                opt_money(ma.long),
                format!("{:?}", ma.signal).to_uppercase(),
            ]),
            Analysis::InsufficientData { required, available } => {
                row.extend([shortfall(*required, *available), "-".into(), "-".into()])
            }
        }
        match &ind.momentum {
            Analysis::Ready(m) => row.extend([
                pct(m.recent_momentum),
                pct(m.overall_momentum),
                m.acceleration.map(pct).unwrap_or_else(|| "-".into()),
                format!("{:?}", m.signal).to_uppercase(),
            ]),
            Analysis::InsufficientData { required, available } => {
                row.extend([shortfall(*required, *available), "-".into(), "-".into(), "-".into()])
            }
        }
        table.push(row);
    }
    table
}

fn shortfall(required: usize, available: usize) -> String {
    format!("needs {}, has {}", required, available)
}

/// Key/value summary of a performance report.
pub fn performance_report(report: &PerformanceReport) -> Table {
    let mut table = Table::new(&["metric", "value"]);
    let names = |trends: &[CardTrend]| {
        trends
            .iter()
            .map(|t| t.card_name.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    };
    let pairs = [
        ("period_start", report.period_start.to_rfc3339()),
        ("period_end", report.period_end.to_rfc3339()),
        ("total_entries", report.total_entries.to_string()),
        ("unique_cards", report.unique_cards.to_string()),
        ("avg_score", format!("{:.1}", report.avg_score)),
        ("avg_delta", money(report.avg_delta)),
        ("up", report.up_count.to_string()),
        ("down", report.down_count.to_string()),
        ("stable", report.stable_count.to_string()),
        ("top_gainers", names(&report.top_gainers)),
        ("top_losers", names(&report.top_losers)),
        ("most_volatile", names(&report.most_volatile)),
    ];
    for (metric, value) in pairs {
        table.push(vec![metric.to_string(), value]);
    }
    table
}

pub fn recommendation_report(recommendations: &[MarketRecommendation]) -> Table {
    let mut table = Table::new(&[
        "card", "action", "confidence", "trend", "raw", "psa10", "entry", "target", "roi_pct", "reasoning",
    ]);
    for r in recommendations {
        table.push(vec![
            r.card_name.clone(),
            format!("{:?}", r.action).to_uppercase(),
            format!("{:.0}", r.confidence),
            format!("{:?}", r.trend).to_uppercase(),
            money(r.current_raw),
            money(r.current_psa10),
            opt_money(r.entry_price),
            opt_money(r.target_price),
            pct(r.roi),
            r.reasoning.clone(),
        ]);
    }
    table
}

pub fn auction_report(opportunities: &[AuctionOpportunity]) -> Table {
    let mut table = Table::new(&[
        "target", "title", "bid", "total_cost", "est_value", "profit_score", "minutes_left", "risk", "url",
    ]);
    for o in opportunities {
        table.push(vec![
            o.target_name.clone(),
            o.auction.title.clone(),
            money(o.auction.current_bid),
            money(o.total_cost),
            money(o.estimated_value),
            format!("{:.1}", o.profit_score),
            o.minutes_left.to_string(),
            format!("{:?}", o.risk).to_uppercase(),
            o.auction.url.clone(),
        ]);
    }
    table
}

/// Neutralizes spreadsheet formulas, then applies RFC 4180 quoting.
pub fn escape_csv_cell(cell: &str) -> String {
    let guarded = match cell.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{}", cell),
        _ => cell.to_string(),
    };
    if guarded.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", guarded.replace('"', "\"\""))
    } else {
        guarded
    }
}

fn csv_line(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| escape_csv_cell(c))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn write_csv<W: Write>(table: &Table, mut writer: W) -> io::Result<()> {
    writeln!(writer, "{}", csv_line(&table.header))?;
    for row in &table.rows {
        writeln!(writer, "{}", csv_line(row))?;
    }
    writer.flush()
}

/// Writes `<dir>/<name>_<YYYYmmdd_HHMMSS>.csv` and returns the path.
pub fn save_csv(table: &Table, dir: &str, name: &str, now: DateTime<Utc>) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = Path::new(dir).join(format!("{}_{}.csv", name, now.format("%Y%m%d_%H%M%S")));
    write_csv(table, BufWriter::new(File::create(&path)?))?;
    info!("Report written to {}", path.display());
    Ok(path)
}

/// Renders the table with left-aligned, space-padded columns.
pub fn render_text(table: &Table) -> String {
    let columns = table
        .rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(table.header.len()))
        .max()
        .unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in std::iter::once(&table.header).chain(&table.rows) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render_row = |row: &Vec<String>| {
        row.iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = render_row(&table.header);
    out.push('\n');
    out.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * columns.saturating_sub(1)));
    for row in &table.rows {
        out.push('\n');
        out.push_str(&render_row(row));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Card, CardPrices, Rarity};

    /// Minimal RFC 4180 reader for one line.
    fn parse_csv_line(line: &str) -> Vec<String> {
        let mut cells = Vec::new();
        let mut cell = String::new();
        let mut quoted = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, quoted) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    cell.push('"');
                    chars.next();
                }
                ('"', _) => quoted = !quoted,
                (',', false) => cells.push(std::mem::take(&mut cell)),
                _ => cell.push(c),
            }
        }
        cells.push(cell);
        cells
    }

    fn row(name: &str, raw: Option<f64>, psa10: Option<f64>) -> Row {
        Row {
            card: Card {
                name: name.into(),
                number: "1".into(),
                set_name: "Jungle".into(),
                rarity: Rarity::Rare,
                release_date: None,
            },
            prices: CardPrices { raw, psa10, ..Default::default() },
            population: None,
            listing_url: None,
            volatility: None,
        }
    }

    #[test]
    fn formula_cells_are_neutralized() {
        assert_eq!(escape_csv_cell("=SUM(A1:A10)"), "'=SUM(A1:A10)");
        assert_eq!(escape_csv_cell("@cmd"), "'@cmd");
        assert_eq!(escape_csv_cell("-5"), "'-5");
        assert_eq!(escape_csv_cell("plain"), "plain");
        assert_eq!(escape_csv_cell("a,b"), "\"a,b\"");
        assert_eq!(escape_csv_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn formula_survives_csv_round_trip() {
        let original = "=SUM(A1:A10)";
        let line = csv_line(&[original.to_string(), "=1,2".to_string()]);
        let parsed = parse_csv_line(&line);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].strip_prefix('\''), Some(original));
        assert_eq!(parsed[1].strip_prefix('\''), Some("=1,2"));
    }

    #[test]
    fn delta_report_skips_incomplete_rows() {
        let rows = vec![row("Scyther", Some(10.0), Some(110.0)), row("Pinsir", Some(5.0), None)];
        let table = delta_report(&rows);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][4], "100.00");
        assert_eq!(table.rows[0][5], "1000.0");
    }

    #[test]
    fn indicator_report_shows_data_shortfall() {
        use crate::analyzer::history::{MaSignal, MomentumAnalysis, MomentumSignal, MovingAverages};
        use crate::model::CardKey;

        let mew = CardKey::new("151", "Mew");
        let ditto = CardKey::new("132", "Ditto");
        let indicators = vec![
            CardIndicators {
                card_key: mew.clone(),
                card_name: "Mew #151".into(),
                moving_averages: Analysis::Ready(MovingAverages {
                    card_key: mew.clone(),
                    short_window: 7,
                    long_window: 30,
                    short: 240.0,
                    long: None,
                    signal: MaSignal::Neutral,
                }),
                momentum: Analysis::Ready(MomentumAnalysis {
                    card_key: mew,
                    recent_momentum: 12.5,
                    overall_momentum: 20.0,
                    acceleration: Some(2.3),
                    signal: MomentumSignal::Up,
                }),
            },
            CardIndicators {
                card_key: ditto,
                card_name: "Ditto #132".into(),
                moving_averages: Analysis::InsufficientData { required: 7, available: 3 },
                momentum: Analysis::InsufficientData { required: 5, available: 3 },
            },
        ];

        let table = indicator_report(&indicators);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["Mew #151", "240.00", "-", "NEUTRAL", "12.5", "20.0", "2.3", "UP"]);
        assert_eq!(table.rows[1], vec!["Ditto #132", "needs 7, has 3", "-", "-", "needs 5, has 3", "-", "-", "-"]);
        assert!(table.rows.iter().all(|r| r.len() == table.header.len()));
    }

    #[test]
    fn multi_grade_marks_unknown_prices() {
        let table = multi_grade_report(&[row("Pinsir", Some(5.0), None)]);
        assert_eq!(table.rows[0][2], "5.00");
        assert_eq!(table.rows[0][5], "-");
    }

    #[test]
    fn csv_and_text_rendering() {
        let mut table = Table::new(&["card", "note"]);
        table.push(vec!["Mew".into(), "+gain, big".into()]);

        let mut buf = Vec::new();
        write_csv(&table, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "card,note\nMew,\"'+gain, big\"\n");

        let text = render_text(&table);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "card  note");
        assert_eq!(lines[2], "Mew   +gain, big");
    }
}
