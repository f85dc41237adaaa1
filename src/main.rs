mod analyzer;
mod config;
mod model;
mod normalizer;
mod notifier;
mod parser;
mod report;
mod sanitizer;
mod scraper;
mod storage;
mod utils;

use analyzer::auction::AuctionOpportunity;
use analyzer::bulk::{SubmissionCard, generate_submission_form};
use analyzer::history::month_name;
use analyzer::scoring::to_history_entries;
use analyzer::{AlertEngine, AuctionAnalyzer, BulkOptimizer, HistoryAnalyzer, MarketAnalyzer, ScoringEngine, ServiceLadder};
use analyzer::trend::{TrendCalculator, mean};
use chrono::{DateTime, Utc};
use config::{AppConfig, TargetCard, load_config};
use futures::future::join_all;
use model::{Analysis, AuctionError, Row, ScraperError, Snapshot, StorageError};
use normalizer::{build_snapshot, parse_ingest};
use notifier::TelegramNotifier;
use rand::Rng;
use report::{Table, render_text, save_csv};
use sanitizer::PriceSanitizer;
use crate::scraper::EbayAuctionSource;
use std::fs;
use std::sync::Arc;
use storage::HistoryStore;
use thiserror::Error;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

const MAX_JITTER_SECONDS: u64 = 60;

#[derive(Debug, Error)]
enum CommandError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid input: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auction error: {0}")]
    Auction(#[from] AuctionError),
    #[error("Scraper error: {0}")]
    Scraper(#[from] ScraperError),
    #[error("Usage: {0}")]
    Usage(String),
}

const USAGE: &str = "grade-sniper <ingest FILE|rank|alerts|market|history|bulk|auctions|watch>";

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = match load_config("config.json") {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load error ({}), using defaults", e);
            AppConfig::default()
        }
    };

    let store = match HistoryStore::new(&config.database_path) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("rank");

    let result = match command {
        "ingest" => match args.get(1) {
            Some(path) => ingest(&config, &store, path),
            None => Err(CommandError::Usage(USAGE.to_string())),
        },
        "rank" => rank(&config, &store),
        "alerts" => alerts(&config, &store).await,
        "market" => market(&config, &store),
        "history" => history(&config, &store),
        "bulk" => bulk(&config, &store),
        "auctions" => auctions(&config).await.map(|_| ()),
        "watch" => watch(&config, &store).await,
        other => Err(CommandError::Usage(format!("unknown command '{}'; {}", other, USAGE))),
    };

    if let Err(e) = result {
        error!("{} failed: {}", command, e);
        std::process::exit(1);
    }
}

fn print_and_save(config: &AppConfig, table: &Table, name: &str, now: DateTime<Utc>) -> Result<(), CommandError> {
    if table.is_empty() {
        info!("{}: nothing to report", name);
        return Ok(());
    }
    println!("{}\n", render_text(table));
    save_csv(table, &config.report_dir, name, now)?;
    Ok(())
}

/// Loads a JSON price dump, sanitizes it and stores it as a snapshot.
fn ingest(config: &AppConfig, store: &HistoryStore, path: &str) -> Result<(), CommandError> {
    let json = fs::read_to_string(path)?;
    let (timestamp, states) = parse_ingest(&json, Utc::now())?;
    let sanitizer = PriceSanitizer::new(&config.sanitizer);
    let snapshot = build_snapshot(timestamp, states, &sanitizer);
    let id = store.save_snapshot(&snapshot)?;
    println!("Stored snapshot {} ({} cards)", id, snapshot.cards.len());
    Ok(())
}

/// Relative spread (std-dev over mean) of a card's raw prices across snapshots.
fn raw_volatility(snapshots: &[Snapshot], row: &Row) -> Option<f64> {
    let raw: Vec<f64> = Snapshot::samples_for(snapshots, &row.card.key())
        .iter()
        .filter_map(|s| s.raw)
        .collect();
    let avg = mean(&raw);
    (raw.len() >= 2 && avg > 0.0).then(|| TrendCalculator::volatility(&raw).sqrt() / avg)
}

fn rank(config: &AppConfig, store: &HistoryStore) -> Result<(), CommandError> {
    let snapshots = store.load_snapshots()?;
    let Some(latest) = snapshots.last() else {
        warn!("No snapshots stored; run ingest first");
        return Ok(());
    };
    let now = Utc::now();

    let mut rows: Vec<Row> = latest.cards.values().map(Row::from_state).collect();
    if config.scoring.track_volatility {
        for row in rows.iter_mut() {
            row.volatility = raw_volatility(&snapshots, row);
        }
    }

    let engine = ScoringEngine::new(config.scoring.clone(), config.costs);
    let ranked = engine.rank(&rows, now);
    print_and_save(config, &report::ranked_report(&ranked), "ranked", now)?;
    print_and_save(config, &report::crossgrade_report(&engine.crossgrade_candidates(&rows)), "crossgrade", now)?;
    save_csv(&report::delta_report(&rows), &config.report_dir, "delta", now)?;
    save_csv(&report::multi_grade_report(&rows), &config.report_dir, "multi_grade", now)?;

    store.append_entries(&to_history_entries(&ranked, now))?;
    Ok(())
}

/// Compares the two most recent snapshots and dispatches the resulting alerts.
async fn alerts(config: &AppConfig, store: &HistoryStore) -> Result<(), CommandError> {
    let snapshots = store.latest_snapshots(2)?;
    let [old, new] = snapshots.as_slice() else {
        warn!("Need two snapshots for alerts, have {}", snapshots.len());
        return Ok(());
    };

    let engine = AlertEngine::new(config.alerts.clone(), config.costs);
    let alerts = engine.scan(old, new);
    for alert in &alerts {
        println!("[{:?}] {} {}: {}", alert.severity, alert.alert_type, alert.card_name, alert.message);
    }

    match TelegramNotifier::from_config(config.telegram.as_ref()) {
        Ok(notifier) => {
            for alert in &alerts {
                if let Err(e) = notifier.notify_alert(alert).await {
                    warn!("Telegram send error: {:?}", e);
                }
            }
        }
        Err(_) => info!("Telegram not configured; alerts printed only"),
    }
    Ok(())
}

fn market(config: &AppConfig, store: &HistoryStore) -> Result<(), CommandError> {
    let snapshots = store.load_snapshots()?;
    let analyzer = MarketAnalyzer::new(config.market.clone(), config.costs);
    let recommendations = analyzer.analyze_market(&snapshots);
    print_and_save(config, &report::recommendation_report(&recommendations), "market", Utc::now())?;

    for rec in recommendations.iter().take(3) {
        if let Some(seasonal) = analyzer.seasonal_analysis(&snapshots, &rec.card_key) {
            println!(
                "{}: best month {}, worst month {} ({:.1}% spread)",
                rec.card_name,
                month_name(seasonal.best_month),
                month_name(seasonal.worst_month),
                seasonal.delta_pct
            );
        }
    }
    Ok(())
}

fn history(config: &AppConfig, store: &HistoryStore) -> Result<(), CommandError> {
    let entries = store.load_entries()?;
    let analyzer = HistoryAnalyzer::new();
    let now = Utc::now();

    print_and_save(config, &report::trend_report(&analyzer.card_trends(&entries)), "trends", now)?;

    let indicators = analyzer.indicators(&entries);
    let waiting = indicators
        .iter()
        .filter(|i| !i.moving_averages.is_ready() || !i.momentum.is_ready())
        .count();
    if waiting > 0 {
        info!("{} of {} cards lack enough entries for some indicators", waiting, indicators.len());
    }
    print_and_save(config, &report::indicator_report(&indicators), "indicators", now)?;

    match analyzer.performance_report(&entries) {
        Analysis::Ready(perf) => print_and_save(config, &report::performance_report(&perf), "performance", now)?,
        Analysis::InsufficientData { required, available } => {
            info!("Performance report needs {} entries, have {}", required, available)
        }
    }
    if let Some(seasonal) = analyzer.seasonal(&entries) {
        println!(
            "Seasonal: best {}, worst {} ({:.1}% spread)",
            month_name(seasonal.best_month),
            month_name(seasonal.worst_month),
            seasonal.delta_pct
        );
    }
    Ok(())
}

fn bulk(config: &AppConfig, store: &HistoryStore) -> Result<(), CommandError> {
    let snapshots = store.latest_snapshots(1)?;
    let Some(latest) = snapshots.last() else {
        warn!("No snapshots stored; run ingest first");
        return Ok(());
    };

    let cards: Vec<SubmissionCard> = latest
        .cards
        .values()
        .filter_map(|state| {
            let raw = state.prices.raw?;
            let psa10 = state.prices.psa10?;
            let rate = state.population.map(|p| p.psa10_rate()).unwrap_or(0.0);
            Some(SubmissionCard::new(state.card.clone(), raw, psa10, state.prices.psa9, rate))
        })
        .collect();

    let ladder = ServiceLadder::from_config(&config.bulk);
    let optimizer = BulkOptimizer::new(&ladder, config.bulk.batch_shipping_cost, config.costs.selling_fee_pct);
    let plan = optimizer.optimize_submission(&cards);

    for batch in &plan.batches {
        println!("{}", generate_submission_form(batch));
    }
    for (level, count) in &plan.discarded {
        println!("{}: {} cards below the service minimum, not submitted", level, count);
    }
    for card in &plan.oversized {
        println!("{}: declared value {:.2} exceeds every service level", card.card.display_name(), card.declared_value);
    }
    Ok(())
}

/// One eBay search per target card, run concurrently.
async fn search_target(config: &AppConfig, target: &TargetCard, now: DateTime<Utc>) -> Result<Vec<AuctionOpportunity>, CommandError> {
    let terms = format!("{} {} {}", target.name, target.set_name, target.number);
    let source = EbayAuctionSource::new(&terms)?;
    let analyzer = AuctionAnalyzer::new(config.auction.clone(), Some(Arc::new(source)));
    Ok(analyzer.find_opportunities(std::slice::from_ref(target), now).await?)
}

async fn auctions(config: &AppConfig) -> Result<Vec<AuctionOpportunity>, CommandError> {
    if !config.auction.enabled || config.targets.is_empty() {
        return Err(AuctionError::NotConfigured.into());
    }
    let now = Utc::now();
    let results = join_all(config.targets.iter().map(|t| search_target(config, t, now))).await;

    let mut opportunities = Vec::new();
    for (target, result) in config.targets.iter().zip(results) {
        match result {
            Ok(found) => opportunities.extend(found),
            Err(e) => warn!("Auction search for {} failed: {}", target.name, e),
        }
    }
    opportunities.sort_by(|a, b| b.profit_score.total_cmp(&a.profit_score));
    print_and_save(config, &report::auction_report(&opportunities), "auctions", now)?;
    Ok(opportunities)
}

/// Periodically re-runs alerts on new snapshots and, when enabled, the auction scan.
async fn watch(config: &AppConfig, store: &HistoryStore) -> Result<(), CommandError> {
    let notifier = TelegramNotifier::from_config(config.telegram.as_ref()).ok();
    if let Some(n) = &notifier {
        if let Err(e) = n.notify_text("🚀 GradeSniper watch started").await {
            warn!("Startup notification failed: {:?}", e);
        }
    }

    let mut last_seen: Option<DateTime<Utc>> = None;
    loop {
        let latest = store.latest_snapshots(1)?.pop().map(|s| s.timestamp);
        if latest.is_some() && latest != last_seen {
            alerts(config, store).await?;
            last_seen = latest;
        } else {
            info!("No new snapshot since last check");
        }

        if config.auction.enabled {
            match auctions(config).await {
                Ok(found) => {
                    if let Some(n) = &notifier {
                        for o in found.iter().take(3) {
                            let text = format!(
                                "🔨 {}\n💰 {:.2} + {:.2} shipping\n📈 score {:.1}, ends in {} min\n🔗 {}",
                                o.auction.title, o.auction.current_bid, o.auction.shipping_cost,
                                o.profit_score, o.minutes_left, o.auction.url
                            );
                            if let Err(e) = n.notify_text(&text).await {
                                warn!("Telegram send error: {:?}", e);
                            }
                        }
                    }
                }
                Err(e) => warn!("Auction scan failed: {}", e),
            }
        }

        let jitter = rand::rng().random_range(0..=MAX_JITTER_SECONDS);
        info!("Waiting {}s (+{}s jitter)...", config.check_interval_seconds, jitter);
        sleep(Duration::from_secs(config.check_interval_seconds + jitter)).await;
    }
}
