// Analyzer module: scoring, trends, alerts and planning over collected price data.

pub mod alerts;
pub mod auction;
pub mod bulk;
pub mod history;
pub mod market;
pub mod scoring;
pub mod trend;

pub use alerts::AlertEngine;
pub use auction::AuctionAnalyzer;
pub use bulk::{BulkOptimizer, ServiceLadder};
pub use history::HistoryAnalyzer;
pub use market::MarketAnalyzer;
pub use scoring::ScoringEngine;
