use crate::model::{Auction, ScraperError};
use crate::parser::{EbayParser, Parser};
use crate::scraper::AuctionSource;
use chrono::{Duration, Utc};
use reqwest::{Client, Request};
use tracing::{info, warn};

const EBAY_SEARCH_URL: &str = "https://www.ebay.com/sch/i.html";

/// Scrapes eBay's "ending soonest" auction search.
pub struct EbayAuctionSource {
    client: Client,
    parser: EbayParser,
    search_terms: String,
}

impl EbayAuctionSource {
    pub fn new(search_terms: &str) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) GradeSniperBot/0.1")
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| ScraperError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            parser: EbayParser::new(),
            search_terms: search_terms.to_string(),
        })
    }

    /// Search request for auctions in `category`, soonest-ending first.
    fn search_request(&self, category: &str) -> Result<Request, ScraperError> {
        self.client
            .get(EBAY_SEARCH_URL)
            .query(&[
                ("_nkw", self.search_terms.trim()),
                ("_sacat", category),
                ("LH_Auction", "1"),
                ("_sop", "1"),
            ])
            .build()
            .map_err(|e| ScraperError::HttpError(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AuctionSource for EbayAuctionSource {
    async fn find_ending_auctions(
        &self,
        window_minutes: u32,
        category: &str,
    ) -> Result<Vec<Auction>, ScraperError> {
        let request = self.search_request(category)?;
        info!("Fetching auctions: {}", request.url());

        let response = self.client.execute(request).await.map_err(|e| {
            if e.is_timeout() {
                ScraperError::Timeout
            } else {
                ScraperError::HttpError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("eBay responded with {}", status);
            return Err(ScraperError::InvalidResponse(body));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ScraperError::HttpError(e.to_string()))?;

        let now = Utc::now();
        let cutoff = now + Duration::minutes(window_minutes as i64);
        let auctions: Vec<Auction> = self
            .parser
            .parse(&html, now)?
            .into_iter()
            .filter(|a| a.end_time <= cutoff)
            .collect();
        info!("{} auctions end within {} minutes", auctions.len(), window_minutes);
        Ok(auctions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn query(source: &EbayAuctionSource, category: &str) -> HashMap<String, String> {
        let request = source.search_request(category).unwrap();
        assert!(request.url().as_str().starts_with(EBAY_SEARCH_URL));
        assert!(request.url().fragment().is_none());
        request.url().query_pairs().into_owned().collect()
    }

    #[test]
    fn search_targets_ending_auctions() {
        let source = EbayAuctionSource::new("pokemon holo").unwrap();
        let pairs = query(&source, "183454");
        assert_eq!(pairs["_nkw"], "pokemon holo");
        assert_eq!(pairs["_sacat"], "183454");
        assert_eq!(pairs["LH_Auction"], "1");
        assert_eq!(pairs["_sop"], "1");
    }

    #[test]
    fn reserved_characters_stay_inside_the_search_terms() {
        let source = EbayAuctionSource::new("Pokemon & Friends #25 +1").unwrap();
        let pairs = query(&source, "183454");
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs["_nkw"], "Pokemon & Friends #25 +1");
        assert_eq!(pairs["_sacat"], "183454");
        assert_eq!(pairs["LH_Auction"], "1");
    }
}
