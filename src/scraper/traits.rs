use crate::model::{Auction, ScraperError};

/// Search collaborator for auctions that are about to close.
#[async_trait::async_trait]
pub trait AuctionSource: Send + Sync {
    async fn find_ending_auctions(
        &self,
        window_minutes: u32,
        category: &str,
    ) -> Result<Vec<Auction>, ScraperError>;
}
