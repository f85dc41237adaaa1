pub mod fetcher;
pub mod traits;

pub use fetcher::EbayAuctionSource;
pub use traits::AuctionSource;
