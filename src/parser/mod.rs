pub mod ebay_parser;

pub use ebay_parser::{EbayParser, Parser};
