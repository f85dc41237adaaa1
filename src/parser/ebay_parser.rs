// eBay search-result parsing for auction listings
use crate::model::{Auction, ParserError};
use chrono::{DateTime, Duration, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

pub trait Parser {
    fn parse(&self, html: &str, now: DateTime<Utc>) -> Result<Vec<Auction>, ParserError>;
}

pub struct EbayParser;

fn selector(css: &str) -> Result<Selector, ParserError> {
    Selector::parse(css).map_err(|e| ParserError::HtmlParseError(e.to_string()))
}

fn text(element: &ElementRef, sel: &Selector) -> Option<String> {
    element
        .select(sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
}

impl EbayParser {
    pub fn new() -> Self {
        Self
    }
}

/// First dollar amount in the text: "$1,234.56" -> 1234.56, "Free shipping" -> 0.
pub fn parse_price(text: &str) -> Option<f64> {
    if text.to_lowercase().contains("free") {
        return Some(0.0);
    }
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let number: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    number.parse().ok()
}

/// "1d 2h left", "2h 15m left", "45m left" -> duration. `None` when nothing
/// parses or the total is out of range.
pub fn parse_time_left(text: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut found = false;
    for token in text.split_whitespace() {
        let (digits, unit): (String, String) = token.chars().partition(|c| c.is_ascii_digit());
        let Ok(value) = digits.parse::<i64>() else {
            continue;
        };
        let part = match unit.as_str() {
            "d" => Duration::try_days(value),
            "h" => Duration::try_hours(value),
            "m" => Duration::try_minutes(value),
            "s" => Duration::try_seconds(value),
            _ => continue,
        }?;
        total = total.checked_add(&part)?;
        found = true;
    }
    found.then_some(total)
}

/// Positive-feedback percentage, e.g. "cardshop (1,204) 99.6%" -> 99.6.
pub fn parse_seller_rating(text: &str) -> Option<f64> {
    text.split_whitespace()
        .find_map(|token| token.strip_suffix('%'))
        .and_then(|pct| pct.parse().ok())
}

impl Parser for EbayParser {
    fn parse(&self, html: &str, now: DateTime<Utc>) -> Result<Vec<Auction>, ParserError> {
        let document = Html::parse_document(html);

        let item_selector = selector("li.s-item")?;
        let title_selector = selector(".s-item__title")?;
        let price_selector = selector(".s-item__price")?;
        let shipping_selector = selector(".s-item__shipping, .s-item__logisticsCost")?;
        let bids_selector = selector(".s-item__bids, .s-item__bidCount")?;
        let time_selector = selector(".s-item__time-left")?;
        let link_selector = selector("a.s-item__link")?;
        let seller_selector = selector(".s-item__seller-info-text")?;

        let mut auctions = Vec::new();

        for element in document.select(&item_selector) {
            let Some(title) = text(&element, &title_selector) else {
                continue;
            };
            // eBay injects a "Shop on eBay" placeholder as the first result
            if title.is_empty() || title.eq_ignore_ascii_case("shop on ebay") {
                continue;
            }
            let Some(current_bid) = text(&element, &price_selector).and_then(|t| parse_price(&t)) else {
                debug!("Skipping '{}': no price", title);
                continue;
            };
            let Some(end_time) = text(&element, &time_selector)
                .and_then(|t| parse_time_left(&t))
                .and_then(|left| now.checked_add_signed(left))
            else {
                debug!("Skipping '{}': no usable end time", title);
                continue;
            };

            let shipping_cost = text(&element, &shipping_selector)
                .and_then(|t| parse_price(&t))
                .unwrap_or(0.0);
            let bid_count = text(&element, &bids_selector)
                .and_then(|t| t.split_whitespace().next().and_then(|n| n.parse().ok()))
                .unwrap_or(0);
            // missing feedback counts as unrated
            let seller_rating = text(&element, &seller_selector)
                .and_then(|t| parse_seller_rating(&t))
                .unwrap_or(0.0);
            let url = element
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
                .unwrap_or("")
                .to_string();

            auctions.push(Auction {
                title,
                current_bid,
                shipping_cost,
                end_time,
                bid_count,
                seller_rating,
                url,
            });
        }

        if auctions.is_empty() && !html.contains("s-item") {
            return Err(ParserError::MissingField("s-item".to_string()));
        }
        Ok(auctions)
    }
}
