// Utility functions
use chrono::{DateTime, NaiveDate, Utc};

const RELEASE_DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%B %d, %Y"];

/// Parses an RFC 3339 string into `DateTime<Utc>`, if possible.
pub fn parse_datetime(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Tries every known release-date format; a bare year maps to January 1st.
pub fn parse_release_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    RELEASE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            text.parse::<i32>()
                .ok()
                .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
        })
}

/// True if the text contains hiragana, katakana or CJK ideographs.
pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{3040}'..='\u{309F}'   // hiragana
            | '\u{30A0}'..='\u{30FF}' // katakana
            | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
            | '\u{FF66}'..='\u{FF9F}') // half-width katakana
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_dates_in_several_formats() {
        let expected = NaiveDate::from_ymd_opt(1999, 1, 9).unwrap();
        assert_eq!(parse_release_date("1999-01-09"), Some(expected));
        assert_eq!(parse_release_date("1999/01/09"), Some(expected));
        assert_eq!(parse_release_date("01/09/1999"), Some(expected));
        assert_eq!(parse_release_date("January 09, 1999"), Some(expected));
        assert_eq!(parse_release_date("1999"), NaiveDate::from_ymd_opt(1999, 1, 1));
        assert_eq!(parse_release_date("soon"), None);
    }

    #[test]
    fn detects_japanese_script() {
        assert!(contains_japanese("リザードン"));
        assert!(contains_japanese("Pikachu ピカチュウ"));
        assert!(!contains_japanese("Charizard"));
    }

    #[test]
    fn rfc3339_parsing() {
        assert!(parse_datetime("2024-02-03T04:05:06Z").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
