//! Cell coercion for amount and date columns

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::{Result, SupplyError};

/// Date layouts seen in procurement exports, tried in order
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y"];

/// Output layout of normalized `Creation Date` values
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses decorated amounts such as `"$1,234.50"` or `"USD 12.00 ea"`
#[derive(Debug, Clone)]
pub struct AmountParser {
    decoration: Regex,
}

impl AmountParser {
    pub fn new() -> Result<Self> {
        let decoration = Regex::new(r"[^\d.\-]")
            .map_err(|e| SupplyError::Config(format!("Invalid amount pattern: {}", e)))?;
        Ok(Self { decoration })
    }

    /// Strip everything except digits, `.` and `-`, then parse.
    ///
    /// Never fails: a cell without usable numeric content is missing.
    pub fn parse(&self, raw: &str) -> Option<f64> {
        let cleaned = self.decoration.replace_all(raw, "");
        if cleaned.is_empty() {
            return None;
        }
        cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Normalize a date cell to `YYYY-MM-DD HH:MM:SS`, keeping it verbatim when
/// no known layout matches.
pub fn normalize_datetime(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return parsed.format(CANONICAL_DATETIME_FORMAT).to_string();
        }
    }

    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
                return midnight.format(CANONICAL_DATETIME_FORMAT).to_string();
            }
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decorated_amounts() {
        let parser = AmountParser::new().unwrap();
        assert_eq!(parser.parse("$1,234.50"), Some(1234.5));
        assert_eq!(parser.parse("USD 12.00 ea"), Some(12.0));
        assert_eq!(parser.parse("-3.25"), Some(-3.25));
        assert_eq!(parser.parse("42"), Some(42.0));
    }

    #[test]
    fn test_non_numeric_cells_are_missing() {
        let parser = AmountParser::new().unwrap();
        assert_eq!(parser.parse(""), None);
        assert_eq!(parser.parse("N/A"), None);
        assert_eq!(parser.parse("nan"), None);
        assert_eq!(parser.parse("-"), None);
        assert_eq!(parser.parse("1.2.3"), None);
    }

    #[test]
    fn test_datetime_normalization() {
        assert_eq!(normalize_datetime("2023-04-05"), "2023-04-05 00:00:00");
        assert_eq!(
            normalize_datetime("4/5/2023 13:07"),
            "2023-04-05 13:07:00"
        );
        assert_eq!(
            normalize_datetime("2023-04-05 08:30:00"),
            "2023-04-05 08:30:00"
        );
        assert_eq!(normalize_datetime("sometime in May"), "sometime in May");
        assert_eq!(normalize_datetime("  "), "");
    }
}
