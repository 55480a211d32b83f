//! Retryable HTTP status sets.
//!
//! Parsed from a comma-separated list of codes and inclusive ranges:
//!
//! ```ignore
//! let codes = ErrorCodes::parse("500-599,408")?;
//! assert!(codes.contains(503));
//! assert!(codes.contains(408));
//! assert!(!codes.contains(404));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::{Error, Result};

// ============================================================================
// ErrorCodes
// ============================================================================

/// A set of HTTP status codes treated as retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodes {
    ranges: Vec<RangeInclusive<u16>>,
}

impl ErrorCodes {
    /// Parses a code list such as `"500-599,408"`.
    ///
    /// An empty string yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a part that is not a code or range.
    pub fn parse(list: &str) -> Result<Self> {
        let mut ranges = Vec::new();

        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((min, max)) => parse_code(min)?..=parse_code(max)?,
                None => {
                    let code = parse_code(part)?;
                    code..=code
                }
            };
            if range.is_empty() {
                return Err(Error::config(format!("Empty status range: {part}")));
            }
            ranges.push(range);
        }

        Ok(Self { ranges })
    }

    /// Returns `true` if `code` is in the set.
    #[must_use]
    pub fn contains(&self, code: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(&code))
    }
}

impl Default for ErrorCodes {
    /// All server errors: `500-599`.
    fn default() -> Self {
        Self {
            ranges: vec![500..=599],
        }
    }
}

impl FromStr for ErrorCodes {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ErrorCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|r| {
                if r.start() == r.end() {
                    r.start().to_string()
                } else {
                    format!("{}-{}", r.start(), r.end())
                }
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}

fn parse_code(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| Error::config(format!("Invalid HTTP status code: {raw:?}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_server_errors() {
        let codes = ErrorCodes::default();
        assert!(codes.contains(500));
        assert!(codes.contains(599));
        assert!(!codes.contains(499));
        assert!(!codes.contains(200));
    }

    #[test]
    fn test_parse_mixed() {
        let codes = ErrorCodes::parse("500-502, 408").unwrap();
        assert!(codes.contains(501));
        assert!(codes.contains(408));
        assert!(!codes.contains(503));
        assert_eq!(codes.to_string(), "500-502,408");
    }

    #[test]
    fn test_parse_empty() {
        let codes = ErrorCodes::parse("").unwrap();
        assert!(!codes.contains(500));
        assert!(!codes.contains(408));
        assert_eq!(codes.to_string(), "");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ErrorCodes::parse("5xx").is_err());
        assert!(ErrorCodes::parse("600-500").is_err());
        assert!("abc".parse::<ErrorCodes>().is_err());
    }
}
