//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};

/// Country code used when nothing is known (the neutral flag).
pub const NEUTRAL_ICON: &str = "aq";

/// ISO 3166-1 alpha-2 country code.
///
/// Always stored upper-case. Providers disagree on casing, so parsing
/// normalises before comparing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Parse a country code from a provider response field.
    ///
    /// # Examples
    /// ```
    /// use ip_widget::domain::value_objects::CountryCode;
    ///
    /// assert_eq!(CountryCode::parse("de").unwrap().as_str(), "DE");
    /// assert!(CountryCode::parse("DEU").is_none());
    /// assert!(CountryCode::parse("-").is_none());
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(s.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// Upper-case representation, e.g. "US".
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case key used by the presentation layer to pick a flag image.
    pub fn icon_key(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl TryFrom<String> for CountryCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid country code: {:?}", value))
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
