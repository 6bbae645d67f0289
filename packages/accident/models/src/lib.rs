#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Accident severity taxonomy and accident record types.
//!
//! Road accident data from the Swiss federal roads office classifies each
//! accident into one of four severity categories (`as1` through `as4`).
//! This crate maps those category codes onto a typed enum with integer
//! weights used by danger scoring.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity category of an accident.
///
/// The string form is the source category code (`as1` .. `as4`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum AccidentSeverity {
    /// `as1`: accident with fatalities
    #[serde(rename = "as1")]
    #[strum(serialize = "as1")]
    Fatal,
    /// `as2`: accident with severe injuries
    #[serde(rename = "as2")]
    #[strum(serialize = "as2")]
    Severe,
    /// `as3`: accident with light injuries
    #[serde(rename = "as3")]
    #[strum(serialize = "as3")]
    Moderate,
    /// `as4`: accident with property damage only
    #[serde(rename = "as4")]
    #[strum(serialize = "as4")]
    Minor,
}

impl AccidentSeverity {
    /// Returns the scoring weight of this severity, from 4 (fatal) down to
    /// 1 (property damage only).
    #[must_use]
    pub const fn weight(self) -> u8 {
        match self {
            Self::Fatal => 4,
            Self::Severe => 3,
            Self::Moderate => 2,
            Self::Minor => 1,
        }
    }

    /// Parses a source category code such as `"as2"`.
    ///
    /// Surrounding whitespace and letter case are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownSeverityError`] if the code is not one of
    /// `as1`..`as4`.
    pub fn from_category(category: &str) -> Result<Self, UnknownSeverityError> {
        category
            .trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| UnknownSeverityError {
                category: category.to_string(),
            })
    }

    /// Returns all variants, most severe first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Fatal, Self::Severe, Self::Moderate, Self::Minor]
    }
}

/// Error returned when a severity category code is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSeverityError {
    /// The unrecognized category code.
    pub category: String,
}

impl std::fmt::Display for UnknownSeverityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown accident severity category {:?}: expected as1-as4",
            self.category
        )
    }
}

impl std::error::Error for UnknownSeverityError {}

/// A single accident with a known severity, located in the Swiss LV95
/// projected coordinate system (EPSG:2056, meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccidentRecord {
    /// LV95 easting.
    pub easting: f64,
    /// LV95 northing.
    pub northing: f64,
    /// Severity category.
    pub severity: AccidentSeverity,
}

impl AccidentRecord {
    /// Creates a new accident record.
    #[must_use]
    pub const fn new(easting: f64, northing: f64, severity: AccidentSeverity) -> Self {
        Self {
            easting,
            northing,
            severity,
        }
    }

    /// Scoring weight of this accident's severity.
    #[must_use]
    pub const fn weight(&self) -> u8 {
        self.severity.weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_injective_and_ordered() {
        let weights: Vec<u8> = AccidentSeverity::all()
            .iter()
            .map(|s| s.weight())
            .collect();
        assert_eq!(weights, vec![4, 3, 2, 1]);
    }

    #[test]
    fn parses_category_codes() {
        assert_eq!(
            AccidentSeverity::from_category("as1"),
            Ok(AccidentSeverity::Fatal)
        );
        assert_eq!(
            AccidentSeverity::from_category(" AS3 "),
            Ok(AccidentSeverity::Moderate)
        );
        assert_eq!(AccidentSeverity::Minor.to_string(), "as4");
    }

    #[test]
    fn rejects_unknown_categories() {
        let err = AccidentSeverity::from_category("as5").unwrap_err();
        assert_eq!(err.category, "as5");
        assert!(AccidentSeverity::from_category("").is_err());
    }

    #[test]
    fn serde_uses_category_codes() {
        let json = serde_json::to_string(&AccidentSeverity::Severe).unwrap();
        assert_eq!(json, "\"as2\"");
    }
}
