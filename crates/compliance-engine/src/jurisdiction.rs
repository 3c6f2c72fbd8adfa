//! Regulatory schemas a scenario can be screened against

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScreeningError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Jurisdiction {
    /// European concrete standard
    #[serde(rename = "EN 206")]
    En206,
    /// Australian concrete structures standard
    #[serde(rename = "AS 3600")]
    As3600,
}

impl Jurisdiction {
    pub const ALL: [Jurisdiction; 2] = [Jurisdiction::En206, Jurisdiction::As3600];

    /// Display name, also the identifier shown in regulation selectors
    pub fn name(&self) -> &'static str {
        match self {
            Jurisdiction::En206 => "EN 206",
            Jurisdiction::As3600 => "AS 3600",
        }
    }

    /// Stem of the data files (`en206.json`, `en206_exposure_class_mapping.json`)
    pub fn file_stem(&self) -> &'static str {
        match self {
            Jurisdiction::En206 => "en206",
            Jurisdiction::As3600 => "as3600",
        }
    }

    pub fn region(&self) -> &'static str {
        match self {
            Jurisdiction::En206 => "Europe (CEN)",
            Jurisdiction::As3600 => "Australia",
        }
    }

    /// Parse an identifier, ignoring case, spaces, hyphens and a trailing
    /// `.json` (so "EN 206", "en206" and "EN-206.json" all match)
    pub fn parse_code(s: &str) -> Option<Self> {
        let cleaned: String = s
            .trim()
            .trim_end_matches(".json")
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_uppercase();

        match cleaned.as_str() {
            "EN206" => Some(Jurisdiction::En206),
            "AS3600" => Some(Jurisdiction::As3600),
            _ => None,
        }
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Jurisdiction {
    type Err = ScreeningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_code(s).ok_or_else(|| ScreeningError::UnknownJurisdiction(s.to_string()))
    }
}
