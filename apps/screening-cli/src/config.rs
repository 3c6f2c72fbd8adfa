//! Process configuration for the screening CLI

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use compliance_engine::Jurisdiction;

/// Settings read from the environment; command-line flags take precedence
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningConfig {
    /// Jurisdiction used when no `--regulation` flag is given
    pub regulation: Jurisdiction,
    /// Directory holding `<id>.json` and `<id>_exposure_class_mapping.json`;
    /// the bundled tables are used when unset
    pub regulations_dir: Option<PathBuf>,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            regulation: Jurisdiction::En206,
            regulations_dir: None,
        }
    }
}

impl ScreeningConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - SCREENING_REGULATION: jurisdiction identifier (default: "EN 206")
    /// - SCREENING_REGULATIONS_DIR: directory of regulation tables (optional)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(id) = lookup("SCREENING_REGULATION").filter(|v| !v.trim().is_empty()) {
            config.regulation = Jurisdiction::parse_code(&id)
                .ok_or_else(|| anyhow!("Unknown regulation in SCREENING_REGULATION: {}", id))?;
        }
        config.regulations_dir = lookup("SCREENING_REGULATIONS_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ScreeningConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ScreeningConfig::default());
    }

    #[test]
    fn test_config_from_vars() {
        let config = ScreeningConfig::from_lookup(lookup(&[
            ("SCREENING_REGULATION", "as3600"),
            ("SCREENING_REGULATIONS_DIR", "/etc/screening"),
        ]))
        .unwrap();
        assert_eq!(config.regulation, Jurisdiction::As3600);
        assert_eq!(config.regulations_dir, Some(PathBuf::from("/etc/screening")));
    }

    #[test]
    fn test_blank_values_fall_back() {
        let config = ScreeningConfig::from_lookup(lookup(&[
            ("SCREENING_REGULATION", "  "),
            ("SCREENING_REGULATIONS_DIR", ""),
        ]))
        .unwrap();
        assert_eq!(config, ScreeningConfig::default());
    }

    #[test]
    fn test_unknown_regulation_rejected() {
        let err = ScreeningConfig::from_lookup(lookup(&[("SCREENING_REGULATION", "ACI 318")]))
            .unwrap_err();
        assert!(err.to_string().contains("ACI 318"));
    }
}
