//! Extraction results read from disk

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use compliance_engine::{epd_from_json, EpdRecord, PartialRecord, Scenario};
use serde::Deserialize;
use shared_types::Provenance;

/// Scenario file holding raw adapter outputs
#[derive(Debug, Default, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    regulation: Option<String>,
    #[serde(default)]
    exposure_classes: Vec<String>,
    #[serde(default, alias = "conditions")]
    condition_descriptors: Vec<String>,
    #[serde(default, alias = "drawing")]
    drawings: Vec<serde_json::Value>,
    #[serde(default, alias = "custom_text")]
    custom: Vec<serde_json::Value>,
    #[serde(default)]
    epds: Option<serde_json::Value>,
}

pub fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub fn read_source(provenance: Provenance, path: &Path) -> Result<PartialRecord> {
    Ok(PartialRecord::from_json(provenance, &read_json(path)?))
}

/// One record per object; arrays get `<fallback_id>-<n>` ids where unnamed
pub fn epds_from_json(fallback_id: &str, json: &serde_json::Value) -> Vec<EpdRecord> {
    match json {
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| epd_from_json(&format!("{}-{}", fallback_id, i + 1), item))
            .collect(),
        other => vec![epd_from_json(fallback_id, other)],
    }
}

pub fn read_epds(path: &Path) -> Result<Vec<EpdRecord>> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "epd".to_string());
    Ok(epds_from_json(&stem, &read_json(path)?))
}

pub fn read_scenario(path: &Path, default_regulation: &str) -> Result<Scenario> {
    let file: ScenarioFile = serde_json::from_value(read_json(path)?)
        .with_context(|| format!("Invalid scenario file {}", path.display()))?;

    let mut scenario = Scenario::new(
        file.regulation
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| default_regulation.to_string()),
    );
    scenario.exposure_classes = file.exposure_classes;
    scenario.condition_descriptors = file.condition_descriptors.into_iter().collect();
    scenario.sources.extend(
        file.drawings
            .iter()
            .map(|raw| PartialRecord::from_json(Provenance::Drawing, raw)),
    );
    scenario.sources.extend(
        file.custom
            .iter()
            .map(|raw| PartialRecord::from_json(Provenance::CustomText, raw)),
    );
    if let Some(epds) = &file.epds {
        scenario.products = epds_from_json("epd", epds);
    }
    Ok(scenario)
}
