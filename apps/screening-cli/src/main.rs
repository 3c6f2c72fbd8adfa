//! Concrete EPD Durability Screening CLI
//!
//! Screens already-extracted EPD records against the exposure-class
//! requirements of a regulation, drawings and custom requirement text.
//! The report goes to stdout as JSON; logs go to stderr.

mod config;
mod inputs;
mod loader;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use compliance_engine::{RegulationRepository, SchemaLoader, Scenario, ScreeningEngine};
use shared_types::{Outcome, Provenance};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ScreeningConfig;
use crate::loader::DirectoryLoader;

#[derive(Parser, Debug)]
#[command(name = "concrete-screen")]
#[command(
    version,
    about = "Screen concrete EPDs against exposure-class durability requirements"
)]
struct Args {
    /// Regulation to screen against, e.g. "EN 206" (default: SCREENING_REGULATION)
    #[arg(short, long)]
    regulation: Option<String>,

    /// Exposure class code; repeat for several
    #[arg(short = 'x', long = "exposure-class")]
    exposure_classes: Vec<String>,

    /// Environmental condition in plain words, e.g. "coastal"; repeat for several
    #[arg(short, long = "condition")]
    conditions: Vec<String>,

    /// Drawing extraction result (JSON)
    #[arg(long = "drawing")]
    drawings: Vec<PathBuf>,

    /// Custom requirement text extraction result (JSON)
    #[arg(long = "custom")]
    custom: Vec<PathBuf>,

    /// EPD extraction result (JSON object or array)
    #[arg(long = "epd")]
    epds: Vec<PathBuf>,

    /// Scenario file with raw extraction results; flags add to it
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Directory of regulation tables (default: SCREENING_REGULATIONS_DIR, else bundled)
    #[arg(long)]
    regulations_dir: Option<PathBuf>,

    /// Print the available regulations and exit
    #[arg(long)]
    list_regulations: bool,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    /// Exit with status 1 unless every product passes
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // stdout carries the report, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ScreeningConfig::from_env()?;

    match args.regulations_dir.as_ref().or(config.regulations_dir.as_ref()) {
        Some(dir) => {
            tracing::info!("Using regulation tables from {}", dir.display());
            run(&RegulationRepository::new(DirectoryLoader::new(dir)), &args, &config)
        }
        None => run(&RegulationRepository::bundled(), &args, &config),
    }
}

/// One "name<TAB>region" line per selectable regulation
fn regulation_list<L: SchemaLoader>(repository: &RegulationRepository<L>) -> Vec<String> {
    repository
        .available_jurisdictions()
        .into_iter()
        .map(|jurisdiction| format!("{}\t{}", jurisdiction.name(), jurisdiction.region()))
        .collect()
}

fn build_scenario(args: &Args, config: &ScreeningConfig) -> Result<Scenario> {
    let default_regulation = config.regulation.name();
    let mut scenario = match &args.scenario {
        Some(path) => inputs::read_scenario(path, default_regulation)?,
        None => Scenario::new(default_regulation),
    };
    if let Some(regulation) = &args.regulation {
        scenario.regulation = regulation.clone();
    }

    scenario
        .exposure_classes
        .extend(args.exposure_classes.iter().cloned());
    scenario
        .condition_descriptors
        .extend(args.conditions.iter().cloned());
    for path in &args.drawings {
        scenario
            .sources
            .push(inputs::read_source(Provenance::Drawing, path)?);
    }
    for path in &args.custom {
        scenario
            .sources
            .push(inputs::read_source(Provenance::CustomText, path)?);
    }
    for path in &args.epds {
        scenario.products.extend(inputs::read_epds(path)?);
    }
    Ok(scenario)
}

fn run<L: SchemaLoader>(
    repository: &RegulationRepository<L>,
    args: &Args,
    config: &ScreeningConfig,
) -> Result<ExitCode> {
    if args.list_regulations {
        for line in regulation_list(repository) {
            println!("{}", line);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let scenario = build_scenario(args, config)?;
    let report = ScreeningEngine::new(repository)
        .screen(&scenario)
        .with_context(|| format!("Screening against {} failed", scenario.regulation))?;

    for warning in &report.warnings {
        tracing::warn!("{}", warning.message);
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize report")?;
    println!("{}", json);

    if args.strict && report.overall() != Outcome::Pass {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_engine::Jurisdiction;

    #[test]
    fn test_flags_parse() {
        let args = Args::try_parse_from([
            "concrete-screen",
            "-r",
            "AS 3600",
            "-x",
            "B1",
            "-c",
            "coastal",
            "-c",
            "tidal zone",
            "--strict",
        ])
        .unwrap();
        assert_eq!(args.regulation.as_deref(), Some("AS 3600"));
        assert_eq!(args.exposure_classes, vec!["B1"]);
        assert_eq!(args.conditions.len(), 2);
        assert!(args.strict);
    }

    #[test]
    fn test_regulation_list_comes_from_repository() {
        let lines = regulation_list(&RegulationRepository::bundled());
        assert_eq!(lines, vec!["EN 206\tEurope (CEN)", "AS 3600\tAustralia"]);
    }

    #[test]
    fn test_flag_regulation_overrides_config() {
        let args = Args::try_parse_from(["concrete-screen", "--regulation", "en206"]).unwrap();
        let config = ScreeningConfig {
            regulation: Jurisdiction::As3600,
            regulations_dir: None,
        };
        let scenario = build_scenario(&args, &config).unwrap();
        assert_eq!(scenario.regulation, "en206");

        let args = Args::try_parse_from(["concrete-screen", "-c", "spray zone"]).unwrap();
        let scenario = build_scenario(&args, &config).unwrap();
        assert_eq!(scenario.regulation, "AS 3600");
        assert!(scenario.condition_descriptors.contains("spray zone"));
    }
}
