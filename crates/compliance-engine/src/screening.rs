//! One screening run: regulation + drawing/custom-text sources + EPDs -> verdicts

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{
    Annotation, ComplianceVerdict, ExposureClass, Outcome, Parameter, RequirementValue,
};
use tracing::info;

use crate::adapters::PartialRecord;
use crate::checker::{effective_requirements, evaluate};
use crate::consolidate::{consolidate, ConsolidatedRequirementSet};
use crate::epd::EpdRecord;
use crate::error::Result;
use crate::jurisdiction::Jurisdiction;
use crate::mapping::{resolve_exposure_classes, validate_declared_classes, DescriptorMatch};
use crate::repository::{BundledLoader, RegulationRepository, SchemaLoader};

/// Inputs of one screening run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Jurisdiction identifier, e.g. "EN 206"
    pub regulation: String,
    /// Exposure class codes selected by the user
    #[serde(default)]
    pub exposure_classes: Vec<String>,
    /// Free-text conditions selected by the user
    #[serde(default)]
    pub condition_descriptors: BTreeSet<String>,
    /// Drawing and custom-text extraction results
    #[serde(default)]
    pub sources: Vec<PartialRecord>,
    #[serde(default)]
    pub products: Vec<EpdRecord>,
}

impl Scenario {
    pub fn new(regulation: impl Into<String>) -> Self {
        Self {
            regulation: regulation.into(),
            ..Default::default()
        }
    }

    pub fn with_exposure_class(mut self, code: &str) -> Self {
        self.exposure_classes.push(code.to_string());
        self
    }

    pub fn with_descriptor(mut self, descriptor: &str) -> Self {
        self.condition_descriptors.insert(descriptor.to_string());
        self
    }

    pub fn with_source(mut self, source: PartialRecord) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_product(mut self, product: EpdRecord) -> Self {
        self.products.push(product);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub jurisdiction: Jurisdiction,
    pub regulation_title: String,
    /// Declared and inferred exposure classes the baseline was taken for
    pub exposure_classes: BTreeSet<ExposureClass>,
    pub class_descriptions: BTreeMap<ExposureClass, String>,
    pub descriptor_matches: Vec<DescriptorMatch>,
    pub unresolved_descriptors: Vec<String>,
    pub requirements: ConsolidatedRequirementSet,
    /// The single threshold per parameter every product is checked against
    pub effective: BTreeMap<Parameter, RequirementValue>,
    /// Scenario-level warnings; product-level ones sit on each verdict
    pub warnings: Vec<Annotation>,
    pub verdicts: Vec<ComplianceVerdict>,
    pub checked_at: DateTime<Utc>,
}

impl ScreeningReport {
    /// Worst outcome over all products
    pub fn overall(&self) -> Outcome {
        Outcome::aggregate(self.verdicts.iter().map(|v| v.overall))
    }

    pub fn verdict(&self, product_id: &str) -> Option<&ComplianceVerdict> {
        self.verdicts.iter().find(|v| v.product_id == product_id)
    }
}

/// Runs scenarios against a shared regulation repository
pub struct ScreeningEngine<'a, L = BundledLoader> {
    repository: &'a RegulationRepository<L>,
}

impl<'a, L: SchemaLoader> ScreeningEngine<'a, L> {
    pub fn new(repository: &'a RegulationRepository<L>) -> Self {
        Self { repository }
    }

    /// Screen every product of `scenario`.
    ///
    /// Only an unknown or unloadable jurisdiction aborts the run; every other
    /// problem ends up as a warning on the report.
    pub fn screen(&self, scenario: &Scenario) -> Result<ScreeningReport> {
        let jurisdiction: Jurisdiction = scenario.regulation.parse()?;
        let schema = self.repository.schema(jurisdiction)?;
        let mapping = self.repository.exposure_mapping(jurisdiction)?;

        let mut warnings: Vec<Annotation> = scenario
            .sources
            .iter()
            .flat_map(|source| source.annotations.iter().cloned())
            .collect();

        let declared = scenario
            .exposure_classes
            .iter()
            .chain(scenario.sources.iter().flat_map(|s| &s.exposure_classes))
            .map(String::as_str);
        let (mut classes, declared_warnings) = validate_declared_classes(declared, &schema);
        warnings.extend(declared_warnings);

        let descriptors: BTreeSet<String> = scenario
            .condition_descriptors
            .iter()
            .chain(scenario.sources.iter().flat_map(|s| &s.condition_descriptors))
            .cloned()
            .collect();
        let resolution = resolve_exposure_classes(&descriptors, &mapping, &schema);
        classes.extend(resolution.classes.iter().cloned());
        warnings.extend(resolution.annotations);

        let mut ordered: Vec<&PartialRecord> = scenario.sources.iter().collect();
        // stable: drawings before custom text, input order within a provenance
        ordered.sort_by_key(|source| source.provenance);
        let mut overrides = Vec::new();
        for source in ordered {
            let (values, source_warnings) = source.overrides(&schema);
            overrides.extend(values);
            warnings.extend(source_warnings);
        }

        let requirements = consolidate(&schema, &classes, &overrides);
        warnings.extend(requirements.annotations.iter().cloned());
        let effective = effective_requirements(&requirements);

        let verdicts: Vec<ComplianceVerdict> = scenario
            .products
            .iter()
            .map(|product| {
                let (attributes, mut product_warnings) = product.attributes(&schema);
                let mut verdict = evaluate(&requirements, &attributes);
                product_warnings.append(&mut verdict.annotations);
                verdict.annotations = product_warnings;
                verdict
            })
            .collect();

        let class_descriptions = requirements
            .classes
            .keys()
            .filter_map(|class| {
                mapping
                    .describe(class)
                    .map(|text| (class.clone(), text.to_string()))
            })
            .collect();

        let report = ScreeningReport {
            jurisdiction,
            regulation_title: schema.title.clone(),
            exposure_classes: classes,
            class_descriptions,
            descriptor_matches: resolution.matches,
            unresolved_descriptors: resolution.unresolved,
            requirements,
            effective,
            warnings,
            verdicts,
            checked_at: Utc::now(),
        };

        info!(
            jurisdiction = %report.jurisdiction,
            classes = ?report.exposure_classes,
            products = report.verdicts.len(),
            warnings = report.warnings.len(),
            overall = report.overall().tag(),
            "screening complete"
        );
        Ok(report)
    }
}
