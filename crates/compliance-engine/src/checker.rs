//! Compliance Checker
//!
//! Compares one product's attributes against a consolidated requirement set.
//! Each parameter is first reduced to its single most stringent threshold
//! across all exposure classes, then checked once. Evaluation is a pure
//! function of its inputs.

use std::collections::BTreeMap;

use shared_types::{
    Annotation, AnnotationKind, ComplianceVerdict, Direction, Field, Outcome, Parameter,
    ParameterCheck, ProductAttributeSet, RequirementValue, Severity, Value,
};
use tracing::debug;

use crate::consolidate::{most_stringent, ConsolidatedRequirementSet};

/// The one threshold per parameter a product must meet.
///
/// Class buckets are visited in class order, class-independent requirements
/// last; on equal stringency the first one seen is kept.
pub fn effective_requirements(
    requirements: &ConsolidatedRequirementSet,
) -> BTreeMap<Parameter, RequirementValue> {
    let mut grouped: BTreeMap<Parameter, Vec<RequirementValue>> = BTreeMap::new();
    for value in requirements.values() {
        grouped
            .entry(value.parameter)
            .or_default()
            .push(value.clone());
    }
    grouped
        .into_iter()
        .filter_map(|(parameter, values)| most_stringent(values).map(|v| (parameter, v)))
        .collect()
}

/// Evaluate one product against the consolidated requirements
pub fn evaluate(
    requirements: &ConsolidatedRequirementSet,
    product: &ProductAttributeSet,
) -> ComplianceVerdict {
    let mut checks = BTreeMap::new();
    let mut annotations = Vec::new();

    for (parameter, threshold) in effective_requirements(requirements) {
        let observed = product
            .attributes
            .get(&parameter)
            .cloned()
            .unwrap_or(Field::Absent);
        let (outcome, detail) = check_one(&threshold, &observed);

        if !observed.is_present() {
            annotations.push(Annotation::new(
                AnnotationKind::MissingProductAttribute { parameter },
                Severity::Warning,
                format!(
                    "{} does not state {}; required {}",
                    product.product_id,
                    parameter.label(),
                    bound_phrase(&threshold)
                ),
            ));
        }

        checks.insert(
            parameter,
            ParameterCheck {
                parameter,
                outcome,
                threshold,
                observed,
                detail,
            },
        );
    }

    let overall = Outcome::aggregate(checks.values().map(|c| c.outcome));
    if checks.is_empty() {
        annotations.push(Annotation::new(
            AnnotationKind::NoApplicableRequirements,
            Severity::Info,
            "No requirements apply; nothing to check",
        ));
    }
    debug!(product = %product.product_id, overall = overall.tag(), checks = checks.len(), "evaluated product");

    ComplianceVerdict {
        product_id: product.product_id.clone(),
        checks,
        overall,
        annotations,
    }
}

fn check_one(threshold: &RequirementValue, observed: &Field<Value>) -> (Outcome, String) {
    let parameter = threshold.parameter;
    let Field::Present(value) = observed else {
        return (
            Outcome::Undetermined,
            format!(
                "UNDETERMINED: EPD does not state {}; required {}",
                parameter.label(),
                bound_phrase(threshold)
            ),
        );
    };

    let shown = format_observed(parameter, value, &threshold.value);
    let required = bound_phrase(threshold);
    match value.satisfies(&threshold.value, parameter.direction()) {
        Some(true) => (
            Outcome::Pass,
            format!(
                "PASS: EPD {} ({}) meets required {}",
                parameter.label(),
                shown,
                required
            ),
        ),
        Some(false) => {
            let verb = match parameter.direction() {
                Direction::LowerIsBetter => "exceeds",
                Direction::HigherIsBetter => "is below",
            };
            (
                Outcome::Fail,
                format!(
                    "FAIL: EPD {} ({}) {} required {}",
                    parameter.label(),
                    shown,
                    verb,
                    required
                ),
            )
        }
        None => (
            Outcome::Undetermined,
            format!(
                "UNDETERMINED: EPD {} ({}) cannot be compared with required {}",
                parameter.label(),
                shown,
                required
            ),
        ),
    }
}

/// e.g. "max (0.45; XC1, custom text)" or "min (20 mm; drawing)"
fn bound_phrase(threshold: &RequirementValue) -> String {
    let bound = match threshold.parameter.direction() {
        Direction::LowerIsBetter => "max",
        Direction::HigherIsBetter => "min",
    };
    let value = format_value(threshold.parameter, &threshold.value);
    let value = match threshold.parameter.unit() {
        Some(unit) => format!("{} {}", value, unit),
        None => value,
    };
    let scope = match &threshold.exposure_class {
        Some(class) => format!("{}, ", class),
        None => String::new(),
    };
    format!("{} ({}; {}{})", bound, value, scope, threshold.provenance)
}

fn format_value(parameter: Parameter, value: &Value) -> String {
    match (parameter, value) {
        (Parameter::MaxWaterCementRatio, Value::Numeric(v)) => format!("{:.2}", v),
        (Parameter::MinCementContent, Value::Numeric(v)) => format!("{:.0}", v),
        (_, other) => other.to_string(),
    }
}

/// Rounded like the threshold, widened when rounding would hide the difference
fn format_observed(parameter: Parameter, observed: &Value, threshold: &Value) -> String {
    let shown = format_value(parameter, observed);
    match (observed, threshold) {
        (Value::Numeric(v), Value::Numeric(t))
            if v != t && shown == format_value(parameter, threshold) =>
        {
            (1..=6)
                .map(|digits| (format!("{:.*}", digits, v), format!("{:.*}", digits, t)))
                .find(|(observed, required)| observed != required)
                .map_or_else(|| observed.to_string(), |(observed, _)| observed)
        }
        _ => shown,
    }
}
