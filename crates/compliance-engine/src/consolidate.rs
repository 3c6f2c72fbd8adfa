//! Requirement Consolidator
//!
//! Folds baseline thresholds and extracted overrides into one value per
//! (exposure class, parameter) key. The fold uses a "more stringent wins"
//! operator, so the surviving value does not depend on the order overrides
//! are supplied in; only provenance bookkeeping on ties does.
//!
//! Regulation values act as floors: an override may tighten them but never
//! relax them. Relaxing attempts are kept in the audit trail and raised as
//! `ConflictingOverrideRejected` annotations.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shared_types::{
    Annotation, AnnotationKind, Direction, ExposureClass, Parameter, Provenance, RequirementValue,
    Severity, Value,
};
use tracing::{debug, warn};

use crate::schema::RegulationSchema;

/// What happened to one override during the fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    /// No value existed for the key yet
    Added,
    /// Strictly more stringent than the existing value
    Tightened,
    /// Same threshold; existing provenance kept
    Tied,
    /// Less stringent than an earlier override
    Superseded,
    /// Less stringent than the regulatory floor
    RejectedBelowFloor,
    /// Value kind does not match the existing threshold
    Incomparable,
}

/// Pure reducer step: combine the current value for a key with an incoming one
pub fn merge(
    current: Option<RequirementValue>,
    incoming: RequirementValue,
) -> (RequirementValue, MergeDecision) {
    let Some(mut current) = current else {
        return (incoming, MergeDecision::Added);
    };
    let direction = incoming.parameter.direction();
    match incoming.value.stringency_cmp(&current.value, direction) {
        Some(Ordering::Greater) => (incoming, MergeDecision::Tightened),
        Some(Ordering::Equal) => {
            if incoming.provenance != current.provenance
                && !current.confirmed_by.contains(&incoming.provenance)
            {
                current.confirmed_by.push(incoming.provenance);
            }
            (current, MergeDecision::Tied)
        }
        Some(Ordering::Less) => (current, MergeDecision::Superseded),
        None => (current, MergeDecision::Incomparable),
    }
}

/// Most stringent of a sequence of values for the same parameter.
///
/// Ties keep the first value seen. Values of a different kind than the
/// running winner are ignored.
pub fn most_stringent<I>(values: I) -> Option<RequirementValue>
where
    I: IntoIterator<Item = RequirementValue>,
{
    values
        .into_iter()
        .fold(None, |acc, value| Some(merge(acc, value).0))
}

/// One override and what the fold did with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    #[serde(rename = "override")]
    pub value: RequirementValue,
    pub decision: MergeDecision,
    /// Threshold in force for the key after this override
    pub effective: RequirementValue,
}

/// Final requirements of one screening scenario.
///
/// Exactly one value per (exposure class, parameter); class-independent
/// requirements live in `general`. A key that no source supplied is simply
/// missing and means "no requirement".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRequirementSet {
    /// Exposure classes the scenario was screened for
    pub scenario_classes: BTreeSet<ExposureClass>,
    pub classes: BTreeMap<ExposureClass, BTreeMap<Parameter, RequirementValue>>,
    pub general: BTreeMap<Parameter, RequirementValue>,
    pub audit: Vec<OverrideRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl ConsolidatedRequirementSet {
    pub fn get(
        &self,
        class: Option<&ExposureClass>,
        parameter: Parameter,
    ) -> Option<&RequirementValue> {
        match class {
            Some(class) => self.classes.get(class)?.get(&parameter),
            None => self.general.get(&parameter),
        }
    }

    /// Classes that carry requirements but were not part of the scenario
    /// (requirements added by drawings or custom text only)
    pub fn user_added_classes(&self) -> impl Iterator<Item = &ExposureClass> {
        self.classes
            .keys()
            .filter(|class| !self.scenario_classes.contains(*class))
    }

    /// Every surviving requirement, classes first, in key order
    pub fn values(&self) -> impl Iterator<Item = &RequirementValue> {
        self.classes
            .values()
            .flat_map(|params| params.values())
            .chain(self.general.values())
    }

    fn slot(
        &mut self,
        class: Option<&ExposureClass>,
    ) -> &mut BTreeMap<Parameter, RequirementValue> {
        match class {
            Some(class) => self.classes.entry(class.clone()).or_default(),
            None => &mut self.general,
        }
    }
}

/// Merge baseline thresholds for `exposure_classes` with `overrides`.
///
/// Overrides are folded in the order given (drawings before custom text by
/// convention). An override without a class applies to every scenario class,
/// or to the class-independent bucket when the scenario has none. Overrides
/// for classes outside `exposure_classes` are kept as user-added requirements.
pub fn consolidate(
    baseline: &RegulationSchema,
    exposure_classes: &BTreeSet<ExposureClass>,
    overrides: &[RequirementValue],
) -> ConsolidatedRequirementSet {
    let mut set = ConsolidatedRequirementSet {
        scenario_classes: exposure_classes.clone(),
        ..Default::default()
    };

    for class in exposure_classes {
        let slot = set.slot(Some(class));
        match baseline.thresholds(class) {
            Some(thresholds) => {
                for (parameter, value) in thresholds {
                    slot.insert(
                        *parameter,
                        RequirementValue::new(
                            *parameter,
                            Some(class.clone()),
                            value.clone(),
                            Provenance::Regulation,
                        ),
                    );
                }
            }
            None => debug!(%class, "no baseline thresholds for exposure class"),
        }
    }

    for (parameter, value) in &baseline.general {
        set.general.insert(
            *parameter,
            RequirementValue::new(*parameter, None, value.clone(), Provenance::Regulation),
        );
    }

    for incoming in overrides {
        if incoming.exposure_class.is_none() && !exposure_classes.is_empty() {
            fold_project_wide(&mut set, baseline, incoming);
        } else if let (_, Some(annotation)) =
            fold_override(&mut set, baseline, incoming.clone())
        {
            raise(&mut set, annotation);
        }
    }

    debug!(
        classes = set.classes.len(),
        general = set.general.len(),
        overrides = overrides.len(),
        "consolidated requirements"
    );
    set
}

/// Fold one class-less override into every scenario class.
///
/// Conflicts are only raised when no copy was applied anywhere: a project-wide
/// value that tightens one class and sits below another class's floor relaxes
/// nothing.
fn fold_project_wide(
    set: &mut ConsolidatedRequirementSet,
    baseline: &RegulationSchema,
    incoming: &RequirementValue,
) {
    let targets: Vec<ExposureClass> = set.scenario_classes.iter().cloned().collect();
    let mut applied = false;
    let mut conflicts = Vec::new();
    for class in targets {
        let copy = RequirementValue {
            exposure_class: Some(class),
            ..incoming.clone()
        };
        let (decision, annotation) = fold_override(set, baseline, copy);
        applied |= matches!(
            decision,
            MergeDecision::Added | MergeDecision::Tightened | MergeDecision::Tied
        );
        match (decision, annotation) {
            (MergeDecision::RejectedBelowFloor, Some(annotation)) => conflicts.push(annotation),
            (_, Some(annotation)) => raise(set, annotation),
            (_, None) => {}
        }
    }

    if applied {
        if !conflicts.is_empty() {
            debug!(
                parameter = %incoming.parameter,
                value = %incoming.value,
                skipped = conflicts.len(),
                "project-wide override applied elsewhere; floor conflicts not raised"
            );
        }
    } else {
        for annotation in conflicts {
            raise(set, annotation);
        }
    }
}

fn raise(set: &mut ConsolidatedRequirementSet, annotation: Annotation) {
    warn!(detail = %annotation.message, "override not applied");
    set.annotations.push(annotation);
}

/// Fold one scoped override; returns the decision and the annotation it calls for
fn fold_override(
    set: &mut ConsolidatedRequirementSet,
    baseline: &RegulationSchema,
    incoming: RequirementValue,
) -> (MergeDecision, Option<Annotation>) {
    let class = incoming.exposure_class.clone();
    let parameter = incoming.parameter;
    let floor = floor_for(baseline, &set.scenario_classes, class.as_ref(), parameter);
    let violated_floor = floor.filter(|floor| {
        incoming.value.stringency_cmp(floor, parameter.direction()) == Some(Ordering::Less)
    });

    let slot = set.slot(class.as_ref());
    let current = slot.remove(&parameter);
    let (effective, decision) = match (&violated_floor, current) {
        (Some(_), Some(current)) => {
            slot.insert(parameter, current.clone());
            (current, MergeDecision::RejectedBelowFloor)
        }
        // Only the class-independent floor covers this key; the class bucket stays empty
        (Some(floor), None) => (
            RequirementValue::new(parameter, None, floor.clone(), Provenance::Regulation),
            MergeDecision::RejectedBelowFloor,
        ),
        (None, current) => {
            let (effective, decision) = merge(current, incoming.clone());
            slot.insert(parameter, effective.clone());
            (effective, decision)
        }
    };
    if let Some(class) = class.as_ref().filter(|c| !set.scenario_classes.contains(*c)) {
        if set.classes.get(class).is_some_and(BTreeMap::is_empty) {
            set.classes.remove(class);
        }
    }

    let annotation = match (decision, violated_floor) {
        (MergeDecision::RejectedBelowFloor, Some(floor)) => Some(Annotation::new(
            AnnotationKind::ConflictingOverrideRejected {
                parameter,
                exposure_class: class.clone(),
                floor: floor.clone(),
                attempted: incoming.value.clone(),
                source: incoming.provenance,
            },
            Severity::Warning,
            format!(
                "{} {} from {} is less stringent than the regulatory {} of {}{}; keeping {}",
                parameter.label(),
                incoming.describe(),
                incoming.provenance,
                floor_name(parameter),
                floor,
                scope_suffix(class.as_ref()),
                effective.describe()
            ),
        )),
        (MergeDecision::Incomparable, _) => Some(Annotation::new(
            AnnotationKind::IncomparableOverride {
                parameter,
                exposure_class: class.clone(),
                source: incoming.provenance,
            },
            Severity::Warning,
            format!(
                "{} {} from {} cannot be compared with {}; ignored",
                parameter.label(),
                incoming.describe(),
                incoming.provenance,
                effective.describe()
            ),
        )),
        (decision, _) => {
            debug!(
                %parameter,
                class = ?class,
                ?decision,
                source = %incoming.provenance,
                "merged override"
            );
            None
        }
    };

    set.audit.push(OverrideRecord {
        value: incoming,
        decision,
        effective,
    });
    (decision, annotation)
}

/// Regulatory floor for a key: the more stringent of the class threshold
/// (scenario classes only) and the class-independent threshold
fn floor_for(
    baseline: &RegulationSchema,
    scenario_classes: &BTreeSet<ExposureClass>,
    class: Option<&ExposureClass>,
    parameter: Parameter,
) -> Option<Value> {
    let general = baseline.general.get(&parameter);
    let class_floor = class
        .filter(|class| scenario_classes.contains(*class))
        .and_then(|class| baseline.thresholds(class)?.get(&parameter));
    match (class_floor, general) {
        (Some(class_floor), Some(general)) => {
            let stricter = general.stringency_cmp(class_floor, parameter.direction())
                == Some(Ordering::Greater);
            Some(if stricter { general } else { class_floor }.clone())
        }
        (class_floor, general) => class_floor.or(general).cloned(),
    }
}

fn floor_name(parameter: Parameter) -> &'static str {
    match parameter.direction() {
        Direction::HigherIsBetter => "minimum",
        Direction::LowerIsBetter => "maximum",
    }
}

fn scope_suffix(class: Option<&ExposureClass>) -> String {
    match class {
        Some(class) => format!(" for {}", class),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jurisdiction::Jurisdiction;
    use pretty_assertions::assert_eq;

    fn schema() -> RegulationSchema {
        RegulationSchema::from_json(
            Jurisdiction::En206,
            r#"{
                "grades": [{ "label": "C25/30" }, { "label": "C30/37" }, { "label": "C35/45" }],
                "general": { "max_aggregate_size": 32 },
                "exposure_classes": {
                    "XC1": { "max_wc": 0.50, "min_cement": 260, "min_strength_class": "C25/30" },
                    "XS1": { "max_wc": 0.50, "min_cement": 280 }
                }
            }"#,
        )
        .unwrap()
    }

    fn classes(codes: &[&str]) -> BTreeSet<ExposureClass> {
        codes.iter().map(|c| ExposureClass::new(c)).collect()
    }

    fn rv(p: Parameter, class: Option<&str>, v: f64, source: Provenance) -> RequirementValue {
        RequirementValue::new(p, class.map(ExposureClass::new), Value::Numeric(v), source)
    }

    #[test]
    fn test_merge_keeps_first_provenance_on_tie() {
        let first = rv(Parameter::MinCementContent, None, 300.0, Provenance::Drawing);
        let second = rv(Parameter::MinCementContent, None, 300.0, Provenance::CustomText);
        let (kept, decision) = merge(Some(first), second);
        assert_eq!(decision, MergeDecision::Tied);
        assert_eq!(kept.provenance, Provenance::Drawing);
        assert_eq!(kept.confirmed_by, vec![Provenance::CustomText]);
    }

    #[test]
    fn test_most_stringent_by_direction() {
        let wc = most_stringent([
            rv(Parameter::MaxWaterCementRatio, None, 0.55, Provenance::Regulation),
            rv(Parameter::MaxWaterCementRatio, None, 0.45, Provenance::Drawing),
            rv(Parameter::MaxWaterCementRatio, None, 0.50, Provenance::CustomText),
        ])
        .unwrap();
        assert_eq!(wc.value, Value::Numeric(0.45));

        let cement = most_stringent([
            rv(Parameter::MinCementContent, None, 300.0, Provenance::Regulation),
            rv(Parameter::MinCementContent, None, 340.0, Provenance::CustomText),
        ])
        .unwrap();
        assert_eq!(cement.value, Value::Numeric(340.0));
        assert_eq!(most_stringent(Vec::new()), None);
    }

    #[test]
    fn test_stricter_override_wins() {
        let overrides = [rv(
            Parameter::MaxWaterCementRatio,
            Some("XC1"),
            0.45,
            Provenance::CustomText,
        )];
        let set = consolidate(&schema(), &classes(&["XC1"]), &overrides);
        let wc = set
            .get(Some(&ExposureClass::new("XC1")), Parameter::MaxWaterCementRatio)
            .unwrap();
        assert_eq!(wc.value, Value::Numeric(0.45));
        assert_eq!(wc.provenance, Provenance::CustomText);
        assert_eq!(set.audit[0].decision, MergeDecision::Tightened);
        assert!(set.annotations.is_empty());
    }

    #[test]
    fn test_regulatory_floor_is_not_relaxed() {
        let overrides = [rv(
            Parameter::MinCementContent,
            Some("XS1"),
            260.0,
            Provenance::CustomText,
        )];
        let set = consolidate(&schema(), &classes(&["XS1"]), &overrides);
        let cement = set
            .get(Some(&ExposureClass::new("XS1")), Parameter::MinCementContent)
            .unwrap();
        assert_eq!(cement.value, Value::Numeric(280.0));
        assert_eq!(cement.provenance, Provenance::Regulation);
        assert_eq!(set.audit[0].decision, MergeDecision::RejectedBelowFloor);
        assert!(matches!(
            &set.annotations[0].kind,
            AnnotationKind::ConflictingOverrideRejected { attempted: Value::Numeric(v), .. } if *v == 260.0
        ));
    }

    #[test]
    fn test_relaxing_a_tightened_value_still_counts_as_floor_violation() {
        let overrides = [
            rv(Parameter::MaxWaterCementRatio, Some("XC1"), 0.40, Provenance::Drawing),
            rv(Parameter::MaxWaterCementRatio, Some("XC1"), 0.60, Provenance::CustomText),
            rv(Parameter::MaxWaterCementRatio, Some("XC1"), 0.45, Provenance::CustomText),
        ];
        let set = consolidate(&schema(), &classes(&["XC1"]), &overrides);
        let decisions: Vec<_> = set.audit.iter().map(|r| r.decision).collect();
        assert_eq!(
            decisions,
            vec![
                MergeDecision::Tightened,
                MergeDecision::RejectedBelowFloor,
                MergeDecision::Superseded
            ]
        );
        assert_eq!(set.annotations.len(), 1);
    }

    #[test]
    fn test_overrides_outside_scenario_classes_are_retained() {
        let overrides = [rv(
            Parameter::MaxAggregateSize,
            Some("XF1"),
            20.0,
            Provenance::Drawing,
        )];
        let set = consolidate(&schema(), &classes(&["XC1"]), &overrides);
        let user_added: Vec<_> = set.user_added_classes().collect();
        assert_eq!(user_added, vec![&ExposureClass::new("XF1")]);
        assert_eq!(set.audit[0].decision, MergeDecision::Added);
    }

    #[test]
    fn test_only_scenario_classes_are_initialised() {
        let set = consolidate(&schema(), &classes(&["XS1"]), &[]);
        assert_eq!(set.classes.len(), 1);
        assert!(set.classes.contains_key(&ExposureClass::new("XS1")));
        // class-independent baseline values are always present
        assert_eq!(
            set.get(None, Parameter::MaxAggregateSize).map(|v| &v.value),
            Some(&Value::Numeric(32.0))
        );
    }

    #[test]
    fn test_absent_keys_are_omitted() {
        let set = consolidate(&schema(), &classes(&["XS1"]), &[]);
        assert!(set
            .get(Some(&ExposureClass::new("XS1")), Parameter::MinStrengthClass)
            .is_none());
        assert!(set.get(None, Parameter::MinAirContent).is_none());
    }

    #[test]
    fn test_incomparable_override_is_ignored_and_annotated() {
        let numeric_grade = RequirementValue::new(
            Parameter::MinStrengthClass,
            Some(ExposureClass::new("XC1")),
            Value::Numeric(30.0),
            Provenance::Drawing,
        );
        let set = consolidate(&schema(), &classes(&["XC1"]), &[numeric_grade]);
        let grade = set
            .get(Some(&ExposureClass::new("XC1")), Parameter::MinStrengthClass)
            .unwrap();
        assert!(matches!(grade.value, Value::Grade { .. }));
        assert_eq!(set.audit[0].decision, MergeDecision::Incomparable);
        assert_eq!(set.annotations.len(), 1);
    }

    #[test]
    fn test_outcome_is_order_independent() {
        let a = rv(Parameter::MinCementContent, Some("XC1"), 300.0, Provenance::Drawing);
        let b = rv(Parameter::MinCementContent, Some("XC1"), 320.0, Provenance::CustomText);
        let forward = consolidate(&schema(), &classes(&["XC1"]), &[a.clone(), b.clone()]);
        let backward = consolidate(&schema(), &classes(&["XC1"]), &[b, a]);
        assert_eq!(forward.classes, backward.classes);
    }

    #[test]
    fn test_class_override_cannot_relax_class_independent_floor() {
        let overrides = [rv(
            Parameter::MaxAggregateSize,
            Some("XC1"),
            40.0,
            Provenance::CustomText,
        )];
        let set = consolidate(&schema(), &classes(&["XC1"]), &overrides);
        assert_eq!(set.audit[0].decision, MergeDecision::RejectedBelowFloor);
        assert_eq!(set.audit[0].effective.value, Value::Numeric(32.0));
        assert!(set
            .get(Some(&ExposureClass::new("XC1")), Parameter::MaxAggregateSize)
            .is_none());
        assert!(matches!(
            &set.annotations[0].kind,
            AnnotationKind::ConflictingOverrideRejected { floor: Value::Numeric(f), .. } if *f == 32.0
        ));
    }

    #[test]
    fn test_project_wide_override_checked_against_class_independent_floor() {
        let overrides = [rv(Parameter::MaxAggregateSize, None, 40.0, Provenance::CustomText)];
        let with_class = consolidate(&schema(), &classes(&["XC1"]), &overrides);
        let without_class = consolidate(&schema(), &classes(&[]), &overrides);
        for set in [&with_class, &without_class] {
            assert_eq!(set.audit[0].decision, MergeDecision::RejectedBelowFloor);
            assert_eq!(set.annotations.len(), 1);
            assert_eq!(
                set.get(None, Parameter::MaxAggregateSize).map(|v| &v.value),
                Some(&Value::Numeric(32.0))
            );
        }
    }

    #[test]
    fn test_project_wide_override_tightening_one_class_raises_no_conflict() {
        let overrides = [rv(Parameter::MinCementContent, None, 270.0, Provenance::CustomText)];
        let set = consolidate(&schema(), &classes(&["XC1", "XS1"]), &overrides);
        let decisions: Vec<_> = set.audit.iter().map(|r| r.decision).collect();
        assert_eq!(
            decisions,
            vec![MergeDecision::Tightened, MergeDecision::RejectedBelowFloor]
        );
        assert!(set.annotations.is_empty());
        let xs1 = set
            .get(Some(&ExposureClass::new("XS1")), Parameter::MinCementContent)
            .unwrap();
        assert_eq!(xs1.value, Value::Numeric(280.0));
    }

    #[test]
    fn test_project_wide_override_rejected_everywhere_is_raised_per_class() {
        let overrides = [rv(Parameter::MinCementContent, None, 250.0, Provenance::Drawing)];
        let set = consolidate(&schema(), &classes(&["XC1", "XS1"]), &overrides);
        assert_eq!(set.audit.len(), 2);
        assert_eq!(set.annotations.len(), 2);
    }
}
