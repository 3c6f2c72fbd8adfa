//! Records handed over by the drawing and custom-text extraction adapters
//!
//! The engine never parses documents. Each adapter returns a JSON object with
//! requirement fields (value or `null`), optional declared exposure classes and
//! optional condition descriptors. A failed extraction (`{"error": ...}`) is
//! kept as an empty record so the rest of the scenario still runs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shared_types::{
    Annotation, AnnotationKind, ExposureClass, Field, Parameter, Provenance, RequirementValue,
    Severity,
};
use tracing::debug;

use crate::extractors::numeric::describe_raw;
use crate::schema::{RegulationSchema, Resolved};

/// Keys holding scenario-wide requirements
const REQUIREMENT_KEYS: &[&str] = &["requirements", "element_specific_reqs"];
/// Keys holding declared exposure class codes
const CLASS_KEYS: &[&str] = &[
    "exposure_classes",
    "drawing_exposure_classes",
    "assigned_exposure_classes",
];
/// Keys holding narrative condition descriptors
const DESCRIPTOR_KEYS: &[&str] = &["condition_descriptors", "conditions"];

type RawFields = BTreeMap<Parameter, Field<serde_json::Value>>;

/// Partial requirement record from one extraction source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    pub provenance: Provenance,
    /// Requirements with no class scope
    #[serde(default)]
    pub requirements: RawFields,
    /// Requirements scoped to one exposure class
    #[serde(default)]
    pub class_requirements: BTreeMap<ExposureClass, RawFields>,
    #[serde(default)]
    pub exposure_classes: Vec<String>,
    #[serde(default)]
    pub condition_descriptors: BTreeSet<String>,
    /// Problems found while reading the adapter output
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl PartialRecord {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            provenance,
            requirements: RawFields::new(),
            class_requirements: BTreeMap::new(),
            exposure_classes: Vec::new(),
            condition_descriptors: BTreeSet::new(),
            annotations: Vec::new(),
        }
    }

    /// Empty record standing in for a source whose extraction failed
    pub fn unavailable(provenance: Provenance, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut record = Self::new(provenance);
        record.annotations.push(Annotation::new(
            AnnotationKind::SourceUnavailable {
                source: provenance.to_string(),
                reason: reason.clone(),
            },
            Severity::Warning,
            format!("No data from {}: {}", provenance, reason),
        ));
        record
    }

    pub fn with_requirement(mut self, parameter: Parameter, raw: serde_json::Value) -> Self {
        self.requirements.insert(parameter, field_of(raw));
        self
    }

    pub fn with_class_requirement(
        mut self,
        class: &str,
        parameter: Parameter,
        raw: serde_json::Value,
    ) -> Self {
        self.class_requirements
            .entry(ExposureClass::new(class))
            .or_default()
            .insert(parameter, field_of(raw));
        self
    }

    pub fn with_exposure_class(mut self, code: &str) -> Self {
        self.exposure_classes.push(code.to_string());
        self
    }

    pub fn with_descriptor(mut self, descriptor: &str) -> Self {
        self.condition_descriptors.insert(descriptor.to_string());
        self
    }

    /// Read an adapter's JSON output.
    ///
    /// Accepts the nested shape (`requirements`/`element_specific_reqs`,
    /// `class_requirements`, `exposure_classes`/`drawing_exposure_classes`,
    /// `condition_descriptors`) as well as flat objects whose top-level keys
    /// are parameter names.
    pub fn from_json(provenance: Provenance, json: &serde_json::Value) -> Self {
        let object = match json {
            serde_json::Value::Object(object) => object,
            serde_json::Value::Null => {
                return Self::unavailable(provenance, "extractor returned nothing")
            }
            other => {
                return Self::unavailable(
                    provenance,
                    format!("expected a JSON object, got {}", kind_name(other)),
                )
            }
        };

        if let Some(error) = object.get("error") {
            return Self::unavailable(provenance, describe_raw(error));
        }

        let mut record = Self::new(provenance);
        for (key, value) in object {
            let key_lower = key.to_lowercase();
            if REQUIREMENT_KEYS.contains(&key_lower.as_str()) {
                record.read_fields(value, None);
            } else if key_lower == "class_requirements" {
                if let serde_json::Value::Object(classes) = value {
                    for (code, fields) in classes {
                        record.read_fields(fields, Some(ExposureClass::new(code)));
                    }
                }
            } else if CLASS_KEYS.contains(&key_lower.as_str()) {
                collect_strings(value, &mut record.exposure_classes);
            } else if DESCRIPTOR_KEYS.contains(&key_lower.as_str()) {
                let mut descriptors = Vec::new();
                collect_strings(value, &mut descriptors);
                record.condition_descriptors.extend(
                    descriptors
                        .into_iter()
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty()),
                );
            } else if let Some(parameter) = Parameter::parse_key(key) {
                record.requirements.insert(parameter, field_of(value.clone()));
            } else {
                debug!(key = %key, source = %provenance, "ignoring adapter field");
            }
        }
        record
    }

    fn read_fields(&mut self, value: &serde_json::Value, class: Option<ExposureClass>) {
        let serde_json::Value::Object(fields) = value else {
            return;
        };
        for (key, raw) in fields {
            match Parameter::parse_key(key) {
                Some(parameter) => {
                    let target = match &class {
                        Some(class) => self.class_requirements.entry(class.clone()).or_default(),
                        None => &mut self.requirements,
                    };
                    target.insert(parameter, field_of(raw.clone()));
                }
                None => self.annotations.push(Annotation::new(
                    AnnotationKind::UnknownParameter { key: key.clone() },
                    Severity::Info,
                    format!("{} requirement \"{}\" is not a known parameter", self.provenance, key),
                )),
            }
        }
    }

    /// Turn the record into override values.
    ///
    /// Unscoped requirements carry no exposure class; the consolidator applies
    /// them to every scenario class. Absent fields contribute nothing;
    /// unreadable ones are annotated and skipped.
    pub fn overrides(
        &self,
        schema: &RegulationSchema,
    ) -> (Vec<RequirementValue>, Vec<Annotation>) {
        let mut values = Vec::new();
        let mut annotations = Vec::new();

        for (parameter, field) in &self.requirements {
            if let Some(value) = self.read(schema, *parameter, field, &mut annotations) {
                values.push(RequirementValue::new(*parameter, None, value, self.provenance));
            }
        }

        for (class, fields) in &self.class_requirements {
            for (parameter, field) in fields {
                if let Some(value) = self.read(schema, *parameter, field, &mut annotations) {
                    values.push(RequirementValue::new(
                        *parameter,
                        Some(class.clone()),
                        value,
                        self.provenance,
                    ));
                }
            }
        }

        (values, annotations)
    }

    fn read(
        &self,
        schema: &RegulationSchema,
        parameter: Parameter,
        field: &Field<serde_json::Value>,
        annotations: &mut Vec<Annotation>,
    ) -> Option<shared_types::Value> {
        let raw = field.as_option()?;
        match schema.resolve(parameter, raw) {
            Resolved::Present(value) => Some(value),
            Resolved::Absent => None,
            Resolved::Unparseable(text) => {
                annotations.push(unparseable(parameter, &text, &self.provenance.to_string()));
                None
            }
            Resolved::UnknownGrade(label) => {
                annotations.push(unrecognized_grade(parameter, &label, schema));
                None
            }
        }
    }
}

pub(crate) fn unparseable(parameter: Parameter, raw: &str, source: &str) -> Annotation {
    Annotation::new(
        AnnotationKind::UnparseableValue {
            parameter,
            raw: raw.to_string(),
        },
        Severity::Warning,
        format!(
            "Could not read {} value \"{}\" from {}; treated as absent",
            parameter.label(),
            raw,
            source
        ),
    )
}

pub(crate) fn unrecognized_grade(
    parameter: Parameter,
    label: &str,
    schema: &RegulationSchema,
) -> Annotation {
    Annotation::new(
        AnnotationKind::UnrecognizedGrade {
            parameter,
            label: label.to_string(),
        },
        Severity::Warning,
        format!(
            "{} \"{}\" is not a {} grade; treated as absent",
            parameter.label(),
            label,
            schema.jurisdiction
        ),
    )
}

fn field_of(raw: serde_json::Value) -> Field<serde_json::Value> {
    if raw.is_null() {
        Field::Absent
    } else {
        Field::Present(raw)
    }
}

/// Collect strings from a string, or arbitrarily nested lists of strings
fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        _ => {}
    }
}

fn kind_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
