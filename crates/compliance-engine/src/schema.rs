//! Baseline requirement tables: exposure class -> parameter -> threshold

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shared_types::{ExposureClass, Parameter, Value, ValueKind};

use crate::error::{Result, ScreeningError};
use crate::extractors::numeric::{describe_raw, normalize_grade_label, number_from_json};
use crate::jurisdiction::Jurisdiction;
use crate::patterns::tokens;

pub type Thresholds = BTreeMap<Parameter, Value>;

/// One entry of a jurisdiction's strength grade order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cylinder_mpa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cube_mpa: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default)]
    title: String,
    #[serde(default)]
    grades: Vec<Grade>,
    #[serde(default)]
    general: BTreeMap<String, serde_json::Value>,
    exposure_classes: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

/// Outcome of reading one raw value against a schema
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Present(Value),
    /// `null` or missing: the source says nothing about this parameter
    Absent,
    Unparseable(String),
    UnknownGrade(String),
}

/// Baseline requirements of one jurisdiction, immutable once loaded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegulationSchema {
    pub jurisdiction: Jurisdiction,
    pub title: String,
    /// Strength grades, weakest first; the position is the grade's rank
    pub grades: Vec<Grade>,
    /// Thresholds that apply whatever the exposure class
    pub general: Thresholds,
    pub exposure_classes: BTreeMap<ExposureClass, Thresholds>,
}

impl RegulationSchema {
    pub const TABLE: &'static str = "regulation";

    pub fn from_json(jurisdiction: Jurisdiction, json: &str) -> Result<Self> {
        let raw: RawSchema =
            serde_json::from_str(json).map_err(|source| ScreeningError::SchemaFormat {
                jurisdiction,
                table: Self::TABLE,
                source,
            })?;

        let invalid = |reason: String| ScreeningError::InvalidSchema {
            jurisdiction,
            table: Self::TABLE,
            reason,
        };

        let mut seen = BTreeSet::new();
        for grade in &raw.grades {
            if !seen.insert(normalize_grade_label(&grade.label)) {
                return Err(invalid(format!("duplicate grade {}", grade.label)));
            }
        }

        let mut schema = Self {
            jurisdiction,
            title: raw.title,
            grades: raw.grades,
            general: Thresholds::new(),
            exposure_classes: BTreeMap::new(),
        };

        schema.general = schema
            .read_thresholds(&raw.general)
            .map_err(|reason| invalid(format!("general: {}", reason)))?;

        for (code, entries) in &raw.exposure_classes {
            let thresholds = schema
                .read_thresholds(entries)
                .map_err(|reason| invalid(format!("{}: {}", code, reason)))?;
            schema
                .exposure_classes
                .insert(ExposureClass::new(code), thresholds);
        }

        Ok(schema)
    }

    fn read_thresholds(
        &self,
        entries: &BTreeMap<String, serde_json::Value>,
    ) -> std::result::Result<Thresholds, String> {
        let mut thresholds = Thresholds::new();
        for (key, raw) in entries {
            let parameter =
                Parameter::parse_key(key).ok_or_else(|| format!("unknown parameter {}", key))?;
            match self.resolve(parameter, raw) {
                Resolved::Present(value) => {
                    thresholds.insert(parameter, value);
                }
                Resolved::Absent => {}
                Resolved::Unparseable(text) => {
                    return Err(format!("unreadable value {} for {}", text, key));
                }
                Resolved::UnknownGrade(label) => {
                    return Err(format!("grade {} is not in the grade list", label));
                }
            }
        }
        Ok(thresholds)
    }

    /// Read a raw extracted value as `parameter` under this schema
    pub fn resolve(&self, parameter: Parameter, raw: &serde_json::Value) -> Resolved {
        if raw.is_null() {
            return Resolved::Absent;
        }
        match parameter.kind() {
            // every tabulated quantity is a positive amount
            ValueKind::Numeric => match number_from_json(raw) {
                Some(v) if v > 0.0 => Resolved::Present(Value::Numeric(v)),
                _ => Resolved::Unparseable(describe_raw(raw)),
            },
            ValueKind::OrderedCategorical => match raw {
                serde_json::Value::String(label) => match self.grade(label) {
                    Some(value) => Resolved::Present(value),
                    None => Resolved::UnknownGrade(label.clone()),
                },
                other => Resolved::Unparseable(describe_raw(other)),
            },
        }
    }

    /// Look a grade label up in the grade order.
    ///
    /// Tries the whole label first, then any word of it, so "C30/37 XC4"
    /// still finds C30/37.
    pub fn grade(&self, label: &str) -> Option<Value> {
        let wanted = normalize_grade_label(label);
        self.rank_of(&wanted).or_else(|| {
            tokens(label)
                .iter()
                .find_map(|word| self.rank_of(&normalize_grade_label(word)))
        })
    }

    fn rank_of(&self, normalized: &str) -> Option<Value> {
        self.grades
            .iter()
            .position(|g| normalize_grade_label(&g.label) == normalized)
            .map(|rank| Value::Grade {
                label: self.grades[rank].label.clone(),
                rank: rank as u32,
            })
    }

    /// Grade details for a resolved grade value
    pub fn grade_info(&self, value: &Value) -> Option<&Grade> {
        match value {
            Value::Grade { rank, .. } => self.grades.get(*rank as usize),
            Value::Numeric(_) => None,
        }
    }

    pub fn has_class(&self, class: &ExposureClass) -> bool {
        self.exposure_classes.contains_key(class)
    }

    pub fn thresholds(&self, class: &ExposureClass) -> Option<&Thresholds> {
        self.exposure_classes.get(class)
    }

    pub fn class_codes(&self) -> impl Iterator<Item = &ExposureClass> {
        self.exposure_classes.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{
        "title": "sample",
        "grades": [
            { "label": "C20/25", "cylinder_mpa": 20, "cube_mpa": 25 },
            { "label": "C30/37", "cylinder_mpa": 30, "cube_mpa": 37 }
        ],
        "general": { "max_aggregate_size": 32 },
        "exposure_classes": {
            "xc1": { "max_wc": 0.65, "min_cement": null, "min_strength_class": "C20/25" }
        }
    }"#;

    #[test]
    fn test_parses_sample_schema() {
        let schema = RegulationSchema::from_json(Jurisdiction::En206, SAMPLE).unwrap();
        let xc1 = schema.thresholds(&ExposureClass::new("XC1")).unwrap();
        assert_eq!(xc1.get(&Parameter::MaxWaterCementRatio), Some(&Value::Numeric(0.65)));
        // null means "no requirement"
        assert!(!xc1.contains_key(&Parameter::MinCementContent));
        assert_eq!(
            xc1.get(&Parameter::MinStrengthClass),
            Some(&Value::Grade {
                label: "C20/25".to_string(),
                rank: 0
            })
        );
        assert_eq!(
            schema.general.get(&Parameter::MaxAggregateSize),
            Some(&Value::Numeric(32.0))
        );
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let json = r#"{ "exposure_classes": { "XC1": { "slump": 100 } } }"#;
        let err = RegulationSchema::from_json(Jurisdiction::En206, json).unwrap_err();
        assert!(matches!(err, ScreeningError::InvalidSchema { .. }));
    }

    #[test]
    fn test_rejects_grade_outside_order() {
        let json = r#"{ "grades": [], "exposure_classes": { "XC1": { "min_strength_class": "C30/37" } } }"#;
        let err = RegulationSchema::from_json(Jurisdiction::En206, json).unwrap_err();
        assert!(err.to_string().contains("invalid regulation table"));
    }

    #[test]
    fn test_malformed_json_is_format_error() {
        let err = RegulationSchema::from_json(Jurisdiction::As3600, "{").unwrap_err();
        assert!(matches!(err, ScreeningError::SchemaFormat { .. }));
    }

    #[test]
    fn test_resolve_values() {
        let schema = RegulationSchema::from_json(Jurisdiction::En206, SAMPLE).unwrap();
        assert_eq!(
            schema.resolve(Parameter::MaxAggregateSize, &json!("20 mm")),
            Resolved::Present(Value::Numeric(20.0))
        );
        assert_eq!(
            schema.resolve(Parameter::MaxAggregateSize, &json!(null)),
            Resolved::Absent
        );
        assert_eq!(
            schema.resolve(Parameter::MinCementContent, &json!("unknown")),
            Resolved::Unparseable("unknown".to_string())
        );
        assert_eq!(
            schema.resolve(Parameter::MinStrengthClass, &json!("C99/99")),
            Resolved::UnknownGrade("C99/99".to_string())
        );
    }

    #[test]
    fn test_resolve_rejects_non_positive_numbers() {
        let schema = RegulationSchema::from_json(Jurisdiction::En206, SAMPLE).unwrap();
        assert_eq!(
            schema.resolve(Parameter::MaxAggregateSize, &json!(-5)),
            Resolved::Unparseable("-5".to_string())
        );
        assert_eq!(
            schema.resolve(Parameter::MinCementContent, &json!("0 kg/m3")),
            Resolved::Unparseable("0 kg/m3".to_string())
        );
        assert_eq!(
            schema.resolve(Parameter::MaxWaterCementRatio, &json!("-0.45")),
            Resolved::Unparseable("-0.45".to_string())
        );
    }

    #[test]
    fn test_grade_lookup_tolerates_spacing_and_context() {
        let schema = RegulationSchema::from_json(Jurisdiction::En206, SAMPLE).unwrap();
        let expected = Some(Value::Grade {
            label: "C30/37".to_string(),
            rank: 1,
        });
        assert_eq!(schema.grade("c 30/37"), expected);
        assert_eq!(schema.grade("C30/37 XC4 (F)"), expected);
        assert_eq!(schema.grade("N32"), None);
        let info = schema.grade_info(&expected.unwrap()).unwrap();
        assert_eq!(info.cube_mpa, Some(37.0));
    }
}
