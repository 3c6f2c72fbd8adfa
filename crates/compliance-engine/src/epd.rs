//! Product attributes from an extracted EPD record
//!
//! The EPD extractor reports the mix as mass percentages per component. The
//! w/c ratio and cement content are derived from it when the EPD does not
//! state them directly.

use serde::{Deserialize, Serialize};
use shared_types::{Annotation, AnnotationKind, Field, Parameter, ProductAttributeSet, Severity, Value};

use crate::adapters::{unparseable, unrecognized_grade};
use crate::extractors::numeric::{describe_raw, number_from_json};
use crate::schema::{RegulationSchema, Resolved};

/// Names that identify mixing water in a composition list
const WATER_NAMES: &[&str] = &["water", "agua"];
/// Names that identify cement ("cem " catches "CEM II/A-LL 42.5")
const CEMENT_NAMES: &[&str] = &["cement", "cem "];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialComponent {
    #[serde(default)]
    pub name: String,
    /// Mass percentage of the mix
    #[serde(default)]
    pub percentage: Option<serde_json::Value>,
}

/// Structured output of the EPD extractor for one product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpdRecord {
    #[serde(default, alias = "name", alias = "product_name")]
    pub product_id: String,
    /// Compressive strength in MPa (cylinder)
    #[serde(default, rename = "MPa", alias = "mpa", alias = "strength_mpa")]
    pub strength_mpa: Option<serde_json::Value>,
    #[serde(default, alias = "cube_mpa")]
    pub cube_strength_mpa: Option<serde_json::Value>,
    #[serde(default)]
    pub strength_class: Option<serde_json::Value>,
    /// kg/m3
    #[serde(default)]
    pub density: Option<serde_json::Value>,
    #[serde(default)]
    pub max_aggregate_size: Option<serde_json::Value>,
    #[serde(default)]
    pub air_content: Option<serde_json::Value>,
    #[serde(default, alias = "calculated_wc")]
    pub w_c_ratio: Option<serde_json::Value>,
    #[serde(default, alias = "cement_content_kg_m3")]
    pub cement_content: Option<serde_json::Value>,
    #[serde(default)]
    pub mat_comp: Vec<MaterialComponent>,
    /// Set by the extractor when it could not read the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sums of the water and cement shares of a composition list
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MixShares {
    pub water_percent: f64,
    pub cement_percent: f64,
}

impl MixShares {
    pub fn from_components(components: &[MaterialComponent]) -> Self {
        let mut shares = Self::default();
        for component in components {
            let name = component.name.to_lowercase();
            let Some(percentage) = component.percentage.as_ref().and_then(number_from_json) else {
                continue;
            };
            if WATER_NAMES.iter().any(|w| name.contains(w)) {
                shares.water_percent += percentage;
            } else if CEMENT_NAMES.iter().any(|c| name.contains(c)) {
                shares.cement_percent += percentage;
            }
        }
        shares
    }

    pub fn water_cement_ratio(&self) -> Option<f64> {
        (self.cement_percent > 0.0).then(|| self.water_percent / self.cement_percent)
    }

    pub fn cement_content(&self, density: f64) -> Option<f64> {
        (self.cement_percent > 0.0 && density > 0.0)
            .then(|| self.cement_percent / 100.0 * density)
    }
}

impl EpdRecord {
    /// Derive the product attribute set under `schema`'s grade order.
    ///
    /// Stated values win over derived ones. Anything that cannot be read or
    /// derived stays `Absent`.
    pub fn attributes(&self, schema: &RegulationSchema) -> (ProductAttributeSet, Vec<Annotation>) {
        let mut product = ProductAttributeSet::new(self.product_id.clone());
        let mut annotations = Vec::new();

        if let Some(reason) = &self.error {
            annotations.push(Annotation::new(
                AnnotationKind::SourceUnavailable {
                    source: format!("EPD {}", self.product_id),
                    reason: reason.clone(),
                },
                Severity::Warning,
                format!("EPD {} could not be extracted: {}", self.product_id, reason),
            ));
            for parameter in Parameter::ALL {
                product.set(parameter, Field::Absent);
            }
            return (product, annotations);
        }

        let mut read = |parameter: Parameter, raw: &Option<serde_json::Value>| -> Field<Value> {
            let Some(raw) = raw else {
                return Field::Absent;
            };
            match schema.resolve(parameter, raw) {
                Resolved::Present(value) => Field::Present(value),
                Resolved::Absent => Field::Absent,
                Resolved::Unparseable(text) => {
                    annotations.push(unparseable(parameter, &text, &format!("EPD {}", self.product_id)));
                    Field::Absent
                }
                Resolved::UnknownGrade(label) => {
                    annotations.push(unrecognized_grade(parameter, &label, schema));
                    Field::Absent
                }
            }
        };

        let stated_wc = read(Parameter::MaxWaterCementRatio, &self.w_c_ratio);
        let stated_cement = read(Parameter::MinCementContent, &self.cement_content);
        let stated_cyl = read(Parameter::MinCylinderStrength, &self.strength_mpa);
        let stated_cube = read(Parameter::MinCubeStrength, &self.cube_strength_mpa);
        let grade = read(Parameter::MinStrengthClass, &self.strength_class);
        let aggregate = read(Parameter::MaxAggregateSize, &self.max_aggregate_size);
        let air = read(Parameter::MinAirContent, &self.air_content);
        let density = self.density.as_ref().and_then(number_from_json);

        let shares = MixShares::from_components(&self.mat_comp);
        let derived_wc = Field::from(shares.water_cement_ratio().map(Value::Numeric));
        let derived_cement = Field::from(
            density
                .and_then(|d| shares.cement_content(d))
                .map(Value::Numeric),
        );

        // A known grade also fixes the characteristic strengths
        let grade_info = grade.as_option().and_then(|g| schema.grade_info(g));
        let grade_cyl = Field::from(grade_info.and_then(|g| g.cylinder_mpa).map(Value::Numeric));
        let grade_cube = Field::from(grade_info.and_then(|g| g.cube_mpa).map(Value::Numeric));

        product.set(Parameter::MaxWaterCementRatio, stated_wc.or(derived_wc));
        product.set(Parameter::MinCementContent, stated_cement.or(derived_cement));
        product.set(Parameter::MinCylinderStrength, stated_cyl.or(grade_cyl));
        product.set(Parameter::MinCubeStrength, stated_cube.or(grade_cube));
        product.set(Parameter::MinStrengthClass, grade);
        product.set(Parameter::MaxAggregateSize, aggregate);
        product.set(Parameter::MinAirContent, air);

        (product, annotations)
    }
}

/// Parse one EPD record, keeping an extractor failure as an all-absent record
pub fn epd_from_json(product_id: &str, json: &serde_json::Value) -> EpdRecord {
    let mut record = match serde_json::from_value::<EpdRecord>(json.clone()) {
        Ok(record) => record,
        Err(err) => EpdRecord {
            error: Some(match json.get("error") {
                Some(error) => describe_raw(error),
                None => format!("unreadable EPD record: {}", err),
            }),
            ..EpdRecord::default()
        },
    };
    if record.product_id.is_empty() {
        record.product_id = product_id.to_string();
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jurisdiction::Jurisdiction;
    use crate::repository::{BundledLoader, SchemaLoader};
    use serde_json::json;

    fn schema() -> RegulationSchema {
        BundledLoader.load_schema(Jurisdiction::En206).unwrap()
    }

    fn record(json: serde_json::Value) -> EpdRecord {
        epd_from_json("test-product", &json)
    }

    #[test]
    fn test_derives_wc_and_cement_content_from_composition() {
        let epd = record(json!({
            "MPa": 30,
            "density": 2400,
            "mat_comp": [
                { "name": "CEM II/A-LL 42.5 R", "percentage": 12.5 },
                { "name": "Water", "percentage": 6.25 },
                { "name": "Gravel 4/20", "percentage": 45 },
                { "name": "Sand 0/4", "percentage": 36.25 }
            ]
        }));
        let (product, annotations) = epd.attributes(&schema());
        assert!(annotations.is_empty());
        assert_eq!(
            product.get(Parameter::MaxWaterCementRatio),
            Some(&Value::Numeric(0.5))
        );
        assert_eq!(
            product.get(Parameter::MinCementContent),
            Some(&Value::Numeric(300.0))
        );
        assert_eq!(
            product.get(Parameter::MinCylinderStrength),
            Some(&Value::Numeric(30.0))
        );
        assert_eq!(product.get(Parameter::MaxAggregateSize), None);
    }

    #[test]
    fn test_no_cement_means_no_ratio() {
        let epd = record(json!({
            "density": 2400,
            "mat_comp": [{ "name": "agua", "percentage": 7 }]
        }));
        let (product, _) = epd.attributes(&schema());
        assert_eq!(product.get(Parameter::MaxWaterCementRatio), None);
        assert_eq!(product.get(Parameter::MinCementContent), None);
    }

    #[test]
    fn test_stated_values_win_over_derived() {
        let epd = record(json!({
            "w_c_ratio": "0,42",
            "mat_comp": [
                { "name": "cement", "percentage": 10 },
                { "name": "water", "percentage": 6 }
            ]
        }));
        let (product, _) = epd.attributes(&schema());
        assert_eq!(
            product.get(Parameter::MaxWaterCementRatio),
            Some(&Value::Numeric(0.42))
        );
    }

    #[test]
    fn test_strength_class_supplies_characteristic_strengths() {
        let epd = record(json!({ "strength_class": "C35/45" }));
        let (product, _) = epd.attributes(&schema());
        assert_eq!(
            product.get(Parameter::MinCylinderStrength),
            Some(&Value::Numeric(35.0))
        );
        assert_eq!(product.get(Parameter::MinCubeStrength), Some(&Value::Numeric(45.0)));
        assert!(matches!(
            product.get(Parameter::MinStrengthClass),
            Some(Value::Grade { rank: 6, .. })
        ));
    }

    #[test]
    fn test_extractor_error_yields_all_absent() {
        let epd = record(json!({ "error": "An error occurred during the API call" }));
        let (product, annotations) = epd.attributes(&schema());
        assert_eq!(product.product_id, "test-product");
        assert!(product.attributes.values().all(|f| !f.is_present()));
        assert_eq!(annotations.len(), 1);
    }

    #[test]
    fn test_unreadable_fields_are_absent_and_annotated() {
        let epd = record(json!({ "MPa": "n/a", "strength_class": "N32" }));
        let (product, annotations) = epd.attributes(&schema());
        assert_eq!(product.get(Parameter::MinCylinderStrength), None);
        assert_eq!(annotations.len(), 2);
    }
}
