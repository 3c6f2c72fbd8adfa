use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Exposure class code under a jurisdiction's schema (e.g. "XS3", "B2")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExposureClass(String);

impl ExposureClass {
    /// Codes are stored trimmed and upper-cased so "xs3" and "XS3" compare equal
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExposureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExposureClass {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Which way a threshold gets harder to satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Numeric,
    /// Ranked against the jurisdiction's grade list
    OrderedCategorical,
}

/// Durability parameters understood by every jurisdiction schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    #[serde(rename = "max_wc")]
    MaxWaterCementRatio,
    #[serde(rename = "min_cement")]
    MinCementContent,
    #[serde(rename = "strength_min_cyl")]
    MinCylinderStrength,
    #[serde(rename = "strength_min_cube")]
    MinCubeStrength,
    MinStrengthClass,
    MaxAggregateSize,
    MinAirContent,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Parameter::MaxWaterCementRatio,
        Parameter::MinCementContent,
        Parameter::MinCylinderStrength,
        Parameter::MinCubeStrength,
        Parameter::MinStrengthClass,
        Parameter::MaxAggregateSize,
        Parameter::MinAirContent,
    ];

    /// Canonical key used in schema tables and reports
    pub fn key(&self) -> &'static str {
        match self {
            Parameter::MaxWaterCementRatio => "max_wc",
            Parameter::MinCementContent => "min_cement",
            Parameter::MinCylinderStrength => "strength_min_cyl",
            Parameter::MinCubeStrength => "strength_min_cube",
            Parameter::MinStrengthClass => "min_strength_class",
            Parameter::MaxAggregateSize => "max_aggregate_size",
            Parameter::MinAirContent => "min_air_content",
        }
    }

    /// Human-readable name for explanations
    pub fn label(&self) -> &'static str {
        match self {
            Parameter::MaxWaterCementRatio => "w/c ratio",
            Parameter::MinCementContent => "cement content",
            Parameter::MinCylinderStrength => "cylinder strength",
            Parameter::MinCubeStrength => "cube strength",
            Parameter::MinStrengthClass => "strength class",
            Parameter::MaxAggregateSize => "aggregate size",
            Parameter::MinAirContent => "air content",
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Parameter::MinCementContent => Some("kg/m3"),
            Parameter::MinCylinderStrength | Parameter::MinCubeStrength => Some("MPa"),
            Parameter::MaxAggregateSize => Some("mm"),
            Parameter::MinAirContent => Some("%"),
            Parameter::MaxWaterCementRatio | Parameter::MinStrengthClass => None,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Parameter::MaxWaterCementRatio | Parameter::MaxAggregateSize => {
                Direction::LowerIsBetter
            }
            Parameter::MinCementContent
            | Parameter::MinCylinderStrength
            | Parameter::MinCubeStrength
            | Parameter::MinStrengthClass
            | Parameter::MinAirContent => Direction::HigherIsBetter,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Parameter::MinStrengthClass => ValueKind::OrderedCategorical,
            _ => ValueKind::Numeric,
        }
    }

    /// Parse a canonical key or one of the field names used by the extractors
    /// (case-insensitive)
    pub fn parse_key(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "max_wc" | "max_w_c_ratio" | "w_c_ratio" | "calculated_wc" => {
                Some(Parameter::MaxWaterCementRatio)
            }
            "min_cement" | "min_cement_content" | "cement_content" | "cement_content_kg_m3" => {
                Some(Parameter::MinCementContent)
            }
            "strength_min_cyl" | "min_mpa_strength" | "strength_class_mpa" | "strength_mpa"
            | "mpa" => Some(Parameter::MinCylinderStrength),
            "strength_min_cube" | "min_cube_strength" => Some(Parameter::MinCubeStrength),
            "min_strength_class" | "strength_class" => Some(Parameter::MinStrengthClass),
            "max_aggregate_size" | "dmax" => Some(Parameter::MaxAggregateSize),
            "min_air_content" | "air_content" => Some(Parameter::MinAirContent),
            _ => None,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A threshold or an observed product value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Numeric(f64),
    /// Grade label plus its rank in the jurisdiction's grade order (weakest = 0)
    Grade { label: String, rank: u32 },
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Numeric(_) => ValueKind::Numeric,
            Value::Grade { .. } => ValueKind::OrderedCategorical,
        }
    }

    /// Compare two thresholds by stringency.
    ///
    /// `Greater` means `self` is harder to satisfy than `other`. Returns `None`
    /// when the values are of different kinds or not comparable (NaN).
    pub fn stringency_cmp(&self, other: &Value, direction: Direction) -> Option<Ordering> {
        let natural = match (self, other) {
            (Value::Numeric(a), Value::Numeric(b)) => a.partial_cmp(b)?,
            (Value::Grade { rank: a, .. }, Value::Grade { rank: b, .. }) => a.cmp(b),
            _ => return None,
        };
        Some(match direction {
            Direction::HigherIsBetter => natural,
            Direction::LowerIsBetter => natural.reverse(),
        })
    }

    /// Whether this observed value meets `threshold`
    pub fn satisfies(&self, threshold: &Value, direction: Direction) -> Option<bool> {
        self.stringency_cmp(threshold, direction)
            .map(|ord| ord != Ordering::Less)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Grade { label, .. } => f.write_str(label),
        }
    }
}

/// Explicit present/absent container; absence is never a zero or a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    Present(T),
    Absent,
}

impl<T> Field<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Absent => None,
        }
    }

    /// Keep `self` if present, otherwise fall back to `other`
    pub fn or(self, other: Field<T>) -> Field<T> {
        match self {
            Field::Present(_) => self,
            Field::Absent => other,
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Present(v),
            None => Field::Absent,
        }
    }
}

/// Where a requirement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Regulation,
    Drawing,
    CustomText,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Regulation => f.write_str("regulation"),
            Provenance::Drawing => f.write_str("drawing"),
            Provenance::CustomText => f.write_str("custom text"),
        }
    }
}

/// One requirement for one parameter, scoped to an exposure class
/// (`None` = applies regardless of exposure class)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementValue {
    pub parameter: Parameter,
    pub exposure_class: Option<ExposureClass>,
    pub value: Value,
    pub provenance: Provenance,
    /// Later sources that supplied the same threshold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confirmed_by: Vec<Provenance>,
}

impl RequirementValue {
    pub fn new(
        parameter: Parameter,
        exposure_class: Option<ExposureClass>,
        value: Value,
        provenance: Provenance,
    ) -> Self {
        Self {
            parameter,
            exposure_class,
            value,
            provenance,
            confirmed_by: Vec::new(),
        }
    }

    /// Threshold with unit, e.g. "0.45" or "280 kg/m3"
    pub fn describe(&self) -> String {
        match self.parameter.unit() {
            Some(unit) => format!("{} {}", self.value, unit),
            None => self.value.to_string(),
        }
    }
}

/// Extracted attributes of one product; a missing key reads as absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductAttributeSet {
    pub product_id: String,
    pub attributes: BTreeMap<Parameter, Field<Value>>,
}

impl ProductAttributeSet {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, parameter: Parameter, value: Field<Value>) -> Self {
        self.attributes.insert(parameter, value);
        self
    }

    pub fn set(&mut self, parameter: Parameter, value: Field<Value>) {
        self.attributes.insert(parameter, value);
    }

    pub fn get(&self, parameter: Parameter) -> Option<&Value> {
        self.attributes
            .get(&parameter)
            .and_then(|field| field.as_option())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Undetermined,
}

impl Outcome {
    /// Fail beats undetermined beats pass; an empty set passes
    pub fn aggregate<I: IntoIterator<Item = Outcome>>(outcomes: I) -> Outcome {
        let mut overall = Outcome::Pass;
        for outcome in outcomes {
            match outcome {
                Outcome::Fail => return Outcome::Fail,
                Outcome::Undetermined => overall = Outcome::Undetermined,
                Outcome::Pass => {}
            }
        }
        overall
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Undetermined => "UNDETERMINED",
        }
    }
}

/// Result of checking one parameter of one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCheck {
    pub parameter: Parameter,
    pub outcome: Outcome,
    /// Effective threshold after reducing across exposure classes
    pub threshold: RequirementValue,
    pub observed: Field<Value>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub product_id: String,
    pub checks: BTreeMap<Parameter, ParameterCheck>,
    pub overall: Outcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Non-fatal conditions attached to a scenario or a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationKind {
    UnresolvedConditionDescriptor {
        descriptor: String,
    },
    UnknownExposureClass {
        code: String,
    },
    ConflictingOverrideRejected {
        parameter: Parameter,
        exposure_class: Option<ExposureClass>,
        floor: Value,
        attempted: Value,
        source: Provenance,
    },
    IncomparableOverride {
        parameter: Parameter,
        exposure_class: Option<ExposureClass>,
        source: Provenance,
    },
    MissingProductAttribute {
        parameter: Parameter,
    },
    UnparseableValue {
        parameter: Parameter,
        raw: String,
    },
    UnknownParameter {
        key: String,
    },
    SourceUnavailable {
        source: String,
        reason: String,
    },
    UnrecognizedGrade {
        parameter: Parameter,
        label: String,
    },
    NoApplicableRequirements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub severity: Severity,
    pub message: String,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }
}
