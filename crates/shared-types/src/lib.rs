pub mod types;

pub use types::{
    Annotation, AnnotationKind, ComplianceVerdict, Direction, ExposureClass, Field, Outcome,
    Parameter, ParameterCheck, ProductAttributeSet, Provenance, RequirementValue, Severity, Value,
    ValueKind,
};
