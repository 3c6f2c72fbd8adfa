//! Durability screening of concrete EPDs against exposure-class requirements
//!
//! Baseline thresholds come from a jurisdiction's regulation tables. Drawing and
//! custom-text sources can tighten them, never relax them. Each product's EPD
//! is then checked against the single most stringent threshold per parameter.

pub mod adapters;
pub mod checker;
pub mod consolidate;
pub mod epd;
pub mod error;
pub mod extractors;
pub mod jurisdiction;
pub mod mapping;
pub mod patterns;
pub mod repository;
pub mod schema;
pub mod screening;

pub use adapters::PartialRecord;
pub use checker::{effective_requirements, evaluate};
pub use consolidate::{consolidate, ConsolidatedRequirementSet, MergeDecision, OverrideRecord};
pub use epd::{epd_from_json, EpdRecord};
pub use error::{Result, ScreeningError};
pub use jurisdiction::Jurisdiction;
pub use mapping::{resolve_exposure_classes, ExposureResolution, MappingTable};
pub use repository::{BundledLoader, RegulationRepository, SchemaLoader};
pub use schema::RegulationSchema;
pub use screening::{Scenario, ScreeningEngine, ScreeningReport};
