//! Mapping Processor: condition descriptors -> exposure class codes
//!
//! Resolution is an intermediate signal. Inferred classes go through the same
//! consolidation as declared ones, so they can only add requirements.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shared_types::{Annotation, AnnotationKind, ExposureClass, Severity};
use tracing::{debug, warn};

use crate::error::{Result, ScreeningError};
use crate::jurisdiction::Jurisdiction;
use crate::patterns::{contains_phrase, normalize_phrase, tokens};
use crate::schema::RegulationSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub condition: String,
    pub classes: Vec<ExposureClass>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(default)]
    classes: BTreeMap<String, String>,
    #[serde(default)]
    mappings: Vec<MappingEntry>,
}

/// Condition descriptor -> exposure class table of one jurisdiction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingTable {
    pub jurisdiction: Jurisdiction,
    /// Plain-language description of every class code
    pub descriptions: BTreeMap<ExposureClass, String>,
    pub entries: Vec<MappingEntry>,
    #[serde(skip)]
    entry_tokens: Vec<Vec<String>>,
}

impl MappingTable {
    pub const TABLE: &'static str = "exposure class mapping";

    pub fn from_json(jurisdiction: Jurisdiction, json: &str) -> Result<Self> {
        let raw: RawMapping =
            serde_json::from_str(json).map_err(|source| ScreeningError::SchemaFormat {
                jurisdiction,
                table: Self::TABLE,
                source,
            })?;

        for entry in &raw.mappings {
            if entry.classes.is_empty() || tokens(&entry.condition).is_empty() {
                return Err(ScreeningError::InvalidSchema {
                    jurisdiction,
                    table: Self::TABLE,
                    reason: format!("mapping entry {:?} is empty", entry.condition),
                });
            }
        }

        let descriptions = raw
            .classes
            .into_iter()
            .map(|(code, text)| (ExposureClass::new(&code), text))
            .collect();
        let entry_tokens = raw.mappings.iter().map(|e| tokens(&e.condition)).collect();

        Ok(Self {
            jurisdiction,
            descriptions,
            entries: raw.mappings,
            entry_tokens,
        })
    }

    pub fn describe(&self, class: &ExposureClass) -> Option<&str> {
        self.descriptions.get(class).map(String::as_str)
    }

    /// Match one descriptor against the table.
    ///
    /// Order: class code, exact condition phrase, then every phrase found as a
    /// whole-word run inside the descriptor, keeping only the longest ones.
    pub fn lookup(&self, descriptor: &str) -> Option<DescriptorMatch> {
        let normalized = normalize_phrase(descriptor);
        if normalized.is_empty() {
            return None;
        }

        let code = ExposureClass::new(&normalized);
        if self.descriptions.contains_key(&code) {
            return Some(DescriptorMatch {
                descriptor: descriptor.to_string(),
                method: MatchMethod::ClassCode,
                matched: vec![code.to_string()],
                classes: BTreeSet::from([code]),
            });
        }

        let exact: Vec<&MappingEntry> = self
            .entries
            .iter()
            .filter(|e| normalize_phrase(&e.condition) == normalized)
            .collect();
        if !exact.is_empty() {
            return Some(DescriptorMatch::from_entries(
                descriptor,
                MatchMethod::Exact,
                &exact,
            ));
        }

        let words = tokens(descriptor);
        let mut best_len = 0;
        let mut best: Vec<&MappingEntry> = Vec::new();
        for (entry, needle) in self.entries.iter().zip(&self.entry_tokens) {
            if !contains_phrase(&words, needle) {
                continue;
            }
            if needle.len() > best_len {
                best_len = needle.len();
                best.clear();
            }
            if needle.len() == best_len {
                best.push(entry);
            }
        }

        if best.is_empty() {
            None
        } else {
            Some(DescriptorMatch::from_entries(
                descriptor,
                MatchMethod::Partial,
                &best,
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ClassCode,
    Exact,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorMatch {
    pub descriptor: String,
    pub method: MatchMethod,
    /// Conditions (or the class code) that matched
    pub matched: Vec<String>,
    pub classes: BTreeSet<ExposureClass>,
}

impl DescriptorMatch {
    fn from_entries(descriptor: &str, method: MatchMethod, entries: &[&MappingEntry]) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            method,
            matched: entries.iter().map(|e| e.condition.clone()).collect(),
            classes: entries
                .iter()
                .flat_map(|e| e.classes.iter().cloned())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureResolution {
    pub classes: BTreeSet<ExposureClass>,
    pub matches: Vec<DescriptorMatch>,
    pub unresolved: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

/// Resolve condition descriptors into exposure classes known to `schema`.
///
/// Unmatched descriptors are reported as `UnresolvedConditionDescriptor`
/// warnings; resolution continues with the rest.
pub fn resolve_exposure_classes(
    descriptors: &BTreeSet<String>,
    table: &MappingTable,
    schema: &RegulationSchema,
) -> ExposureResolution {
    let mut resolution = ExposureResolution::default();

    for descriptor in descriptors {
        match table.lookup(descriptor) {
            Some(mut found) => {
                let (known, unknown): (BTreeSet<_>, BTreeSet<_>) =
                    found.classes.into_iter().partition(|c| schema.has_class(c));
                for class in unknown {
                    warn!(%class, %descriptor, "mapping points at a class missing from the schema");
                    resolution.annotations.push(unknown_class(class.code()));
                }
                found.classes = known;
                if found.classes.is_empty() {
                    resolution.unresolved.push(descriptor.clone());
                    resolution.annotations.push(unresolved(descriptor));
                    continue;
                }
                debug!(%descriptor, method = ?found.method, classes = ?found.classes, "resolved descriptor");
                resolution.classes.extend(found.classes.iter().cloned());
                resolution.matches.push(found);
            }
            None => {
                warn!(%descriptor, jurisdiction = %table.jurisdiction, "unresolved condition descriptor");
                resolution.unresolved.push(descriptor.clone());
                resolution.annotations.push(unresolved(descriptor));
            }
        }
    }

    resolution
}

/// Keep declared class codes the schema knows, warn about the rest
pub fn validate_declared_classes<'a, I>(
    codes: I,
    schema: &RegulationSchema,
) -> (BTreeSet<ExposureClass>, Vec<Annotation>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut known = BTreeSet::new();
    let mut annotations = Vec::new();
    for code in codes {
        if code.trim().is_empty() {
            continue;
        }
        let class = ExposureClass::new(code);
        if schema.has_class(&class) {
            known.insert(class);
        } else {
            warn!(code, jurisdiction = %schema.jurisdiction, "declared exposure class not in schema");
            annotations.push(unknown_class(code));
        }
    }
    (known, annotations)
}

fn unresolved(descriptor: &str) -> Annotation {
    Annotation::new(
        AnnotationKind::UnresolvedConditionDescriptor {
            descriptor: descriptor.to_string(),
        },
        Severity::Warning,
        format!(
            "Condition \"{}\" could not be mapped to an exposure class",
            descriptor
        ),
    )
}

fn unknown_class(code: &str) -> Annotation {
    Annotation::new(
        AnnotationKind::UnknownExposureClass {
            code: code.to_string(),
        },
        Severity::Warning,
        format!("Exposure class {} is not defined by the selected regulation", code.trim()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{BundledLoader, SchemaLoader};

    fn en206() -> (MappingTable, RegulationSchema) {
        let loader = BundledLoader;
        (
            loader.load_exposure_mapping(Jurisdiction::En206).unwrap(),
            loader.load_schema(Jurisdiction::En206).unwrap(),
        )
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_coastal_and_spray_resolve_to_xs3_only() {
        let (table, schema) = en206();
        let resolution =
            resolve_exposure_classes(&set(&["coastal", "saltwater spray"]), &table, &schema);
        assert_eq!(resolution.classes, BTreeSet::from([ExposureClass::new("XS3")]));
        assert!(resolution.unresolved.is_empty());
        assert_eq!(resolution.matches.len(), 2);
    }

    #[test]
    fn test_class_code_descriptor() {
        let (table, _) = en206();
        let found = table.lookup("xd3").unwrap();
        assert_eq!(found.method, MatchMethod::ClassCode);
        assert_eq!(found.classes, BTreeSet::from([ExposureClass::new("XD3")]));
    }

    #[test]
    fn test_multi_class_condition() {
        let (table, _) = en206();
        let found = table
            .lookup("Concrete for a bridge deck exposed to de-icing salts.")
            .unwrap();
        assert_eq!(found.method, MatchMethod::Partial);
        let codes: Vec<_> = found.classes.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec!["XC4", "XD3", "XF4"]);
    }

    #[test]
    fn test_longest_phrase_wins() {
        let (table, _) = en206();
        // "dry" alone maps to XC1, "dry inland" is more specific
        let found = table.lookup("A foundation in a dry inland area").unwrap();
        assert_eq!(found.classes, BTreeSet::from([ExposureClass::new("X0")]));
    }

    #[test]
    fn test_unresolved_descriptor_is_reported_not_dropped() {
        let (table, schema) = en206();
        let resolution = resolve_exposure_classes(
            &set(&["lunar regolith", "splash zone"]),
            &table,
            &schema,
        );
        assert_eq!(resolution.classes, BTreeSet::from([ExposureClass::new("XS3")]));
        assert_eq!(resolution.unresolved, vec!["lunar regolith".to_string()]);
        assert!(resolution.annotations.iter().any(|a| matches!(
            &a.kind,
            AnnotationKind::UnresolvedConditionDescriptor { descriptor } if descriptor == "lunar regolith"
        )));
    }

    #[test]
    fn test_validate_declared_classes() {
        let (_, schema) = en206();
        let (known, annotations) = validate_declared_classes(["xc1", "B2", " "], &schema);
        assert_eq!(known, BTreeSet::from([ExposureClass::new("XC1")]));
        assert_eq!(annotations.len(), 1);
        assert!(matches!(
            &annotations[0].kind,
            AnnotationKind::UnknownExposureClass { code } if code == "B2"
        ));
    }

    #[test]
    fn test_rejects_empty_mapping_entry() {
        let json = r#"{ "mappings": [ { "condition": "coastal", "classes": [] } ] }"#;
        assert!(MappingTable::from_json(Jurisdiction::En206, json).is_err());
    }
}
