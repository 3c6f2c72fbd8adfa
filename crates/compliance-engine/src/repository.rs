//! Regulation Repository
//!
//! Tables are loaded through an injectable `SchemaLoader` and cached per
//! jurisdiction for the lifetime of the repository. Construct one repository
//! at startup and pass it by reference to every screening run.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;
use crate::jurisdiction::Jurisdiction;
use crate::mapping::MappingTable;
use crate::schema::RegulationSchema;

/// Source of the two tables each jurisdiction needs
pub trait SchemaLoader: Send + Sync {
    fn load_schema(&self, jurisdiction: Jurisdiction) -> Result<RegulationSchema>;

    fn load_exposure_mapping(&self, jurisdiction: Jurisdiction) -> Result<MappingTable>;
}

const EN206_SCHEMA: &str = include_str!("../data/en206.json");
const EN206_MAPPING: &str = include_str!("../data/en206_exposure_class_mapping.json");
const AS3600_SCHEMA: &str = include_str!("../data/as3600.json");
const AS3600_MAPPING: &str = include_str!("../data/as3600_exposure_class_mapping.json");

/// Tables compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledLoader;

impl BundledLoader {
    pub fn schema_source(jurisdiction: Jurisdiction) -> &'static str {
        match jurisdiction {
            Jurisdiction::En206 => EN206_SCHEMA,
            Jurisdiction::As3600 => AS3600_SCHEMA,
        }
    }

    pub fn mapping_source(jurisdiction: Jurisdiction) -> &'static str {
        match jurisdiction {
            Jurisdiction::En206 => EN206_MAPPING,
            Jurisdiction::As3600 => AS3600_MAPPING,
        }
    }
}

impl SchemaLoader for BundledLoader {
    fn load_schema(&self, jurisdiction: Jurisdiction) -> Result<RegulationSchema> {
        RegulationSchema::from_json(jurisdiction, Self::schema_source(jurisdiction))
    }

    fn load_exposure_mapping(&self, jurisdiction: Jurisdiction) -> Result<MappingTable> {
        MappingTable::from_json(jurisdiction, Self::mapping_source(jurisdiction))
    }
}

type Cache<T> = RwLock<HashMap<Jurisdiction, Arc<T>>>;

/// Load-once cache of regulation tables
pub struct RegulationRepository<L = BundledLoader> {
    loader: L,
    schemas: Cache<RegulationSchema>,
    mappings: Cache<MappingTable>,
}

impl RegulationRepository<BundledLoader> {
    pub fn bundled() -> Self {
        Self::new(BundledLoader)
    }
}

impl Default for RegulationRepository<BundledLoader> {
    fn default() -> Self {
        Self::bundled()
    }
}

impl<L: SchemaLoader> RegulationRepository<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            schemas: RwLock::new(HashMap::new()),
            mappings: RwLock::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Jurisdictions a caller may select
    pub fn available_jurisdictions(&self) -> Vec<Jurisdiction> {
        Jurisdiction::ALL.to_vec()
    }

    /// Baseline table for a jurisdiction identifier such as "EN 206".
    ///
    /// Fails with `UnknownJurisdiction` for identifiers without a schema.
    pub fn load_schema(&self, jurisdiction_id: &str) -> Result<Arc<RegulationSchema>> {
        self.schema(jurisdiction_id.parse()?)
    }

    /// Condition descriptor table for a jurisdiction identifier
    pub fn load_exposure_mapping(&self, jurisdiction_id: &str) -> Result<Arc<MappingTable>> {
        self.exposure_mapping(jurisdiction_id.parse()?)
    }

    pub fn schema(&self, jurisdiction: Jurisdiction) -> Result<Arc<RegulationSchema>> {
        cached(&self.schemas, jurisdiction, RegulationSchema::TABLE, || {
            self.loader.load_schema(jurisdiction)
        })
    }

    pub fn exposure_mapping(&self, jurisdiction: Jurisdiction) -> Result<Arc<MappingTable>> {
        cached(&self.mappings, jurisdiction, MappingTable::TABLE, || {
            self.loader.load_exposure_mapping(jurisdiction)
        })
    }
}

fn cached<T, F>(
    cache: &Cache<T>,
    jurisdiction: Jurisdiction,
    table: &'static str,
    load: F,
) -> Result<Arc<T>>
where
    F: FnOnce() -> Result<T>,
{
    if let Some(hit) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&jurisdiction)
    {
        return Ok(Arc::clone(hit));
    }

    let mut guard = cache.write().unwrap_or_else(PoisonError::into_inner);
    // Another reader may have filled the slot while we waited for the lock
    if let Some(hit) = guard.get(&jurisdiction) {
        return Ok(Arc::clone(hit));
    }

    let loaded = Arc::new(load()?);
    tracing::info!("Loaded {} table for {}", table, jurisdiction);
    guard.insert(jurisdiction, Arc::clone(&loaded));
    Ok(loaded)
}
