//! Regulation tables read from a directory at runtime

use std::fs;
use std::path::{Path, PathBuf};

use compliance_engine::{
    Jurisdiction, MappingTable, RegulationSchema, Result, SchemaLoader, ScreeningError,
};

/// Reads `<dir>/<id>.json` and `<dir>/<id>_exposure_class_mapping.json`
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
}

impl DirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn schema_path(&self, jurisdiction: Jurisdiction) -> PathBuf {
        self.dir.join(format!("{}.json", jurisdiction.file_stem()))
    }

    pub fn mapping_path(&self, jurisdiction: Jurisdiction) -> PathBuf {
        self.dir
            .join(format!("{}_exposure_class_mapping.json", jurisdiction.file_stem()))
    }
}

fn read_table(path: &Path, jurisdiction: Jurisdiction, table: &'static str) -> Result<String> {
    tracing::debug!("Reading {} table from {}", table, path.display());
    fs::read_to_string(path).map_err(|err| ScreeningError::SchemaLoad {
        jurisdiction,
        table,
        reason: format!("{}: {}", path.display(), err),
    })
}

impl SchemaLoader for DirectoryLoader {
    fn load_schema(&self, jurisdiction: Jurisdiction) -> Result<RegulationSchema> {
        let json = read_table(
            &self.schema_path(jurisdiction),
            jurisdiction,
            RegulationSchema::TABLE,
        )?;
        RegulationSchema::from_json(jurisdiction, &json)
    }

    fn load_exposure_mapping(&self, jurisdiction: Jurisdiction) -> Result<MappingTable> {
        let json = read_table(
            &self.mapping_path(jurisdiction),
            jurisdiction,
            MappingTable::TABLE,
        )?;
        MappingTable::from_json(jurisdiction, &json)
    }
}
