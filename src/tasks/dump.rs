//! Schema dump and load through pg_dump / psql

use super::{PostgisDatabaseTasks, POSTGIS_SCHEMA, PUBLIC_SCHEMA};
use crate::connection::Connector;
use crate::error::Result;
use crate::statements;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Schemas passed to pg_dump. PostGIS objects are recreated by the extension,
/// so its schema is never dumped.
pub fn dump_schemas(search_path: &[String]) -> Vec<String> {
    let schemas: Vec<String> = search_path
        .iter()
        .filter(|s| s.as_str() != POSTGIS_SCHEMA)
        .cloned()
        .collect();

    if schemas.is_empty() {
        vec![PUBLIC_SCHEMA.to_string()]
    } else {
        schemas
    }
}

pub fn dump_args(database: &str, search_path: &[String], filename: &Path) -> Vec<String> {
    let mut args = vec![
        "--schema-only".to_string(),
        "--no-privileges".to_string(),
        "--no-owner".to_string(),
        "--file".to_string(),
        filename.display().to_string(),
    ];

    args.extend(
        dump_schemas(search_path)
            .into_iter()
            .map(|schema| format!("--schema={}", schema)),
    );
    args.push(database.to_string());

    args
}

pub fn load_args(database: &str, filename: &Path) -> Vec<String> {
    vec![
        "--quiet".to_string(),
        "--no-psqlrc".to_string(),
        "--set".to_string(),
        "ON_ERROR_STOP=1".to_string(),
        "--file".to_string(),
        filename.display().to_string(),
        database.to_string(),
    ]
}

/// pg_dump resets the search path to empty; restore it at the end of the dump
pub fn append_search_path(filename: &Path, search_path: &[String]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(filename)?;
    writeln!(file, "{}\n", statements::set_search_path(search_path))?;
    Ok(())
}

impl<C: Connector> PostgisDatabaseTasks<C> {
    /// Dump the schema (no data) of every search path schema except PostGIS's own
    pub async fn structure_dump(&self, filename: &Path) -> Result<()> {
        let args = dump_args(&self.config.database, self.search_path(), filename);

        self.tools
            .run(&self.tools.pg_dump, &args, &self.config.app_target())
            .await?;
        append_search_path(filename, self.search_path())?;

        info!("Dumped structure of {} to {}", self.config.database, filename.display());
        Ok(())
    }

    pub async fn structure_load(&self, filename: &Path) -> Result<()> {
        let args = load_args(&self.config.database, filename);

        self.tools
            .run(&self.tools.psql, &args, &self.config.app_target())
            .await?;

        info!("Loaded structure into {} from {}", self.config.database, filename.display());
        Ok(())
    }
}
