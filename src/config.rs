use crate::connection::ConnectionTarget;
use crate::error::{Result, TaskError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// How PostGIS gets installed into a new database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupMode {
    /// Inspect the local installation and pick one of the other modes
    Default,
    Extension,
    Script,
}

impl FromStr for SetupMode {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(SetupMode::Default),
            "extension" => Ok(SetupMode::Extension),
            "script" => Ok(SetupMode::Script),
            other => Err(TaskError::configuration(format!(
                "Unknown POSTGIS_SETUP mode: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    pub su_username: Option<String>,
    pub su_password: Option<String>,
    pub schema_search_path: Vec<String>,
    pub encoding: String,
    pub template: Option<String>,
    pub setup: SetupMode,
    pub postgis_extension: Option<Vec<String>>,
    pub script_dir: Option<PathBuf>,
    /// Directory holding pg_dump, psql and pg_config (PATH lookup when unset)
    pub pg_bin_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = non_empty("DB_HOST").unwrap_or_else(|| "localhost".to_string());

        let port = match non_empty("DB_PORT") {
            Some(p) => p.trim().parse().map_err(|_| {
                TaskError::configuration(format!("Invalid DB_PORT: {}", p))
            })?,
            None => 5432,
        };

        let database = non_empty("DB_NAME")
            .ok_or_else(|| TaskError::configuration("DB_NAME is required"))?;
        let username = non_empty("DB_USER")
            .ok_or_else(|| TaskError::configuration("DB_USER is required"))?;

        let schema_search_path = split_list(&lookup("DB_SCHEMA_SEARCH_PATH").unwrap_or_default());

        let setup = lookup("POSTGIS_SETUP")
            .unwrap_or_default()
            .parse::<SetupMode>()?;

        let postgis_extension = non_empty("POSTGIS_EXTENSION")
            .map(|v| split_list(&v))
            .filter(|names| !names.is_empty());

        Ok(Config {
            host,
            port,
            database,
            username,
            password: lookup("DB_PASSWORD"),
            su_username: non_empty("DB_SU_USER"),
            su_password: lookup("DB_SU_PASSWORD"),
            schema_search_path,
            encoding: non_empty("DB_ENCODING").unwrap_or_else(|| "utf8".to_string()),
            template: non_empty("DB_TEMPLATE"),
            setup,
            postgis_extension,
            script_dir: non_empty("POSTGIS_SCRIPT_DIR").map(PathBuf::from),
            pg_bin_dir: non_empty("PG_BIN_DIR").map(PathBuf::from),
        })
    }

    pub fn has_su(&self) -> bool {
        self.su_username.is_some()
    }

    pub fn su_username(&self) -> &str {
        self.su_username.as_deref().unwrap_or(&self.username)
    }

    pub fn su_password(&self) -> Option<&str> {
        self.su_password
            .as_deref()
            .or(self.password.as_deref())
    }

    pub fn search_path(&self) -> &[String] {
        &self.schema_search_path
    }

    pub fn extension_names(&self) -> Vec<String> {
        match &self.postgis_extension {
            Some(names) => names.clone(),
            None => vec!["postgis".to_string()],
        }
    }

    /// Target used by the application once provisioning is done
    pub fn app_target(&self) -> ConnectionTarget {
        ConnectionTarget {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            search_path: self.schema_search_path.clone(),
        }
    }

    /// Privileged session on the database being provisioned
    pub fn su_target(&self) -> ConnectionTarget {
        ConnectionTarget {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.su_username().to_string(),
            password: self.su_password().map(str::to_string),
            search_path: vec!["public".to_string()],
        }
    }

    /// Privileged session on the `postgres` maintenance database
    pub fn maintenance_target(&self) -> ConnectionTarget {
        ConnectionTarget {
            database: "postgres".to_string(),
            ..self.su_target()
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
