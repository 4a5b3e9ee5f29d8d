//! PostGIS database tasks
//!
//! Creates a database, installs PostGIS into it and hands ownership of the
//! PostGIS catalog over to the application role. All steps run one after
//! another over a single connection, which is swapped between the
//! privileged and the application credentials as needed.

mod dump;
mod installation;
#[cfg(test)]
pub(crate) mod mock;

pub use dump::{append_search_path, dump_args, dump_schemas, load_args};
pub use installation::{apply_installation, detect_installation, ensure_installation_configs, Installation};

use crate::config::{Config, SetupMode};
use crate::connection::{ConnectionTarget, Connector, SqlConnection};
use crate::error::{Result, TaskError};
use crate::statements::{self, CreateDatabaseOptions, RelationKind};
use crate::tools::ClientTools;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const TOPOLOGY_EXTENSION: &str = "postgis_topology";
const TOPOLOGY_SCHEMA: &str = "topology";
const POSTGIS_SCHEMA: &str = "postgis";
const PUBLIC_SCHEMA: &str = "public";

/// Scripts executed, in order, for a script based install
const SETUP_SCRIPTS: [&str; 2] = ["postgis.sql", "spatial_ref_sys.sql"];

pub struct PostgisDatabaseTasks<C: Connector> {
    config: Config,
    connector: C,
    tools: ClientTools,
    connection: Option<C::Connection>,
    current_target: Option<ConnectionTarget>,
}

impl<C: Connector> PostgisDatabaseTasks<C> {
    /// Build the tasks, auto-detecting the PostGIS install mode if needed
    pub async fn new(mut config: Config, connector: C) -> Self {
        let tools = ClientTools::new(config.pg_bin_dir.as_deref());
        ensure_installation_configs(&mut config, &tools).await;
        Self::with_tools(config, connector, tools)
    }

    /// Build the tasks from a config taken as-is
    pub fn with_tools(config: Config, connector: C, tools: ClientTools) -> Self {
        Self {
            config,
            connector,
            tools,
            connection: None,
            current_target: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_su(&self) -> bool {
        self.config.has_su()
    }

    pub fn search_path(&self) -> &[String] {
        self.config.search_path()
    }

    pub fn extension_names(&self) -> Vec<String> {
        self.config.extension_names()
    }

    /// Target of the connection currently held, if any
    pub fn current_target(&self) -> Option<&ConnectionTarget> {
        self.current_target.as_ref()
    }

    async fn establish_connection(&mut self, target: ConnectionTarget) -> Result<()> {
        // Close the previous session before opening the next one
        self.connection = None;
        self.current_target = None;

        let connection = self.connector.connect(&target).await?;
        debug!("Connected to {} as {}", target.database, target.username);

        self.connection = Some(connection);
        self.current_target = Some(target);
        Ok(())
    }

    async fn establish_master_connection(&mut self) -> Result<()> {
        let target = self.config.maintenance_target();
        self.establish_connection(target).await
    }

    async fn establish_su_connection(&mut self) -> Result<()> {
        let target = self.config.su_target();
        self.establish_connection(target).await
    }

    async fn establish_app_connection(&mut self) -> Result<()> {
        let target = self.config.app_target();
        self.establish_connection(target).await
    }

    fn connection(&mut self) -> Result<&mut C::Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| TaskError::Internal("No database connection established".to_string()))
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        self.connection()?.execute(sql).await
    }

    async fn query_strings(&mut self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
        self.connection()?.query_strings(sql, params).await
    }

    /// Create the database, owned by the application role when a superuser
    /// is configured, then install PostGIS into it
    pub async fn create(&mut self) -> Result<()> {
        self.establish_master_connection().await?;

        let owner = if self.has_su() {
            Some(self.config.username.as_str())
        } else {
            None
        };
        let sql = statements::create_database(
            &self.config.database,
            &CreateDatabaseOptions {
                encoding: &self.config.encoding,
                template: self.config.template.as_deref(),
                owner,
            },
        );

        info!("Creating database {}", self.config.database);
        if let Err(e) = self.execute(&sql).await {
            return Err(map_create_error(e, &self.config.database));
        }

        self.setup_gis().await
    }

    pub async fn drop_database(&mut self) -> Result<()> {
        self.establish_master_connection().await?;

        let sql = statements::drop_database(&self.config.database);
        self.execute(&sql).await?;

        info!("Dropped database {}", self.config.database);
        Ok(())
    }

    /// Drop and recreate the database
    pub async fn purge(&mut self) -> Result<()> {
        self.drop_database().await?;
        self.create().await
    }

    /// Install PostGIS into the existing database, then reconnect as the
    /// application role
    pub async fn setup_gis(&mut self) -> Result<()> {
        let script_dir = match (self.config.setup, &self.config.script_dir) {
            (SetupMode::Script, None) => {
                return Err(TaskError::configuration(
                    "POSTGIS_SETUP=script requires POSTGIS_SCRIPT_DIR",
                ))
            }
            (SetupMode::Extension, _) => None,
            (_, dir) => dir.clone(),
        };

        if script_dir.is_none() {
            self.validate_extensions()?;
        }

        self.establish_su_connection().await?;
        self.setup_gis_schemas().await?;

        match script_dir {
            Some(dir) => self.setup_gis_from_script_dir(&dir).await?,
            None => self.setup_gis_from_extension().await?,
        }

        if self.has_su() {
            self.setup_gis_grant_privileges().await?;
        }

        self.establish_app_connection().await?;
        info!("PostGIS setup complete for {}", self.config.database);
        Ok(())
    }

    fn validate_extensions(&self) -> Result<()> {
        let wants_topology = self
            .extension_names()
            .iter()
            .any(|name| name == TOPOLOGY_EXTENSION);

        if wants_topology && !self.in_search_path(TOPOLOGY_SCHEMA) {
            return Err(TaskError::configuration(format!(
                "'{}' must be in the schema search path for {}",
                TOPOLOGY_SCHEMA, TOPOLOGY_EXTENSION
            )));
        }

        Ok(())
    }

    fn in_search_path(&self, schema: &str) -> bool {
        self.search_path().iter().any(|s| s == schema)
    }

    async fn setup_gis_schemas(&mut self) -> Result<()> {
        let schemas: Vec<String> = self
            .search_path()
            .iter()
            .filter(|s| !s.eq_ignore_ascii_case(PUBLIC_SCHEMA))
            .cloned()
            .collect();

        // With a superuser the schemas are handed to the application role
        let owner = self.has_su().then(|| self.config.username.clone());

        for schema in schemas {
            let existing = self
                .query_strings(statements::SCHEMA_EXISTS, &[schema.as_str()])
                .await?;

            if existing.is_empty() {
                self.execute(&statements::create_schema(&schema, owner.as_deref()))
                    .await?;
                info!("Created schema {}", schema);
            } else {
                debug!("Schema {} already exists", schema);
            }
        }

        Ok(())
    }

    async fn setup_gis_from_extension(&mut self) -> Result<()> {
        let postgis_schema = self
            .in_search_path(POSTGIS_SCHEMA)
            .then_some(POSTGIS_SCHEMA);

        for name in self.extension_names() {
            let schema = if name == TOPOLOGY_EXTENSION {
                Some(TOPOLOGY_SCHEMA)
            } else {
                postgis_schema
            };

            self.execute(&statements::create_extension(&name, schema)).await?;
            info!("Installed extension {} in {}", name, self.config.database);
        }

        Ok(())
    }

    async fn setup_gis_from_script_dir(&mut self, script_dir: &Path) -> Result<()> {
        for script in SETUP_SCRIPTS {
            let path = script_dir.join(script);
            let sql = fs::read_to_string(&path).map_err(|e| {
                TaskError::configuration(format!("Failed to read {}: {}", path.display(), e))
            })?;

            info!("Running {} against {}", path.display(), self.config.database);
            self.connection()?.execute(&sql).await?;
        }

        Ok(())
    }

    /// Schema PostGIS was installed into
    fn postgis_schema(&self) -> &'static str {
        if self.in_search_path(POSTGIS_SCHEMA) {
            POSTGIS_SCHEMA
        } else {
            PUBLIC_SCHEMA
        }
    }

    async fn postgis_major_version(&mut self) -> Result<u32> {
        let sql = statements::postgis_version(self.postgis_schema());
        let version = self
            .query_strings(&sql, &[])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TaskError::Internal("postgis_lib_version() returned no rows".to_string()))?;

        statements::parse_major_version(&version)
            .ok_or_else(|| TaskError::Internal(format!("Unrecognized PostGIS version: {}", version)))
    }

    async fn setup_gis_grant_privileges(&mut self) -> Result<()> {
        let schema = self.postgis_schema();
        let owner = self.config.username.clone();

        self.execute(&statements::grant_all_tables(schema, &owner)).await?;
        self.execute(&statements::grant_all_functions(schema, &owner)).await?;

        let major = self.postgis_major_version().await?;
        let column_kind = RelationKind::for_postgis_major(major);

        let ownership = [
            (RelationKind::Table, "spatial_ref_sys"),
            (column_kind, "geometry_columns"),
            (column_kind, "geography_columns"),
        ];
        for (kind, relation) in ownership {
            self.execute(&statements::alter_owner(kind, schema, relation, &owner))
                .await?;
        }

        info!(
            "Granted PostGIS privileges in schema {} to {} (PostGIS {})",
            schema, owner, major
        );
        Ok(())
    }

    async fn database_setting(&mut self, sql: &str) -> Result<String> {
        if self.connection.is_none() {
            self.establish_app_connection().await?;
        }

        let database = self.config.database.clone();
        self.query_strings(sql, &[database.as_str()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TaskError::Internal(format!("Database {} not found", database)))
    }

    /// Encoding of the database, e.g. `UTF8`
    pub async fn charset(&mut self) -> Result<String> {
        self.database_setting(statements::DATABASE_CHARSET).await
    }

    pub async fn collation(&mut self) -> Result<String> {
        self.database_setting(statements::DATABASE_COLLATION).await
    }
}

fn map_create_error(err: TaskError, database: &str) -> TaskError {
    match &err {
        TaskError::Statement { code, message }
            if code.as_deref() == Some(statements::DUPLICATE_DATABASE)
                || statements::is_duplicate_database_message(message) =>
        {
            TaskError::DatabaseAlreadyExists {
                database: database.to_string(),
            }
        }
        _ => err,
    }
}
