//! Database connection seam
//!
//! The provisioning tasks only ever hold one connection at a time. They talk
//! to it through [`SqlConnection`] so the statement sequence can be recorded
//! in tests without a running server.

use crate::error::{Result, TaskError};
use crate::statements;
use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    pub search_path: Vec<String>,
}

impl ConnectionTarget {
    /// Startup `options` value that sets the search path, if there is one.
    /// Schema names are quoted so mixed case survives, and whitespace is
    /// backslash-escaped because the server splits options on it.
    pub fn options(&self) -> Option<String> {
        if self.search_path.is_empty() {
            return None;
        }

        let schemas: Vec<String> = self
            .search_path
            .iter()
            .map(|schema| escape_option(&statements::quote_ident(schema)))
            .collect();

        Some(format!("-c search_path={}", schemas.join(",")))
    }

    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.username);

        if let Some(password) = &self.password {
            config.password(password);
        }
        if let Some(options) = self.options() {
            config.options(&options);
        }

        config
    }
}

fn escape_option(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
pub trait SqlConnection: Send {
    /// Run one or more statements with the simple query protocol
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Run a query and return the first column of every row as text
    async fn query_strings(&mut self, sql: &str, params: &[&str]) -> Result<Vec<String>>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: SqlConnection;

    async fn connect(&self, target: &ConnectionTarget) -> Result<Self::Connection>;
}

/// Opens plain `tokio-postgres` connections
#[derive(Debug, Clone, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }
}

pub struct PgConnection {
    client: Client,
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgConnection;

    async fn connect(&self, target: &ConnectionTarget) -> Result<PgConnection> {
        debug!(
            "Connecting to {} as {} on {}:{}",
            target.database, target.username, target.host, target.port
        );

        let (client, connection) = target
            .pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| TaskError::ConnectionFailed {
                database: target.database.clone(),
                cause: e.to_string(),
            })?;

        let database = target.database.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Connection to {} closed with error: {}", database, e);
            }
        });

        Ok(PgConnection { client })
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query_strings(&mut self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = self.client.query(sql, &params).await?;

        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(TaskError::from))
            .collect()
    }
}
