//! Recording connector for exercising the task sequences without a server

use crate::config::Config;
use crate::connection::{ConnectionTarget, Connector, SqlConnection};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    log: Vec<String>,
    existing_schemas: Vec<String>,
    postgis_version: Option<String>,
    rows: HashMap<String, Vec<String>>,
    failures: Vec<(String, Option<String>, String)>,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        let connector = Self::default();
        connector.state.lock().unwrap().postgis_version = Some("3.4.2".to_string());
        connector
    }

    pub fn with_schema(self, schema: &str) -> Self {
        self.state.lock().unwrap().existing_schemas.push(schema.to_string());
        self
    }

    pub fn with_postgis_version(self, version: &str) -> Self {
        self.state.lock().unwrap().postgis_version = Some(version.to_string());
        self
    }

    pub fn with_rows(self, sql: &str, rows: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .rows
            .insert(sql.to_string(), rows.iter().map(|r| r.to_string()).collect());
        self
    }

    /// Fail any statement containing `needle` with a server error
    pub fn failing_on(self, needle: &str, code: Option<&str>, message: &str) -> Self {
        self.state.lock().unwrap().failures.push((
            needle.to_string(),
            code.map(str::to_string),
            message.to_string(),
        ));
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Only the statements sent through `execute`
    pub fn statements(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|entry| entry.strip_prefix("execute ").map(str::to_string))
            .collect()
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, target: &ConnectionTarget) -> Result<MockConnection> {
        self.state.lock().unwrap().log.push(format!(
            "connect {} as {} [{}]",
            target.database,
            target.username,
            target.search_path.join(",")
        ));
        Ok(MockConnection {
            state: self.state.clone(),
        })
    }
}

#[async_trait]
impl SqlConnection for MockConnection {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("execute {}", sql));

        if let Some((_, code, message)) = state.failures.iter().find(|(n, _, _)| sql.contains(n.as_str())) {
            return Err(TaskError::Statement {
                code: code.clone(),
                message: message.clone(),
            });
        }

        Ok(())
    }

    async fn query_strings(&mut self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("query {} {:?}", sql, params));

        if sql.contains("pg_namespace") {
            let schema = params.first().copied().unwrap_or_default();
            return Ok(state
                .existing_schemas
                .iter()
                .filter(|s| s.as_str() == schema)
                .cloned()
                .collect());
        }

        if sql.contains("postgis_lib_version") {
            return Ok(state.postgis_version.iter().cloned().collect());
        }

        Ok(state.rows.get(sql).cloned().unwrap_or_default())
    }
}

/// Config with `DB_NAME=gis`, `DB_USER=app` plus the given overrides
pub fn test_config(pairs: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("DB_NAME".to_string(), "gis".to_string());
    vars.insert("DB_USER".to_string(), "app".to_string());
    for (key, value) in pairs {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}
