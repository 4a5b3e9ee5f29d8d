//! PostGIS database tasks
//!
//! Provisioning helpers that create PostgreSQL databases with PostGIS
//! installed, plus schema dump and load through the PostgreSQL client tools.

pub mod config;
pub mod connection;
pub mod error;
pub mod statements;
pub mod tasks;
pub mod tools;

pub use config::{Config, SetupMode};
pub use connection::{ConnectionTarget, Connector, PgConnector, SqlConnection};
pub use error::{Result, TaskError};
pub use tasks::PostgisDatabaseTasks;
