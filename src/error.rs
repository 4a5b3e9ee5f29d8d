use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Database already exists: {database}")]
    DatabaseAlreadyExists { database: String },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Command failed: {command} ({status})")]
    ProcessFailed { command: String, status: String },

    #[error("Connection failed to {database}: {cause}")]
    ConnectionFailed { database: String, cause: String },

    #[error("Statement failed: {message}")]
    Statement {
        code: Option<String>,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskError {
    pub fn configuration(message: impl Into<String>) -> Self {
        TaskError::Configuration {
            message: message.into(),
        }
    }

    pub fn process_failed(command: &str, status: ExitStatus) -> Self {
        TaskError::ProcessFailed {
            command: command.to_string(),
            status: status.to_string(),
        }
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskError::DatabaseAlreadyExists { .. } => 2,
            TaskError::Configuration { .. } => 3,
            _ => 1,
        }
    }
}

impl From<tokio_postgres::Error> for TaskError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => TaskError::Statement {
                code: Some(db.code().code().to_string()),
                message: db.message().to_string(),
            },
            None => TaskError::Statement {
                code: err.code().map(|c| c.code().to_string()),
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
