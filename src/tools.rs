//! PostgreSQL client programs (pg_dump, psql, pg_config)

use crate::connection::ConnectionTarget;
use crate::error::{Result, TaskError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ClientTools {
    pub pg_dump: PathBuf,
    pub psql: PathBuf,
    pub pg_config: PathBuf,
}

impl ClientTools {
    /// Resolve the client programs, inside `bin_dir` when given
    pub fn new(bin_dir: Option<&Path>) -> Self {
        let program = |name: &str| match bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };

        Self {
            pg_dump: program("pg_dump"),
            psql: program("psql"),
            pg_config: program("pg_config"),
        }
    }

    /// Run a program to completion, failing on a non-zero exit
    pub async fn run(
        &self,
        program: &Path,
        args: &[String],
        target: &ConnectionTarget,
    ) -> Result<()> {
        let command_line = format!("{} {}", program.display(), args.join(" "));
        debug!("Running: {}", command_line);

        let status = Command::new(program)
            .args(args)
            .envs(client_env(target))
            .stdin(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            warn!("Command exited with {}: {}", status, command_line);
            return Err(TaskError::process_failed(&command_line, status));
        }

        Ok(())
    }

    /// Installation share directory as reported by `pg_config --sharedir`
    pub async fn share_dir(&self) -> Result<PathBuf> {
        let output = Command::new(&self.pg_config)
            .arg("--sharedir")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(TaskError::process_failed(
                &format!("{} --sharedir", self.pg_config.display()),
                output.status,
            ));
        }

        let dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if dir.is_empty() {
            return Err(TaskError::Internal(
                "pg_config --sharedir printed nothing".to_string(),
            ));
        }

        Ok(PathBuf::from(dir))
    }
}

impl Default for ClientTools {
    fn default() -> Self {
        Self::new(None)
    }
}

/// libpq environment for a target, keeping the password off the command line
pub fn client_env(target: &ConnectionTarget) -> Vec<(&'static str, String)> {
    let mut env = vec![
        ("PGHOST", target.host.clone()),
        ("PGPORT", target.port.to_string()),
        ("PGUSER", target.username.clone()),
    ];

    if let Some(password) = &target.password {
        env.push(("PGPASSWORD", password.clone()));
    }

    env
}
