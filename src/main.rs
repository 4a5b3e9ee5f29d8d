use postgis_tasks::{Config, PgConnector, PostgisDatabaseTasks, TaskError};

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: postgis-tasks <command> [file]

Commands:
  create          Create the database and install PostGIS
  setup           Install PostGIS into an existing database
  drop            Drop the database if it exists
  purge           Drop and recreate the database
  dump <file>     Dump the schema (without the postgis schema) to <file>
  load <file>     Load a schema dump from <file>
  charset         Print the database encoding
  collation       Print the database collation
  info            Print the resolved provisioning settings

Configuration is read from the environment (and a .env file if present):
  DB_HOST, DB_PORT, DB_NAME, DB_USER, DB_PASSWORD, DB_SU_USER, DB_SU_PASSWORD,
  DB_SCHEMA_SEARCH_PATH, DB_ENCODING, DB_TEMPLATE, POSTGIS_SETUP,
  POSTGIS_EXTENSION, POSTGIS_SCRIPT_DIR, PG_BIN_DIR, LOG_DIR, RUST_LOG";

enum Command {
    Create,
    Setup,
    Drop,
    Purge,
    Dump(PathBuf),
    Load(PathBuf),
    Charset,
    Collation,
    Info,
}

fn parse_command(args: &[String]) -> Option<Command> {
    let file = || args.get(2).map(PathBuf::from);

    match args.get(1).map(String::as_str)? {
        "create" => Some(Command::Create),
        "setup" => Some(Command::Setup),
        "drop" => Some(Command::Drop),
        "purge" => Some(Command::Purge),
        "dump" => file().map(Command::Dump),
        "load" => file().map(Command::Load),
        "charset" => Some(Command::Charset),
        "collation" => Some(Command::Collation),
        "info" => Some(Command::Info),
        _ => None,
    }
}

const DEFAULT_LOG_FILTER: &str = "info,postgis_tasks=debug";

/// Logging knobs, read after `.env` has been loaded
struct LogSettings {
    log_dir: Option<String>,
    filter: String,
}

impl LogSettings {
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            log_dir: lookup("LOG_DIR").filter(|d| !d.trim().is_empty()),
            filter: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}

/// Console logging, plus JSON file logging when LOG_DIR is set
fn init_logging(settings: LogSettings) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let Some(log_dir) = settings.log_dir else {
        tracing_subscriber::registry().with(filter).with(console).init();
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory {}: {}", log_dir, e);
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "postgis-tasks.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .init();

    debug!("Logging initialized - log directory: {}", log_dir);
    Some(guard)
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let mut tasks = PostgisDatabaseTasks::new(config, PgConnector::new()).await;

    match command {
        Command::Create => tasks.create().await?,
        Command::Setup => tasks.setup_gis().await?,
        Command::Drop => tasks.drop_database().await?,
        Command::Purge => tasks.purge().await?,
        Command::Dump(file) => tasks.structure_dump(&file).await?,
        Command::Load(file) => tasks.structure_load(&file).await?,
        Command::Charset => println!("{}", tasks.charset().await?),
        Command::Collation => println!("{}", tasks.collation().await?),
        Command::Info => print_info(&tasks),
    }

    Ok(())
}

fn print_info(tasks: &PostgisDatabaseTasks<PgConnector>) {
    let config = tasks.config();
    println!("database:       {}", config.database);
    println!("user:           {}", config.username);
    println!("superuser:      {}", config.su_username());
    println!("has_su:         {}", tasks.has_su());
    println!("search_path:    {}", tasks.search_path().join(","));
    println!("setup:          {:?}", config.setup);
    println!("extensions:     {}", tasks.extension_names().join(","));
    println!(
        "script_dir:     {}",
        config
            .script_dir
            .as_deref()
            .map(Path::display)
            .map(|d| d.to_string())
            .unwrap_or_default()
    );
}

#[tokio::main]
async fn main() {
    // Load .env before logging so LOG_DIR and RUST_LOG can come from it
    let dotenv = dotenvy::dotenv();
    let guard = init_logging(LogSettings::from_lookup(|key| env::var(key).ok()));
    if let Err(e) = dotenv {
        debug!("No .env file loaded: {}", e);
    }

    let args: Vec<String> = env::args().collect();
    let Some(command) = parse_command(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(64);
    };

    match run(command).await {
        Ok(()) => info!("Done"),
        Err(e) => {
            let code = match e.downcast_ref::<TaskError>() {
                Some(task_error) => task_error.exit_code(),
                None => 1,
            };
            if code == 2 {
                warn!("{}", e);
            } else {
                error!("{}", e);
            }
            drop(guard);
            std::process::exit(code);
        }
    }
}
