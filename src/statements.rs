//! SQL text for the provisioning steps.
//!
//! DDL cannot take bind parameters, so identifiers and literals are quoted
//! here before they are spliced into statements.

use regex::Regex;
use std::sync::OnceLock;

/// Whether a PostGIS catalog relation is a table or a view on this version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Table,
    View,
}

impl RelationKind {
    fn keyword(self) -> &'static str {
        match self {
            RelationKind::Table => "TABLE",
            RelationKind::View => "VIEW",
        }
    }

    /// `geometry_columns` and `geography_columns` became views in PostGIS 2
    pub fn for_postgis_major(major: u32) -> Self {
        if major >= 2 {
            RelationKind::View
        } else {
            RelationKind::Table
        }
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct CreateDatabaseOptions<'a> {
    pub encoding: &'a str,
    pub template: Option<&'a str>,
    pub owner: Option<&'a str>,
}

pub fn create_database(name: &str, options: &CreateDatabaseOptions<'_>) -> String {
    let mut sql = format!("CREATE DATABASE {}", quote_ident(name));

    if let Some(owner) = options.owner {
        sql.push_str(&format!(" OWNER = {}", quote_ident(owner)));
    }
    if let Some(template) = options.template {
        sql.push_str(&format!(" TEMPLATE = {}", quote_ident(template)));
    }
    sql.push_str(&format!(" ENCODING = {}", quote_literal(options.encoding)));

    sql
}

pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote_ident(name))
}

pub fn create_schema(name: &str, owner: Option<&str>) -> String {
    let mut sql = format!("CREATE SCHEMA {}", quote_ident(name));

    if let Some(owner) = owner {
        sql.push_str(&format!(" AUTHORIZATION {}", quote_ident(owner)));
    }

    sql
}

pub fn create_extension(name: &str, schema: Option<&str>) -> String {
    let mut sql = format!("CREATE EXTENSION IF NOT EXISTS {}", quote_ident(name));

    if let Some(schema) = schema {
        sql.push_str(&format!(" SCHEMA {}", quote_ident(schema)));
    }

    sql
}

pub fn grant_all_tables(schema: &str, role: &str) -> String {
    format!(
        "GRANT ALL ON ALL TABLES IN SCHEMA {} TO {}",
        quote_ident(schema),
        quote_ident(role)
    )
}

pub fn grant_all_functions(schema: &str, role: &str) -> String {
    format!(
        "GRANT ALL ON ALL FUNCTIONS IN SCHEMA {} TO {}",
        quote_ident(schema),
        quote_ident(role)
    )
}

pub fn alter_owner(kind: RelationKind, schema: &str, relation: &str, role: &str) -> String {
    format!(
        "ALTER {} {}.{} OWNER TO {}",
        kind.keyword(),
        quote_ident(schema),
        quote_ident(relation),
        quote_ident(role)
    )
}

pub fn set_search_path(search_path: &[String]) -> String {
    let schemas: Vec<String> = if search_path.is_empty() {
        vec![quote_ident("public")]
    } else {
        search_path.iter().map(|s| quote_ident(s)).collect()
    };
    format!("SET search_path TO {};", schemas.join(", "))
}

pub const SCHEMA_EXISTS: &str = "SELECT nspname::text FROM pg_namespace WHERE nspname = $1";

pub fn postgis_version(schema: &str) -> String {
    format!("SELECT {}.postgis_lib_version()::text", quote_ident(schema))
}

pub const DATABASE_CHARSET: &str =
    "SELECT pg_encoding_to_char(encoding)::text FROM pg_database WHERE datname = $1";

pub const DATABASE_COLLATION: &str =
    "SELECT datcollate::text FROM pg_database WHERE datname = $1";

/// Major version out of strings like `3.4.2` or `2.5.0dev r1234`
pub fn parse_major_version(version: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^\s*(\d+)\.").expect("valid regex"));

    pattern
        .captures(version)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Server message for CREATE DATABASE on an existing name
pub fn is_duplicate_database_message(message: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"database .* already exists").expect("valid regex"));

    pattern.is_match(message)
}

/// SQLSTATE for `duplicate_database`
pub const DUPLICATE_DATABASE: &str = "42P04";
