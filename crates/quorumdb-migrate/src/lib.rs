//! QuorumDB Migration Runner
//!
//! Applies `.sql` files from a directory in lexicographic order through a
//! connected [`quorumdb_client::Client`], tracking what has already run in a
//! `_client_migrations` table on the server.
//!
//! # Conventions
//!
//! - Files must end in `.sql`; `.down.sql` files and subdirectories are
//!   ignored
//! - Apply order is the lexicographic file name order, so prefix versions
//!   like `00001_create_users.sql`, `00002_add_index.sql`
//! - A file is applied at most once; the tracking table is keyed by file
//!   name
//!
//! # Example
//!
//! ```rust,no_run
//! use quorumdb_client::Client;
//! use quorumdb_common::ClientConfig;
//! use quorumdb_migrate::Migrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::from_env())?;
//!     client.connect("admin", "admin").await?;
//!
//!     let applied = Migrator::new(client.clone()).migrate("./migrations").await?;
//!     println!("applied {} migrations", applied);
//!     Ok(())
//! }
//! ```

use quorumdb_client::Client;
use quorumdb_common::protocol::error::{ClientError, Result};
use quorumdb_common::protocol::ParamSql;
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

/// Name of the tracking table kept on the server.
pub const MIGRATION_TABLE: &str = "_client_migrations";

#[derive(Debug, Clone, PartialEq)]
struct MigrationFile {
    name: String,
    content: String,
}

/// Runs directory-based schema migrations through a connected client.
pub struct Migrator {
    client: Client,
}

impl Migrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Scans `dir` for pending `.sql` files and applies them in order.
    /// Returns how many migrations were newly applied.
    pub async fn migrate(&self, dir: impl AsRef<Path>) -> Result<usize> {
        self.ensure_migration_table().await?;

        let files = read_migration_files(dir.as_ref())?;
        if files.is_empty() {
            info!("no migration files found");
            return Ok(0);
        }

        let applied = self.applied_migrations().await?;

        let mut count = 0;
        for file in files {
            if applied.contains(&file.name) {
                continue;
            }
            info!(name = %file.name, "applying migration");
            self.apply(&file).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn ensure_migration_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\
             \tid INTEGER PRIMARY KEY,\n\
             \tname TEXT NOT NULL UNIQUE,\n\
             \tapplied_at DATETIME DEFAULT CURRENT_TIMESTAMP\n\
             )",
            MIGRATION_TABLE
        );
        let result = self.client.exec_sql(&sql).await?;
        if let Some(message) = result.error {
            return Err(ClientError::Server {
                status: 500,
                message,
            });
        }
        Ok(())
    }

    /// Names of migrations already recorded on the server. An empty table is
    /// not an error.
    async fn applied_migrations(&self) -> Result<HashSet<String>> {
        let sql = format!("SELECT name FROM {}", MIGRATION_TABLE);
        let records = match self.client.select_sql(&sql).await {
            Ok(records) => records,
            Err(ClientError::NoRows) => return Ok(HashSet::new()),
            Err(err) => return Err(err),
        };

        Ok(records
            .iter()
            .filter_map(|r| r.get_str("name").map(str::to_string))
            .collect())
    }

    async fn apply(&self, file: &MigrationFile) -> Result<()> {
        let result = self.client.exec_sql(&file.content).await?;
        if let Some(message) = result.error {
            return Err(ClientError::Server {
                status: 500,
                message,
            });
        }

        let insert = ParamSql::new(
            format!("INSERT INTO {} (name) VALUES (?)", MIGRATION_TABLE),
            vec![json!(file.name)],
        );
        let result = self.client.exec_sql_parameterized(insert).await?;
        if let Some(message) = result.error {
            return Err(ClientError::Server {
                status: 500,
                message: format!("failed to record migration: {}", message),
            });
        }
        Ok(())
    }
}

/// Reads and sorts the `.sql` files in a directory, skipping `.down.sql`
/// files and anything that is not a regular file.
fn read_migration_files(dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let lower = name.to_lowercase();
        if !lower.ends_with(".sql") || lower.ends_with(".down.sql") {
            continue;
        }

        files.push(MigrationFile {
            content: fs::read_to_string(entry.path())?,
            name,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
