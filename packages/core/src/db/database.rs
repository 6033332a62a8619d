//! Database Connection Management
//!
//! This module provides the database connection and schema initialization
//! for the media store, using libsql as an embedded SQLite-compatible engine.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **Normalized schema**: base `node` table plus `content`, `content_version`,
//!   `property_data` and the two denormalized snapshot tables
//! - **WAL mode**: Write-Ahead Logging for concurrent readers
//! - **Foreign keys**: Enabled for referential integrity
//!
//! # Connection Pattern
//!
//! Use `connect_with_timeout()` in async code. It configures the busy timeout so
//! that a locked database makes the statement wait instead of failing
//! immediately with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use mediastore_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/media.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RepositoryConfig;
use crate::db::error::DatabaseError;
use crate::models::{MEDIA_RECYCLE_BIN_ID, RECYCLE_BIN_OBJECT_TYPE};
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Default busy timeout applied to every connection (milliseconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Table definitions, created idempotently on every open.
const SCHEMA_STATEMENTS: &[(&str, &str)] = &[
    (
        "node",
        "CREATE TABLE IF NOT EXISTS node (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            unique_id TEXT NOT NULL UNIQUE,
            parent_id INTEGER,
            level INTEGER NOT NULL,
            path TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            trashed INTEGER NOT NULL DEFAULT 0,
            text TEXT NOT NULL,
            node_object_type TEXT NOT NULL,
            create_date TEXT NOT NULL
        )",
    ),
    (
        "content",
        "CREATE TABLE IF NOT EXISTS content (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id INTEGER NOT NULL UNIQUE,
            content_type_id INTEGER NOT NULL,
            FOREIGN KEY (node_id) REFERENCES node(id)
        )",
    ),
    (
        "content_version",
        "CREATE TABLE IF NOT EXISTS content_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id INTEGER NOT NULL,
            version_id TEXT NOT NULL UNIQUE,
            version_date TEXT NOT NULL,
            content_type_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            FOREIGN KEY (node_id) REFERENCES node(id)
        )",
    ),
    (
        "property_data",
        "CREATE TABLE IF NOT EXISTS property_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id INTEGER NOT NULL,
            version_id TEXT NOT NULL,
            property_type_id INTEGER NOT NULL,
            data_int INTEGER,
            data_decimal REAL,
            data_date TEXT,
            data_nvarchar TEXT,
            data_ntext TEXT,
            UNIQUE (version_id, property_type_id),
            FOREIGN KEY (node_id) REFERENCES node(id)
        )",
    ),
    (
        "content_xml",
        "CREATE TABLE IF NOT EXISTS content_xml (
            node_id INTEGER PRIMARY KEY,
            xml TEXT NOT NULL,
            FOREIGN KEY (node_id) REFERENCES node(id)
        )",
    ),
    (
        "preview_xml",
        "CREATE TABLE IF NOT EXISTS preview_xml (
            node_id INTEGER NOT NULL,
            version_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            xml TEXT NOT NULL,
            PRIMARY KEY (node_id, version_id),
            FOREIGN KEY (node_id) REFERENCES node(id)
        )",
    ),
];

/// Index definitions
const INDEX_STATEMENTS: &[(&str, &str)] = &[
    (
        "idx_node_parent",
        "CREATE INDEX IF NOT EXISTS idx_node_parent ON node(parent_id, node_object_type)",
    ),
    (
        "idx_node_object_type",
        "CREATE INDEX IF NOT EXISTS idx_node_object_type ON node(node_object_type)",
    ),
    (
        "idx_node_path",
        "CREATE INDEX IF NOT EXISTS idx_node_path ON node(path)",
    ),
    (
        "idx_version_node",
        "CREATE INDEX IF NOT EXISTS idx_version_node ON content_version(node_id, version_date)",
    ),
    (
        "idx_property_node",
        "CREATE INDEX IF NOT EXISTS idx_property_node ON property_data(node_id)",
    ),
];

/// Database service for managing the libsql database and schema
///
/// # Examples
///
/// ```no_run
/// use mediastore_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_service = DatabaseService::new(PathBuf::from("/path/to/media.db")).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    /// Busy timeout applied to each connection
    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` with the default busy timeout
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the parent directory cannot be created, the
    /// database cannot be opened, or schema initialization fails.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::open(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
    }

    /// Open (or create) the database with the connection settings of `config`
    pub async fn with_config(db_path: PathBuf, config: &RepositoryConfig) -> Result<Self, DatabaseError> {
        Self::open(db_path, config.busy_timeout_ms).await
    }

    /// Open (or create) the database with an explicit busy timeout
    pub async fn open(db_path: PathBuf, busy_timeout_ms: u64) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms,
        };

        service.initialize_schema().await?;

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements may return rows, so they go through query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn
            .prepare(pragma)
            .await
            .map_err(|e| DatabaseError::pragma_failed(pragma, e))?;
        let _ = stmt
            .query(())
            .await
            .map_err(|e| DatabaseError::pragma_failed(pragma, e))?;
        Ok(())
    }

    /// Create tables, indexes and the recycle bin container row
    ///
    /// Safe to call repeatedly: every statement is `IF NOT EXISTS` / `OR IGNORE`.
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        for (table, statement) in SCHEMA_STATEMENTS {
            conn.execute(statement, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create table '{}': {}",
                    table, e
                ))
            })?;
        }

        for (index, statement) in INDEX_STATEMENTS {
            conn.execute(statement, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    index, e
                ))
            })?;
        }

        self.seed_recycle_bin(&conn).await?;

        Ok(())
    }

    /// Seed the reserved media recycle bin container
    ///
    /// The bin sits at level 0 so that media moved into it land on level 1
    /// with a path of `-21,<id>`.
    async fn seed_recycle_bin(&self, conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT OR IGNORE INTO node
                (id, unique_id, parent_id, level, path, sort_order, trashed, text, node_object_type, create_date)
             VALUES (?, ?, NULL, 0, ?, 0, 0, ?, ?, ?)",
            (
                MEDIA_RECYCLE_BIN_ID,
                "bf7c7cbc-952f-4518-97a2-69e9c7b3cd00",
                MEDIA_RECYCLE_BIN_ID.to_string(),
                "Recycle Bin",
                RECYCLE_BIN_OBJECT_TYPE,
                "1970-01-01T00:00:00.000000Z",
            ),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to seed recycle bin: {}", e))
        })?;

        Ok(())
    }

    /// Busy timeout applied to each connection, in milliseconds
    pub fn busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms
    }

    /// Get a raw connection to the database
    ///
    /// Prefer `connect_with_timeout()`; this handle has no busy timeout and no
    /// foreign key enforcement configured.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with busy timeout and foreign keys configured
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }
}
