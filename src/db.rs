//! SQLite record store with Diesel ORM
//!
//! Holds local template records, their token field mappings and a log of
//! sync runs. Tables are created on open.

use crate::config::CONFIG_DIR;
use crate::schema::*;
use crate::sync::SyncReport;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Database file name inside the config directory
const DB_FILE: &str = "template-sync.db";

/// Walk up directory tree to find .template-sync folder (like git finds .git)
/// Can be overridden with TEMPLATE_SYNC_DB_PATH env var
fn get_db_path() -> PathBuf {
    // Check env var first - always takes priority
    if let Ok(path) = std::env::var("TEMPLATE_SYNC_DB_PATH") {
        return PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let sync_dir = dir.join(CONFIG_DIR);
            if sync_dir.is_dir() {
                return sync_dir.join(DB_FILE);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    // Nothing found - `template-sync init` creates it here
    PathBuf::from(CONFIG_DIR).join(DB_FILE)
}

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable template record
#[derive(Insertable)]
#[diesel(table_name = templates)]
pub struct NewTemplate<'a> {
    pub remote_id: &'a str,
    pub name: &'a str,
    pub last_modified: &'a str,
    pub created_at: &'a str,
}

/// Local mirror of a remote template. `id` is the local key.
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = templates)]
pub struct TemplateRecord {
    pub id: i32,
    pub remote_id: String,
    pub name: String,
    pub last_modified: String,
    pub created_at: String,
}

/// Insertable field mapping
#[derive(Insertable)]
#[diesel(table_name = field_mappings)]
pub struct NewFieldMapping<'a> {
    pub template_id: i32,
    pub remote_field_name: &'a str,
    pub local_field_name: Option<&'a str>,
    pub is_inactive: bool,
    pub created_at: &'a str,
}

/// Token-to-local-field association for one template
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = field_mappings)]
pub struct FieldMapping {
    pub id: i32,
    pub template_id: i32,
    pub remote_field_name: String,
    pub local_field_name: Option<String>,
    pub is_inactive: bool,
    pub created_at: String,
}

/// Insertable sync run
#[derive(Insertable)]
#[diesel(table_name = sync_runs)]
pub struct NewSyncRun<'a> {
    pub run_id: &'a str,
    pub started_at: &'a str,
    pub completed_at: Option<&'a str>,
    pub templates_discovered: i32,
    pub templates_created: i32,
    pub mappings_created: i32,
    pub failure_count: i32,
    pub report_json: Option<&'a str>,
}

/// Queryable sync run
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = sync_runs)]
pub struct SyncRun {
    pub id: i32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub templates_discovered: i32,
    pub templates_created: i32,
    pub mappings_created: i32,
    pub failure_count: i32,
    pub report_json: Option<String>,
}

/// Outcome of inserting a template keyed by its remote id
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateInsert {
    Created(TemplateRecord),
    /// A row with the same remote id already existed; nothing was written
    Existing(TemplateRecord),
}

impl TemplateInsert {
    pub fn record(&self) -> &TemplateRecord {
        match self {
            TemplateInsert::Created(r) | TemplateInsert::Existing(r) => r,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, TemplateInsert::Created(_))
    }
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas. Workers write concurrently, so every pooled
/// connection waits on the lock instead of failing with SQLITE_BUSY.
#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
}

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] diesel::r2d2::Error),

    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> PathBuf {
        get_db_path()
    }

    /// Open database at default path (respects TEMPLATE_SYNC_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::Connection(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(5)
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                remote_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS field_mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                template_id INTEGER NOT NULL,
                remote_field_name TEXT NOT NULL,
                local_field_name TEXT,
                is_inactive INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (template_id) REFERENCES templates(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS sync_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                run_id TEXT NOT NULL UNIQUE,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                templates_discovered INTEGER NOT NULL DEFAULT 0,
                templates_created INTEGER NOT NULL DEFAULT 0,
                mappings_created INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                report_json TEXT
            )
        "#).execute(&mut conn)?;

        // One active mapping per (template, token). Inactive rows don't count.
        diesel::sql_query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_mappings_active_token \
             ON field_mappings(template_id, remote_field_name) WHERE is_inactive = 0",
        )
        .execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_mappings_template ON field_mappings(template_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_runs_started_at ON sync_runs(started_at)").execute(&mut conn)?;

        Ok(())
    }

    // ========================================================================
    // Template Operations
    // ========================================================================

    /// Find the template record mirroring a remote template
    pub fn find_template_by_remote_id(&self, remote_id: &str) -> Result<Option<TemplateRecord>> {
        let mut conn = self.get_conn()?;
        let record = templates::table
            .filter(templates::remote_id.eq(remote_id))
            .select(TemplateRecord::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(record)
    }

    /// Get a template record by local key
    pub fn get_template(&self, id: i32) -> Result<Option<TemplateRecord>> {
        let mut conn = self.get_conn()?;
        let record = templates::table
            .filter(templates::id.eq(id))
            .select(TemplateRecord::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(record)
    }

    /// Insert a template record unless one with the same remote id exists.
    ///
    /// The `remote_id` unique constraint makes a concurrent duplicate a no-op;
    /// either way the row that ends up stored is returned.
    pub fn insert_template(
        &self,
        remote_id: &str,
        name: &str,
        last_modified: &str,
    ) -> Result<TemplateInsert> {
        let mut conn = self.get_conn()?;
        let now = chrono::Local::now().to_rfc3339();

        let new_template = NewTemplate {
            remote_id,
            name,
            last_modified,
            created_at: &now,
        };

        let inserted = diesel::insert_or_ignore_into(templates::table)
            .values(&new_template)
            .execute(&mut conn)?;

        let record = templates::table
            .filter(templates::remote_id.eq(remote_id))
            .select(TemplateRecord::as_select())
            .first(&mut conn)?;

        Ok(if inserted == 1 {
            TemplateInsert::Created(record)
        } else {
            TemplateInsert::Existing(record)
        })
    }

    /// Get all template records
    pub fn get_all_templates(&self) -> Result<Vec<TemplateRecord>> {
        let mut conn = self.get_conn()?;
        let records = templates::table
            .order(templates::id.asc())
            .select(TemplateRecord::as_select())
            .load(&mut conn)?;
        Ok(records)
    }

    // ========================================================================
    // Field Mapping Operations
    // ========================================================================

    /// Remote field names of all active mappings under a template
    pub fn active_field_names(&self, template_id: i32) -> Result<Vec<String>> {
        let mut conn = self.get_conn()?;
        let names = field_mappings::table
            .filter(field_mappings::template_id.eq(template_id))
            .filter(field_mappings::is_inactive.eq(false))
            .select(field_mappings::remote_field_name)
            .load::<String>(&mut conn)?;
        Ok(names)
    }

    /// Insert an active mapping for a token. Returns false when an active
    /// mapping for the same (template, token) already exists.
    pub fn insert_field_mapping(&self, template_id: i32, remote_field_name: &str) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let now = chrono::Local::now().to_rfc3339();

        let new_mapping = NewFieldMapping {
            template_id,
            remote_field_name,
            local_field_name: None,
            is_inactive: false,
            created_at: &now,
        };

        let inserted = diesel::insert_or_ignore_into(field_mappings::table)
            .values(&new_mapping)
            .execute(&mut conn)?;

        Ok(inserted == 1)
    }

    /// Mappings under a template, optionally including inactive ones
    pub fn get_field_mappings(&self, template_id: i32, include_inactive: bool) -> Result<Vec<FieldMapping>> {
        let mut conn = self.get_conn()?;
        let mut query = field_mappings::table
            .filter(field_mappings::template_id.eq(template_id))
            .into_boxed();
        if !include_inactive {
            query = query.filter(field_mappings::is_inactive.eq(false));
        }
        let mappings = query
            .order(field_mappings::id.asc())
            .select(FieldMapping::as_select())
            .load(&mut conn)?;
        Ok(mappings)
    }

    /// Point a mapping at a local field
    pub fn set_local_field_name(&self, mapping_id: i32, local_field_name: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        let updated = diesel::update(field_mappings::table.filter(field_mappings::id.eq(mapping_id)))
            .set(field_mappings::local_field_name.eq(Some(local_field_name)))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(DbError::Validation(format!(
                "Field mapping {} does not exist. Run 'template-sync mappings <template>' to see existing mappings.",
                mapping_id
            )));
        }
        Ok(())
    }

    /// Mark a mapping inactive. The next sync recreates an active mapping if
    /// the token is still present remotely.
    pub fn deactivate_field_mapping(&self, mapping_id: i32) -> Result<()> {
        let mut conn = self.get_conn()?;
        let updated = diesel::update(field_mappings::table.filter(field_mappings::id.eq(mapping_id)))
            .set(field_mappings::is_inactive.eq(true))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(DbError::Validation(format!(
                "Field mapping {} does not exist. Run 'template-sync mappings <template>' to see existing mappings.",
                mapping_id
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Sync Run Log
    // ========================================================================

    /// Record the start of a sync run
    pub fn start_sync_run(&self, run_id: &str) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = chrono::Local::now().to_rfc3339();

        let new_run = NewSyncRun {
            run_id,
            started_at: &now,
            completed_at: None,
            templates_discovered: 0,
            templates_created: 0,
            mappings_created: 0,
            failure_count: 0,
            report_json: None,
        };

        diesel::insert_into(sync_runs::table)
            .values(&new_run)
            .execute(&mut conn)?;

        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
            .first(&mut conn)?;

        Ok(id)
    }

    /// Complete a sync run with its report
    pub fn complete_sync_run(&self, id: i32, report: &SyncReport) -> Result<()> {
        let discovered = to_i32("templates_discovered", report.templates_discovered)?;
        let created = to_i32("templates_created", report.templates_created)?;
        let mappings = to_i32("mappings_created", report.mappings_created)?;
        let failures = to_i32("failure_count", report.failures.len())?;

        let mut conn = self.get_conn()?;
        let now = chrono::Local::now().to_rfc3339();
        let report_json = serde_json::to_string(report).ok();

        diesel::update(sync_runs::table.filter(sync_runs::id.eq(id)))
            .set((
                sync_runs::completed_at.eq(Some(&now)),
                sync_runs::templates_discovered.eq(discovered),
                sync_runs::templates_created.eq(created),
                sync_runs::mappings_created.eq(mappings),
                sync_runs::failure_count.eq(failures),
                sync_runs::report_json.eq(report_json),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    /// Get recent sync runs, newest first
    pub fn get_recent_runs(&self, limit: i64) -> Result<Vec<SyncRun>> {
        let mut conn = self.get_conn()?;
        let runs = sync_runs::table
            .order(sync_runs::id.desc())
            .limit(limit)
            .select(SyncRun::as_select())
            .load(&mut conn)?;
        Ok(runs)
    }
}

fn to_i32(column: &str, n: usize) -> Result<i32> {
    i32::try_from(n)
        .map_err(|_| DbError::Validation(format!("{} = {} does not fit in sync_runs", column, n)))
}
