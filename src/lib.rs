//! template-sync - mirror document templates and their tokens locally
//!
//! Pulls template metadata from a document-generation service and keeps a
//! local record store up to date: one record per remote template, plus one
//! field-mapping row per template token, so tokens can be mapped to local
//! fields by hand.
//!
//! # Pipeline
//!
//! | Stage | Does |
//! |-------|------|
//! | Discovery | pages through the template listing until an empty page |
//! | Upsert | fetches each template's detail, finds or creates its local record |
//! | Reconcile | creates mappings for tokens that don't have one yet |
//!
//! Nothing is ever updated or deleted by a sync; mappings only accumulate.
//!
//! # Quick Start
//!
//! ```no_run
//! use template_sync::{run_sync, Config, Database, RemoteClient, SyncOptions};
//!
//! let config = Config::load().unwrap();
//! let client = RemoteClient::new(config.remote_settings().unwrap()).unwrap();
//! let db = Database::open().unwrap();
//!
//! let report = run_sync(&client, &db, &SyncOptions::from_config(&config)).unwrap();
//! println!(
//!     "templates created: {}, mappings created: {}",
//!     report.templates_created, report.mappings_created
//! );
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod init;
pub mod remote;
pub mod schema;
pub mod store;
pub mod sync;

pub use config::{Config, ConfigError, RemoteSettings};
pub use db::{Database, DbError, FieldMapping, SyncRun, TemplateInsert, TemplateRecord};
pub use error::SyncError;
pub use remote::{RemoteClient, TemplateDetail, TemplateSource, TemplateSummary, Token};
pub use store::RecordStore;
pub use sync::{run_sync, Stage, SyncFailure, SyncOptions, SyncReport};
