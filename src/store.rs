//! Record store seen by the sync pipeline
//!
//! The pipeline only needs four operations; `Database` provides them over
//! SQLite, tests provide them in memory.

use crate::db::{self, Database, TemplateInsert, TemplateRecord};
use std::collections::HashSet;

pub trait RecordStore {
    /// Template record whose remote id matches, if any
    fn find_template(&self, remote_id: &str) -> db::Result<Option<TemplateRecord>>;

    /// Create a template record. A record that already exists for the same
    /// remote id is returned as `Existing` and left untouched.
    fn create_template(
        &self,
        remote_id: &str,
        name: &str,
        last_modified: &str,
    ) -> db::Result<TemplateInsert>;

    /// Remote field names of the active mappings under a template
    fn mapped_field_names(&self, template_key: i32) -> db::Result<HashSet<String>>;

    /// Create an active mapping. `Ok(false)` when one already exists.
    fn create_field_mapping(&self, template_key: i32, remote_field_name: &str) -> db::Result<bool>;
}

impl RecordStore for Database {
    fn find_template(&self, remote_id: &str) -> db::Result<Option<TemplateRecord>> {
        self.find_template_by_remote_id(remote_id)
    }

    fn create_template(
        &self,
        remote_id: &str,
        name: &str,
        last_modified: &str,
    ) -> db::Result<TemplateInsert> {
        self.insert_template(remote_id, name, last_modified)
    }

    fn mapped_field_names(&self, template_key: i32) -> db::Result<HashSet<String>> {
        Ok(self.active_field_names(template_key)?.into_iter().collect())
    }

    fn create_field_mapping(&self, template_key: i32, remote_field_name: &str) -> db::Result<bool> {
        self.insert_field_mapping(template_key, remote_field_name)
    }
}
