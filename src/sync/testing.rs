//! In-memory source and store for pipeline tests

use crate::db::{self, DbError, TemplateInsert, TemplateRecord};
use crate::error::{Result, SyncError};
use crate::remote::{TemplateDetail, TemplateSource, TemplateSummary, Token};
use crate::store::RecordStore;
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

pub fn detail(id: &str, tokens: &[&str]) -> TemplateDetail {
    TemplateDetail {
        id: id.to_string(),
        name: format!("Template {}", id),
        date_modified: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        tokens: tokens
            .iter()
            .map(|n| Token {
                name: n.to_string(),
                value: None,
            })
            .collect(),
    }
}

/// Remote service with a fixed template set that records every request
#[derive(Default)]
pub struct FakeSource {
    templates: Vec<TemplateDetail>,
    failing: HashSet<String>,
    pages_requested: Mutex<Vec<u32>>,
    details_requested: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new(templates: Vec<TemplateDetail>) -> Self {
        Self {
            templates,
            ..Default::default()
        }
    }

    /// `count` templates named tpl-0001.. without tokens
    pub fn with_count(count: usize) -> Self {
        let templates = (1..=count)
            .map(|i| detail(&format!("tpl-{:04}", i), &[]))
            .collect();
        Self::new(templates)
    }

    /// Detail requests for `id` fail with a transport error
    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn pages_requested(&self) -> Vec<u32> {
        self.pages_requested.lock().unwrap().clone()
    }

    pub fn details_requested(&self) -> Vec<String> {
        self.details_requested.lock().unwrap().clone()
    }
}

impl TemplateSource for FakeSource {
    fn list_templates(&self, page: u32, count: u32) -> Result<Vec<TemplateSummary>> {
        self.pages_requested.lock().unwrap().push(page);
        let start = ((page - 1) * count) as usize;
        Ok(self
            .templates
            .iter()
            .skip(start)
            .take(count as usize)
            .map(|t| TemplateSummary {
                id: t.id.clone(),
                name: Some(t.name.clone()),
            })
            .collect())
    }

    fn template_details(&self, id: &str) -> Result<TemplateDetail> {
        self.details_requested.lock().unwrap().push(id.to_string());
        let url = format!("fake://templates/{}/details", id);
        if self.failing.contains(id) {
            return Err(SyncError::transport(&url, "503 Service Unavailable"));
        }
        self.templates
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| SyncError::transport(&url, "404 Not Found"))
    }
}

#[derive(Default)]
struct MemoryState {
    templates: Vec<TemplateRecord>,
    mappings: Vec<(i32, String)>,
}

/// Record store with the same uniqueness rules as the SQLite one
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing_tokens: HashSet<String>,
    failing_templates: HashSet<i32>,
}

impl MemoryStore {
    /// Creating a mapping for `token` fails
    pub fn failing_token(mut self, token: &str) -> Self {
        self.failing_tokens.insert(token.to_string());
        self
    }

    /// Loading mappings for `key` fails
    pub fn failing_template(mut self, key: i32) -> Self {
        self.failing_templates.insert(key);
        self
    }

    pub fn template_count(&self) -> usize {
        self.state.lock().unwrap().templates.len()
    }

    pub fn mapping_count(&self) -> usize {
        self.state.lock().unwrap().mappings.len()
    }

    pub fn template(&self, remote_id: &str) -> Option<TemplateRecord> {
        self.state
            .lock()
            .unwrap()
            .templates
            .iter()
            .find(|t| t.remote_id == remote_id)
            .cloned()
    }

    pub fn mappings(&self, key: i32) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .mappings
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn seed_mapping(&self, key: i32, name: &str) {
        self.state.lock().unwrap().mappings.push((key, name.to_string()));
    }
}

impl RecordStore for MemoryStore {
    fn find_template(&self, remote_id: &str) -> db::Result<Option<TemplateRecord>> {
        Ok(self.template(remote_id))
    }

    fn create_template(
        &self,
        remote_id: &str,
        name: &str,
        last_modified: &str,
    ) -> db::Result<TemplateInsert> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.templates.iter().find(|t| t.remote_id == remote_id) {
            return Ok(TemplateInsert::Existing(existing.clone()));
        }
        let record = TemplateRecord {
            id: state.templates.len() as i32 + 1,
            remote_id: remote_id.to_string(),
            name: name.to_string(),
            last_modified: last_modified.to_string(),
            created_at: "2024-05-02T00:00:00+00:00".to_string(),
        };
        state.templates.push(record.clone());
        Ok(TemplateInsert::Created(record))
    }

    fn mapped_field_names(&self, template_key: i32) -> db::Result<HashSet<String>> {
        if self.failing_templates.contains(&template_key) {
            return Err(DbError::Connection("store unavailable".to_string()));
        }
        Ok(self.mappings(template_key).into_iter().collect())
    }

    fn create_field_mapping(&self, template_key: i32, remote_field_name: &str) -> db::Result<bool> {
        if self.failing_tokens.contains(remote_field_name) {
            return Err(DbError::Validation(format!("cannot save {}", remote_field_name)));
        }
        let mut state = self.state.lock().unwrap();
        if state
            .mappings
            .iter()
            .any(|(k, n)| *k == template_key && n == remote_field_name)
        {
            return Ok(false);
        }
        state.mappings.push((template_key, remote_field_name.to_string()));
        Ok(true)
    }
}
