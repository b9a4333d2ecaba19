//! Stage 2: make sure every remote template has a local record

use crate::error::Result;
use crate::remote::{TemplateDetail, TemplateSource};
use crate::store::RecordStore;
use tracing::debug;

/// A template detail annotated with the local record it resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateUpsert {
    pub local_key: i32,
    /// True when this call created the local record
    pub created: bool,
    pub detail: TemplateDetail,
}

/// Fetch the detail for `remote_id` and find or create its local record.
///
/// Existing records are reused as-is (name and modify date are not
/// refreshed). Calling this twice for the same id creates at most one record.
pub fn upsert<S, R>(source: &S, store: &R, remote_id: &str) -> Result<TemplateUpsert>
where
    S: TemplateSource + ?Sized,
    R: RecordStore + ?Sized,
{
    let detail = source.template_details(remote_id)?;

    if let Some(existing) = store.find_template(&detail.id)? {
        return Ok(TemplateUpsert {
            local_key: existing.id,
            created: false,
            detail,
        });
    }

    let inserted = store.create_template(
        &detail.id,
        &detail.name,
        &detail.date_modified.to_rfc3339(),
    )?;
    let local_key = inserted.record().id;
    if inserted.was_created() {
        debug!(remote_id = %detail.id, local_key, "created template record");
    }

    Ok(TemplateUpsert {
        local_key,
        created: inserted.was_created(),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::SyncError;
    use crate::sync::testing::{detail, FakeSource, MemoryStore};

    #[test]
    fn test_creates_missing_record() {
        let source = FakeSource::new(vec![detail("tpl-a", &["X"])]);
        let store = MemoryStore::default();

        let result = upsert(&source, &store, "tpl-a").unwrap();
        assert!(result.created);
        assert_eq!(result.detail.id, "tpl-a");

        let record = store.template("tpl-a").unwrap();
        assert_eq!(record.id, result.local_key);
        assert_eq!(record.name, "Template tpl-a");
        assert_eq!(record.last_modified, "2024-05-01T09:30:00+00:00");
    }

    #[test]
    fn test_same_id_twice_one_record() {
        let source = FakeSource::new(vec![detail("tpl-a", &[])]);
        let store = MemoryStore::default();

        let first = upsert(&source, &store, "tpl-a").unwrap();
        let second = upsert(&source, &store, "tpl-a").unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.local_key, second.local_key);
        assert_eq!(store.template_count(), 1);
    }

    #[test]
    fn test_same_id_twice_sqlite() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("t.db")).unwrap();
        let source = FakeSource::new(vec![detail("tpl-a", &[])]);

        let first = upsert(&source, &db, "tpl-a").unwrap();
        let second = upsert(&source, &db, "tpl-a").unwrap();

        assert_eq!(first.local_key, second.local_key);
        assert_eq!(db.get_all_templates().unwrap().len(), 1);
    }

    #[test]
    fn test_fetch_failure_creates_nothing() {
        let source = FakeSource::new(vec![detail("tpl-a", &[])]).failing("tpl-a");
        let store = MemoryStore::default();

        let err = upsert(&source, &store, "tpl-a").unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert_eq!(store.template_count(), 0);
    }
}
