//! Stage 1: walk the paginated listing and collect every template id

use crate::config::ConfigError;
use crate::error::{Result, SyncError};
use crate::remote::TemplateSource;
use tracing::debug;

/// All remote template ids, in page order then in-page order.
///
/// Pages are requested from 1 upward until one comes back empty. Any failed
/// page fails the whole discovery. With `max_pages` set, a listing that is
/// still returning results after that many pages is treated as malformed.
/// A zero `page_size` is rejected before any request.
pub fn discover<S: TemplateSource + ?Sized>(
    source: &S,
    page_size: u32,
    max_pages: Option<u32>,
) -> Result<Vec<String>> {
    if page_size == 0 {
        return Err(ConfigError::Invalid {
            field: "remote.page_size",
            reason: "must be at least 1".to_string(),
        }
        .into());
    }

    let mut ids = Vec::new();
    let mut page = 1;

    loop {
        let results = source.list_templates(page, page_size)?;
        if results.is_empty() {
            break;
        }
        debug!(page, count = results.len(), "listing page");
        ids.extend(results.into_iter().map(|t| t.id));

        if let Some(max) = max_pages {
            if page >= max {
                return Err(SyncError::malformed(
                    "templates listing",
                    format!("still returning results after {} pages", max),
                ));
            }
        }
        page += 1;
    }

    Ok(ids)
}
