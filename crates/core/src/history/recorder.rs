use tracing::debug;

use super::{diff, History, OBJECT_ID_FIELD};
use crate::document::DocumentId;
use crate::error::WatchError;
use crate::events::types::ChangeEvent;
use crate::store::{Collection, Filter};

/// Turns change events into [`History`] entries.
///
/// Every event costs one lookup of the document's latest entry and one
/// insert. Nothing is cached between events.
#[derive(Debug, Clone)]
pub struct Recorder {
    history: Collection<History>,
}

impl Recorder {
    pub fn new(history: Collection<History>) -> Self {
        Self { history }
    }

    /// Name of the collection entries are written to.
    pub fn collection_name(&self) -> &str {
        self.history.name()
    }

    /// Persist the entry for `event`.
    ///
    /// Returns the id of the new entry, or `None` when an equal entry was
    /// already recorded and the insert hit a unique index.
    pub async fn record(&self, event: &ChangeEvent) -> Result<Option<DocumentId>, WatchError> {
        let object_id = event.document_id()?;

        let previous = match self.history.last_inserted(by_object_id(object_id)).await {
            Ok(entry) => Some(entry.modified),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        let modified = event.full_document.clone().unwrap_or_default();
        let updated_fields = diff::updated_fields(previous.as_ref(), &modified);
        let entry = History {
            id: None,
            created_at: event.cluster_time,
            collection_name: event.ns.coll.clone(),
            object_id,
            modified,
            updated_fields,
            action: event.operation_type,
        };

        match self.history.create(&entry).await {
            Ok(id) => {
                debug!(
                    collection = %entry.collection_name,
                    %object_id,
                    action = entry.action.as_str(),
                    changed = entry.updated_fields.len(),
                    "recorded history entry"
                );
                Ok(Some(id))
            }
            Err(err) if err.is_duplicate_key() => {
                debug!(%object_id, created_at = %entry.created_at, "history entry already recorded");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn by_object_id(id: DocumentId) -> Filter {
    Filter::new().equals(OBJECT_ID_FIELD, id.to_value())
}
