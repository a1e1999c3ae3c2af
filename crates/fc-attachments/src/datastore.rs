//! External datastore contract.
//!
//! The host record-persistence framework sits behind this trait: it owns
//! rows, identities and associations, while the lifecycle owns bytes and
//! processing. An in-memory implementation ships for tests and examples.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use fc_core::{Id, ValidationErrors};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::Attachment;

/// Datastore errors.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// The host ran its own validations and rejected the commit.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("row not found: {0}")]
    NotFound(Id),

    #[error("datastore failure: {0}")]
    Backend(String),
}

/// Narrow contract to the host record-persistence framework.
///
/// The hook methods have no-op defaults; a host that registers nothing gets
/// the plain lifecycle.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Persist the attachment's metadata row.
    ///
    /// Assigns and returns the identity for new attachments; updates the
    /// existing row in place (keeping the identity) for re-processed ones.
    async fn commit(&self, attachment: &mut Attachment) -> Result<Id, DatastoreError>;

    /// Look up an attachment row.
    async fn find(&self, id: Id) -> Result<Option<Attachment>, DatastoreError>;

    /// Locate the thumbnail row for `(parent_id, label)`, or produce a
    /// fresh unsaved entity so derivation never duplicates rows.
    async fn find_or_create_child(
        &self,
        parent_id: Id,
        label: &str,
    ) -> Result<Attachment, DatastoreError>;

    /// All thumbnail rows of a parent.
    async fn children_of(&self, parent_id: Id) -> Result<Vec<Attachment>, DatastoreError>;

    /// Remove an attachment row.
    async fn delete_row(&self, id: Id) -> Result<(), DatastoreError>;

    /// Invoked on each derived thumbnail after its bytes are staged and
    /// before it is committed; may mutate the entity.
    async fn before_thumbnail_saved(
        &self,
        _child: &mut Attachment,
    ) -> Result<(), DatastoreError> {
        Ok(())
    }

    /// Invoked after an attachment reaches its persisted state.
    async fn after_attachment_processed(
        &self,
        _attachment: &Attachment,
    ) -> Result<(), DatastoreError> {
        Ok(())
    }
}

/// In-memory datastore for tests.
///
/// Keeps rows in sync with processing by updating them in the
/// `after_attachment_processed` hook, the way a real host would persist the
/// final state.
pub struct MemoryDatastore {
    rows: RwLock<Vec<Attachment>>,
    next_id: AtomicI64,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn commit(&self, attachment: &mut Attachment) -> Result<Id, DatastoreError> {
        let mut rows = self.rows.write().await;

        match attachment.id {
            Some(id) => {
                match rows.iter().position(|r| r.id == Some(id)) {
                    Some(pos) => rows[pos] = attachment.clone(),
                    None => rows.push(attachment.clone()),
                }
                Ok(id)
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                attachment.id = Some(id);
                rows.push(attachment.clone());
                Ok(id)
            }
        }
    }

    async fn find(&self, id: Id) -> Result<Option<Attachment>, DatastoreError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|r| r.id == Some(id)).cloned())
    }

    async fn find_or_create_child(
        &self,
        parent_id: Id,
        label: &str,
    ) -> Result<Attachment, DatastoreError> {
        let rows = self.rows.read().await;
        let existing = rows.iter().find(|r| {
            r.parent_id == Some(parent_id) && r.thumbnail_label.as_deref() == Some(label)
        });
        Ok(existing
            .cloned()
            .unwrap_or_else(|| Attachment::child_of(parent_id, label)))
    }

    async fn children_of(&self, parent_id: Id) -> Result<Vec<Attachment>, DatastoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn delete_row(&self, id: Id) -> Result<(), DatastoreError> {
        let mut rows = self.rows.write().await;
        rows.retain(|r| r.id != Some(id));
        Ok(())
    }

    async fn after_attachment_processed(
        &self,
        attachment: &Attachment,
    ) -> Result<(), DatastoreError> {
        let mut rows = self.rows.write().await;
        if let Some(pos) = rows.iter().position(|r| r.id == attachment.id) {
            rows[pos] = attachment.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_assigns_monotonic_identities() {
        let store = MemoryDatastore::new();

        let mut a = Attachment::new("a.txt", "text/plain");
        let mut b = Attachment::new("b.txt", "text/plain");

        let id_a = store.commit(&mut a).await.unwrap();
        let id_b = store.commit(&mut b).await.unwrap();

        assert_eq!(a.id, Some(id_a));
        assert!(id_b > id_a);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn commit_with_identity_updates_in_place() {
        let store = MemoryDatastore::new();

        let mut attachment = Attachment::new("a.txt", "text/plain");
        let id = store.commit(&mut attachment).await.unwrap();

        attachment.size = 42;
        let again = store.commit(&mut attachment).await.unwrap();

        assert_eq!(again, id);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.find(id).await.unwrap().unwrap().size, 42);
    }

    #[tokio::test]
    async fn find_or_create_child_reuses_existing_rows() {
        let store = MemoryDatastore::new();

        let mut child = store.find_or_create_child(7, "thumb").await.unwrap();
        assert!(child.id.is_none());
        child.filename = "photo_thumb.jpg".to_string();
        let id = store.commit(&mut child).await.unwrap();

        let found = store.find_or_create_child(7, "thumb").await.unwrap();
        assert_eq!(found.id, Some(id));

        let other = store.find_or_create_child(7, "large").await.unwrap();
        assert!(other.id.is_none());
    }

    #[tokio::test]
    async fn delete_row_removes_only_the_target() {
        let store = MemoryDatastore::new();

        let mut a = Attachment::new("a.txt", "text/plain");
        let mut b = Attachment::new("b.txt", "text/plain");
        let id_a = store.commit(&mut a).await.unwrap();
        store.commit(&mut b).await.unwrap();

        store.delete_row(id_a).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.find(id_a).await.unwrap().is_none());
    }
}
