//! Revisions as new documents linked to their predecessor
use super::document::{Document, RevisionPath};
use super::error::{PersistenceError, Result, ValidationError, WorkflowError};
use super::storage::{Store, Tx, TxResult, abort, decode};
use super::types::TimeStamp;
use super::utils::composite_key;

fn member_key(document_number: &str, version_number: u32) -> Vec<u8> {
    composite_key(document_number.as_bytes(), &version_number.to_be_bytes())
}

/// Keeps one `is_latest_version` document per shared document number
#[derive(Clone)]
pub struct RevisionChainManager {
    store: Store,
}

impl RevisionChainManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn start_chain(&self, document: Document) -> Result<Document> {
        self.store
            .transaction(|tx| self.start_chain_in(tx, document.clone()))
    }

    pub fn chain(&self, parent_id: &str, document: Document) -> Result<Document> {
        self.store
            .transaction(|tx| self.chain_in(tx, parent_id, document.clone()))
    }

    /// First member of a new chain
    pub fn start_chain_in(&self, tx: &Tx<'_>, mut document: Document) -> TxResult<Document> {
        document.version_number = 1;
        document.is_latest_version = true;
        document.parent_document_id = None;

        tx.put_document(&document)?;
        tx.chain_members.insert(
            member_key(&document.document_number, 1),
            document.id.as_bytes(),
        )?;

        Ok(document)
    }

    /// Supersedes `parent_id` with `document`.
    ///
    /// The child takes the parent's document number and the next version; the
    /// parent loses its latest flag. Both rows are written in `tx`.
    pub fn chain_in(
        &self,
        tx: &Tx<'_>,
        parent_id: &str,
        mut document: Document,
    ) -> TxResult<Document> {
        let mut parent = tx.require_document(parent_id)?;

        if !parent.is_latest_version {
            return Err(abort(WorkflowError::Conflict(format!(
                "{} is no longer the latest revision of {}",
                parent.id, parent.document_number
            ))));
        }
        if parent.revision_path == Some(RevisionPath::Snapshot) {
            return Err(abort(ValidationError::SnapshotLineage(parent.id.clone())));
        }

        document.kind = parent.kind;
        document.document_number = parent.document_number.clone();
        document.version_number = parent.version_number + 1;
        document.is_latest_version = true;
        document.parent_document_id = Some(parent.id.clone());
        document.revision_path = Some(RevisionPath::Chain);

        parent.is_latest_version = false;
        parent.revision_path = Some(RevisionPath::Chain);
        parent.updated_at = TimeStamp::new();

        tx.put_document(&parent)?;
        tx.put_document(&document)?;
        tx.chain_members.insert(
            member_key(&document.document_number, document.version_number),
            document.id.as_bytes(),
        )?;

        tracing::debug!(
            parent_id,
            document_id = %document.id,
            version_number = document.version_number,
            "chain extended"
        );
        Ok(document)
    }

    /// Every document sharing `document_number`, newest first
    pub fn history(&self, document_number: &str) -> Result<Vec<Document>> {
        self.store
            .chain_members
            .scan_prefix(composite_key(document_number.as_bytes(), b""))
            .values()
            .rev()
            .map(|id| {
                let id = id?;
                let id = std::str::from_utf8(&id)
                    .map_err(|e| PersistenceError::Identifier(e.to_string()))?;
                self.store.require_document(id)
            })
            .collect()
    }

    pub fn latest(&self, document_number: &str) -> Result<Option<Document>> {
        let Some(first) = self
            .store
            .chain_members
            .scan_prefix(composite_key(document_number.as_bytes(), b""))
            .values()
            .next_back()
        else {
            return Ok(None);
        };
        let id = first?;
        self.store
            .documents
            .get(&id)?
            .map(|raw| decode::<Document>(&raw))
            .transpose()
    }
}
