//! sled backed store: named trees plus one transactional view across all of them
use super::document::{Document, LineItem, Term};
use super::error::{PersistenceError, Result, WorkflowError};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use std::sync::Arc;

pub type TxResult<T> = ConflictableTransactionResult<T, WorkflowError>;

/// Aborts the surrounding transaction with a domain error
pub(crate) fn abort(err: impl Into<WorkflowError>) -> ConflictableTransactionError<WorkflowError> {
    ConflictableTransactionError::Abort(err.into())
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>> {
    minicbor::to_vec(value).map_err(|e| PersistenceError::Encode(e.to_string()).into())
}

pub(crate) fn decode<'b, T: minicbor::Decode<'b, ()>>(bytes: &'b [u8]) -> Result<T> {
    Ok(minicbor::decode(bytes)?)
}

#[derive(Clone)]
pub struct Store {
    db: Arc<Db>,
    pub(crate) documents: Tree,
    pub(crate) line_items: Tree,
    pub(crate) terms: Tree,
    pub(crate) snapshots: Tree,
    pub(crate) snapshot_heads: Tree,
    pub(crate) audit_log: Tree,
    pub(crate) audit_index: Tree,
    pub(crate) chain_members: Tree,
    pub(crate) sequences: Tree,
}

impl Store {
    pub fn new(db: Arc<Db>) -> Result<Self> {
        Ok(Self {
            documents: db.open_tree("documents")?,
            line_items: db.open_tree("line_items")?,
            terms: db.open_tree("terms")?,
            snapshots: db.open_tree("snapshots")?,
            snapshot_heads: db.open_tree("snapshot_heads")?,
            audit_log: db.open_tree("audit_log")?,
            audit_index: db.open_tree("audit_index")?,
            chain_members: db.open_tree("chain_members")?,
            sequences: db.open_tree("sequences")?,
            db,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Arc::new(sled::open(path)?))
    }

    /// In-memory database removed on drop
    pub fn temporary() -> Result<Self> {
        Self::new(Arc::new(sled::Config::new().temporary(true).open()?))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }

    /// Runs `f` as one serializable unit over every workflow tree.
    ///
    /// sled re-runs `f` when a concurrent transaction touched the same keys, so
    /// `f` must not have side effects outside `tx`. An `Abort` rolls back every
    /// write made through `tx` and surfaces the domain error.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&Tx<'_>) -> TxResult<T>,
    {
        let trees = (
            &self.documents,
            &self.line_items,
            &self.terms,
            &self.snapshots,
            &self.snapshot_heads,
            &self.audit_log,
            &self.audit_index,
            &self.chain_members,
        );

        trees
            .transaction(
                |(
                    documents,
                    line_items,
                    terms,
                    snapshots,
                    snapshot_heads,
                    audit_log,
                    audit_index,
                    chain_members,
                )| {
                    let tx = Tx {
                        documents,
                        line_items,
                        terms,
                        snapshots,
                        snapshot_heads,
                        audit_log,
                        audit_index,
                        chain_members,
                    };
                    f(&tx)
                },
            )
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => e.into(),
            })
    }

    pub fn document(&self, id: &str) -> Result<Option<Document>> {
        self.documents
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    pub fn require_document(&self, id: &str) -> Result<Document> {
        self.document(id)?
            .ok_or_else(|| WorkflowError::not_found("Document", id))
    }

    pub fn line_items(&self, document_id: &str) -> Result<Vec<LineItem>> {
        match self.line_items.get(document_id.as_bytes())? {
            Some(raw) => decode(&raw),
            None => Ok(vec![]),
        }
    }

    pub fn terms(&self, document_id: &str) -> Result<Vec<Term>> {
        match self.terms.get(document_id.as_bytes())? {
            Some(raw) => decode(&raw),
            None => Ok(vec![]),
        }
    }

    pub fn documents(&self) -> impl Iterator<Item = Result<Document>> + '_ {
        self.documents
            .iter()
            .values()
            .map(|raw| raw.map_err(WorkflowError::from).and_then(|raw| decode::<Document>(&raw)))
    }
}

/// Transactional view handed to the workflow components
pub struct Tx<'a> {
    pub(crate) documents: &'a TransactionalTree,
    pub(crate) line_items: &'a TransactionalTree,
    pub(crate) terms: &'a TransactionalTree,
    pub(crate) snapshots: &'a TransactionalTree,
    pub(crate) snapshot_heads: &'a TransactionalTree,
    pub(crate) audit_log: &'a TransactionalTree,
    pub(crate) audit_index: &'a TransactionalTree,
    pub(crate) chain_members: &'a TransactionalTree,
}

impl Tx<'_> {
    pub fn document(&self, id: &str) -> TxResult<Option<Document>> {
        match self.documents.get(id.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_document(&self, id: &str) -> TxResult<Document> {
        self.document(id)?
            .ok_or_else(|| abort(WorkflowError::not_found("Document", id)))
    }

    pub fn put_document(&self, document: &Document) -> TxResult<()> {
        self.documents
            .insert(document.id.as_bytes(), encode(document)?)?;
        Ok(())
    }

    pub fn line_items(&self, document_id: &str) -> TxResult<Vec<LineItem>> {
        match self.line_items.get(document_id.as_bytes())? {
            Some(raw) => Ok(decode(&raw)?),
            None => Ok(vec![]),
        }
    }

    /// Replaces the whole item set of a document
    pub fn put_line_items(&self, document_id: &str, items: &[LineItem]) -> TxResult<()> {
        self.line_items
            .insert(document_id.as_bytes(), encode(&items)?)?;
        Ok(())
    }

    pub fn terms(&self, document_id: &str) -> TxResult<Vec<Term>> {
        match self.terms.get(document_id.as_bytes())? {
            Some(raw) => Ok(decode(&raw)?),
            None => Ok(vec![]),
        }
    }

    pub fn put_terms(&self, document_id: &str, terms: &[Term]) -> TxResult<()> {
        self.terms.insert(document_id.as_bytes(), encode(&terms)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn aborted_transaction_leaves_no_writes() {
        let store = Store::temporary().unwrap();

        let result: Result<()> = store.transaction(|tx| {
            tx.terms.insert(&b"doc_1"[..], &b"partial"[..])?;
            Err(abort(ValidationError::NoItems))
        });

        assert!(matches!(
            result,
            Err(WorkflowError::Validation(ValidationError::NoItems))
        ));
        assert!(store.terms.get(b"doc_1").unwrap().is_none());
    }

    #[test]
    fn missing_lists_read_as_empty() {
        let store = Store::temporary().unwrap();

        assert!(store.line_items("doc_missing").unwrap().is_empty());
        assert!(store.terms("doc_missing").unwrap().is_empty());
        assert!(store.document("doc_missing").unwrap().is_none());
    }
}
