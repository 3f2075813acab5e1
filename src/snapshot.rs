//! Immutable, numbered version snapshots of one document
use super::diff::{self, Diff};
use super::document::{Document, LineItem, Term};
use super::error::{Result, ValidationError, WorkflowError};
use super::storage::{Store, Tx, TxResult, abort, decode, encode};
use super::types::{ActorId, TimeStamp};
use super::utils::{composite_key, non_blank};
use super::value::Value;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct VersionSnapshot {
    #[n(0)]
    pub document_id: String,
    #[n(1)]
    pub version_number: u32,
    #[n(2)]
    pub version_label: String,
    #[n(3)]
    pub header: Document, // frozen copy
    #[n(4)]
    pub items: Vec<LineItem>,
    #[n(5)]
    pub terms: Vec<Term>,
    #[n(6)]
    pub change_reason: String,
    #[n(7)]
    pub changed_by: String,
    #[n(8)]
    pub changed_at: TimeStamp<Utc>,
    #[n(9)]
    pub is_current: bool,
    #[n(10)]
    pub content_hash: String, // sha256 over the encoded items and terms
}

/// History row without the frozen payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSummary {
    pub version_number: u32,
    pub version_label: String,
    pub change_reason: String,
    pub changed_by: String,
    pub changed_at: TimeStamp<Utc>,
    pub is_current: bool,
    pub content_hash: String,
}

impl From<&VersionSnapshot> for VersionSummary {
    fn from(s: &VersionSnapshot) -> Self {
        Self {
            version_number: s.version_number,
            version_label: s.version_label.clone(),
            change_reason: s.change_reason.clone(),
            changed_by: s.changed_by.clone(),
            changed_at: s.changed_at.clone(),
            is_current: s.is_current,
            content_hash: s.content_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionComparison {
    pub from: VersionSummary,
    pub to: VersionSummary,
    pub header: Diff,
    pub line_items: Diff,
    pub terms: Diff,
}

/// `Rev.00` for the first version
pub fn version_label(version_number: u32) -> String {
    format!("Rev.{:02}", version_number.saturating_sub(1))
}

fn snapshot_key(document_id: &str, version_number: u32) -> Vec<u8> {
    composite_key(document_id.as_bytes(), &version_number.to_be_bytes())
}

fn content_hash(items: &[LineItem], terms: &[Term]) -> Result<String> {
    let mut content = encode(&items)?;
    content.extend(encode(&terms)?);
    Ok(sha256::digest(&content))
}

#[derive(Clone)]
pub struct VersionSnapshotStore {
    store: Store,
}

impl VersionSnapshotStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Appends the next snapshot in its own transaction
    pub fn create_snapshot(
        &self,
        document_id: &str,
        header: &Document,
        items: &[LineItem],
        terms: &[Term],
        change_reason: &str,
        actor: &ActorId,
    ) -> Result<VersionSnapshot> {
        if non_blank(Some(change_reason)).is_none() {
            return Err(ValidationError::MissingChangeReason.into());
        }
        self.store.transaction(|tx| {
            self.create_in(tx, document_id, header, items, terms, change_reason, actor)
        })
    }

    /// Highest existing version + 1, or 1 for a document without snapshots
    pub fn next_version_in(&self, tx: &Tx<'_>, document_id: &str) -> TxResult<u32> {
        Ok(self.head_in(tx, document_id)?.map_or(1, |head| head + 1))
    }

    /// Swaps the current flag to a new snapshot inside `tx`.
    ///
    /// The previous current snapshot is rewritten with `is_current = false` and
    /// the new one inserted with `is_current = true` in the same transaction, so
    /// no reader ever sees zero or two current snapshots.
    #[allow(clippy::too_many_arguments)]
    pub fn create_in(
        &self,
        tx: &Tx<'_>,
        document_id: &str,
        header: &Document,
        items: &[LineItem],
        terms: &[Term],
        change_reason: &str,
        actor: &ActorId,
    ) -> TxResult<VersionSnapshot> {
        let Some(change_reason) = non_blank(Some(change_reason)) else {
            return Err(abort(ValidationError::MissingChangeReason));
        };

        let head = self.head_in(tx, document_id)?;
        if let Some(previous) = head {
            let key = snapshot_key(document_id, previous);
            let raw = tx.snapshots.get(&key)?.ok_or_else(|| {
                abort(WorkflowError::not_found("Snapshot", format!("{document_id}@{previous}")))
            })?;
            let mut previous: VersionSnapshot = decode(&raw)?;
            previous.is_current = false;
            tx.snapshots.insert(key, encode(&previous)?)?;
        }

        let version_number = head.map_or(1, |head| head + 1);
        let snapshot = VersionSnapshot {
            document_id: document_id.to_string(),
            version_number,
            version_label: version_label(version_number),
            header: header.clone(),
            items: items.to_vec(),
            terms: terms.to_vec(),
            change_reason: change_reason.to_string(),
            changed_by: actor.to_string(),
            changed_at: TimeStamp::new(),
            is_current: true,
            content_hash: content_hash(items, terms)?,
        };

        tx.snapshots
            .insert(snapshot_key(document_id, version_number), encode(&snapshot)?)?;
        tx.snapshot_heads
            .insert(document_id.as_bytes(), encode(&version_number)?)?;

        tracing::debug!(document_id, version_number, "version snapshot written");
        Ok(snapshot)
    }

    pub fn current_in(&self, tx: &Tx<'_>, document_id: &str) -> TxResult<VersionSnapshot> {
        let head = self
            .head_in(tx, document_id)?
            .ok_or_else(|| abort(WorkflowError::not_found("Snapshot", document_id)))?;
        let raw = tx
            .snapshots
            .get(snapshot_key(document_id, head))?
            .ok_or_else(|| abort(WorkflowError::not_found("Snapshot", document_id)))?;
        Ok(decode(&raw)?)
    }

    fn head_in(&self, tx: &Tx<'_>, document_id: &str) -> TxResult<Option<u32>> {
        match tx.snapshot_heads.get(document_id.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// The requested version, or the current one when `version_number` is `None`
    pub fn get_snapshot(
        &self,
        document_id: &str,
        version_number: Option<u32>,
    ) -> Result<VersionSnapshot> {
        let version_number = match version_number {
            Some(version_number) => version_number,
            None => {
                let raw = self
                    .store
                    .snapshot_heads
                    .get(document_id.as_bytes())?
                    .ok_or_else(|| WorkflowError::not_found("Snapshot", document_id))?;
                decode(&raw)?
            }
        };

        let raw = self
            .store
            .snapshots
            .get(snapshot_key(document_id, version_number))?
            .ok_or_else(|| {
                WorkflowError::not_found("Snapshot", format!("{document_id}@{version_number}"))
            })?;
        decode(&raw)
    }

    /// Newest first
    pub fn list_snapshots(&self, document_id: &str) -> Result<Vec<VersionSnapshot>> {
        self.store
            .snapshots
            .scan_prefix(composite_key(document_id.as_bytes(), b""))
            .values()
            .rev()
            .map(|raw| decode::<VersionSnapshot>(&raw?))
            .collect()
    }

    pub fn list_summaries(&self, document_id: &str) -> Result<Vec<VersionSummary>> {
        Ok(self
            .list_snapshots(document_id)?
            .iter()
            .map(VersionSummary::from)
            .collect())
    }

    /// What changed between two versions of the same document
    pub fn compare(&self, document_id: &str, from: u32, to: u32) -> Result<VersionComparison> {
        let old = self.get_snapshot(document_id, Some(from))?;
        let new = self.get_snapshot(document_id, Some(to))?;

        let items = |s: &VersionSnapshot| s.items.iter().map(LineItem::to_value).collect::<Vec<Value>>();
        let terms = |s: &VersionSnapshot| s.terms.iter().map(Term::to_value).collect::<Vec<Value>>();

        Ok(VersionComparison {
            from: VersionSummary::from(&old),
            to: VersionSummary::from(&new),
            header: diff::diff_values(&old.header.to_value(), &new.header.to_value()),
            line_items: diff::diff_keyed(&items(&old), &items(&new), "line_no"),
            terms: diff::diff_keyed(&terms(&old), &terms(&new), "display_order"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_count_from_rev_zero() {
        assert_eq!(version_label(1), "Rev.00");
        assert_eq!(version_label(2), "Rev.01");
        assert_eq!(version_label(12), "Rev.11");
    }

    #[test]
    fn snapshot_keys_sort_by_version() {
        let mut keys = vec![
            snapshot_key("doc_a", 256),
            snapshot_key("doc_a", 2),
            snapshot_key("doc_a", 1),
        ];
        keys.sort();

        assert_eq!(keys[0], snapshot_key("doc_a", 1));
        assert_eq!(keys[2], snapshot_key("doc_a", 256));
    }
}
