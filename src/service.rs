//! Service layer API for document workflow operations
use super::audit::{AuditAction, AuditEvent, AuditLogger};
use super::chain::RevisionChainManager;
use super::config::WorkflowConfig;
use super::document::{
    Document, DocumentInput, DocumentPatch, LineItem, RevisionPath, Term, Totals,
    finalise_items, finalise_terms, validity_window,
};
use super::error::{Result, ValidationError, WorkflowError};
use super::sequence::{DocumentNumbers, SledSequence};
use super::snapshot::{VersionComparison, VersionSnapshotStore, VersionSummary, version_label};
use super::storage::{Store, Tx, TxResult, abort};
use super::transition::{StatusTransitionValidator, status};
use super::types::{ActorId, Amount, Currency, EntityKind, TimeStamp};
use super::utils::{new_uuid_to_bech32, non_blank};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

const INITIAL_CHANGE_REASON: &str = "Initial creation";

/// Header merged with one of its snapshots, plus both revision histories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentView {
    pub document: Document,
    pub version_number: u32,
    pub version_label: String,
    pub items: Vec<LineItem>,
    pub terms: Vec<Term>,
    /// snapshot history, newest first
    pub versions: Vec<VersionSummary>,
    /// documents sharing the document number, newest first
    pub chain: Vec<Document>,
}

pub struct DocumentWorkflowService {
    store: Store,
    config: WorkflowConfig,
    validator: StatusTransitionValidator,
    snapshots: VersionSnapshotStore,
    chains: RevisionChainManager,
    audit: AuditLogger,
    numbers: Arc<dyn DocumentNumbers>,
}

impl DocumentWorkflowService {
    /// Service numbering documents from the store's own sequence tree
    pub fn new(store: Store, config: WorkflowConfig) -> Result<Self> {
        let numbers = Arc::new(SledSequence::new(&store, &config.company_code));
        Self::with_numbers(store, config, numbers)
    }

    pub fn with_numbers(
        store: Store,
        config: WorkflowConfig,
        numbers: Arc<dyn DocumentNumbers>,
    ) -> Result<Self> {
        let validator = StatusTransitionValidator::new(config.transition_table()?);

        Ok(Self {
            snapshots: VersionSnapshotStore::new(store.clone()),
            chains: RevisionChainManager::new(store.clone()),
            audit: AuditLogger::new(store.clone()),
            store,
            config,
            validator,
            numbers,
        })
    }

    pub fn open(path: impl AsRef<Path>, config: WorkflowConfig) -> Result<Self> {
        Self::new(Store::open(path)?, config)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }
    pub fn validator(&self) -> &StatusTransitionValidator {
        &self.validator
    }
    pub fn snapshots(&self) -> &VersionSnapshotStore {
        &self.snapshots
    }
    pub fn chains(&self) -> &RevisionChainManager {
        &self.chains
    }
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    fn exchange_rate_for(&self, currency: Currency) -> Amount {
        match currency {
            Currency::INR => Amount::units(1),
            _ => self.config.default_exchange_rate(),
        }
    }

    /// Create a document with its items, terms and snapshot #1.
    ///
    /// An input naming a parent document is a revision and goes through the chain.
    pub fn create(&self, actor: &ActorId, input: DocumentInput) -> Result<Document> {
        if let Some(parent_id) = input.parent_document_id.clone() {
            return self.create_revision_as_new_document(
                actor,
                &parent_id,
                INITIAL_CHANGE_REASON,
                input.into(),
            );
        }

        // Validate everything before touching the store
        let items = finalise_items(&input.items)?;
        let terms = finalise_terms(&input.terms)?;
        let kind = input.kind;

        let initial_status = if input.submit_for_approval {
            let initial = kind.initial_status();
            if !self
                .validator
                .is_allowed(kind, initial, status::PENDING_APPROVAL)
            {
                return Err(ValidationError::InvalidInitialStatus {
                    kind: kind.to_string(),
                    status: status::PENDING_APPROVAL.to_string(),
                }
                .into());
            }
            status::PENDING_APPROVAL
        } else {
            kind.initial_status()
        };

        let now = TimeStamp::new();
        let validity_days = input
            .validity_days
            .unwrap_or(self.config.default_validity_days);
        let totals = Totals::compute(&items, &input.charges, self.config.tax_rate())?;
        let valid_until = match input.valid_until {
            Some(valid_until) => valid_until,
            None => validity_window(&now, validity_days)?,
        };

        let mut document = Document {
            id: String::new(),
            kind,
            document_number: String::new(),
            customer_id: input.customer_id,
            enquiry_id: input.enquiry_id,
            buyer_id: input.buyer_id,
            project_name: input.project_name,
            market_type: input.market_type,
            currency: input.currency,
            exchange_rate: input
                .exchange_rate
                .unwrap_or_else(|| self.exchange_rate_for(input.currency)),
            charges: input.charges,
            totals,
            status: initial_status.to_string(),
            version_number: 1,
            is_latest_version: true,
            parent_document_id: None,
            revision_path: None,
            valid_until,
            validity_days,
            testing_standards: input.testing_standards,
            remarks: input.remarks,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_by: actor.to_string(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        document.validate_header(&now)?;

        document.document_number = self.numbers.next_number(kind.number_prefix())?;
        document.id = new_uuid_to_bech32(&kind.number_prefix().to_lowercase())?;

        let document = self.store.transaction(|tx| {
            let document = self.chains.start_chain_in(tx, document.clone())?;
            tx.put_line_items(&document.id, &items)?;
            tx.put_terms(&document.id, &terms)?;
            self.snapshots.create_in(
                tx,
                &document.id,
                &document,
                &items,
                &terms,
                INITIAL_CHANGE_REASON,
                actor,
            )?;
            self.audit.record_in(
                tx,
                kind,
                &document.id,
                AuditAction::Create,
                None,
                Some(document.to_value()),
                actor,
            )?;

            if kind == EntityKind::Quotation {
                if let Some(enquiry_id) = &document.enquiry_id {
                    self.mark_enquiry_quoted(tx, enquiry_id, actor)?;
                }
            }
            Ok(document)
        })?;

        tracing::info!(
            document_id = %document.id,
            document_number = %document.document_number,
            %kind,
            actor = %actor,
            "document created"
        );
        Ok(document)
    }

    /// Enquiries outside the store are external references and left alone
    fn mark_enquiry_quoted(&self, tx: &Tx<'_>, enquiry_id: &str, actor: &ActorId) -> TxResult<()> {
        let Some(mut enquiry) = tx.document(enquiry_id)? else {
            return Ok(());
        };
        if enquiry.kind != EntityKind::Enquiry
            || !self
                .validator
                .is_allowed(enquiry.kind, &enquiry.status, status::QUOTED)
        {
            return Ok(());
        }

        let before = enquiry.to_value();
        enquiry.status = status::QUOTED.to_string();
        enquiry.updated_at = TimeStamp::new();
        tx.put_document(&enquiry)?;
        self.audit.record_in(
            tx,
            EntityKind::Enquiry,
            enquiry_id,
            AuditAction::StatusChange,
            Some(before),
            Some(enquiry.to_value()),
            actor,
        )?;
        Ok(())
    }

    /// Re-reads the status inside the transaction so racing callers see each other
    fn change_status<F>(&self, actor: &ActorId, id: &str, target: &str, stamp: F) -> Result<Document>
    where
        F: Fn(&mut Document),
    {
        let document = self.store.transaction(|tx| {
            let mut document = tx.require_document(id)?;
            self.validator.check(document.kind, &document.status, target)?;

            let before = document.to_value();
            document.status = target.to_string();
            document.updated_at = TimeStamp::new();
            stamp(&mut document);
            tx.put_document(&document)?;

            self.audit.record_in(
                tx,
                document.kind,
                id,
                AuditAction::StatusChange,
                Some(before),
                Some(document.to_value()),
                actor,
            )?;
            Ok(document)
        })?;

        tracing::info!(document_id = id, status = target, actor = %actor, "status changed");
        Ok(document)
    }

    pub fn submit_for_approval(&self, actor: &ActorId, id: &str) -> Result<Document> {
        self.change_status(actor, id, status::PENDING_APPROVAL, |_| {})
    }

    pub fn approve(&self, actor: &ActorId, id: &str, remarks: &str) -> Result<Document> {
        // an unknown id is reported before missing remarks
        self.store.require_document(id)?;
        let remarks = non_blank(Some(remarks)).ok_or(ValidationError::MissingRemarks("approve"))?;

        self.change_status(actor, id, status::APPROVED, |document| {
            document.approved_by = Some(actor.to_string());
            document.approved_at = Some(TimeStamp::new());
            document.remarks = Some(remarks.to_string());
        })
    }

    pub fn reject(&self, actor: &ActorId, id: &str, remarks: &str) -> Result<Document> {
        self.store.require_document(id)?;
        let remarks = non_blank(Some(remarks)).ok_or(ValidationError::MissingRemarks("reject"))?;

        self.change_status(actor, id, status::REJECTED, |document| {
            document.remarks = Some(remarks.to_string());
            document.rejection_reason = Some(remarks.to_string());
        })
    }

    pub fn send(&self, actor: &ActorId, id: &str) -> Result<Document> {
        self.change_status(actor, id, status::SENT, |_| {})
    }

    /// Any move the table permits for the document's kind.
    ///
    /// Approval and rejection still demand remarks when reached this way.
    pub fn transition(
        &self,
        actor: &ActorId,
        id: &str,
        target: &str,
        remarks: Option<&str>,
    ) -> Result<Document> {
        match target {
            status::APPROVED => self.approve(actor, id, remarks.unwrap_or_default()),
            status::REJECTED => self.reject(actor, id, remarks.unwrap_or_default()),
            _ => self.change_status(actor, id, target, |_| {}),
        }
    }

    /// Revise in place: same id, next version snapshot
    pub fn revise(
        &self,
        actor: &ActorId,
        id: &str,
        change_reason: &str,
        patch: DocumentPatch,
    ) -> Result<Document> {
        self.revise_checked(actor, id, None, change_reason, patch)
    }

    /// `revise` that fails with a conflict unless the document is still at `expected_version`
    pub fn revise_if_version(
        &self,
        actor: &ActorId,
        id: &str,
        expected_version: u32,
        change_reason: &str,
        patch: DocumentPatch,
    ) -> Result<Document> {
        self.revise_checked(actor, id, Some(expected_version), change_reason, patch)
    }

    fn revise_checked(
        &self,
        actor: &ActorId,
        id: &str,
        expected_version: Option<u32>,
        change_reason: &str,
        patch: DocumentPatch,
    ) -> Result<Document> {
        let change_reason =
            non_blank(Some(change_reason)).ok_or(ValidationError::MissingChangeReason)?;
        let (new_items, new_terms) = patch.finalise_lists()?;
        let today = TimeStamp::new();

        let document = self.store.transaction(|tx| {
            let mut document = tx.require_document(id)?;
            if document.revision_path == Some(RevisionPath::Chain) {
                return Err(abort(ValidationError::ChainedLineage(document.id.clone())));
            }
            if let Some(expected) = expected_version {
                if expected != document.version_number {
                    return Err(abort(WorkflowError::Conflict(format!(
                        "{id} is at version {}, expected {expected}",
                        document.version_number
                    ))));
                }
            }

            // carry forward whatever the caller did not replace
            let current = self.snapshots.current_in(tx, id)?;
            let items = new_items.clone().unwrap_or(current.items);
            let terms = new_terms.clone().unwrap_or(current.terms);

            let before = document.to_value();
            patch.apply_header(&mut document);
            if patch.currency.is_some() && patch.exchange_rate.is_none() {
                document.exchange_rate = self.exchange_rate_for(document.currency);
            }
            document.totals = Totals::compute(&items, &document.charges, self.config.tax_rate())?;
            document.validate_commercials()?;
            if patch.valid_until.is_some() {
                document.validate_header(&today)?;
            }

            document.version_number = self.snapshots.next_version_in(tx, id)?;
            document.revision_path = Some(RevisionPath::Snapshot);
            document.updated_at = TimeStamp::new();

            tx.put_document(&document)?;
            if new_items.is_some() {
                tx.put_line_items(id, &items)?;
            }
            if new_terms.is_some() {
                tx.put_terms(id, &terms)?;
            }
            self.snapshots
                .create_in(tx, id, &document, &items, &terms, change_reason, actor)?;
            self.audit.record_in(
                tx,
                document.kind,
                id,
                AuditAction::Update,
                Some(before),
                Some(document.to_value()),
                actor,
            )?;
            Ok(document)
        })?;

        tracing::info!(
            document_id = id,
            version_number = document.version_number,
            actor = %actor,
            "document revised"
        );
        Ok(document)
    }

    /// Supersede `parent_id` with a new document that shares its number.
    ///
    /// The parent's items and terms are carried over unless `patch` replaces them.
    pub fn create_revision_as_new_document(
        &self,
        actor: &ActorId,
        parent_id: &str,
        change_reason: &str,
        patch: DocumentPatch,
    ) -> Result<Document> {
        let change_reason =
            non_blank(Some(change_reason)).ok_or(ValidationError::MissingChangeReason)?;
        let (new_items, new_terms) = patch.finalise_lists()?;
        let today = TimeStamp::new();

        let parent = self.store.require_document(parent_id)?;
        let new_id = new_uuid_to_bech32(&parent.kind.number_prefix().to_lowercase())?;

        let document = self.store.transaction(|tx| {
            let parent = tx.require_document(parent_id)?;
            let items = match &new_items {
                Some(items) => items.clone(),
                None => tx.line_items(parent_id)?,
            };
            let terms = match &new_terms {
                Some(terms) => terms.clone(),
                None => tx.terms(parent_id)?,
            };
            if items.is_empty() {
                return Err(abort(ValidationError::NoItems));
            }

            let mut document = parent.clone();
            document.id = new_id.clone();
            document.status = parent.kind.initial_status().to_string();
            document.approved_by = None;
            document.approved_at = None;
            document.rejection_reason = None;
            document.remarks = None;
            document.created_by = actor.to_string();
            document.created_at = today.clone();
            document.updated_at = today.clone();
            patch.apply_header(&mut document);
            if patch.valid_until.is_none() {
                document.valid_until = validity_window(&today, document.validity_days)?;
            }
            if patch.currency.is_some() && patch.exchange_rate.is_none() {
                document.exchange_rate = self.exchange_rate_for(document.currency);
            }
            document.totals = Totals::compute(&items, &document.charges, self.config.tax_rate())?;
            document.validate_header(&today)?;

            let document = self.chains.chain_in(tx, parent_id, document)?;
            tx.put_line_items(&document.id, &items)?;
            tx.put_terms(&document.id, &terms)?;
            self.snapshots.create_in(
                tx,
                &document.id,
                &document,
                &items,
                &terms,
                change_reason,
                actor,
            )?;
            self.audit.record_in(
                tx,
                document.kind,
                &document.id,
                AuditAction::Create,
                Some(parent.to_value()),
                Some(document.to_value()),
                actor,
            )?;
            Ok(document)
        })?;

        tracing::info!(
            document_id = %document.id,
            parent_id,
            version_number = document.version_number,
            actor = %actor,
            "revision created as new document"
        );
        Ok(document)
    }

    /// Header with the requested version's items and terms, current version when `None`
    pub fn fetch(&self, id: &str, version_number: Option<u32>) -> Result<DocumentView> {
        let document = self.store.require_document(id)?;
        let snapshot = self.snapshots.get_snapshot(id, version_number)?;
        let versions = self.snapshots.list_summaries(id)?;
        let chain = self.chains.history(&document.document_number)?;

        Ok(DocumentView {
            document,
            version_number: snapshot.version_number,
            version_label: version_label(snapshot.version_number),
            items: snapshot.items,
            terms: snapshot.terms,
            versions,
            chain,
        })
    }

    pub fn compare(&self, id: &str, from: u32, to: u32) -> Result<VersionComparison> {
        self.store.require_document(id)?;
        self.snapshots.compare(id, from, to)
    }

    /// Chain members sharing `document_number`, newest first
    pub fn history(&self, document_number: &str) -> Result<Vec<Document>> {
        self.chains.history(document_number)
    }

    pub fn audit_trail(&self, kind: EntityKind, id: &str) -> Result<Vec<AuditEvent>> {
        self.audit.events_for(kind, id)
    }

    /// Expire approved or sent quotations whose validity ended before `today`.
    ///
    /// Only the latest member of a chain is considered. Documents the table
    /// does not let expire, or that moved on concurrently, are skipped.
    pub fn expire_overdue(&self, actor: &ActorId, today: &TimeStamp<Utc>) -> Result<Vec<Document>> {
        let cutoff = today.start_of_day();
        let mut candidates = vec![];
        for document in self.store.documents() {
            let document = document?;
            if document.kind == EntityKind::Quotation
                && document.is_latest_version
                && matches!(document.status.as_str(), status::APPROVED | status::SENT)
                && document.valid_until.start_of_day() < cutoff
            {
                candidates.push(document);
            }
        }

        let mut expired = vec![];
        for document in candidates {
            if !self
                .validator
                .is_allowed(document.kind, &document.status, status::EXPIRED)
            {
                tracing::warn!(
                    document_id = %document.id,
                    status = %document.status,
                    "expiry not permitted from current status, skipping"
                );
                continue;
            }

            match self.change_status(actor, &document.id, status::EXPIRED, |_| {}) {
                Ok(document) => expired.push(document),
                Err(WorkflowError::Transition { current, .. }) => {
                    tracing::warn!(document_id = %document.id, %current, "status moved on, skipping expiry");
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(count = expired.len(), "overdue quotations expired");
        Ok(expired)
    }
}
