//! Revision and approval workflow for steel trading documents.
//!
//! Quotations, orders, GRNs, dispatches and invoices move through a per-kind
//! status table, keep numbered immutable snapshots of every revision, may be
//! superseded by chained documents sharing one number, and leave an
//! append-only audit trail. Every workflow action commits as one sled
//! transaction.

pub mod api;
pub mod audit;
pub mod chain;
pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod sequence;
pub mod service;
pub mod snapshot;
pub mod storage;
pub mod transition;
pub mod types;
pub mod utils;
pub mod value;

pub use audit::{AuditAction, AuditEvent, AuditLogger, AuditQuery};
pub use chain::RevisionChainManager;
pub use config::WorkflowConfig;
pub use document::{
    Charges, Document, DocumentInput, DocumentPatch, LineItem, LineItemInput, RevisionPath, Term,
    TermInput,
};
pub use error::{PersistenceError, ValidationError, WorkflowError};
pub use service::{DocumentView, DocumentWorkflowService};
pub use snapshot::{VersionSnapshot, VersionSnapshotStore};
pub use storage::Store;
pub use transition::{StatusTransitionValidator, TransitionTable};
pub use types::{ActorId, Amount, Currency, EntityKind, MarketType, TimeStamp};
