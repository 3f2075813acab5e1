//! Status transition table and the validator gating every status change
use super::error::{ValidationError, WorkflowError};
use super::types::EntityKind;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub mod status {
    pub const DRAFT: &str = "draft";
    pub const PENDING_APPROVAL: &str = "pending_approval";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";
    pub const SENT: &str = "sent";
    pub const ACCEPTED: &str = "accepted";
    pub const EXPIRED: &str = "expired";
    pub const QUOTED: &str = "quoted";
}

type Edges = &'static [(&'static str, &'static [&'static str])];

const STANDARD: &[(EntityKind, Edges)] = &[
    (
        EntityKind::Enquiry,
        &[("open", &["quoted", "closed"]), ("quoted", &["closed"]), ("closed", &[])],
    ),
    (
        EntityKind::Quotation,
        &[
            ("draft", &["pending_approval"]),
            ("pending_approval", &["approved", "rejected"]),
            ("approved", &["sent"]),
            ("sent", &["accepted", "rejected", "expired"]),
            ("accepted", &[]),
            ("rejected", &[]),
            ("expired", &[]),
        ],
    ),
    (
        EntityKind::SalesOrder,
        &[
            ("draft", &["open", "cancelled"]),
            ("open", &["confirmed", "cancelled"]),
            ("confirmed", &["processing", "cancelled"]),
            (
                "processing",
                &[
                    "partial_dispatch",
                    "partially_dispatched",
                    "ready_for_dispatch",
                    "cancelled",
                ],
            ),
            ("ready_for_dispatch", &["dispatched", "cancelled"]),
            ("partial_dispatch", &["completed", "cancelled"]),
            ("partially_dispatched", &["completed", "cancelled"]),
            ("dispatched", &["completed"]),
            ("completed", &[]),
            ("cancelled", &[]),
        ],
    ),
    (
        EntityKind::PurchaseOrder,
        &[
            ("draft", &["approved"]),
            ("approved", &["sent"]),
            ("sent", &["partial_received", "received", "cancelled"]),
            ("partial_received", &["received", "cancelled"]),
            ("received", &["closed"]),
            ("closed", &[]),
            ("cancelled", &[]),
        ],
    ),
    (
        EntityKind::Grn,
        &[
            ("pending_inspection", &["inspected"]),
            ("inspected", &["completed"]),
            ("completed", &[]),
        ],
    ),
    (
        EntityKind::Dispatch,
        &[
            ("pending", &["dispatched"]),
            ("dispatched", &["delivered"]),
            ("delivered", &[]),
        ],
    ),
    (
        EntityKind::Invoice,
        &[
            ("draft", &["sent"]),
            ("sent", &["partial_paid", "paid", "overdue"]),
            ("partial_paid", &["paid", "overdue"]),
            ("paid", &[]),
            ("overdue", &["partial_paid", "paid"]),
        ],
    ),
];

/// Immutable entity -> status -> reachable statuses map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    kinds: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl TransitionTable {
    /// The built-in lifecycle of every document kind
    pub fn standard() -> Self {
        let kinds = STANDARD
            .iter()
            .map(|(kind, edges)| {
                let statuses = edges
                    .iter()
                    .map(|(from, to)| {
                        let targets = to.iter().map(|s| s.to_string()).collect();
                        (from.to_string(), targets)
                    })
                    .collect();
                (kind.as_str().to_string(), statuses)
            })
            .collect();

        Self { kinds }
    }

    /// Builds a table from configuration. Statuses only named as targets become terminal.
    pub fn from_map(
        map: &BTreeMap<String, BTreeMap<String, Vec<String>>>,
    ) -> Result<Self, ValidationError> {
        let mut kinds = BTreeMap::new();

        for (kind, edges) in map {
            let kind: EntityKind = kind.parse()?;
            let mut statuses: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

            for (from, targets) in edges {
                for target in targets {
                    statuses.entry(target.clone()).or_default();
                }
                statuses
                    .entry(from.clone())
                    .or_default()
                    .extend(targets.iter().cloned());
            }
            kinds.insert(kind.as_str().to_string(), statuses);
        }

        Ok(Self { kinds })
    }

    /// Statuses reachable in one step. Empty for terminal or unknown statuses.
    pub fn targets<'a>(&'a self, kind: &str, current: &str) -> impl Iterator<Item = &'a str> {
        self.kinds
            .get(kind)
            .and_then(|statuses| statuses.get(current))
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn statuses<'a>(&'a self, kind: &str) -> impl Iterator<Item = &'a str> {
        self.kinds
            .get(kind)
            .into_iter()
            .flat_map(|statuses| statuses.keys())
            .map(String::as_str)
    }

    pub fn is_terminal(&self, kind: &str, status: &str) -> bool {
        self.targets(kind, status).next().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct StatusTransitionValidator {
    table: Arc<TransitionTable>,
}

impl StatusTransitionValidator {
    pub fn new(table: TransitionTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Total over its inputs: anything not in the table is simply not allowed.
    pub fn is_allowed_by_name(&self, kind: &str, current: &str, target: &str) -> bool {
        self.table.targets(kind, current).any(|s| s == target)
    }

    pub fn is_allowed(&self, kind: EntityKind, current: &str, target: &str) -> bool {
        self.is_allowed_by_name(kind.as_str(), current, target)
    }

    /// `is_allowed` as a gate, naming the blocking status on refusal.
    pub fn check(&self, kind: EntityKind, current: &str, target: &str) -> Result<(), WorkflowError> {
        if self.is_allowed(kind, current, target) {
            return Ok(());
        }
        tracing::warn!(%kind, current, target, "status transition refused");
        Err(WorkflowError::Transition {
            kind: kind.to_string(),
            current: current.to_string(),
            target: target.to_string(),
        })
    }
}

impl Default for StatusTransitionValidator {
    fn default() -> Self {
        Self::new(TransitionTable::standard())
    }
}
