//! Error taxonomy for workflow operations
use sled::transaction::ConflictableTransactionError;

/// Malformed or missing caller input. Always detected before any write.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("At least one item is required")]
    NoItems,
    #[error("Item {line}: quantity must be greater than 0")]
    NonPositiveQuantity { line: u32 },
    #[error("Item {line}: unit price must not be negative")]
    NegativePrice { line: u32 },
    #[error("Item {line}: discount must be between 0 and 100")]
    DiscountOutOfRange { line: u32 },
    #[error("Item {line}: amount is out of range")]
    AmountOutOfRange { line: u32 },
    #[error("Document totals are out of range")]
    TotalOutOfRange,
    #[error("Validity must be at most {max} days")]
    ValidityOutOfRange { max: u32 },
    #[error("Item {line}: a product or a description is required")]
    UnnamedItem { line: u32 },
    #[error("Term {order}: a standard clause or custom text is required")]
    EmptyTerm { order: u32 },
    #[error("{0} must not be negative")]
    NegativeCharge(&'static str),
    #[error("Total amount must be greater than 0")]
    NonPositiveTotal,
    #[error("Exchange rate must be greater than 0 for non-INR currencies")]
    InvalidExchangeRate,
    #[error("Valid until date must be today or in the future")]
    ValidUntilInPast,
    #[error("Domestic documents must be in INR")]
    DomesticCurrency,
    #[error("Remarks are mandatory to {0} a document")]
    MissingRemarks(&'static str),
    #[error("Change reason is mandatory for creating a new version")]
    MissingChangeReason,
    #[error("Cannot create a {kind} in status {status}")]
    InvalidInitialStatus { kind: String, status: String },
    #[error("Document {0} is revised through chained documents; revise is not permitted")]
    ChainedLineage(String),
    #[error("Document {0} is revised through version snapshots; chaining is not permitted")]
    SnapshotLineage(String),
    #[error("Invalid action: {0}")]
    UnknownAction(String),
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),
}

/// Failures of the underlying store or of the value codec.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode value: {0}")]
    Encode(String),
    #[error("failed to decode value: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("failed to generate identifier: {0}")]
    Identifier(String),
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Cannot move {kind} from status {current} to {target}")]
    Transition {
        kind: String,
        current: String,
        target: String,
    },
    #[error("Conflicting update: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Auth,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// HTTP status the caller-facing layer reports for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Transition { .. } => 400,
            Self::Auth => 401,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::Persistence(_) => 500,
        }
    }
}

impl From<sled::Error> for WorkflowError {
    fn from(value: sled::Error) -> Self {
        PersistenceError::Storage(value).into()
    }
}

impl From<minicbor::decode::Error> for WorkflowError {
    fn from(value: minicbor::decode::Error) -> Self {
        PersistenceError::Decode(value).into()
    }
}

impl From<WorkflowError> for ConflictableTransactionError<WorkflowError> {
    fn from(value: WorkflowError) -> Self {
        ConflictableTransactionError::Abort(value)
    }
}

impl From<ValidationError> for ConflictableTransactionError<WorkflowError> {
    fn from(value: ValidationError) -> Self {
        ConflictableTransactionError::Abort(value.into())
    }
}

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;
