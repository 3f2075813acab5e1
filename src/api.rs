//! Caller-facing surface with HTTP status semantics
use super::audit::{AuditEvent, AuditQuery};
use super::document::{Document, DocumentInput, DocumentPatch};
use super::error::{ValidationError, WorkflowError};
use super::service::{DocumentView, DocumentWorkflowService};
use super::snapshot::VersionComparison;
use super::types::ActorId;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub body: T,
}

impl<T> ApiResponse<T> {
    fn ok(body: T) -> Self {
        Self { status: 200, body }
    }
    fn created(body: T) -> Self {
        Self { status: 201, body }
    }
}

/// Status plus the message shown to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let status = err.status_code();
        let message = match &err {
            WorkflowError::Persistence(inner) => {
                tracing::error!(error = %inner, "persistence failure");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        WorkflowError::from(err).into()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    SubmitForApproval,
    Approve,
    Reject,
    Send,
}

impl FromStr for PatchAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit_for_approval" => Ok(PatchAction::SubmitForApproval),
            "approve" => Ok(PatchAction::Approve),
            "reject" => Ok(PatchAction::Reject),
            "send" => Ok(PatchAction::Send),
            other => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }
}

/// PATCH body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: String,
    pub remarks: Option<String>,
}

impl ActionRequest {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            remarks: None,
        }
    }
    pub fn with_remarks(mut self, remarks: &str) -> Self {
        self.remarks = Some(remarks.to_string());
        self
    }
}

/// PUT body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviseRequest {
    pub change_reason: Option<String>,
    pub expected_version: Option<u32>,
    pub updates: DocumentPatch,
}

fn authenticate(actor: Option<&str>) -> Result<ActorId, ApiError> {
    Ok(ActorId::new(actor.unwrap_or_default())?)
}

pub struct DocumentApi {
    service: Arc<DocumentWorkflowService>,
}

impl DocumentApi {
    pub fn new(service: Arc<DocumentWorkflowService>) -> Self {
        Self { service }
    }

    pub fn post(&self, actor: Option<&str>, input: DocumentInput) -> ApiResult<DocumentView> {
        let actor = authenticate(actor)?;
        let document = self.service.create(&actor, input)?;
        Ok(ApiResponse::created(self.service.fetch(&document.id, None)?))
    }

    pub fn get(
        &self,
        actor: Option<&str>,
        id: &str,
        version: Option<u32>,
    ) -> ApiResult<DocumentView> {
        authenticate(actor)?;
        Ok(ApiResponse::ok(self.service.fetch(id, version)?))
    }

    pub fn patch(&self, actor: Option<&str>, id: &str, request: &ActionRequest) -> ApiResult<Document> {
        let actor = authenticate(actor)?;
        let action: PatchAction = request.action.parse()?;
        let remarks = request.remarks.as_deref().unwrap_or_default();

        let document = match action {
            PatchAction::SubmitForApproval => self.service.submit_for_approval(&actor, id),
            PatchAction::Approve => self.service.approve(&actor, id, remarks),
            PatchAction::Reject => self.service.reject(&actor, id, remarks),
            PatchAction::Send => self.service.send(&actor, id),
        }?;
        Ok(ApiResponse::ok(document))
    }

    pub fn put(&self, actor: Option<&str>, id: &str, request: ReviseRequest) -> ApiResult<Document> {
        let actor = authenticate(actor)?;
        let change_reason = request.change_reason.as_deref().unwrap_or_default();

        let document = match request.expected_version {
            Some(expected) => {
                self.service
                    .revise_if_version(&actor, id, expected, change_reason, request.updates)
            }
            None => self.service.revise(&actor, id, change_reason, request.updates),
        }?;
        Ok(ApiResponse::ok(document))
    }

    pub fn post_revision(
        &self,
        actor: Option<&str>,
        parent_id: &str,
        change_reason: &str,
        updates: DocumentPatch,
    ) -> ApiResult<Document> {
        let actor = authenticate(actor)?;
        let document = self
            .service
            .create_revision_as_new_document(&actor, parent_id, change_reason, updates)?;
        Ok(ApiResponse::created(document))
    }

    pub fn compare(
        &self,
        actor: Option<&str>,
        id: &str,
        from: u32,
        to: u32,
    ) -> ApiResult<VersionComparison> {
        authenticate(actor)?;
        Ok(ApiResponse::ok(self.service.compare(id, from, to)?))
    }

    pub fn audit(&self, actor: Option<&str>, query: &AuditQuery) -> ApiResult<Vec<AuditEvent>> {
        authenticate(actor)?;
        Ok(ApiResponse::ok(self.service.audit().query(query)?))
    }
}
