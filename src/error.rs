use crate::access::{Action, Role};
use crate::approval::ApprovalStatus;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a contract requires a related estimate")]
    MissingEstimate,
    #[error("the related estimate must be approved before a contract can be created")]
    EstimateNotApproved,
    #[error("required field `{0}` is not set")]
    MissingField(&'static str),
    #[error("line item quantity must be greater than zero")]
    ZeroQuantity,
    #[error("line item subtotal overflows")]
    SubtotalOverflow,
    #[error("status cannot be set to Approved directly, use approve")]
    ApprovalBypassed,
    #[error("an approved document cannot be moved back to {0}")]
    ApprovalIsFinal(ApprovalStatus),
    #[error("snapshot value for `{field}` cannot be applied: {reason}")]
    SnapshotField { field: String, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("{entity_type} is already approved (status: {status})")]
    AlreadyApproved {
        entity_type: &'static str,
        status: ApprovalStatus,
    },
    // never says whether the id exists under another document
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },
    #[error("{action} is not permitted for {}", role_label(.role))]
    Forbidden { action: Action, role: Option<Role> },
    #[error("persistence failure: {0}")]
    Persistence(#[from] sled::Error),
    #[error("stored record could not be encoded or decoded: {0}")]
    Codec(String),
    #[error("identifier generation failed: {0}")]
    Identifier(String),
}

impl WorkflowError {
    /// Client errors are surfaced to the caller as-is, everything else is a server fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::AlreadyApproved { .. }
                | Self::NotFound { .. }
                | Self::Forbidden { .. }
        )
    }
}

impl From<minicbor::decode::Error> for WorkflowError {
    fn from(value: minicbor::decode::Error) -> Self {
        WorkflowError::Codec(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for WorkflowError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        WorkflowError::Codec(value.to_string())
    }
}

impl From<TransactionError<WorkflowError>> for WorkflowError {
    fn from(value: TransactionError<WorkflowError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => WorkflowError::Persistence(err),
        }
    }
}

/// Abort the enclosing sled transaction; nothing it staged is written.
pub(crate) fn abort<T>(err: impl Into<WorkflowError>) -> ConflictableTransactionResult<T, WorkflowError> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

fn role_label(role: &Option<Role>) -> &'static str {
    match role {
        Some(role) => role.as_str(),
        None => "an unauthenticated actor",
    }
}
