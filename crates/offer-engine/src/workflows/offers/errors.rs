use axum::http::StatusCode;

use super::integration::IntegrationError;
use super::store::StoreError;
use super::validation::ValidationError;

/// Error raised by the offer transaction engine.
#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("invalid rubric: {0}")]
    InvalidRubric(String),
    #[error("authorization incomplete; missing consent: {}", .missing.join(", "))]
    IncompleteAuthorization { missing: Vec<&'static str> },
    #[error("e-signature requires a typed legal name")]
    MissingSignature,
    #[error("offer {offer_id} was modified concurrently")]
    ConcurrentModification { offer_id: String },
    /// Kept for the error taxonomy. Contract push failures are recorded on the
    /// push and reported through the receipt, so the engine never raises this.
    #[error(transparent)]
    IntegrationFailure(#[from] IntegrationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OfferError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Machine-readable taxonomy label.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::InvalidRubric(_) => "invalid_rubric",
            Self::IncompleteAuthorization { .. } => "incomplete_authorization",
            Self::MissingSignature => "missing_signature",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::IntegrationFailure(_) => "integration_failure",
            Self::Validation(_) => "validation",
            Self::Store(_) => "store",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) | Self::ConcurrentModification { .. } => {
                StatusCode::CONFLICT
            }
            Self::InvalidRubric(_) | Self::Validation(_) | Self::MissingSignature => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::IncompleteAuthorization { .. } => StatusCode::FORBIDDEN,
            Self::IntegrationFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller errors are surfaced as-is and logged quietly; everything else is
    /// reported as an engine fault.
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::InvalidTransition(_)
                | Self::InvalidRubric(_)
                | Self::IncompleteAuthorization { .. }
                | Self::MissingSignature
                | Self::Validation(_)
        )
    }
}
