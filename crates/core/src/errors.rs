use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::recommendation::RecommendationError;
use crate::training::TrainingError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("malformed inventory item `{item_id}`: {reason}")]
    MalformedItemContext { item_id: String, reason: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("feature schema skew: {0}")]
    FeatureSkew(String),
    #[error("training failure: {0}")]
    Training(String),
    #[error("retrain job exceeded {timeout_secs}s; outcome unknown")]
    RetrainTimeout { timeout_secs: u64 },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "The request is missing valid credentials.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Unauthorized { .. } => "unauthorized",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::MalformedItemContext { .. })
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id,
            },
            ApplicationError::ModelUnavailable(message)
            | ApplicationError::FeatureSkew(message)
            | ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::RetrainTimeout { timeout_secs } => Self::ServiceUnavailable {
                message: format!("retrain still pending after {timeout_secs}s"),
                correlation_id,
            },
            ApplicationError::Training(message) | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}

impl From<RecommendationError> for ApplicationError {
    fn from(value: RecommendationError) -> Self {
        match value {
            RecommendationError::ModelUnavailable => {
                Self::ModelUnavailable("no trained classifier is loaded".to_owned())
            }
        }
    }
}

impl From<ArtifactError> for ApplicationError {
    fn from(value: ArtifactError) -> Self {
        match value {
            ArtifactError::Missing { .. } => Self::ModelUnavailable(value.to_string()),
            ArtifactError::FeatureSkew { .. } => Self::FeatureSkew(value.to_string()),
            ArtifactError::Read { .. }
            | ArtifactError::Write { .. }
            | ArtifactError::Corrupt { .. } => {
                Self::Persistence(value.to_string())
            }
        }
    }
}

impl From<TrainingError> for ApplicationError {
    fn from(value: TrainingError) -> Self {
        Self::Training(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::recommendation::RecommendationError;

    #[test]
    fn malformed_item_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::MalformedItemContext {
            item_id: "item_009".to_owned(),
            reason: "price is required".to_owned(),
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn model_unavailable_maps_to_service_unavailable() {
        let interface =
            ApplicationError::from(RecommendationError::ModelUnavailable).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.error_class(), "service_unavailable");
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn retrain_timeout_is_retryable_later() {
        let interface =
            ApplicationError::RetrainTimeout { timeout_secs: 30 }.into_interface("req-3");

        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable { ref message, .. } if message.contains("30s")
        ));
    }

    #[test]
    fn training_failure_maps_to_internal_with_safe_message() {
        let interface =
            ApplicationError::Training("fit diverged".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
        assert_eq!(interface.correlation_id(), "req-4");
    }
}
