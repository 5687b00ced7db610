use service_core::error::AppError;
use std::fmt;
use thiserror::Error;

/// Entity kinds that can be reported as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
    Project,
    Domain,
    Role,
    Grant,
    Membership,
    Token,
    Trust,
    Service,
    Endpoint,
    Policy,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::Project => "project",
            EntityKind::Domain => "domain",
            EntityKind::Role => "role",
            EntityKind::Grant => "grant",
            EntityKind::Membership => "group membership",
            EntityKind::Token => "token",
            EntityKind::Trust => "trust",
            EntityKind::Service => "service",
            EntityKind::Endpoint => "endpoint",
            EntityKind::Policy => "policy",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Could not find {kind}: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Conflict occurred attempting to store {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("The action you have requested has not been implemented: {0}")]
    NotImplemented(String),

    #[error("An unexpected error prevented the request from being fulfilled: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn unexpected(message: impl fmt::Display) -> Self {
        ServiceError::Unexpected(anyhow::anyhow!("{}", message))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }

    /// True when this is a NotFound for the given kind.
    pub fn is_not_found_of(&self, expected: EntityKind) -> bool {
        matches!(self, ServiceError::NotFound { kind, .. } if *kind == expected)
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            e @ ServiceError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!(e.to_string())),
            ServiceError::Conflict(e) => AppError::Conflict(anyhow::anyhow!(e)),
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::NotImplemented(e) => AppError::NotImplemented(e),
            ServiceError::Unexpected(e) => AppError::InternalError(e),
        }
    }
}
