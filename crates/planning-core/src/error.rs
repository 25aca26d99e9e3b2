use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("malformed document {path}: {reason}")]
    MalformedDocument { path: String, reason: String },

    #[error("invalid status '{status}' for {type_name}; valid statuses: {}", .valid.join(", "))]
    InvalidStatus {
        status: String,
        type_name: String,
        valid: Vec<String>,
    },

    #[error("cannot edit {id} (status: {status}): {suggested_action}")]
    EditBlocked {
        id: String,
        status: String,
        suggested_action: String,
    },

    #[error("cannot archive {id}: status '{status}' is not an archive trigger (expected one of: {}); use --force to archive anyway", .triggers.join(", "))]
    NotArchivable {
        id: String,
        status: String,
        triggers: Vec<String>,
    },

    #[error("document number {number} for type '{type_key}' is already taken ({path})")]
    DuplicateNumber {
        type_key: String,
        number: u32,
        path: String,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("relationship inconsistency: {0}")]
    RelationshipInconsistency(String),

    #[error("unknown document type '{key}'; configured types: {}", .known.join(", "))]
    UnknownType { key: String, known: Vec<String> },

    #[error("invalid document id '{0}': it does not match any configured id format")]
    InvalidId(String),

    #[error("{0} is archived and read-only; append an addendum instead")]
    Archived(String),

    #[error("{id} is already superseded by {by}")]
    AlreadySuperseded { id: String, by: String },

    #[error("roadmap already exists: {0} (use --force to overwrite)")]
    RoadmapExists(String),

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid schema version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PlanningError {
    pub(crate) fn malformed(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        PlanningError::MalformedDocument {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanningError>;
