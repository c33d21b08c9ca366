use thiserror::Error;

#[derive(Debug, Error)]
pub enum IsmError {
    #[error("not initialized: run 'ism init'")]
    NotInitialized,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error(
        "version conflict on policy '{id}': expected seq_no {expected_seq_no} / primary_term {expected_primary_term}, found seq_no {actual_seq_no} / primary_term {actual_primary_term}"
    )]
    VersionConflict {
        id: String,
        expected_seq_no: u64,
        expected_primary_term: u64,
        actual_seq_no: u64,
        actual_primary_term: u64,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("index '{0}' has no resolvable policy")]
    Unresolvable(String),

    #[error("index '{0}' is not being managed")]
    NotManaged(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IsmError {
    pub fn policy_not_found(id: impl Into<String>) -> Self {
        IsmError::NotFound {
            kind: "policy",
            id: id.into(),
        }
    }

    pub fn index_not_found(id: impl Into<String>) -> Self {
        IsmError::NotFound {
            kind: "index",
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        IsmError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IsmError::NotFound { .. })
    }

    /// The message to report for a failed item, without the
    /// "validation failed" prefix.
    pub fn into_reason(self) -> String {
        match self {
            IsmError::Validation(msg) => msg,
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IsmError>;
