use serde::Deserialize;
use thiserror::Error;

/// Error body shape the backend returns for rejected requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
}

#[derive(Debug, Clone, Error)]
#[error("invalid condition name '{0}'")]
pub struct InvalidConditionName(pub String);
