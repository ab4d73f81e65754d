use thiserror::Error;

/// Failures of domain operations. Each kind maps onto one HTTP status.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unsupported evaluation metric: {0}")]
    UnknownMetric(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RuntimeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        RuntimeError::NotFound(what.into())
    }

    pub fn bad_request(what: impl Into<String>) -> Self {
        RuntimeError::BadRequest(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        RuntimeError::Conflict(what.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            RuntimeError::NotFound(_) => 404,
            RuntimeError::BadRequest(_) | RuntimeError::UnknownMetric(_) => 400,
            RuntimeError::Conflict(_) => 409,
            RuntimeError::Database(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(RuntimeError::not_found("x").status_code(), 404);
        assert_eq!(RuntimeError::bad_request("x").status_code(), 400);
        assert_eq!(RuntimeError::conflict("x").status_code(), 409);
        assert_eq!(RuntimeError::UnknownMetric("bleu".into()).status_code(), 400);
        assert_eq!(RuntimeError::Database(sqlx::Error::RowNotFound).status_code(), 500);
    }

    #[test]
    fn unknown_metric_names_the_key() {
        let err = RuntimeError::UnknownMetric("bleu".into());
        assert_eq!(err.to_string(), "Unsupported evaluation metric: bleu");
    }
}
