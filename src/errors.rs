use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Store-level failures. `NotFound` is the only variant callers branch on;
/// everything else surfaces as a generic 500.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Map onto the HTTP taxonomy, naming the entity in the 404 message.
    /// Non-NotFound details stay in the server log.
    pub fn into_api(self, entity: &'static str) -> ApiError {
        match self {
            DbError::NotFound => ApiError::NotFound(entity),
            other => {
                log::error!("Database error: {other}");
                ApiError::Internal
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Token verification failed")]
    InvalidToken,
    #[error("Admin privileges required")]
    AdminRequired,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingToken => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken | ApiError::AdminRequired => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
