use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

use crate::fetcher::FetchError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    /// The standings listing could not be fetched. Aborts the whole run.
    #[error("League listing failed: {0}")]
    Listing(FetchError),

    /// Player and gameweek master data could not be fetched. Also fatal.
    #[error("Master data fetch failed: {0}")]
    MasterData(FetchError),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
