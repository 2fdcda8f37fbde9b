use axum::{
    Json,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileServerError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Path is outside root directory")]
    PathTraversal,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("Method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("Upload exceeds the size limit: {0}")]
    FileTooLarge(String),

    #[error("Failed to create directory: {0}")]
    CreateDirFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Embedded asset missing: {0}")]
    MissingAsset(String),
}

impl FileServerError {
    /// Status code and machine-readable code for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            FileServerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            FileServerError::PathTraversal => (StatusCode::FORBIDDEN, "PATH_TRAVERSAL"),
            FileServerError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "INVALID_PATH"),
            FileServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            FileServerError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            FileServerError::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "NOT_IMPLEMENTED"),
            FileServerError::MethodNotAllowed(_) => {
                (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED")
            }
            FileServerError::FileTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            FileServerError::CreateDirFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CREATE_DIR_FAILED")
            }
            FileServerError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            FileServerError::Template(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TEMPLATE_ERROR"),
            FileServerError::MissingAsset(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MISSING_ASSET")
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for FileServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}
