//! Error types for the autoscaling alias registry

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("autoscaling config file not found: {0}")]
    ConfigMissing(String),

    #[error("autoscaling config file invalid: {0}")]
    ConfigInvalid(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("cloud provider error: {0}")]
    CloudError(String),

    #[error("instance already registered in group")]
    AlreadyRegistered,

    #[error("no empty slot available")]
    NoEmptySlot,

    #[error("instance is not registered")]
    NotRegistered,

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("autoscaling_group_name is required")]
    MissingGroupName,

    #[error("can't find autoscaling group name in config: {0}")]
    UnknownGroup(String),

    #[error("alias not found: {0}")]
    AliasNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status code per the bastion surface's outcome table.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingParameter(_) | Error::MissingGroupName => StatusCode::BAD_REQUEST,
            Error::UnknownGroup(_) | Error::AliasNotFound(_) => StatusCode::NOT_FOUND,
            Error::ConfigMissing(_)
            | Error::ConfigInvalid(_)
            | Error::StorageError(_)
            | Error::CloudError(_)
            | Error::AlreadyRegistered
            | Error::NoEmptySlot
            | Error::NotRegistered
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::StorageError(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<Error>> for Error {
    /// An aborted transaction carries the exact `Error` the closure raised
    /// (e.g. `AlreadyRegistered`) — preserve it rather than flattening every
    /// abort into `StorageError`, since the HTTP layer and callers match on
    /// the specific variant.
    fn from(err: sled::transaction::TransactionError<Error>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(inner) => {
                Error::StorageError(inner.to_string())
            },
        }
    }
}

/// JSON envelope returned by every bastion endpoint: `{status, message, ...}`.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
