use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::{ingest::IngestError, store::StoreError};

/// Failure of an HTTP route, rendered as a JSON body with a machine readable `error` tag.
#[derive(Debug)]
pub enum ApiError {
    Ingest {
        error: IngestError,
        expose_plaintext: bool,
    },
    Store(StoreError),
    NotFound,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl ApiError {
    fn status_and_body(self) -> (StatusCode, Value) {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "not_found" })),
            ApiError::Store(err) => {
                error!("Query failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "store_failed" }),
                )
            }
            ApiError::Ingest {
                error,
                expose_plaintext,
            } => {
                let stage = error.kind();
                match error {
                    IngestError::InputShape(msg) => (
                        StatusCode::BAD_REQUEST,
                        json!({ "error": "invalid payload", "stage": stage, "msg": msg }),
                    ),
                    IngestError::Decode(err) | IngestError::Decrypt(err) => (
                        StatusCode::BAD_REQUEST,
                        json!({ "error": "decrypt_failed", "stage": stage, "msg": err.to_string() }),
                    ),
                    IngestError::Parse(err) => {
                        let mut body =
                            json!({ "error": "json_parse", "stage": stage, "msg": err.message });
                        if expose_plaintext {
                            body["plain"] = Value::String(err.plain);
                        }
                        (StatusCode::BAD_REQUEST, body)
                    }
                    IngestError::Store(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "store_failed", "stage": stage }),
                    ),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}
