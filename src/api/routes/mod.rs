//! API route handlers

pub mod bet_lists;
pub mod program;
pub mod query;
pub mod selection;

use crate::error::Error;
use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a library error to its HTTP status and user-facing message
pub fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::DuplicateName(_) => StatusCode::CONFLICT,
        Error::InvalidImport(_) => StatusCode::BAD_REQUEST,
        Error::Http(_) | Error::Download { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    (status, Json(ErrorResponse { error: err.user_message() }))
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: message.into() }),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::api::{create_app, AppState};
    use crate::fixtures::ReferenceFixture;
    use crate::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    pub async fn app(fixture: &ReferenceFixture) -> (Router, AppState) {
        let mut state = AppState::with_stores(Config::default(), fixture.open().await, fixture.local_store().await);
        state.fixed_now = Some(fixture.now);
        (create_app(state.clone()), state)
    }

    pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}
