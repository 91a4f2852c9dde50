//! axum integration: error envelope responses and body extraction

use crate::api::{ErrorEnvelope, Validate};
use crate::{Error, ErrorKind};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::{error, warn};

/// Error returned from handlers, rendered as the JSON error envelope
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        status_for(self.0.kind())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::SessionNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.0.kind();

        if status.is_server_error() {
            error!(error_type = %kind, status_code = %status, error = %self.0, "API error");
        } else {
            warn!(error_type = %kind, status_code = %status, error = %self.0, "API request rejected");
        }

        (status, Json(ErrorEnvelope::from(&self.0))).into_response()
    }
}

/// JSON body that is validated on extraction.
///
/// Malformed JSON, missing fields and empty required fields all become
/// `INVALID_INPUT` with status 400.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| Error::invalid_input(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}
