use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let rejection = if let Some(rejection) = err.find::<ApiRejection>() {
        rejection.clone()
    } else if err.is_not_found() {
        ApiRejection::from(ApiErrorCode::RouteNotFound)
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        ApiRejection::new(ApiErrorCode::InvalidRequest, e.to_string())
    } else if err.find::<reject::UnsupportedMediaType>().is_some()
        || err.find::<reject::PayloadTooLarge>().is_some()
        || err.find::<reject::LengthRequired>().is_some()
    {
        ApiRejection::from(ApiErrorCode::InvalidRequest)
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ApiRejection::from(ApiErrorCode::MethodNotAllowed)
    } else {
        warn!("Unhandled rejection: {:?}", err);
        ApiRejection::from(ApiErrorCode::InternalError)
    };

    let status = rejection.code.status();
    let json = warp::reply::json(&ApiResponse::<()>::err(rejection.code, rejection.message));
    Ok(warp::reply::with_status(json, status))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Missing or invalid request field")]
    InvalidRequest,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("User does not exist")]
    UserNotFound,
    #[error("User with email or username already exists")]
    UserExists,
    #[error("Route not found")]
    RouteNotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiErrorCode::UserNotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::UserExists => StatusCode::CONFLICT,
            ApiErrorCode::RouteNotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A failed request as carried through warp's rejection chain: a stable code
/// plus a human readable message.
#[derive(Debug, Clone)]
pub struct ApiRejection {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiRejection {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl reject::Reject for ApiRejection {}

impl From<ApiErrorCode> for ApiRejection {
    fn from(code: ApiErrorCode) -> Self {
        Self::new(code, code.to_string())
    }
}

impl From<AuthError> for ApiRejection {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::BadRequest(message) => Self::new(ApiErrorCode::InvalidRequest, message),
            AuthError::Unauthorized(UnauthorizedReason::InvalidPassword) => {
                Self::from(ApiErrorCode::InvalidCredentials)
            }
            AuthError::Unauthorized(reason) => {
                Self::new(ApiErrorCode::InvalidToken, reason.to_string())
            }
            AuthError::UserNotFound => Self::from(ApiErrorCode::UserNotFound),
            AuthError::UserExists => Self::from(ApiErrorCode::UserExists),
            AuthError::Store(e) => Self::from(ApiErrorCode::internal(e)),
            AuthError::InternalError(e) => Self::from(ApiErrorCode::internal(e)),
        }
    }
}

pub fn rejection(error: impl Into<ApiRejection>) -> Rejection {
    reject::custom(error.into())
}
