use super::cookie::*;
use super::error::*;
use crate::application_port::*;
use crate::domain_model::Identity;
use crate::server::CookiePolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::http::header::SET_COOKIE;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Rejection, Reply};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

fn with_session_cookies(
    reply: impl Reply,
    tokens: &AuthTokens,
    policy: &CookiePolicy,
) -> Result<Response, Rejection> {
    let access = token_cookie(
        policy,
        ACCESS_TOKEN_COOKIE,
        &tokens.access_token.0,
        policy.access_ttl,
    )
    .map_err(|e| rejection(ApiErrorCode::internal(e)))?;
    let refresh = token_cookie(
        policy,
        REFRESH_TOKEN_COOKIE,
        &tokens.refresh_token.0,
        policy.refresh_ttl,
    )
    .map_err(|e| rejection(ApiErrorCode::internal(e)))?;

    let mut response = reply.into_response();
    response.headers_mut().append(SET_COOKIE, access);
    response.headers_mut().append(SET_COOKIE, refresh);
    Ok(response)
}

fn without_session_cookies(reply: impl Reply, policy: &CookiePolicy) -> Result<Response, Rejection> {
    let mut response = reply.into_response();
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        let cookie = clear_cookie(policy, name).map_err(|e| rejection(ApiErrorCode::internal(e)))?;
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    Ok(response)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn healthcheck() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(HealthResponse { status: "OK" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn register(
    body: RegisterRequest,
    session_service: Arc<dyn SessionService>,
) -> Result<impl Reply, Rejection> {
    let register_input = RegisterInput {
        full_name: body.full_name,
        email: body.email,
        username: body.username,
        password: body.password,
    };
    let identity = session_service
        .register(register_input)
        .await
        .map_err(rejection)?;

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::ok(identity)),
        StatusCode::CREATED,
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub identity: Identity,
    #[serde(flatten)]
    pub tokens: AuthTokens,
}

pub async fn login(
    body: LoginRequest,
    session_service: Arc<dyn SessionService>,
    cookie_policy: Arc<CookiePolicy>,
) -> Result<Response, Rejection> {
    let login_input = LoginInput {
        username: body.username,
        email: body.email,
        password: body.password,
    };
    let login_result = session_service
        .login(login_input)
        .await
        .map_err(rejection)?;

    let login_response = LoginResponse {
        identity: login_result.identity,
        tokens: login_result.tokens,
    };
    let reply = warp::reply::json(&ApiResponse::ok(&login_response));
    with_session_cookies(reply, &login_response.tokens, &cookie_policy)
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse;

pub async fn logout(
    identity: Identity,
    session_service: Arc<dyn SessionService>,
    cookie_policy: Arc<CookiePolicy>,
) -> Result<Response, Rejection> {
    session_service
        .logout(identity.id)
        .await
        .map_err(rejection)?;

    let reply = warp::reply::json(&ApiResponse::ok(LogoutResponse));
    without_session_cookies(reply, &cookie_policy)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

pub async fn refresh_token(
    cookie: Option<String>,
    body: Bytes,
    session_service: Arc<dyn SessionService>,
    cookie_policy: Arc<CookiePolicy>,
) -> Result<Response, Rejection> {
    // the cookie wins; a JSON body is only consulted without one
    let presented = cookie.filter(|c| !c.is_empty()).or_else(|| {
        serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|request| request.refresh_token)
    });

    let tokens = session_service
        .refresh(presented.as_deref())
        .await
        .map_err(rejection)?;

    let reply = warp::reply::json(&ApiResponse::ok(&tokens));
    with_session_cookies(reply, &tokens, &cookie_policy)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordResponse;

pub async fn change_password(
    identity: Identity,
    body: ChangePasswordRequest,
    session_service: Arc<dyn SessionService>,
) -> Result<impl Reply, Rejection> {
    session_service
        .change_password(identity.id, &body.old_password, &body.new_password)
        .await
        .map_err(|e| match e {
            AuthError::Unauthorized(UnauthorizedReason::InvalidPassword) => {
                ApiRejection::new(ApiErrorCode::InvalidRequest, "Invalid old password")
            }
            other => ApiRejection::from(other),
        })
        .map_err(rejection)?;

    Ok(warp::reply::json(&ApiResponse::ok(ChangePasswordResponse)))
}

pub async fn me(identity: Identity) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(identity)))
}
