use super::cookie::*;
use super::error::*;
use super::handler;
use crate::application_port::SessionService;
use crate::domain_model::Identity;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;
use warp::hyper::body::Bytes;

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let cookie_policy = Arc::new(server.cookie_policy.clone());

    let healthcheck = warp::path("healthcheck")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handler::healthcheck);

    let register = warp::path("users")
        .and(warp::path("register"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and_then(handler::register);

    let login = warp::path("users")
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and(with(cookie_policy.clone()))
        .and_then(handler::login);

    let logout = warp::path("users")
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_identity(server.session_service.clone()))
        .and(with(server.session_service.clone()))
        .and(with(cookie_policy.clone()))
        .and_then(handler::logout);

    let refresh_token = warp::path("users")
        .and(warp::path("refresh-token"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::cookie::optional(REFRESH_TOKEN_COOKIE))
        .and(optional_body())
        .and(with(server.session_service.clone()))
        .and(with(cookie_policy.clone()))
        .and_then(handler::refresh_token);

    let change_password = warp::path("users")
        .and(warp::path("change-password"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_identity(server.session_service.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and_then(handler::change_password);

    let me = warp::path("users")
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_identity(server.session_service.clone()))
        .and_then(handler::me);

    healthcheck
        .or(register)
        .or(login)
        .or(logout)
        .or(refresh_token)
        .or(change_password)
        .or(me)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// A bounded body that may also be absent entirely; a request without a
/// usable `content-length` reads as empty.
fn optional_body() -> impl Filter<Extract = (Bytes,), Error = Infallible> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES)
        .and(warp::body::bytes())
        .or(warp::any().map(Bytes::new))
        .unify()
}

/// Authorization gate: turns the `accessToken` cookie or a bearer header into
/// the caller's [`Identity`], or rejects with 401.
fn with_identity(
    session_service: Arc<dyn SessionService>,
) -> impl Filter<Extract = (Identity,), Error = warp::Rejection> + Clone {
    warp::cookie::optional(ACCESS_TOKEN_COOKIE)
        .and(warp::header::optional::<String>("authorization"))
        .and_then(move |cookie: Option<String>, authorization: Option<String>| {
            let session_service = session_service.clone();
            async move {
                let token = extract_access_token(cookie, authorization).unwrap_or_default();
                let identity = session_service
                    .authenticate(&token)
                    .await
                    .map_err(rejection)?;
                Ok::<_, warp::Rejection>(identity)
            }
        })
}
