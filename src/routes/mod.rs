use std::convert::Infallible;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use crate::config::ServerConfig;
use db::Db;
use filters::{Forbidden, Unauthenticated};

mod admin;
mod auth;
mod courses;
mod enroll;
mod globals;
mod instructor;
mod profile;
mod student;

pub use globals::{ErrorCode, FailureResponse};

pub fn routes(
    db: &Db,
    config: &ServerConfig,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    auth::routes(db, config.bcrypt_cost)
        .or(profile::routes(db))
        .or(courses::routes(db))
        .or(instructor::routes(db))
        .or(admin::routes(db))
        .or(student::routes(db))
        .or(enroll::routes(db))
}

/// Every route, with rejections turned into JSON failures.
pub fn api(
    db: &Db,
    config: &ServerConfig,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    routes(db, config).recover(handle_rejection)
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (error_code, status_code, message) = if err.is_not_found() {
        (ErrorCode::NotFound, StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<Unauthenticated>().is_some() {
        (
            ErrorCode::Unauthenticated,
            StatusCode::UNAUTHORIZED,
            "Authentication required",
        )
    } else if err.find::<Forbidden>().is_some() {
        (
            ErrorCode::InsufficientAuthorization,
            StatusCode::FORBIDDEN,
            "Insufficient authorization",
        )
    } else if err.find::<warp::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
        || err.find::<warp::reject::MissingHeader>().is_some()
        || err.find::<warp::reject::UnsupportedMediaType>().is_some()
    {
        (
            ErrorCode::MalformedData,
            StatusCode::BAD_REQUEST,
            "Malformed request",
        )
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some()
        || err.find::<warp::reject::LengthRequired>().is_some()
    {
        (
            ErrorCode::PayloadTooLarge,
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large",
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            ErrorCode::MethodNotAllowed,
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        )
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (
            ErrorCode::InternalServerError,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        )
    };

    let json = warp::reply::json(&FailureResponse::new(error_code, message));
    Ok(warp::reply::with_status(json, status_code))
}
