use crate::with_db;
use db::{models::Role, Database, Db};

use warp::{Filter, Rejection};

/// Filter that checks if the user is authenticated, and rejects the request if they aren't.
/// Extracts the id of the authenticated user.
pub fn authed(db: &Db) -> impl Filter<Extract = (u32,), Error = Rejection> + Clone {
    with_db(db.clone())
        .and(warp::header::optional::<String>("Authorization"))
        .and_then(guard)
}

#[derive(Eq, PartialEq, Debug)]
pub enum PossibleUserKind {
    Administrator,
    Instructor,
    Student,
    Unassigned,
}

/// Filter that checks if the user has one of the requested roles, and rejects the request if
/// they don't; also checks that the user is authenticated.
pub fn authed_is_of_kind(
    db: &Db,
    role: &'static [PossibleUserKind],
) -> impl Filter<Extract = (u32,), Error = Rejection> + Clone {
    with_db(db.clone())
        .and(authed(db))
        .map(move |db, user_id| (db, user_id, role))
        .untuple_one()
        .and_then(guard_kind)
}

/// Missing or invalid credentials
#[derive(Debug)]
pub struct Unauthenticated;

impl warp::reject::Reject for Unauthenticated {}

/// Authenticated, but with a role that may not use the route
#[derive(Debug)]
pub struct Forbidden;

impl warp::reject::Reject for Forbidden {}

/// Extracts the token of a `Bearer` authorization header.
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (auth_type, token) = {
        let mut parts = authorization.splitn(2, ' ');
        (parts.next().unwrap_or(""), parts.next().unwrap_or(""))
    };

    if auth_type.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

async fn guard(db: Db, authorization: Option<String>) -> Result<u32, Rejection> {
    let token = authorization
        .as_deref()
        .and_then(bearer_token)
        .ok_or_else(|| warp::reject::custom(Unauthenticated))?;

    let db = db.lock().await;

    match db.auth_get_user(token) {
        Some(user) => Ok(user.id),
        None => Err(warp::reject::custom(Unauthenticated)),
    }
}

async fn guard_kind(
    db: Db,
    user_id: u32,
    wanted_kind: &'static [PossibleUserKind],
) -> Result<u32, Rejection> {
    let db = db.lock().await;

    // The user may have been removed since the token was checked
    let user = db
        .user_get(user_id)
        .ok_or_else(|| warp::reject::custom(Unauthenticated))?;

    let kind = match user.role {
        Role::Administrator => PossibleUserKind::Administrator,
        Role::Instructor(_) => PossibleUserKind::Instructor,
        Role::Student(_) => PossibleUserKind::Student,
        Role::Unassigned => PossibleUserKind::Unassigned,
    };

    if wanted_kind.contains(&kind) {
        Ok(user_id)
    } else {
        Err(warp::reject::custom(Forbidden))
    }
}
