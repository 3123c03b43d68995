use db::Db;
use std::convert::Infallible;
use warp::Filter;

mod authed;

pub use authed::{
    authed, authed_is_of_kind, bearer_token, Forbidden, PossibleUserKind, Unauthenticated,
};

/// Hands a clone of the shared database to the handler
pub fn with_db(db: Db) -> impl Filter<Extract = (Db,), Error = Infallible> + Clone {
    warp::any().map(move || db.clone())
}
