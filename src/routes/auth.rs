use serde::{Deserialize, Serialize};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{
    db_failure, failure, internal_error, required, success, ErrorCode, JsonReply,
    SimpleSuccessResponse, UserResponse,
};
use db::{
    models::{InstructorProfile, Role, StudentProfile, User},
    Database, Db, NewUser, SelectedRole,
};
use filters::{bearer_token, with_db};

pub fn routes(
    db: &Db,
    bcrypt_cost: u32,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let signup_route = warp::path!("api" / "signup")
        .and(warp::post())
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and(warp::any().map(move || bcrypt_cost))
        .and_then(signup)
        .boxed();

    let post_session_route = warp::path!("api" / "session")
        .and(warp::post())
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and_then(post_session)
        .boxed();

    let delete_session_route = warp::path!("api" / "session")
        .and(warp::delete())
        .and(warp::header::optional::<String>("Authorization"))
        .and(with_db(db.clone()))
        .and_then(delete_session)
        .boxed();

    signup_route
        .or(post_session_route)
        .or(delete_session_route)
}

/// Either a single value or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
pub(super) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        let values = match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        };

        values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }
}

pub(super) struct InvalidRole;

/// Parses a role picked by the user. `admin` can never be picked.
pub(super) fn parse_role(
    role: &str,
    education_level: Option<String>,
    expertise_area: Option<OneOrMany>,
) -> Result<SelectedRole, InvalidRole> {
    match role {
        "student" => Ok(SelectedRole::Student(StudentProfile {
            education_level: required(education_level),
        })),
        "instructor" => Ok(SelectedRole::Instructor(InstructorProfile {
            expertise_areas: expertise_area.map(OneOrMany::into_vec).unwrap_or_default(),
        })),
        _ => Err(InvalidRole),
    }
}

/// Where the client should go next once signed in.
pub(super) fn redirect_for(role: &Role) -> &'static str {
    match role {
        Role::Unassigned => "/auth/select-role",
        Role::Instructor(_) => "/dashboard/instructor",
        Role::Administrator => "/dashboard/admin",
        Role::Student(_) => "/",
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupRequest {
    email: Option<String>,
    name: Option<String>,
    password: Option<String>,
    role: Option<String>,
    education_level: Option<String>,
    expertise_area: Option<OneOrMany>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse<'a> {
    success: bool,
    message: &'static str,
    token: &'a str,
    needs_role_selection: bool,
    redirect: &'static str,
    user: UserResponse<'a>,
}

impl<'a> SessionResponse<'a> {
    fn new(message: &'static str, token: &'a str, user: &'a User) -> Self {
        Self {
            success: true,
            message,
            token,
            needs_role_selection: user.role.is_unassigned(),
            redirect: redirect_for(&user.role),
            user: UserResponse::from(user),
        }
    }
}

async fn hash_password(password: String, cost: u32) -> Result<String, String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

async fn verify_password(password: String, hash: String) -> Result<bool, String> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

async fn signup(
    request: SignupRequest,
    db: Db,
    bcrypt_cost: u32,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (email, name, password) = match (
        required(request.email),
        required(request.name),
        request.password.filter(|p| !p.is_empty()),
    ) {
        (Some(email), Some(name), Some(password)) => (email, name, password),
        _ => {
            return Ok(failure(
                ErrorCode::MissingFields,
                "Missing required fields: email, password, and name are required",
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    // A missing role defers the choice to role selection
    let role = match required(request.role) {
        None => Role::Unassigned,
        Some(role) => {
            match parse_role(&role, request.education_level, request.expertise_area) {
                Ok(role) => role.into(),
                Err(InvalidRole) => {
                    return Ok(failure(
                        ErrorCode::InvalidRole,
                        "Invalid role",
                        StatusCode::BAD_REQUEST,
                    ))
                }
            }
        }
    };

    let password_hash = match hash_password(password, bcrypt_cost).await {
        Ok(hash) => hash,
        Err(err) => return Ok(internal_error("Error registering user", err)),
    };

    let mut db = db.lock().await;

    let user_id = match db.user_add(NewUser {
        email,
        name,
        password_hash: Some(password_hash),
        role,
    }) {
        Ok(user) => user.id,
        Err(err) => return Ok(db_failure(err, "Error registering user")),
    };

    let token = match db.auth_login(user_id) {
        Ok(token) => token,
        Err(err) => return Ok(db_failure(err, "Error registering user")),
    };

    let user = match db.user_get(user_id) {
        Some(user) => user,
        None => return Ok(internal_error("Error registering user", "user vanished")),
    };

    log::info!("New user {} ({})", user.email, user.role.name());

    Ok(warp::reply::with_status(
        warp::reply::json(&SessionResponse::new(
            "User registered successfully",
            &token,
            user,
        )),
        StatusCode::CREATED,
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

fn invalid_credentials() -> JsonReply {
    failure(
        ErrorCode::InvalidCredentials,
        "Invalid email or password",
        StatusCode::UNAUTHORIZED,
    )
}

async fn post_session(request: LoginRequest, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let (email, password) = match (required(request.email), request.password) {
        (Some(email), Some(password)) if !password.is_empty() => (email, password),
        _ => {
            return Ok(failure(
                ErrorCode::MissingFields,
                "Missing email or password",
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    // Release the database while bcrypt runs
    let candidate = {
        let db = db.lock().await;
        db.user_get_by_email(&email)
            .and_then(|u| u.password_hash.clone().map(|hash| (u.id, hash)))
    };

    let (user_id, hash) = match candidate {
        Some(candidate) => candidate,
        None => return Ok(invalid_credentials()),
    };

    match verify_password(password, hash).await {
        Ok(true) => {}
        Ok(false) => return Ok(invalid_credentials()),
        Err(err) => return Ok(internal_error("Error signing in", err)),
    }

    let mut db = db.lock().await;

    let token = match db.auth_login(user_id) {
        Ok(token) => token,
        Err(err) => return Ok(db_failure(err, "Error signing in")),
    };

    match db.user_get(user_id) {
        Some(user) => Ok(success(&SessionResponse::new(
            "Sign-in successful",
            &token,
            user,
        ))),
        None => Ok(invalid_credentials()),
    }
}

async fn delete_session(
    authorization: Option<String>,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let token = match authorization.as_deref().and_then(bearer_token) {
        Some(token) => token,
        None => return Err(warp::reject::custom(filters::Unauthenticated)),
    };

    let mut db = db.lock().await;

    match db.auth_logout(token) {
        Ok(true) => Ok(success(&SimpleSuccessResponse::new("Signed out"))),
        Ok(false) => Err(warp::reject::custom(filters::Unauthenticated)),
        Err(err) => Ok(db_failure(err, "Error signing out")),
    }
}
