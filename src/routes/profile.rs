use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::{
    auth::{parse_role, redirect_for, InvalidRole, OneOrMany},
    globals::{db_failure, failure, success, CourseSummary, ErrorCode, UserResponse},
};
use db::{
    models::{Role, User},
    Database, Db,
};
use filters::{authed, with_db, Unauthenticated};

pub fn routes(db: &Db) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let get_profile_route = warp::path!("api" / "profile")
        .and(warp::get())
        .and(authed(db))
        .and(with_db(db.clone()))
        .and_then(get_profile)
        .boxed();

    let select_role_route = warp::path!("api" / "profile" / "role")
        .and(warp::put())
        .and(authed(db))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and_then(select_role)
        .boxed();

    get_profile_route.or(select_role_route)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse<'a> {
    #[serde(flatten)]
    summary: UserResponse<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    education_level: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expertise_areas: Option<&'a [String]>,
    created_at: DateTime<Utc>,
    enrolled_courses: Vec<CourseSummary<'a>>,
}

impl<'a> ProfileResponse<'a> {
    fn new<D: Database>(db: &'a D, user: &'a User) -> Self {
        let (education_level, expertise_areas) = match &user.role {
            Role::Student(profile) => (profile.education_level.as_deref(), None),
            Role::Instructor(profile) => (None, Some(profile.expertise_areas.as_slice())),
            Role::Unassigned | Role::Administrator => (None, None),
        };

        let enrolled_courses = db
            .enrollment_list_for_student(user.id)
            .into_iter()
            .filter_map(|e| db.course_get(e.course_id))
            .map(|c| CourseSummary::new(db, c))
            .collect();

        Self {
            summary: UserResponse::from(user),
            education_level,
            expertise_areas,
            created_at: user.created_at,
            enrolled_courses,
        }
    }
}

#[derive(Serialize)]
struct GetProfileResponse<'a> {
    success: bool,
    user: ProfileResponse<'a>,
}

async fn get_profile(user_id: u32, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let user = db
        .user_get(user_id)
        .ok_or_else(|| warp::reject::custom(Unauthenticated))?;

    Ok(success(&GetProfileResponse {
        success: true,
        user: ProfileResponse::new(&*db, user),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectRoleRequest {
    role: Option<String>,
    education_level: Option<String>,
    expertise_area: Option<OneOrMany>,
}

#[derive(Serialize)]
struct SelectRoleResponse<'a> {
    success: bool,
    message: &'static str,
    redirect: &'static str,
    user: UserResponse<'a>,
}

async fn select_role(
    user_id: u32,
    request: SelectRoleRequest,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let role = match parse_role(
        request.role.as_deref().unwrap_or("").trim(),
        request.education_level,
        request.expertise_area,
    ) {
        Ok(role) => role,
        Err(InvalidRole) => {
            return Ok(failure(
                ErrorCode::InvalidRole,
                "Invalid role",
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let mut db = db.lock().await;

    match db.user_select_role(user_id, role) {
        Ok(user) => {
            log::info!("User {} selected role {}", user.email, user.role.name());

            Ok(success(&SelectRoleResponse {
                success: true,
                message: "Role updated successfully",
                redirect: redirect_for(&user.role),
                user: UserResponse::from(user),
            }))
        }
        Err(err) => Ok(db_failure(err, "Error updating role")),
    }
}
