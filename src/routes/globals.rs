use chrono::{DateTime, Utc};
use db::{
    models::{Course, CourseLevel, CourseStatus, Material, User},
    Database, DbError,
};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;

pub type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

#[derive(Serialize)]
pub struct FailureResponse {
    success: bool,
    code: ErrorCode,
    error: String,
}

impl FailureResponse {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            error: error.into(),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub enum ErrorCode {
    InvalidCredentials,
    Unauthenticated,
    InsufficientAuthorization,
    MalformedData,
    MissingFields,
    EmailTaken,
    InvalidRole,
    RoleAlreadySelected,
    NotAStudent,
    UserNotFound,
    CourseNotFound,
    CourseNotAvailable,
    AlreadyEnrolled,
    EnrollmentNotFound,
    CourseMismatch,
    MaterialNotFound,
    MaterialAlreadyCompleted,
    IllegalStatus,
    IllegalRequest,
    InvalidID,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    InternalServerError,
}

/// JSON failure body with the given status.
pub fn failure(code: ErrorCode, error: impl Into<String>, status: StatusCode) -> JsonReply {
    warp::reply::with_status(
        warp::reply::json(&FailureResponse::new(code, error)),
        status,
    )
}

pub fn success<T: Serialize>(body: &T) -> JsonReply {
    warp::reply::with_status(warp::reply::json(body), StatusCode::OK)
}

/// Converts a store error into a response. Storage failures are logged and only `context` is
/// shown to the caller.
pub fn db_failure(err: DbError, context: &str) -> JsonReply {
    use DbError::*;

    if err.is_storage() {
        return internal_error(context, err);
    }

    let (code, status) = match &err {
        EmailTaken => (ErrorCode::EmailTaken, StatusCode::BAD_REQUEST),
        UserNotFound => (ErrorCode::UserNotFound, StatusCode::NOT_FOUND),
        RoleAlreadySelected => (ErrorCode::RoleAlreadySelected, StatusCode::BAD_REQUEST),
        NotAStudent => (ErrorCode::NotAStudent, StatusCode::BAD_REQUEST),
        CourseNotFound => (ErrorCode::CourseNotFound, StatusCode::NOT_FOUND),
        CourseNotAvailable => (ErrorCode::CourseNotAvailable, StatusCode::BAD_REQUEST),
        AlreadyEnrolled => (ErrorCode::AlreadyEnrolled, StatusCode::BAD_REQUEST),
        EnrollmentNotFound => (ErrorCode::EnrollmentNotFound, StatusCode::NOT_FOUND),
        CourseMismatch => (ErrorCode::CourseMismatch, StatusCode::BAD_REQUEST),
        MaterialNotFound => (ErrorCode::MaterialNotFound, StatusCode::NOT_FOUND),
        MaterialAlreadyCompleted => (ErrorCode::MaterialAlreadyCompleted, StatusCode::BAD_REQUEST),
        Io(_) | Json(_) => (ErrorCode::InternalServerError, StatusCode::INTERNAL_SERVER_ERROR),
    };

    failure(code, err.to_string(), status)
}

/// Logs an unexpected failure and answers with a generic message.
pub fn internal_error(context: &str, err: impl std::fmt::Display) -> JsonReply {
    log::error!("{}: {}", context, err);
    failure(
        ErrorCode::InternalServerError,
        context,
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

#[derive(Serialize)]
pub struct SimpleSuccessResponse {
    success: bool,
    message: &'static str,
}

impl SimpleSuccessResponse {
    pub fn new(message: &'static str) -> Self {
        Self {
            success: true,
            message,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct PaginatedQueryableListRequest {
    pub query: Option<String>,
    pub page: Option<usize>,
}

impl PaginatedQueryableListRequest {
    /// Checks that the page number is valid, and if its not it returns 1
    pub fn normalized_page_number(&self) -> usize {
        self.page
            .map(|v| if v >= 1 { v } else { 1 })
            .unwrap_or(1usize)
    }
}

/// Returns the trimmed value, or `None` if it is missing or blank.
pub fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse<'a> {
    pub id: u32,
    pub name: &'a str,
    pub email: &'a str,
    pub role: &'static str,
}

impl<'a> From<&'a User> for UserResponse<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            id: user.id,
            name: &user.name,
            email: &user.email,
            role: user.role.name(),
        }
    }
}

#[derive(Serialize)]
pub struct PersonResponse<'a> {
    pub id: u32,
    pub name: &'a str,
    pub email: &'a str,
}

impl<'a> From<&'a User> for PersonResponse<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            id: user.id,
            name: &user.name,
            email: &user.email,
        }
    }
}

/// Course as shown in listings, with its instructor and roster size resolved.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary<'a> {
    pub id: u32,
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub level: CourseLevel,
    pub status: CourseStatus,
    pub price: f64,
    pub thumbnail: Option<&'a str>,
    pub instructor: Option<PersonResponse<'a>>,
    pub students_enrolled: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> CourseSummary<'a> {
    pub fn new<D: Database>(db: &'a D, course: &'a Course) -> Self {
        Self {
            id: course.id,
            title: &course.title,
            description: &course.description,
            category: &course.category,
            level: course.level,
            status: course.status,
            price: course.price,
            thumbnail: course.thumbnail.as_deref(),
            instructor: db.user_get(course.instructor_id).map(PersonResponse::from),
            students_enrolled: db.course_students(course.id).len(),
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

/// Course with its materials.
#[derive(Serialize)]
pub struct CourseDetail<'a> {
    #[serde(flatten)]
    pub summary: CourseSummary<'a>,
    pub materials: &'a [Material],
}

impl<'a> CourseDetail<'a> {
    pub fn new<D: Database>(db: &'a D, course: &'a Course) -> Self {
        Self {
            summary: CourseSummary::new(db, course),
            materials: &course.materials,
        }
    }
}
