use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{
    db_failure, failure, success, CourseSummary, ErrorCode, PaginatedQueryableListRequest,
    PersonResponse, SimpleSuccessResponse, UserResponse,
};
use db::{
    models::{CourseStatus, Role},
    Database, Db,
};
use filters::{authed_is_of_kind, with_db, PossibleUserKind};

const ADMINISTRATOR: &[PossibleUserKind] = &[PossibleUserKind::Administrator];

pub fn routes(db: &Db) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let courses_route = warp::path!("api" / "admin" / "courses")
        .and(warp::get())
        .and(authed_is_of_kind(db, ADMINISTRATOR))
        .and(with_db(db.clone()))
        .and_then(courses)
        .boxed();

    let course_status_route = warp::path!("api" / "admin" / "courses" / u32 / "status")
        .and(warp::put())
        .and(authed_is_of_kind(db, ADMINISTRATOR))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and_then(course_status)
        .boxed();

    let course_delete_route = warp::path!("api" / "admin" / "courses" / u32)
        .and(warp::delete())
        .and(authed_is_of_kind(db, ADMINISTRATOR))
        .and(with_db(db.clone()))
        .and_then(course_delete)
        .boxed();

    let users_route = warp::path!("api" / "admin" / "users")
        .and(warp::get())
        .and(authed_is_of_kind(db, ADMINISTRATOR))
        .and(warp::query::<PaginatedQueryableListRequest>())
        .and(with_db(db.clone()))
        .and_then(users)
        .boxed();

    let users_delete_route = warp::path!("api" / "admin" / "users")
        .and(warp::delete())
        .and(authed_is_of_kind(db, ADMINISTRATOR))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and_then(users_delete)
        .boxed();

    let stats_route = warp::path!("api" / "admin" / "stats")
        .and(warp::get())
        .and(authed_is_of_kind(db, ADMINISTRATOR))
        .and(with_db(db.clone()))
        .and_then(stats)
        .boxed();

    courses_route
        .or(course_status_route)
        .or(course_delete_route)
        .or(users_route)
        .or(users_delete_route)
        .or(stats_route)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseStats {
    total_courses: usize,
    pending_courses: usize,
    approved_courses: usize,
    rejected_courses: usize,
    reported_courses: usize,
    total_enrollments: usize,
}

#[derive(Serialize)]
struct CoursesResponse<'a> {
    success: bool,
    courses: Vec<CourseSummary<'a>>,
    stats: CourseStats,
    instructors: Vec<PersonResponse<'a>>,
}

async fn courses(_admin_id: u32, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let courses = db.course_all();
    let count = |status: CourseStatus| courses.iter().filter(|c| c.status == status).count();

    let stats = CourseStats {
        total_courses: courses.len(),
        pending_courses: count(CourseStatus::Pending),
        approved_courses: count(CourseStatus::Approved),
        rejected_courses: count(CourseStatus::Rejected),
        reported_courses: count(CourseStatus::Reported),
        total_enrollments: db.enrollment_count(),
    };

    let instructors = db
        .user_all()
        .into_iter()
        .filter(|u| matches!(u.role, Role::Instructor(_)))
        .map(PersonResponse::from)
        .collect();

    Ok(success(&CoursesResponse {
        success: true,
        courses: courses
            .into_iter()
            .map(|c| CourseSummary::new(&*db, c))
            .collect(),
        stats,
        instructors,
    }))
}

#[derive(Deserialize)]
struct StatusRequest {
    status: Option<CourseStatus>,
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    success: bool,
    message: &'static str,
    course: CourseSummary<'a>,
}

async fn course_status(
    course_id: u32,
    _admin_id: u32,
    request: StatusRequest,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let status = match request.status {
        Some(status) => status,
        None => {
            return Ok(failure(
                ErrorCode::MissingFields,
                "Status is required",
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let mut db = db.lock().await;

    if let Err(err) = db.course_set_status(course_id, status) {
        return Ok(db_failure(err, "Error updating course status"));
    }

    log::info!("Course {} moderated to {:?}", course_id, status);

    let message = match status {
        CourseStatus::Approved => "Course approved successfully",
        CourseStatus::Rejected => "Course rejected successfully",
        CourseStatus::Draft | CourseStatus::Pending | CourseStatus::Reported => {
            "Course updated successfully"
        }
    };

    match db.course_get(course_id) {
        Some(course) => Ok(success(&StatusResponse {
            success: true,
            message,
            course: CourseSummary::new(&*db, course),
        })),
        None => Ok(failure(
            ErrorCode::CourseNotFound,
            "Course not found",
            StatusCode::NOT_FOUND,
        )),
    }
}

async fn course_delete(
    course_id: u32,
    admin_id: u32,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let mut db = db.lock().await;

    match db.course_remove(course_id) {
        Ok(true) => {
            log::info!("Administrator {} deleted course {}", admin_id, course_id);
            Ok(success(&SimpleSuccessResponse::new(
                "Course deleted successfully",
            )))
        }
        Ok(false) => Ok(failure(
            ErrorCode::CourseNotFound,
            "Course not found",
            StatusCode::NOT_FOUND,
        )),
        Err(err) => Ok(db_failure(err, "Error deleting course")),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserStats {
    total_users: usize,
    students: usize,
    instructors: usize,
    admins: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminUserResponse<'a> {
    #[serde(flatten)]
    summary: UserResponse<'a>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct UsersResponse<'a> {
    success: bool,
    total: usize,
    users: Vec<AdminUserResponse<'a>>,
    stats: UserStats,
}

async fn users(
    _admin_id: u32,
    request: PaginatedQueryableListRequest,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let (total, users) = db.user_list(
        request.normalized_page_number(),
        request.query.as_deref(),
        |_| true,
    );

    let all = db.user_all();
    let count = |name: &str| all.iter().filter(|u| u.role.name() == name).count();

    let stats = UserStats {
        total_users: all.len(),
        students: count("student"),
        instructors: count("instructor"),
        admins: count("admin"),
    };

    Ok(success(&UsersResponse {
        success: true,
        total,
        users: users
            .into_iter()
            .map(|u| AdminUserResponse {
                summary: UserResponse::from(u),
                created_at: u.created_at,
            })
            .collect(),
        stats,
    }))
}

async fn users_delete(
    admin_id: u32,
    ids: Vec<u32>,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    if ids.contains(&admin_id) {
        return Ok(failure(
            ErrorCode::IllegalRequest,
            "You cannot delete your own account",
            StatusCode::BAD_REQUEST,
        ));
    }

    let mut db = db.lock().await;

    match db.user_remove(&ids) {
        Ok(true) => {
            log::info!("Administrator {} deleted users {:?}", admin_id, ids);
            Ok(success(&SimpleSuccessResponse::new(
                "Users deleted successfully",
            )))
        }
        Ok(false) => Ok(failure(
            ErrorCode::InvalidID,
            "Unknown user",
            StatusCode::NOT_FOUND,
        )),
        Err(err) => Ok(db_failure(err, "Error deleting users")),
    }
}

#[derive(Serialize)]
struct Activity {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    success: bool,
    total_users: usize,
    total_courses: usize,
    total_instructors: usize,
    pending_approvals: usize,
    total_enrollments: usize,
    recent_activities: Vec<Activity>,
}

async fn stats(_admin_id: u32, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let users = db.user_all();
    let courses = db.course_all();

    let mut pending: Vec<_> = courses
        .iter()
        .filter(|c| c.status == CourseStatus::Pending)
        .collect();
    pending.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    // Listings are newest first already
    let mut recent_activities: Vec<Activity> = pending
        .iter()
        .take(5)
        .map(|c| Activity {
            kind: "course_submission",
            message: format!("New course submitted: {}", c.title),
            timestamp: c.updated_at,
        })
        .chain(users.iter().take(3).map(|u| Activity {
            kind: "new_user",
            message: format!("New user registered: {}", u.name),
            timestamp: u.created_at,
        }))
        .collect();
    recent_activities.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent_activities.truncate(5);

    Ok(success(&StatsResponse {
        success: true,
        total_users: users.len(),
        total_courses: courses.len(),
        total_instructors: users
            .iter()
            .filter(|u| matches!(u.role, Role::Instructor(_)))
            .count(),
        pending_approvals: pending.len(),
        total_enrollments: db.enrollment_count(),
        recent_activities,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use db::{models::CourseStatus, Database};
    use serde_json::json;
    use warp::http::StatusCode;

    #[tokio::test]
    async fn moderation_opens_enrollment() {
        let db = empty_db();
        let root = admin(&db).await;
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (course_id, _) = course(&db, ines.id, CourseStatus::Pending, 1).await;

        let enroll = json!({ "courseId": course_id, "studentId": alice.id });

        let (status, _) = call(&db, "POST", "/api/enroll", Some(&alice.token), Some(enroll.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &db,
            "PUT",
            &format!("/api/admin/courses/{}/status", course_id),
            Some(&root.token),
            Some(json!({ "status": "approved" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Course approved successfully");

        let (status, _) = call(&db, "POST", "/api/enroll", Some(&alice.token), Some(enroll)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&db, "GET", "/api/admin/courses", Some(&root.token), None).await;
        assert_eq!(body["stats"]["approvedCourses"], 1);
        assert_eq!(body["stats"]["totalEnrollments"], 1);
        assert_eq!(body["instructors"][0]["email"], "ines@example.com");
    }

    #[tokio::test]
    async fn unknown_course_cannot_be_moderated() {
        let db = empty_db();
        let root = admin(&db).await;

        let (status, body) = call(
            &db,
            "PUT",
            "/api/admin/courses/42/status",
            Some(&root.token),
            Some(json!({ "status": "rejected" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Course not found");
    }

    #[tokio::test]
    async fn deleting_a_course_removes_its_enrollments() {
        let db = empty_db();
        let root = admin(&db).await;
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (course_id, _) = course(&db, ines.id, CourseStatus::Approved, 1).await;
        call(
            &db,
            "POST",
            "/api/enroll",
            Some(&alice.token),
            Some(json!({ "courseId": course_id, "studentId": alice.id })),
        )
        .await;

        let path = format!("/api/admin/courses/{}", course_id);
        let (status, _) = call(&db, "DELETE", &path, Some(&root.token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(db.lock().await.enrollment_count(), 0);

        let (status, _) = call(&db, "DELETE", &path, Some(&root.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn users_are_listed_and_removed() {
        let db = empty_db();
        let root = admin(&db).await;
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;

        let (status, body) = call(&db, "GET", "/api/admin/users?query=alice", Some(&root.token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["users"][0]["role"], "student");
        assert_eq!(
            body["stats"],
            json!({ "totalUsers": 3, "students": 1, "instructors": 1, "admins": 1 })
        );

        let (status, body) = call(&db, "DELETE", "/api/admin/users", Some(&root.token), Some(json!([root.id]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "IllegalRequest");

        let (status, _) = call(&db, "DELETE", "/api/admin/users", Some(&root.token), Some(json!([alice.id, 999]))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &db,
            "DELETE",
            "/api/admin/users",
            Some(&root.token),
            Some(json!([alice.id, ines.id])),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&db, "GET", "/api/profile", Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stats_summarize_the_platform() {
        let db = empty_db();
        let root = admin(&db).await;
        let ines = instructor(&db, "ines@example.com").await;
        student(&db, "alice@example.com").await;
        course(&db, ines.id, CourseStatus::Pending, 1).await;
        course(&db, ines.id, CourseStatus::Approved, 1).await;

        let (status, body) = call(&db, "GET", "/api/admin/stats", Some(&root.token), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalUsers"], 3);
        assert_eq!(body["totalCourses"], 2);
        assert_eq!(body["totalInstructors"], 1);
        assert_eq!(body["pendingApprovals"], 1);
        assert_eq!(body["totalEnrollments"], 0);

        let activities = body["recentActivities"].as_array().unwrap();
        assert_eq!(activities.len(), 4);
        assert!(activities
            .iter()
            .any(|a| a["type"] == "course_submission" && a["message"] == "New course submitted: Intro to Rust"));
    }
}
