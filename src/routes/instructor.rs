use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{
    db_failure, failure, required, success, CourseDetail, ErrorCode, JsonReply,
    PersonResponse, SimpleSuccessResponse,
};
use db::{
    models::{CourseLevel, CourseStatus},
    CourseUpdate, Database, Db, JSONDatabase, MaterialInput, NewCourse,
};
use filters::{authed_is_of_kind, with_db, PossibleUserKind};

const INSTRUCTOR: &[PossibleUserKind] = &[PossibleUserKind::Instructor];

pub fn routes(db: &Db) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list_route = warp::path!("api" / "instructor" / "courses")
        .and(warp::get())
        .and(authed_is_of_kind(db, INSTRUCTOR))
        .and(with_db(db.clone()))
        .and_then(list)
        .boxed();

    let create_route = warp::path!("api" / "instructor" / "courses")
        .and(warp::post())
        .and(authed_is_of_kind(db, INSTRUCTOR))
        .and(warp::body::content_length_limit(1024 * 64).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and_then(create)
        .boxed();

    let update_route = warp::path!("api" / "instructor" / "courses" / u32)
        .and(warp::put())
        .and(authed_is_of_kind(db, INSTRUCTOR))
        .and(warp::body::content_length_limit(1024 * 64).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and_then(update)
        .boxed();

    let delete_route = warp::path!("api" / "instructor" / "courses" / u32)
        .and(warp::delete())
        .and(authed_is_of_kind(db, INSTRUCTOR))
        .and(with_db(db.clone()))
        .and_then(delete)
        .boxed();

    list_route
        .or(create_route)
        .or(update_route)
        .or(delete_route)
}

/// Instructors can save drafts and submit them for review, publishing is up to admins.
fn is_instructor_status(status: CourseStatus) -> bool {
    matches!(status, CourseStatus::Draft | CourseStatus::Pending)
}

fn illegal_status() -> JsonReply {
    failure(
        ErrorCode::IllegalStatus,
        "Instructors can only save a course as draft or submit it for review",
        StatusCode::BAD_REQUEST,
    )
}

fn negative_price() -> JsonReply {
    failure(
        ErrorCode::MalformedData,
        "Price cannot be negative",
        StatusCode::BAD_REQUEST,
    )
}

/// `None` keeps the current price. NaN is rejected along with negative values.
fn is_valid_price(price: Option<f64>) -> bool {
    price.map_or(true, |p| p >= 0.0)
}

fn course_not_found() -> JsonReply {
    failure(
        ErrorCode::CourseNotFound,
        "Course not found",
        StatusCode::NOT_FOUND,
    )
}

fn owns_course(db: &JSONDatabase, instructor_id: u32, course_id: u32) -> bool {
    db.course_get(course_id)
        .map(|c| c.instructor_id == instructor_id)
        .unwrap_or(false)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstructorStats {
    total_courses: usize,
    published_courses: usize,
    draft_courses: usize,
    pending_courses: usize,
    total_students: usize,
}

#[derive(Serialize)]
struct ListResponse<'a> {
    success: bool,
    courses: Vec<CourseDetail<'a>>,
    stats: InstructorStats,
    students: Vec<PersonResponse<'a>>,
}

async fn list(instructor_id: u32, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let courses: Vec<_> = db
        .course_all()
        .into_iter()
        .filter(|c| c.instructor_id == instructor_id)
        .collect();

    let count = |status: CourseStatus| courses.iter().filter(|c| c.status == status).count();

    // A student enrolled in several of the courses is listed once
    let mut total_students = 0;
    let mut students = BTreeMap::new();
    for course in &courses {
        let roster = db.course_students(course.id);
        total_students += roster.len();
        students.extend(roster.into_iter().map(|s| (s.id, s)));
    }

    let stats = InstructorStats {
        total_courses: courses.len(),
        published_courses: count(CourseStatus::Approved),
        draft_courses: count(CourseStatus::Draft),
        pending_courses: count(CourseStatus::Pending),
        total_students,
    };

    Ok(success(&ListResponse {
        success: true,
        courses: courses
            .into_iter()
            .map(|c| CourseDetail::new(&*db, c))
            .collect(),
        stats,
        students: students.into_values().map(PersonResponse::from).collect(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    level: Option<CourseLevel>,
    status: Option<CourseStatus>,
    price: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    materials: Vec<MaterialInput>,
}

#[derive(Serialize)]
struct CourseResponse<'a> {
    success: bool,
    message: &'static str,
    course: CourseDetail<'a>,
}

async fn create(
    instructor_id: u32,
    request: CreateRequest,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (title, description, category) = match (
        required(request.title),
        required(request.description),
        required(request.category),
    ) {
        (Some(title), Some(description), Some(category)) => (title, description, category),
        _ => {
            return Ok(failure(
                ErrorCode::MissingFields,
                "Title, description, and category are required",
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let status = request.status.unwrap_or_default();
    if !is_instructor_status(status) {
        return Ok(illegal_status());
    }

    if !is_valid_price(request.price) {
        return Ok(negative_price());
    }

    let mut db = db.lock().await;

    let course_id = match db.course_add(
        instructor_id,
        NewCourse {
            title,
            description,
            category,
            level: request.level.unwrap_or_default(),
            status,
            price: request.price.unwrap_or(0.0),
            thumbnail: request.thumbnail,
            materials: request.materials,
        },
    ) {
        Ok(course) => course.id,
        Err(err) => return Ok(db_failure(err, "Error creating course")),
    };

    match db.course_get(course_id) {
        Some(course) => Ok(warp::reply::with_status(
            warp::reply::json(&CourseResponse {
                success: true,
                message: "Course created successfully",
                course: CourseDetail::new(&*db, course),
            }),
            StatusCode::CREATED,
        )),
        None => Ok(course_not_found()),
    }
}

async fn update(
    course_id: u32,
    instructor_id: u32,
    request: CourseUpdate,
    db: Db,
) -> Result<warp::reply::Response, warp::Rejection> {
    if request.status.map_or(false, |s| !is_instructor_status(s)) {
        return Ok(illegal_status().into_response());
    }

    if !is_valid_price(request.price) {
        return Ok(negative_price().into_response());
    }

    // Blank values would clear fields that are required at creation
    let blank = |value: &Option<String>| value.as_deref().map_or(false, |v| v.trim().is_empty());
    if blank(&request.title) || blank(&request.description) || blank(&request.category) {
        return Ok(failure(
            ErrorCode::MissingFields,
            "Title, description, and category are required",
            StatusCode::BAD_REQUEST,
        )
        .into_response());
    }

    let mut db = db.lock().await;

    // Courses of other instructors are reported as missing
    if !owns_course(&db, instructor_id, course_id) {
        return Ok(course_not_found().into_response());
    }

    let status = match db.course_update(course_id, request) {
        Ok(status) => status,
        Err(err) => return Ok(db_failure(err, "Error updating course").into_response()),
    };

    match db.course_get(course_id) {
        Some(_) if status.found && !status.updated => {
            Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT).into_response())
        }
        Some(course) if status.found => Ok(success(&CourseResponse {
            success: true,
            message: "Course updated successfully",
            course: CourseDetail::new(&*db, course),
        })
        .into_response()),
        _ => Ok(course_not_found().into_response()),
    }
}

async fn delete(
    course_id: u32,
    instructor_id: u32,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let mut db = db.lock().await;

    if !owns_course(&db, instructor_id, course_id) {
        return Ok(course_not_found());
    }

    match db.course_remove(course_id) {
        Ok(true) => {
            log::info!("Instructor {} deleted course {}", instructor_id, course_id);
            Ok(success(&SimpleSuccessResponse::new(
                "Course deleted successfully",
            )))
        }
        Ok(false) => Ok(course_not_found()),
        Err(err) => Ok(db_failure(err, "Error deleting course")),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use db::{models::CourseStatus, Database};
    use serde_json::json;
    use warp::http::StatusCode;

    #[tokio::test]
    async fn courses_are_created_with_defaults() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;

        let (status, body) = call(
            &db,
            "POST",
            "/api/instructor/courses",
            Some(&ines.token),
            Some(json!({
                "title": "Async Rust",
                "description": "Futures and executors",
                "category": "Programming",
                "materials": [
                    { "type": "youtube", "url": "https://youtu.be/abc", "title": "Intro" },
                    { "type": "pdf", "url": "https://cdn.example.com/a.pdf", "title": "Notes" }
                ]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["course"]["level"], "beginner");
        assert_eq!(body["course"]["status"], "draft");
        let materials = body["course"]["materials"].as_array().unwrap();
        assert_eq!(materials.len(), 2);
        assert_ne!(materials[0]["id"], materials[1]["id"]);

        let (status, body) = call(
            &db,
            "POST",
            "/api/instructor/courses",
            Some(&ines.token),
            Some(json!({ "title": "Untitled" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title, description, and category are required");
    }

    #[tokio::test]
    async fn instructors_cannot_publish() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let (course_id, _) = course(&db, ines.id, CourseStatus::Draft, 1).await;

        let (status, body) = call(
            &db,
            "PUT",
            &format!("/api/instructor/courses/{}", course_id),
            Some(&ines.token),
            Some(json!({ "status": "approved" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "IllegalStatus");

        let (status, body) = call(
            &db,
            "PUT",
            &format!("/api/instructor/courses/{}", course_id),
            Some(&ines.token),
            Some(json!({ "status": "pending" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["course"]["status"], "pending");

        let (status, body) = call(
            &db,
            "PUT",
            &format!("/api/instructor/courses/{}", course_id),
            Some(&ines.token),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn prices_cannot_be_negative() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let (course_id, _) = course(&db, ines.id, CourseStatus::Draft, 1).await;

        let (status, body) = call(
            &db,
            "PUT",
            &format!("/api/instructor/courses/{}", course_id),
            Some(&ines.token),
            Some(json!({ "price": -5.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MalformedData");
        assert_eq!(body["error"], "Price cannot be negative");

        let (_, body) = call(&db, "GET", "/api/instructor/courses", Some(&ines.token), None).await;
        assert_eq!(body["courses"][0]["price"], 0.0);

        let (status, _) = call(
            &db,
            "POST",
            "/api/instructor/courses",
            Some(&ines.token),
            Some(json!({
                "title": "Rust",
                "description": "Ownership",
                "category": "Programming",
                "price": -1.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &db,
            "PUT",
            &format!("/api/instructor/courses/{}", course_id),
            Some(&ines.token),
            Some(json!({ "price": 19.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["course"]["price"], 19.5);
    }

    #[tokio::test]
    async fn editing_materials_recomputes_progress() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (course_id, materials) = course(&db, ines.id, CourseStatus::Approved, 2).await;

        let (_, body) = call(
            &db,
            "POST",
            "/api/enroll",
            Some(&alice.token),
            Some(json!({ "courseId": course_id, "studentId": alice.id })),
        )
        .await;
        let enrollment_id = body["enrollment"]["id"].as_u64().unwrap() as u32;
        call(
            &db,
            "POST",
            "/api/enroll/complete-material",
            Some(&alice.token),
            Some(json!({ "enrollmentId": enrollment_id, "materialId": materials[0], "courseId": course_id })),
        )
        .await;

        // Keep the completed material, add two new ones
        let (status, _) = call(
            &db,
            "PUT",
            &format!("/api/instructor/courses/{}", course_id),
            Some(&ines.token),
            Some(json!({
                "materials": [
                    { "id": materials[0], "type": "pdf", "url": "https://cdn.example.com/1.pdf", "title": "m1" },
                    { "type": "image", "url": "https://cdn.example.com/2.png", "title": "m2" },
                    { "type": "image", "url": "https://cdn.example.com/3.png", "title": "m3" },
                    { "type": "image", "url": "https://cdn.example.com/4.png", "title": "m4" }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let db = db.lock().await;
        let enrollment = db.enrollment_get(enrollment_id).unwrap();
        assert_eq!(enrollment.progress, 25);
        assert_eq!(enrollment.completed_materials.len(), 1);
    }

    #[tokio::test]
    async fn other_instructors_courses_are_hidden() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let omar = instructor(&db, "omar@example.com").await;
        let (course_id, _) = course(&db, ines.id, CourseStatus::Draft, 1).await;

        let path = format!("/api/instructor/courses/{}", course_id);

        let (status, _) = call(&db, "PUT", &path, Some(&omar.token), Some(json!({ "title": "Mine" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&db, "DELETE", &path, Some(&omar.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&db, "GET", "/api/instructor/courses", Some(&omar.token), None).await;
        assert_eq!(body["stats"]["totalCourses"], 0);

        let (status, _) = call(&db, "DELETE", &path, Some(&ines.token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(db.lock().await.course_get(course_id).is_none());
    }

    #[tokio::test]
    async fn dashboard_counts_courses_and_students() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (published, _) = course(&db, ines.id, CourseStatus::Approved, 1).await;
        let (other, _) = course(&db, ines.id, CourseStatus::Approved, 1).await;
        course(&db, ines.id, CourseStatus::Draft, 1).await;
        course(&db, ines.id, CourseStatus::Pending, 1).await;

        for course_id in [published, other] {
            call(
                &db,
                "POST",
                "/api/enroll",
                Some(&alice.token),
                Some(json!({ "courseId": course_id, "studentId": alice.id })),
            )
            .await;
        }

        let (status, body) = call(&db, "GET", "/api/instructor/courses", Some(&ines.token), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["stats"],
            json!({
                "totalCourses": 4,
                "publishedCourses": 2,
                "draftCourses": 1,
                "pendingCourses": 1,
                "totalStudents": 2
            })
        );
        assert_eq!(body["students"].as_array().unwrap().len(), 1);
    }
}
