use serde::{Deserialize, Serialize};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{db_failure, failure, success, ErrorCode};
use db::{models::Enrollment, Database, Db, JSONDatabase};
use filters::{authed, with_db, Forbidden};

pub fn routes(db: &Db) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let check_route = warp::path!("api" / "enroll" / "check")
        .and(warp::get())
        .and(authed(db))
        .and(warp::query::<CheckRequest>())
        .and(with_db(db.clone()))
        .and_then(check)
        .boxed();

    let create_route = warp::path!("api" / "enroll")
        .and(warp::post())
        .and(authed(db))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and_then(create)
        .boxed();

    let complete_route = warp::path!("api" / "enroll" / "complete-material")
        .and(warp::post())
        .and(authed(db))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and(with_db(db.clone()))
        .and_then(complete_material)
        .boxed();

    check_route.or(create_route).or(complete_route)
}

/// Students act on their own enrollments, administrators on anyone's.
fn may_act_for(db: &JSONDatabase, caller: u32, student_id: u32) -> Result<(), Rejection> {
    let is_admin = db
        .user_get(caller)
        .map(|u| u.role.is_administrator())
        .unwrap_or(false);

    if caller == student_id || is_admin {
        Ok(())
    } else {
        Err(warp::reject::custom(Forbidden))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest {
    course_id: Option<u32>,
    student_id: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse<'a> {
    is_enrolled: bool,
    enrollment: Option<&'a Enrollment>,
}

async fn check(
    caller: u32,
    request: CheckRequest,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (course_id, student_id) = match (request.course_id, request.student_id) {
        (Some(course_id), Some(student_id)) => (course_id, student_id),
        _ => {
            return Ok(failure(
                ErrorCode::MissingFields,
                "Course ID and Student ID are required",
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let db = db.lock().await;
    may_act_for(&db, caller, student_id)?;

    let enrollment = db.enrollment_find(student_id, course_id);

    Ok(success(&CheckResponse {
        is_enrolled: enrollment.is_some(),
        enrollment,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    course_id: Option<u32>,
    student_id: Option<u32>,
}

#[derive(Serialize)]
struct CreateResponse<'a> {
    success: bool,
    message: &'static str,
    enrollment: &'a Enrollment,
}

async fn create(
    caller: u32,
    request: CreateRequest,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (course_id, student_id) = match (request.course_id, request.student_id) {
        (Some(course_id), Some(student_id)) => (course_id, student_id),
        _ => {
            return Ok(failure(
                ErrorCode::MissingFields,
                "Course ID and Student ID are required",
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let mut db = db.lock().await;
    may_act_for(&db, caller, student_id)?;

    match db.enrollment_create(student_id, course_id) {
        Ok(enrollment) => Ok(success(&CreateResponse {
            success: true,
            message: "Successfully enrolled in course",
            enrollment,
        })),
        Err(err) => Ok(db_failure(err, "Failed to enroll in course")),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest {
    enrollment_id: Option<u32>,
    material_id: Option<u32>,
    course_id: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteResponse<'a> {
    success: bool,
    message: &'static str,
    enrollment: &'a Enrollment,
    completed_count: usize,
    total_materials: usize,
}

async fn complete_material(
    caller: u32,
    request: CompleteRequest,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (enrollment_id, material_id, course_id) =
        match (request.enrollment_id, request.material_id, request.course_id) {
            (Some(enrollment_id), Some(material_id), Some(course_id)) => {
                (enrollment_id, material_id, course_id)
            }
            _ => {
                return Ok(failure(
                    ErrorCode::MissingFields,
                    "Enrollment ID, Material ID, and Course ID are required",
                    StatusCode::BAD_REQUEST,
                ))
            }
        };

    let mut db = db.lock().await;

    // Unknown enrollments fall through to the store, which reports them
    if let Some(student_id) = db.enrollment_get(enrollment_id).map(|e| e.student_id) {
        may_act_for(&db, caller, student_id)?;
    }

    match db.enrollment_complete_material(enrollment_id, course_id, material_id) {
        Ok(completion) => Ok(success(&CompleteResponse {
            success: true,
            message: "Material marked as completed",
            enrollment: completion.enrollment,
            completed_count: completion.completed_count,
            total_materials: completion.total_materials,
        })),
        Err(err) => Ok(db_failure(err, "Failed to mark material as completed")),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use db::{models::CourseStatus, Database};
    use serde_json::{json, Value};
    use warp::http::StatusCode;

    async fn enroll(db: &db::Db, token: &str, course_id: u32, student_id: u32) -> (StatusCode, Value) {
        call(
            db,
            "POST",
            "/api/enroll",
            Some(token),
            Some(json!({ "courseId": course_id, "studentId": student_id })),
        )
        .await
    }

    async fn complete(
        db: &db::Db,
        token: &str,
        enrollment_id: u64,
        course_id: u32,
        material_id: u32,
    ) -> (StatusCode, Value) {
        call(
            db,
            "POST",
            "/api/enroll/complete-material",
            Some(token),
            Some(json!({
                "enrollmentId": enrollment_id,
                "materialId": material_id,
                "courseId": course_id
            })),
        )
        .await
    }

    #[tokio::test]
    async fn progress_is_tracked_until_completion() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (course_id, materials) = course(&db, ines.id, CourseStatus::Approved, 4).await;

        let (status, body) = enroll(&db, &alice.token, course_id, alice.id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Successfully enrolled in course");
        assert_eq!(body["enrollment"]["progress"], 0);
        let enrollment_id = body["enrollment"]["id"].as_u64().unwrap();

        let (status, body) = complete(&db, &alice.token, enrollment_id, course_id, materials[0]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enrollment"]["progress"], 25);
        assert_eq!(body["enrollment"]["completed"], false);
        assert_eq!(body["completedCount"], 1);
        assert_eq!(body["totalMaterials"], 4);

        let mut last = Value::Null;
        for material_id in &materials[1..] {
            let (status, body) =
                complete(&db, &alice.token, enrollment_id, course_id, *material_id).await;
            assert_eq!(status, StatusCode::OK);
            last = body;
        }
        assert_eq!(last["enrollment"]["progress"], 100);
        assert_eq!(last["enrollment"]["completed"], true);
        assert!(last["enrollment"]["completedAt"].is_string());

        let (status, body) = complete(&db, &alice.token, enrollment_id, course_id, materials[0]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Material already marked as completed");

        let (_, body) = call(
            &db,
            "GET",
            &format!("/api/enroll/check?courseId={}&studentId={}", course_id, alice.id),
            Some(&alice.token),
            None,
        )
        .await;
        assert_eq!(
            body["enrollment"]["completedMaterials"]
                .as_array()
                .unwrap()
                .len(),
            4
        );
    }

    #[tokio::test]
    async fn only_approved_courses_accept_enrollments() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (course_id, _) = course(&db, ines.id, CourseStatus::Pending, 2).await;

        let (status, body) = enroll(&db, &alice.token, course_id, alice.id).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Course is not available for enrollment");
    }

    #[tokio::test]
    async fn enrolling_twice_is_rejected() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (course_id, _) = course(&db, ines.id, CourseStatus::Approved, 2).await;

        let (status, _) = enroll(&db, &alice.token, course_id, alice.id).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = enroll(&db, &alice.token, course_id, alice.id).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Already enrolled in this course");
        assert_eq!(db.lock().await.course_students(course_id).len(), 1);
    }

    #[tokio::test]
    async fn absent_enrollment_is_reported_as_null() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (course_id, _) = course(&db, ines.id, CourseStatus::Approved, 1).await;

        let (status, body) = call(
            &db,
            "GET",
            &format!("/api/enroll/check?courseId={}&studentId={}", course_id, alice.id),
            Some(&alice.token),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "isEnrolled": false, "enrollment": null }));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let db = empty_db();
        let alice = student(&db, "alice@example.com").await;

        let (status, body) = call(&db, "GET", "/api/enroll/check?courseId=1", Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Course ID and Student ID are required");

        let (status, body) = call(
            &db,
            "POST",
            "/api/enroll/complete-material",
            Some(&alice.token),
            Some(json!({ "enrollmentId": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Enrollment ID, Material ID, and Course ID are required"
        );
    }

    #[tokio::test]
    async fn unknown_records_are_not_found() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let (course_id, materials) = course(&db, ines.id, CourseStatus::Approved, 1).await;

        let (status, body) = enroll(&db, &alice.token, 999, alice.id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Course not found");

        let (status, body) = complete(&db, &alice.token, 999, course_id, materials[0]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "EnrollmentNotFound");
    }

    #[tokio::test]
    async fn students_only_act_for_themselves() {
        let db = empty_db();
        let ines = instructor(&db, "ines@example.com").await;
        let alice = student(&db, "alice@example.com").await;
        let bob = student(&db, "bob@example.com").await;
        let root = admin(&db).await;
        let (course_id, materials) = course(&db, ines.id, CourseStatus::Approved, 2).await;

        let (status, _) = enroll(&db, &bob.token, course_id, alice.id).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = enroll(&db, &root.token, course_id, alice.id).await;
        assert_eq!(status, StatusCode::OK);
        let enrollment_id = body["enrollment"]["id"].as_u64().unwrap();

        let (status, _) = complete(&db, &bob.token, enrollment_id, course_id, materials[0]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &db,
            "GET",
            &format!("/api/enroll/check?courseId={}&studentId={}", course_id, alice.id),
            Some(&bob.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn enrollment_requires_a_session() {
        let db = empty_db();

        let (status, _) = call(
            &db,
            "POST",
            "/api/enroll",
            None,
            Some(json!({ "courseId": 1, "studentId": 1 })),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
