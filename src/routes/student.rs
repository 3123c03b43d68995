use chrono::{DateTime, Utc};
use serde::Serialize;
use warp::{Filter, Rejection, Reply};

use super::globals::{success, PersonResponse};
use db::{
    models::{Course, CourseLevel, Enrollment},
    Database, Db,
};
use filters::{authed_is_of_kind, with_db, PossibleUserKind};

pub fn routes(db: &Db) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "student" / "courses")
        .and(warp::get())
        .and(authed_is_of_kind(db, &[PossibleUserKind::Student]))
        .and(with_db(db.clone()))
        .and_then(courses)
        .boxed()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrolledCourse<'a> {
    id: u32,
    enrollment_id: u32,
    title: &'a str,
    description: &'a str,
    category: &'a str,
    level: CourseLevel,
    thumbnail: Option<&'a str>,
    instructor: Option<PersonResponse<'a>>,
    progress: u8,
    completed: bool,
    last_accessed: DateTime<Utc>,
    total_lessons: usize,
    completed_lessons: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentStats {
    total_courses: usize,
    in_progress_courses: usize,
    completed_courses: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Activity<'a> {
    enrollment_id: u32,
    course_id: u32,
    course_title: &'a str,
    action: &'static str,
    timestamp: DateTime<Utc>,
}

fn action(enrollment: &Enrollment) -> &'static str {
    if enrollment.completed {
        "completed"
    } else if enrollment.progress > 0 {
        "started"
    } else {
        "enrolled"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CoursesResponse<'a> {
    success: bool,
    enrolled_courses: Vec<EnrolledCourse<'a>>,
    stats: StudentStats,
    recent_activity: Vec<Activity<'a>>,
}

async fn courses(student_id: u32, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    // Most recently accessed first
    let enrollments: Vec<(&Enrollment, &Course)> = db
        .enrollment_list_for_student(student_id)
        .into_iter()
        .filter_map(|e| db.course_get(e.course_id).map(|c| (e, c)))
        .collect();

    let stats = StudentStats {
        total_courses: enrollments.len(),
        in_progress_courses: enrollments
            .iter()
            .filter(|(e, _)| !e.completed && e.progress > 0)
            .count(),
        completed_courses: enrollments.iter().filter(|(e, _)| e.completed).count(),
    };

    let recent_activity = enrollments
        .iter()
        .take(5)
        .map(|(e, c)| Activity {
            enrollment_id: e.id,
            course_id: c.id,
            course_title: &c.title,
            action: action(e),
            timestamp: e.last_accessed,
        })
        .collect();

    let enrolled_courses = enrollments
        .iter()
        .map(|(e, c)| EnrolledCourse {
            id: c.id,
            enrollment_id: e.id,
            title: &c.title,
            description: &c.description,
            category: &c.category,
            level: c.level,
            thumbnail: c.thumbnail.as_deref(),
            instructor: db.user_get(c.instructor_id).map(PersonResponse::from),
            progress: e.progress,
            completed: e.completed,
            last_accessed: e.last_accessed,
            total_lessons: c.materials.len(),
            completed_lessons: e.completed_materials.len(),
        })
        .collect();

    Ok(success(&CoursesResponse {
        success: true,
        enrolled_courses,
        stats,
        recent_activity,
    }))
}
