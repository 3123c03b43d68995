use serde::Serialize;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{
    failure, success, CourseDetail, CourseSummary, ErrorCode, PaginatedQueryableListRequest,
};
use db::{models::CourseStatus, Database, Db};
use filters::with_db;

pub fn routes(db: &Db) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list_route = warp::path!("api" / "courses")
        .and(warp::get())
        .and(warp::query::<PaginatedQueryableListRequest>())
        .and(with_db(db.clone()))
        .and_then(list)
        .boxed();

    let get_route = warp::path!("api" / "courses" / u32)
        .and(warp::get())
        .and(with_db(db.clone()))
        .and_then(get)
        .boxed();

    list_route.or(get_route)
}

#[derive(Serialize)]
struct ListResponse<'a> {
    success: bool,
    total: usize,
    courses: Vec<CourseSummary<'a>>,
}

async fn list(
    request: PaginatedQueryableListRequest,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let (total, courses) = db.course_list(
        request.normalized_page_number(),
        request.query.as_deref(),
        |c| c.status == CourseStatus::Approved,
    );

    Ok(success(&ListResponse {
        success: true,
        total,
        courses: courses
            .into_iter()
            .map(|c| CourseSummary::new(&*db, c))
            .collect(),
    }))
}

#[derive(Serialize)]
struct GetResponse<'a> {
    success: bool,
    course: CourseDetail<'a>,
}

async fn get(id: u32, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    // Courses under review or rejected are only visible from the dashboards
    match db
        .course_get(id)
        .filter(|c| c.status == CourseStatus::Approved)
    {
        Some(course) => Ok(success(&GetResponse {
            success: true,
            course: CourseDetail::new(&*db, course),
        })),
        None => Ok(failure(
            ErrorCode::CourseNotFound,
            "Course not found",
            StatusCode::NOT_FOUND,
        )),
    }
}
