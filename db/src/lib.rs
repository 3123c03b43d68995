use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

mod error;
mod json;
pub mod models;
pub mod progress;
mod seed;

pub use error::DbError;
pub use json::JSONDatabase;
pub use seed::seed_administrator;

use models::{
    Course, CourseLevel, CourseStatus, Enrollment, InstructorProfile, MaterialKind, Role,
    StudentProfile, User,
};

pub const PAGE_SIZE: usize = 10;

pub type Db = Arc<Mutex<JSONDatabase>>;

pub fn new_db(database: JSONDatabase) -> Db {
    Arc::new(Mutex::new(database))
}

/// Storage operations used by the routes. Every mutation either fully applies and
/// is persisted, or returns an error.
pub trait Database {
    fn dump_as_json(&self) -> Result<String, serde_json::Error>;

    fn auth_login(&mut self, user_id: u32) -> Result<String, DbError>;
    fn auth_logout(&mut self, token: &str) -> Result<bool, DbError>;
    fn auth_get_user(&self, token: &str) -> Option<&User>;

    fn user_add(&mut self, user: NewUser) -> Result<&User, DbError>;
    fn user_get(&self, id: u32) -> Option<&User>;
    fn user_get_by_email(&self, email: &str) -> Option<&User>;
    fn user_all(&self) -> Vec<&User>;
    fn user_list(
        &self,
        page: usize,
        query: Option<&str>,
        filter: impl Fn(&User) -> bool,
    ) -> (usize, Vec<&User>);
    fn user_select_role(&mut self, id: u32, role: SelectedRole) -> Result<&User, DbError>;
    fn user_remove(&mut self, users: &[u32]) -> Result<bool, DbError>;

    fn course_add(&mut self, instructor_id: u32, course: NewCourse) -> Result<&Course, DbError>;
    fn course_get(&self, id: u32) -> Option<&Course>;
    fn course_all(&self) -> Vec<&Course>;
    fn course_list(
        &self,
        page: usize,
        query: Option<&str>,
        filter: impl Fn(&Course) -> bool,
    ) -> (usize, Vec<&Course>);
    fn course_update(&mut self, id: u32, update: CourseUpdate) -> Result<UpdateStatus, DbError>;
    fn course_set_status(&mut self, id: u32, status: CourseStatus) -> Result<&Course, DbError>;
    fn course_remove(&mut self, id: u32) -> Result<bool, DbError>;
    /// Students enrolled in a course, derived from the enrollments.
    fn course_students(&self, id: u32) -> Vec<&User>;

    fn enrollment_get(&self, id: u32) -> Option<&Enrollment>;
    fn enrollment_find(&self, student_id: u32, course_id: u32) -> Option<&Enrollment>;
    /// Enrollments of a student, most recently accessed first.
    fn enrollment_list_for_student(&self, student_id: u32) -> Vec<&Enrollment>;
    fn enrollment_count(&self) -> usize;
    fn enrollment_create(&mut self, student_id: u32, course_id: u32)
        -> Result<&Enrollment, DbError>;
    fn enrollment_complete_material(
        &mut self,
        enrollment_id: u32,
        course_id: u32,
        material_id: u32,
    ) -> Result<MaterialCompletion<'_>, DbError>;
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub role: Role,
}

/// The roles a user can pick for themselves when leaving [`Role::Unassigned`].
pub enum SelectedRole {
    Student(StudentProfile),
    Instructor(InstructorProfile),
}

impl From<SelectedRole> for Role {
    fn from(role: SelectedRole) -> Self {
        match role {
            SelectedRole::Student(profile) => Role::Student(profile),
            SelectedRole::Instructor(profile) => Role::Instructor(profile),
        }
    }
}

pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub category: String,
    pub level: CourseLevel,
    pub status: CourseStatus,
    pub price: f64,
    pub thumbnail: Option<String>,
    pub materials: Vec<MaterialInput>,
}

/// A material as sent by an instructor. Materials already stored in the course keep
/// their id, the others get a fresh one.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MaterialInput {
    pub id: Option<u32>,
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub status: Option<CourseStatus>,
    pub price: Option<f64>,
    pub thumbnail: Option<String>,
    pub materials: Option<Vec<MaterialInput>>,
}

pub struct UpdateStatus {
    pub found: bool,
    pub updated: bool,
}

pub struct MaterialCompletion<'a> {
    pub enrollment: &'a Enrollment,
    pub completed_count: usize,
    pub total_materials: usize,
}
