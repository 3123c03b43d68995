use thiserror::Error;

/// Errors produced by the store, both rule violations and persistence failures.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Email already registered")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Role has already been selected")]
    RoleAlreadySelected,

    #[error("Only students can enroll in courses")]
    NotAStudent,

    #[error("Course not found")]
    CourseNotFound,

    #[error("Course is not available for enrollment")]
    CourseNotAvailable,

    #[error("Already enrolled in this course")]
    AlreadyEnrolled,

    #[error("Enrollment not found")]
    EnrollmentNotFound,

    #[error("Enrollment does not belong to this course")]
    CourseMismatch,

    #[error("Material not found")]
    MaterialNotFound,

    #[error("Material already marked as completed")]
    MaterialAlreadyCompleted,

    /// Reading or writing the database file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The database file could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// True for failures that are not the caller's fault.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Json(_))
    }
}
