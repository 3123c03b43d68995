use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u32,
    pub email: String,
    pub name: String,
    /// bcrypt hash, absent for accounts created through an external identity provider
    pub password_hash: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    /// Account created without a role, waiting for role selection
    Unassigned,
    Student(StudentProfile),
    Instructor(InstructorProfile),
    Administrator,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unassigned => "",
            Self::Student(_) => "student",
            Self::Instructor(_) => "instructor",
            Self::Administrator => "admin",
        }
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self, Self::Administrator)
    }

    pub fn is_unassigned(&self) -> bool {
        matches!(self, Self::Unassigned)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub education_level: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstructorProfile {
    pub expertise_areas: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub level: CourseLevel,
    pub status: CourseStatus,
    pub instructor_id: u32,
    pub price: f64,
    pub thumbnail: Option<String>,
    pub materials: Vec<Material>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn has_material(&self, material_id: u32) -> bool {
        self.materials.iter().any(|m| m.id == material_id)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl Default for CourseLevel {
    fn default() -> Self {
        Self::Beginner
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Reported,
}

impl Default for CourseStatus {
    fn default() -> Self {
        Self::Draft
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    /// Generated when the material is added to its course, never reused
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub url: String,
    pub title: String,
    pub description: String,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Pdf,
    Image,
    Youtube,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: u32,
    pub student_id: u32,
    pub course_id: u32,
    pub enrolled_at: DateTime<Utc>,
    pub progress: u8,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
    pub completed_materials: Vec<CompletedMaterial>,
}

impl Enrollment {
    pub fn has_completed(&self, material_id: u32) -> bool {
        self.completed_materials
            .iter()
            .any(|m| m.material_id == material_id)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMaterial {
    pub material_id: u32,
    pub completed_at: DateTime<Utc>,
}
