use bimap::BiMap;
use chrono::Utc;
use rand::{self, distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::{
    normalize_email, progress, CourseUpdate, Database, DbError, MaterialCompletion,
    MaterialInput, NewCourse, NewUser, SelectedRole, UpdateStatus, PAGE_SIZE,
};
use crate::models::{
    CompletedMaterial, Course, CourseStatus, Enrollment, Material, Role, User,
};

const TOKEN_LENGTH: usize = 25;

#[derive(Serialize, Deserialize)]
pub struct JSONDatabase {
    #[serde(skip)]
    filename: Option<PathBuf>,
    users: BTreeMap<u32, User>,
    tokens: BiMap<String, u32>,
    courses: BTreeMap<u32, Course>,
    enrollments: BTreeMap<u32, Enrollment>,
    next_user_id: u32,
    next_course_id: u32,
    next_material_id: u32,
    next_enrollment_id: u32,
}

impl JSONDatabase {
    /// Loads the database stored at `filename`, or creates it if the file does not exist.
    pub fn open(filename: impl Into<PathBuf>) -> Result<Self, DbError> {
        let filename = filename.into();

        let mut db = match Self::from_file(&filename) {
            Ok(db) => db,
            Err(DbError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                log::info!("No database at {}, creating it", filename.display());
                Self::in_memory()
            }
            Err(err) => return Err(err),
        };

        db.filename = Some(filename);
        db.persist()?;

        Ok(db)
    }

    /// A database that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            filename: None,
            users: BTreeMap::new(),
            tokens: BiMap::new(),
            courses: BTreeMap::new(),
            enrollments: BTreeMap::new(),
            next_user_id: 0,
            next_course_id: 0,
            next_material_id: 0,
            next_enrollment_id: 0,
        }
    }

    fn from_file(filename: &Path) -> Result<Self, DbError> {
        let contents = {
            let mut file = File::open(filename)?;
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            contents
        };

        Ok(serde_json::from_str(&contents)?)
    }

    fn persist(&self) -> Result<(), DbError> {
        if let Some(filename) = &self.filename {
            let mut output = File::create(filename)?;
            write!(output, "{}", self.dump_as_json()?)?;
        }

        Ok(())
    }

    /// Persists the current state. If that fails, `undo` puts the in-memory state back
    /// to what it was before the change and the error is returned.
    fn persist_or_undo(&mut self, undo: impl FnOnce(&mut Self)) -> Result<(), DbError> {
        if let Err(err) = self.persist() {
            undo(self);
            return Err(err);
        }

        Ok(())
    }
}

impl Database for JSONDatabase {
    fn dump_as_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self)
    }

    fn auth_login(&mut self, user_id: u32) -> Result<String, DbError> {
        if !self.users.contains_key(&user_id) {
            return Err(DbError::UserNotFound);
        }

        let mut rng = rand::thread_rng();
        let token: String = std::iter::repeat(())
            .map(|()| char::from(rng.sample(Alphanumeric)))
            .take(TOKEN_LENGTH)
            .collect();

        // A user holds a single session, logging in again revokes the previous token
        let previous = self.tokens.get_by_right(&user_id).cloned();
        self.tokens.insert(token.clone(), user_id);

        let new_token = token.clone();
        self.persist_or_undo(move |db| {
            db.tokens.remove_by_left(&new_token);
            if let Some(previous) = previous {
                db.tokens.insert(previous, user_id);
            }
        })?;

        Ok(token)
    }

    fn auth_logout(&mut self, token: &str) -> Result<bool, DbError> {
        let (token, user_id) = match self.tokens.remove_by_left(token) {
            Some(session) => session,
            None => return Ok(false),
        };

        self.persist_or_undo(move |db| {
            db.tokens.insert(token, user_id);
        })?;

        Ok(true)
    }

    fn auth_get_user(&self, token: &str) -> Option<&User> {
        let user_id = self.tokens.get_by_left(token)?;
        self.users.get(user_id)
    }

    fn user_add(&mut self, user: NewUser) -> Result<&User, DbError> {
        let email = normalize_email(&user.email);

        if self.user_get_by_email(&email).is_some() {
            return Err(DbError::EmailTaken);
        }

        let id = self.next_user_id;

        self.users.insert(
            id,
            User {
                id,
                email,
                name: user.name,
                password_hash: user.password_hash,
                role: user.role,
                created_at: Utc::now(),
            },
        );
        self.next_user_id += 1;

        self.persist_or_undo(|db| {
            db.users.remove(&id);
            db.next_user_id = id;
        })?;

        Ok(&self.users[&id])
    }

    fn user_get(&self, id: u32) -> Option<&User> {
        self.users.get(&id)
    }

    fn user_get_by_email(&self, email: &str) -> Option<&User> {
        let email = normalize_email(email);
        self.users.values().find(|u| u.email == email)
    }

    fn user_all(&self) -> Vec<&User> {
        self.users.values().rev().collect()
    }

    fn user_list(
        &self,
        page: usize,
        query: Option<&str>,
        filter: impl Fn(&User) -> bool,
    ) -> (usize, Vec<&User>) {
        _search(
            self.users.values().rev(),
            |u: &User| format!("{} {}", u.name, u.email),
            page,
            query,
            filter,
        )
    }

    fn user_select_role(&mut self, id: u32, role: SelectedRole) -> Result<&User, DbError> {
        let user = self.users.get_mut(&id).ok_or(DbError::UserNotFound)?;

        if !user.role.is_unassigned() {
            return Err(DbError::RoleAlreadySelected);
        }

        let previous = std::mem::replace(&mut user.role, role.into());

        self.persist_or_undo(move |db| {
            if let Some(user) = db.users.get_mut(&id) {
                user.role = previous;
            }
        })?;

        Ok(&self.users[&id])
    }

    fn user_remove(&mut self, users: &[u32]) -> Result<bool, DbError> {
        // Check first that all IDs exist
        if !users.iter().all(|id| self.users.contains_key(id)) {
            return Ok(false);
        }

        let owned_courses: Vec<u32> = self
            .courses
            .values()
            .filter(|c| users.contains(&c.instructor_id))
            .map(|c| c.id)
            .collect();

        let enrollment_ids: Vec<u32> = self
            .enrollments
            .values()
            .filter(|e| users.contains(&e.student_id) || owned_courses.contains(&e.course_id))
            .map(|e| e.id)
            .collect();

        let mut removed_tokens = Vec::new();
        let mut removed_users = Vec::new();
        for id in users {
            removed_tokens.extend(self.tokens.remove_by_right(id));
            removed_users.extend(self.users.remove(id));
        }

        let removed_courses: Vec<Course> = owned_courses
            .iter()
            .filter_map(|id| self.courses.remove(id))
            .collect();
        let removed_enrollments: Vec<Enrollment> = enrollment_ids
            .iter()
            .filter_map(|id| self.enrollments.remove(id))
            .collect();

        self.persist_or_undo(move |db| {
            db.users.extend(removed_users.into_iter().map(|u| (u.id, u)));
            for (token, user_id) in removed_tokens {
                db.tokens.insert(token, user_id);
            }
            db.courses
                .extend(removed_courses.into_iter().map(|c| (c.id, c)));
            db.enrollments
                .extend(removed_enrollments.into_iter().map(|e| (e.id, e)));
        })?;

        Ok(true)
    }

    fn course_add(&mut self, instructor_id: u32, course: NewCourse) -> Result<&Course, DbError> {
        let id = self.next_course_id;
        let next_material_id = self.next_material_id;
        let now = Utc::now();
        let materials = assign_material_ids(course.materials, &[], &mut self.next_material_id);

        self.courses.insert(
            id,
            Course {
                id,
                title: course.title,
                description: course.description,
                category: course.category,
                level: course.level,
                status: course.status,
                instructor_id,
                price: course.price,
                thumbnail: course.thumbnail.filter(|t| !t.is_empty()),
                materials,
                created_at: now,
                updated_at: now,
            },
        );
        self.next_course_id += 1;

        self.persist_or_undo(|db| {
            db.courses.remove(&id);
            db.next_course_id = id;
            db.next_material_id = next_material_id;
        })?;

        Ok(&self.courses[&id])
    }

    fn course_get(&self, id: u32) -> Option<&Course> {
        self.courses.get(&id)
    }

    fn course_all(&self) -> Vec<&Course> {
        self.courses.values().rev().collect()
    }

    fn course_list(
        &self,
        page: usize,
        query: Option<&str>,
        filter: impl Fn(&Course) -> bool,
    ) -> (usize, Vec<&Course>) {
        _search(
            self.courses.values().rev(),
            |c: &Course| c.title.to_string(),
            page,
            query,
            filter,
        )
    }

    fn course_update(&mut self, id: u32, update: CourseUpdate) -> Result<UpdateStatus, DbError> {
        let course = match self.courses.get_mut(&id) {
            Some(course) => course,
            None => {
                return Ok(UpdateStatus {
                    found: false,
                    updated: false,
                })
            }
        };

        let previous_course = course.clone();
        let previous_enrollments: Vec<Enrollment> = if update.materials.is_some() {
            self.enrollments
                .values()
                .filter(|e| e.course_id == id)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let next_material_id = self.next_material_id;

        let mut updated = false;

        if let Some(title) = update.title {
            course.title = title;
            updated = true;
        }

        if let Some(description) = update.description {
            course.description = description;
            updated = true;
        }

        if let Some(category) = update.category {
            course.category = category;
            updated = true;
        }

        if let Some(level) = update.level {
            course.level = level;
            updated = true;
        }

        if let Some(status) = update.status {
            course.status = status;
            updated = true;
        }

        if let Some(price) = update.price {
            course.price = price;
            updated = true;
        }

        if let Some(thumbnail) = update.thumbnail {
            course.thumbnail = Some(thumbnail).filter(|t| !t.is_empty());
            updated = true;
        }

        let now = Utc::now();

        if let Some(inputs) = update.materials {
            let materials =
                assign_material_ids(inputs, &course.materials, &mut self.next_material_id);
            course.materials = materials;
            updated = true;

            // Completions of removed materials no longer count towards progress
            let total = course.materials.len();
            let material_ids: HashSet<u32> = course.materials.iter().map(|m| m.id).collect();

            for enrollment in self.enrollments.values_mut().filter(|e| e.course_id == id) {
                enrollment
                    .completed_materials
                    .retain(|m| material_ids.contains(&m.material_id));
                progress::refresh(enrollment, total, now);
            }
        }

        if updated {
            course.updated_at = now;

            self.persist_or_undo(move |db| {
                db.courses.insert(id, previous_course);
                db.enrollments
                    .extend(previous_enrollments.into_iter().map(|e| (e.id, e)));
                db.next_material_id = next_material_id;
            })?;
        }

        Ok(UpdateStatus {
            found: true,
            updated,
        })
    }

    fn course_set_status(&mut self, id: u32, status: CourseStatus) -> Result<&Course, DbError> {
        let course = self.courses.get_mut(&id).ok_or(DbError::CourseNotFound)?;

        let previous = (course.status, course.updated_at);
        course.status = status;
        course.updated_at = Utc::now();

        self.persist_or_undo(move |db| {
            if let Some(course) = db.courses.get_mut(&id) {
                course.status = previous.0;
                course.updated_at = previous.1;
            }
        })?;

        Ok(&self.courses[&id])
    }

    fn course_remove(&mut self, id: u32) -> Result<bool, DbError> {
        let course = match self.courses.remove(&id) {
            Some(course) => course,
            None => return Ok(false),
        };

        let enrollment_ids: Vec<u32> = self
            .enrollments
            .values()
            .filter(|e| e.course_id == id)
            .map(|e| e.id)
            .collect();
        let removed_enrollments: Vec<Enrollment> = enrollment_ids
            .iter()
            .filter_map(|id| self.enrollments.remove(id))
            .collect();

        self.persist_or_undo(move |db| {
            db.courses.insert(id, course);
            db.enrollments
                .extend(removed_enrollments.into_iter().map(|e| (e.id, e)));
        })?;

        Ok(true)
    }

    fn course_students(&self, id: u32) -> Vec<&User> {
        self.enrollments
            .values()
            .filter(|e| e.course_id == id)
            .filter_map(|e| self.users.get(&e.student_id))
            .collect()
    }

    fn enrollment_get(&self, id: u32) -> Option<&Enrollment> {
        self.enrollments.get(&id)
    }

    fn enrollment_find(&self, student_id: u32, course_id: u32) -> Option<&Enrollment> {
        self.enrollments
            .values()
            .find(|e| e.student_id == student_id && e.course_id == course_id)
    }

    fn enrollment_list_for_student(&self, student_id: u32) -> Vec<&Enrollment> {
        let mut enrollments: Vec<&Enrollment> = self
            .enrollments
            .values()
            .filter(|e| e.student_id == student_id)
            .collect();

        enrollments.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        enrollments
    }

    fn enrollment_count(&self) -> usize {
        self.enrollments.len()
    }

    fn enrollment_create(
        &mut self,
        student_id: u32,
        course_id: u32,
    ) -> Result<&Enrollment, DbError> {
        let course = self.courses.get(&course_id).ok_or(DbError::CourseNotFound)?;

        if course.status != CourseStatus::Approved {
            return Err(DbError::CourseNotAvailable);
        }

        let student = self.users.get(&student_id).ok_or(DbError::UserNotFound)?;

        if !matches!(student.role, Role::Student(_)) {
            return Err(DbError::NotAStudent);
        }

        if self.enrollment_find(student_id, course_id).is_some() {
            return Err(DbError::AlreadyEnrolled);
        }

        let id = self.next_enrollment_id;
        let now = Utc::now();

        self.enrollments.insert(
            id,
            Enrollment {
                id,
                student_id,
                course_id,
                enrolled_at: now,
                progress: 0,
                completed: false,
                completed_at: None,
                last_accessed: now,
                completed_materials: Vec::new(),
            },
        );
        self.next_enrollment_id += 1;

        self.persist_or_undo(|db| {
            db.enrollments.remove(&id);
            db.next_enrollment_id = id;
        })?;

        log::info!("Student {} enrolled in course {}", student_id, course_id);

        Ok(&self.enrollments[&id])
    }

    fn enrollment_complete_material(
        &mut self,
        enrollment_id: u32,
        course_id: u32,
        material_id: u32,
    ) -> Result<MaterialCompletion<'_>, DbError> {
        let enrollment = self
            .enrollments
            .get_mut(&enrollment_id)
            .ok_or(DbError::EnrollmentNotFound)?;
        let course = self.courses.get(&course_id).ok_or(DbError::CourseNotFound)?;

        if enrollment.course_id != course_id {
            return Err(DbError::CourseMismatch);
        }

        if !course.has_material(material_id) {
            return Err(DbError::MaterialNotFound);
        }

        // Check and write happen under the same exclusive borrow, so duplicates cannot race
        if enrollment.has_completed(material_id) {
            return Err(DbError::MaterialAlreadyCompleted);
        }

        let previous = enrollment.clone();
        let now = Utc::now();
        let total_materials = course.materials.len();

        enrollment.completed_materials.push(CompletedMaterial {
            material_id,
            completed_at: now,
        });
        progress::refresh(enrollment, total_materials, now);
        enrollment.last_accessed = now;

        let completed_count = enrollment.completed_materials.len();
        let just_completed = enrollment.completed && !previous.completed;

        self.persist_or_undo(move |db| {
            db.enrollments.insert(enrollment_id, previous);
        })?;

        if just_completed {
            log::info!(
                "Enrollment {} completed course {}",
                enrollment_id,
                course_id
            );
        }

        Ok(MaterialCompletion {
            enrollment: &self.enrollments[&enrollment_id],
            completed_count,
            total_materials,
        })
    }
}

/// Builds the stored materials from instructor input. Ids of materials already in
/// `existing` are kept, anything else (unknown or repeated ids) gets a fresh one.
fn assign_material_ids(
    inputs: Vec<MaterialInput>,
    existing: &[Material],
    next_material_id: &mut u32,
) -> Vec<Material> {
    let mut used = HashSet::new();

    inputs
        .into_iter()
        .map(|input| {
            let id = match input.id {
                Some(id) if existing.iter().any(|m| m.id == id) && used.insert(id) => id,
                _ => {
                    let id = *next_material_id;
                    *next_material_id += 1;
                    used.insert(id);
                    id
                }
            };

            Material {
                id,
                kind: input.kind,
                url: input.url,
                title: input.title,
                description: input.description,
            }
        })
        .collect()
}

fn _search<'a, T, F>(
    collection: impl Iterator<Item = &'a T>,
    property: F,
    page: usize,
    query: Option<&str>,
    custom_filter: impl Fn(&T) -> bool,
) -> (usize, Vec<&'a T>)
where
    F: Fn(&T) -> String,
    T: 'a,
{
    let mut filter = contains_query(query, property);
    let mut total = 0;
    let mut skipped = 0;
    let mut results: Vec<&T> = Vec::new();
    let to_skip = (page.max(1) - 1) * PAGE_SIZE;

    for row in collection {
        if !filter(&row) || !custom_filter(row) {
            continue;
        }

        total += 1;

        if skipped < to_skip {
            skipped += 1;
        } else if results.len() < PAGE_SIZE {
            results.push(row);
        }
    }

    (total, results)
}

/// Returns a function to be used as a filter that checks if the provided query is contained in the
/// object string.
fn contains_query<T, F>(query: Option<&str>, property: F) -> impl FnMut(&&T) -> bool
where
    F: Fn(&T) -> String,
{
    let normalize = |s: &str| unidecode::unidecode(s.trim()).to_ascii_lowercase();
    let query = query.map(|d| truncate(d, 50)).map(normalize);

    move |object: &&T| {
        if let Some(query) = &query {
            let name = property(object);
            let name = normalize(&name);
            name.contains(query)
        } else {
            true
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        None => s,
        Some((idx, _)) => &s[..idx],
    }
}
