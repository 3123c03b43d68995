use chrono::{DateTime, Utc};

use crate::models::Enrollment;

/// Percentage of completed materials, rounded half up and capped at 100.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }

    let rounded = (200 * completed + total) / (2 * total);
    rounded.min(100) as u8
}

pub fn is_complete(completed: usize, total: usize) -> bool {
    total > 0 && completed >= total
}

/// Recomputes the derived fields of an enrollment from its completed materials.
///
/// The completion timestamp is stamped when the enrollment becomes complete and
/// cleared if the course grows past what has been completed.
pub fn refresh(enrollment: &mut Enrollment, total_materials: usize, now: DateTime<Utc>) {
    let completed_count = enrollment.completed_materials.len();

    enrollment.progress = percent(completed_count, total_materials);

    if is_complete(completed_count, total_materials) {
        if !enrollment.completed {
            enrollment.completed = true;
            enrollment.completed_at = Some(now);
        }
    } else {
        enrollment.completed = false;
        enrollment.completed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompletedMaterial;

    fn enrollment_with(completed: u32) -> Enrollment {
        let now = Utc::now();

        Enrollment {
            id: 0,
            student_id: 0,
            course_id: 0,
            enrolled_at: now,
            progress: 0,
            completed: false,
            completed_at: None,
            last_accessed: now,
            completed_materials: (0..completed)
                .map(|material_id| CompletedMaterial {
                    material_id,
                    completed_at: now,
                })
                .collect(),
        }
    }

    #[test]
    fn percent_without_materials_is_zero() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(3, 0), 0);
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent(1, 4), 25);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(1, 200), 1);
        assert_eq!(percent(4, 4), 100);
    }

    #[test]
    fn percent_is_capped() {
        assert_eq!(percent(5, 4), 100);
    }

    #[test]
    fn complete_needs_materials() {
        assert!(!is_complete(0, 0));
        assert!(!is_complete(2, 3));
        assert!(is_complete(3, 3));
    }

    #[test]
    fn refresh_stamps_completion_once() {
        let mut enrollment = enrollment_with(2);
        let first = Utc::now();

        refresh(&mut enrollment, 2, first);
        assert_eq!(enrollment.progress, 100);
        assert!(enrollment.completed);
        assert_eq!(enrollment.completed_at, Some(first));

        refresh(&mut enrollment, 2, first + chrono::Duration::seconds(10));
        assert_eq!(enrollment.completed_at, Some(first));
    }

    #[test]
    fn refresh_clears_completion_when_course_grows() {
        let mut enrollment = enrollment_with(2);
        let now = Utc::now();

        refresh(&mut enrollment, 2, now);
        refresh(&mut enrollment, 4, now);

        assert_eq!(enrollment.progress, 50);
        assert!(!enrollment.completed);
        assert_eq!(enrollment.completed_at, None);
    }
}
