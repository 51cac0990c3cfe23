//! Concrete stores implementing both [`SchoolDirectory`](super::repository::SchoolDirectory)
//! and [`EnrollmentRepository`](super::repository::EnrollmentRepository).

mod memory;
mod sqlite;

pub use memory::MemorySchoolStore;
pub use sqlite::SqliteSchoolStore;

use chrono::{DateTime, Utc};

use super::domain::{Classification, Enrollment, StateChange};

pub(crate) fn apply_classification(
    record: &mut Enrollment,
    classification: &Classification,
    now: DateTime<Utc>,
) {
    record.general_average = classification.general_average;
    record.transition_status = classification.transition_status;
    record.target_grade_label = classification.target_grade_label.clone();
    record.graded_subjects = classification.graded_subjects;
    record.mandatory_subjects = classification.mandatory_subjects;
    record.updated_at = now;
}

pub(crate) fn apply_change(record: &mut Enrollment, change: StateChange, now: DateTime<Utc>) {
    if let Some(classification) = &change.classification {
        apply_classification(record, classification, now);
    }
    record.state = change.state;
    if change.target_class_id.is_some() {
        record.target_class_id = change.target_class_id;
    }
    if change.exam_grade.is_some() {
        record.exam_grade = change.exam_grade;
    }
    record.updated_at = now;
}

fn sort_for_listing(records: &mut [Enrollment]) {
    records.sort_by(|a, b| {
        a.source_class_id
            .cmp(&b.source_class_id)
            .then_with(|| a.target_year.cmp(&b.target_year))
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
}
