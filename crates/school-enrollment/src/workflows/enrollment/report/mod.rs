//! Read-side projections: per-state counts, staff-facing views and CSV export.

mod summary;
mod views;

use std::io;

use serde::Serialize;

pub use summary::{EnrollmentSummary, StateCount, TransitionCount};
pub use views::{DestinationOption, EnrollmentView};

use super::domain::{Enrollment, TransitionStatus};

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    enrollment_id: &'a str,
    student_id: &'a str,
    source_class_id: &'a str,
    target_year: &'a str,
    general_average: Option<f64>,
    transition_status: &'a str,
    state: &'a str,
    target_grade: Option<&'a str>,
    target_class_id: Option<&'a str>,
    exam_grade: Option<f64>,
}

/// Write the records as CSV, one row per enrollment, with a header line.
pub fn write_csv<W: io::Write>(writer: W, records: &[Enrollment]) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(CsvRow {
            enrollment_id: &record.id.0,
            student_id: &record.student_id.0,
            source_class_id: &record.source_class_id.0,
            target_year: &record.target_year,
            general_average: record.general_average,
            transition_status: record
                .transition_status
                .map_or("", TransitionStatus::code),
            state: record.state.code(),
            target_grade: record.target_grade_label.as_deref(),
            target_class_id: record.target_class_id.as_ref().map(|id| id.0.as_str()),
            exam_grade: record.exam_grade,
        })?;
    }
    csv.flush()?;
    Ok(())
}
