use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::super::domain::{
    ClassId, Classification, Enrollment, EnrollmentFilter, EnrollmentId, EnrollmentState,
    NewEnrollment, RosterEntry, SchoolClass, StateChange, StudentId, SubjectFinal, SubjectId,
    TransitionStatus,
};
use super::super::repository::{EnrollmentRepository, RepositoryError, SchoolDirectory};
use super::apply_change;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS classes (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    academic_year   TEXT NOT NULL,
    education_level TEXT NOT NULL,
    grade_label     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS class_students (
    class_id     TEXT NOT NULL REFERENCES classes(id),
    student_id   TEXT NOT NULL,
    student_name TEXT NOT NULL,
    active       INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (class_id, student_id)
);
CREATE TABLE IF NOT EXISTS class_subjects (
    class_id   TEXT NOT NULL REFERENCES classes(id),
    subject_id TEXT NOT NULL,
    mandatory  INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (class_id, subject_id)
);
CREATE TABLE IF NOT EXISTS final_grades (
    student_id TEXT NOT NULL,
    class_id   TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    grade      REAL NOT NULL,
    PRIMARY KEY (student_id, class_id, subject_id)
);
CREATE TABLE IF NOT EXISTS enrollments (
    id                 TEXT PRIMARY KEY,
    source_class_id    TEXT NOT NULL,
    student_id         TEXT NOT NULL,
    target_year        TEXT NOT NULL,
    target_class_id    TEXT,
    target_grade_label TEXT,
    general_average    REAL,
    transition_status  TEXT,
    graded_subjects    INTEGER NOT NULL DEFAULT 0,
    mandatory_subjects INTEGER NOT NULL DEFAULT 0,
    state              TEXT NOT NULL DEFAULT 'pendente',
    exam_grade         REAL,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,
    UNIQUE (student_id, source_class_id, target_year)
);
CREATE INDEX IF NOT EXISTS idx_enrollments_class_year
    ON enrollments (source_class_id, target_year);
";

const ENROLLMENT_COLUMNS: &str = "id, source_class_id, student_id, target_year, target_class_id, \
     target_grade_label, general_average, transition_status, graded_subjects, mandatory_subjects, \
     state, exam_grade, created_at, updated_at";

/// SQLite-backed school store. The schema is created on open.
pub struct SqliteSchoolStore {
    conn: Mutex<Connection>,
}

impl SqliteSchoolStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| {
                RepositoryError::Unavailable("sqlite connection lock poisoned".to_string())
            })
    }

    pub fn add_class(&self, class: &SchoolClass) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO classes (id, name, academic_year, education_level, grade_label)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                academic_year = excluded.academic_year,
                education_level = excluded.education_level,
                grade_label = excluded.grade_label",
            params![
                class.id.0,
                class.name,
                class.academic_year,
                class.education_level,
                class.grade_label
            ],
        )?;
        Ok(())
    }

    pub fn add_student(
        &self,
        class_id: &ClassId,
        student_id: &StudentId,
        student_name: &str,
        active: bool,
    ) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO class_students (class_id, student_id, student_name, active)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(class_id, student_id) DO UPDATE SET
                student_name = excluded.student_name,
                active = excluded.active",
            params![class_id.0, student_id.0, student_name, active],
        )?;
        Ok(())
    }

    pub fn add_mandatory_subject(
        &self,
        class_id: &ClassId,
        subject_id: &SubjectId,
    ) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT OR IGNORE INTO class_subjects (class_id, subject_id, mandatory)
             VALUES (?1, ?2, 1)",
            params![class_id.0, subject_id.0],
        )?;
        Ok(())
    }

    pub fn record_final(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        subject_id: &SubjectId,
        grade: f64,
    ) -> Result<(), RepositoryError> {
        self.lock()?.execute(
            "INSERT INTO final_grades (student_id, class_id, subject_id, grade)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(student_id, class_id, subject_id) DO UPDATE SET grade = excluded.grade",
            params![student_id.0, class_id.0, subject_id.0, grade],
        )?;
        Ok(())
    }

    fn fetch_with(
        conn: &Connection,
        id: &EnrollmentId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = ?1");
        let record = conn
            .query_row(&sql, params![id.0], row_to_enrollment)
            .optional()?;
        Ok(record)
    }
}

fn row_to_class(row: &Row<'_>) -> rusqlite::Result<SchoolClass> {
    Ok(SchoolClass {
        id: ClassId(row.get(0)?),
        name: row.get(1)?,
        academic_year: row.get(2)?,
        education_level: row.get(3)?,
        grade_label: row.get(4)?,
    })
}

fn row_to_enrollment(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    let transition_status = match row.get::<_, Option<String>>(7)? {
        Some(code) => Some(TransitionStatus::parse(&code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                Type::Text,
                format!("unknown transition status '{code}'").into(),
            )
        })?),
        None => None,
    };
    let state_code: String = row.get(10)?;
    let state = EnrollmentState::parse(&state_code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            Type::Text,
            format!("unknown enrollment state '{state_code}'").into(),
        )
    })?;

    Ok(Enrollment {
        id: EnrollmentId(row.get(0)?),
        source_class_id: ClassId(row.get(1)?),
        student_id: StudentId(row.get(2)?),
        target_year: row.get(3)?,
        target_class_id: row.get::<_, Option<String>>(4)?.map(ClassId),
        target_grade_label: row.get(5)?,
        general_average: row.get(6)?,
        transition_status,
        graded_subjects: row.get(8)?,
        mandatory_subjects: row.get(9)?,
        state,
        exam_grade: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl SchoolDirectory for SqliteSchoolStore {
    fn class(&self, id: &ClassId) -> Result<Option<SchoolClass>, RepositoryError> {
        let conn = self.lock()?;
        let class = conn
            .query_row(
                "SELECT id, name, academic_year, education_level, grade_label
                 FROM classes WHERE id = ?1",
                params![id.0],
                row_to_class,
            )
            .optional()?;
        Ok(class)
    }

    fn roster(&self, class_id: &ClassId) -> Result<Vec<RosterEntry>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT student_id, student_name, active FROM class_students
             WHERE class_id = ?1 ORDER BY student_name, student_id",
        )?;
        let rows = stmt.query_map(params![class_id.0], |row| {
            Ok(RosterEntry {
                student_id: StudentId(row.get(0)?),
                student_name: row.get(1)?,
                active: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn mandatory_subjects(&self, class_id: &ClassId) -> Result<Vec<SubjectId>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT subject_id FROM class_subjects
             WHERE class_id = ?1 AND mandatory = 1 ORDER BY subject_id",
        )?;
        let rows = stmt.query_map(params![class_id.0], |row| Ok(SubjectId(row.get(0)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn final_grades(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        subjects: &[SubjectId],
    ) -> Result<Vec<SubjectFinal>, RepositoryError> {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..subjects.len())
            .map(|index| format!("?{}", index + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT subject_id, grade FROM final_grades
             WHERE student_id = ?1 AND class_id = ?2 AND subject_id IN ({placeholders})
             ORDER BY subject_id"
        );

        let mut values: Vec<&str> = vec![student_id.0.as_str(), class_id.0.as_str()];
        values.extend(subjects.iter().map(|subject| subject.0.as_str()));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok(SubjectFinal {
                subject_id: SubjectId(row.get(0)?),
                grade: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn classes_for_year(&self, academic_year: &str) -> Result<Vec<SchoolClass>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, academic_year, education_level, grade_label
             FROM classes WHERE academic_year = ?1 ORDER BY name, id",
        )?;
        let rows = stmt.query_map(params![academic_year], row_to_class)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl EnrollmentRepository for SqliteSchoolStore {
    fn insert_missing(
        &self,
        batch: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let mut inserted = Vec::new();

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO enrollments (
                    id, source_class_id, student_id, target_year, target_class_id,
                    target_grade_label, general_average, transition_status, graded_subjects,
                    mandatory_subjects, state, exam_grade, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;

            for row in batch {
                let record = row.into_record(now);
                let changed = stmt.execute(params![
                    record.id.0,
                    record.source_class_id.0,
                    record.student_id.0,
                    record.target_year,
                    record.target_class_id.as_ref().map(|id| id.0.as_str()),
                    record.target_grade_label,
                    record.general_average,
                    record.transition_status.map(TransitionStatus::code),
                    record.graded_subjects,
                    record.mandatory_subjects,
                    record.state.code(),
                    record.exam_grade,
                    record.created_at,
                    record.updated_at,
                ])?;
                if changed == 1 {
                    inserted.push(record);
                }
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn fetch(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        let conn = self.lock()?;
        Self::fetch_with(&conn, id)
    }

    fn list(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(class_id) = &filter.source_class_id {
            values.push(class_id.0.clone());
            clauses.push(format!("source_class_id = ?{}", values.len()));
        }
        if let Some(year) = &filter.target_year {
            values.push(year.clone());
            clauses.push(format!("target_year = ?{}", values.len()));
        }
        if let Some(state) = filter.state {
            values.push(state.code().to_string());
            clauses.push(format!("state = ?{}", values.len()));
        }
        if let Some(status) = filter.transition {
            values.push(status.code().to_string());
            clauses.push(format!("transition_status = ?{}", values.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments {where_clause}
             ORDER BY source_class_id, target_year, student_id"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_enrollment)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn update_classification(
        &self,
        id: &EnrollmentId,
        classification: &Classification,
    ) -> Result<Enrollment, RepositoryError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE enrollments SET
                general_average = ?2,
                transition_status = ?3,
                target_grade_label = ?4,
                graded_subjects = ?5,
                mandatory_subjects = ?6,
                updated_at = ?7
             WHERE id = ?1 AND state = ?8",
            params![
                id.0,
                classification.general_average,
                classification.transition_status.map(TransitionStatus::code),
                classification.target_grade_label,
                classification.graded_subjects,
                classification.mandatory_subjects,
                Utc::now(),
                EnrollmentState::Pendente.code(),
            ],
        )?;
        let record = Self::fetch_with(&conn, id)?.ok_or(RepositoryError::NotFound)?;
        if changed == 0 {
            return Err(RepositoryError::StaleState {
                expected: EnrollmentState::Pendente,
                found: record.state,
            });
        }
        Ok(record)
    }

    fn transition(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentState,
        change: StateChange,
    ) -> Result<Enrollment, RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut record = Self::fetch_with(&tx, id)?.ok_or(RepositoryError::NotFound)?;
        if record.state != expected {
            return Err(RepositoryError::StaleState {
                expected,
                found: record.state,
            });
        }
        apply_change(&mut record, change, Utc::now());

        let changed = tx.execute(
            "UPDATE enrollments SET
                state = ?3,
                target_class_id = ?4,
                target_grade_label = ?5,
                general_average = ?6,
                transition_status = ?7,
                graded_subjects = ?8,
                mandatory_subjects = ?9,
                exam_grade = ?10,
                updated_at = ?11
             WHERE id = ?1 AND state = ?2",
            params![
                record.id.0,
                expected.code(),
                record.state.code(),
                record.target_class_id.as_ref().map(|id| id.0.as_str()),
                record.target_grade_label,
                record.general_average,
                record.transition_status.map(TransitionStatus::code),
                record.graded_subjects,
                record.mandatory_subjects,
                record.exam_grade,
                record.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::Conflict);
        }

        tx.commit()?;
        Ok(record)
    }
}
