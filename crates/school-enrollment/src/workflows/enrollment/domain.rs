use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for enrollment records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnrollmentId(pub String);

impl EnrollmentId {
    pub fn generate() -> Self {
        Self(format!("mat-{}", uuid::Uuid::new_v4()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub String);

macro_rules! display_id {
    ($($name:ident),+) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_id!(EnrollmentId, ClassId, StudentId, SubjectId);

/// A class (turma) as exposed by the school directory. Destination choices
/// are drawn from the same catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolClass {
    pub id: ClassId,
    pub name: String,
    pub academic_year: String,
    pub education_level: String,
    pub grade_label: String,
}

/// One line of a class roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: StudentId,
    pub student_name: String,
    pub active: bool,
}

/// Final grade of a student for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectFinal {
    pub subject_id: SubjectId,
    pub grade: f64,
}

/// Academic outcome of the outgoing year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStatus {
    Transita,
    NaoTransita,
    Condicional,
}

impl TransitionStatus {
    pub const fn ordered() -> [Self; 3] {
        [Self::Transita, Self::Condicional, Self::NaoTransita]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Transita => "Transita",
            Self::NaoTransita => "Não Transita",
            Self::Condicional => "Condicional",
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Transita => "transita",
            Self::NaoTransita => "nao_transita",
            Self::Condicional => "condicional",
        }
    }

    /// Accepts wire codes as well as the display labels used by school staff.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "transita" => Some(Self::Transita),
            "nao_transita" | "não transita" | "nao transita" => Some(Self::NaoTransita),
            "condicional" => Some(Self::Condicional),
            _ => None,
        }
    }
}

/// Workflow status of an enrollment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    Pendente,
    AguardandoExame,
    Confirmada,
}

impl EnrollmentState {
    pub const fn ordered() -> [Self; 3] {
        [Self::Pendente, Self::AguardandoExame, Self::Confirmada]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pendente => "Pendente",
            Self::AguardandoExame => "Aguardando Exame",
            Self::Confirmada => "Confirmada",
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Pendente => "pendente",
            Self::AguardandoExame => "aguardando_exame",
            Self::Confirmada => "confirmada",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pendente" => Some(Self::Pendente),
            "aguardando_exame" => Some(Self::AguardandoExame),
            "confirmada" => Some(Self::Confirmada),
            _ => None,
        }
    }

    /// Forward-only transitions; `Confirmada` is terminal.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pendente, Self::Confirmada)
                | (Self::Pendente, Self::AguardandoExame)
                | (Self::AguardandoExame, Self::Confirmada)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmada)
    }
}

/// One student's candidacy from a source class into the next academic year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub source_class_id: ClassId,
    pub student_id: StudentId,
    pub target_year: String,
    pub target_class_id: Option<ClassId>,
    pub target_grade_label: Option<String>,
    pub general_average: Option<f64>,
    pub transition_status: Option<TransitionStatus>,
    pub graded_subjects: u32,
    pub mandatory_subjects: u32,
    pub state: EnrollmentState,
    pub exam_grade: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn key(&self) -> EnrollmentKey {
        EnrollmentKey {
            student_id: self.student_id.clone(),
            source_class_id: self.source_class_id.clone(),
            target_year: self.target_year.clone(),
        }
    }

    pub fn classification(&self) -> Classification {
        Classification {
            general_average: self.general_average,
            transition_status: self.transition_status,
            target_grade_label: self.target_grade_label.clone(),
            graded_subjects: self.graded_subjects,
            mandatory_subjects: self.mandatory_subjects,
        }
    }
}

/// Uniqueness key: one enrollment per student, source class and target year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnrollmentKey {
    pub student_id: StudentId,
    pub source_class_id: ClassId,
    pub target_year: String,
}

/// Computed fields written by generation and by the classification updater.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub general_average: Option<f64>,
    pub transition_status: Option<TransitionStatus>,
    pub target_grade_label: Option<String>,
    pub graded_subjects: u32,
    pub mandatory_subjects: u32,
}

/// Row prepared by the generator before it reaches the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEnrollment {
    pub source_class_id: ClassId,
    pub student_id: StudentId,
    pub target_year: String,
    pub classification: Classification,
}

impl NewEnrollment {
    pub fn key(&self) -> EnrollmentKey {
        EnrollmentKey {
            student_id: self.student_id.clone(),
            source_class_id: self.source_class_id.clone(),
            target_year: self.target_year.clone(),
        }
    }

    pub fn into_record(self, now: DateTime<Utc>) -> Enrollment {
        let Classification {
            general_average,
            transition_status,
            target_grade_label,
            graded_subjects,
            mandatory_subjects,
        } = self.classification;

        Enrollment {
            id: EnrollmentId::generate(),
            source_class_id: self.source_class_id,
            student_id: self.student_id,
            target_year: self.target_year,
            target_class_id: None,
            target_grade_label,
            general_average,
            transition_status,
            graded_subjects,
            mandatory_subjects,
            state: EnrollmentState::Pendente,
            exam_grade: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field changes applied together with a state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub state: EnrollmentState,
    pub target_class_id: Option<ClassId>,
    pub exam_grade: Option<f64>,
    pub classification: Option<Classification>,
}

/// Equality filters for listing enrollments. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentFilter {
    pub source_class_id: Option<ClassId>,
    pub target_year: Option<String>,
    pub state: Option<EnrollmentState>,
    pub transition: Option<TransitionStatus>,
}

impl EnrollmentFilter {
    pub fn for_class_year(source_class_id: ClassId, target_year: impl Into<String>) -> Self {
        Self {
            source_class_id: Some(source_class_id),
            target_year: Some(target_year.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &Enrollment) -> bool {
        self.source_class_id
            .as_ref()
            .map_or(true, |id| *id == record.source_class_id)
            && self
                .target_year
                .as_ref()
                .map_or(true, |year| *year == record.target_year)
            && self.state.map_or(true, |state| state == record.state)
            && self
                .transition
                .map_or(true, |status| Some(status) == record.transition_status)
    }
}

/// Staff roles recognised by the enrollment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Administrator,
    Secretariat,
    Teacher,
}

impl StaffRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "administrator" | "admin" => Some(Self::Administrator),
            "secretariat" | "secretaria" => Some(Self::Secretariat),
            "teacher" | "professor" => Some(Self::Teacher),
            _ => None,
        }
    }

    pub const fn allows(self, capability: Capability) -> bool {
        match capability {
            Capability::ViewEnrollments => true,
            Capability::ManageEnrollments => {
                matches!(self, Self::Administrator | Self::Secretariat)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewEnrollments,
    ManageEnrollments,
}

/// The acting user, passed explicitly to every workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: String,
    pub role: StaffRole,
}

impl ActorContext {
    pub fn new(actor_id: impl Into<String>, role: StaffRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            role,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.allows(capability)
    }
}

/// Increment the leading number of a grade label, keeping its suffix.
///
/// `"9º"` becomes `"10º"` and `"7ª Classe"` becomes `"8ª Classe"`. Labels
/// without a leading number have no successor.
pub fn next_grade_label(label: &str) -> Option<String> {
    let trimmed = label.trim();
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    let suffix = &trimmed[digits.len()..];
    Some(format!("{}{}", number.checked_add(1)?, suffix))
}
