use crate::infra::print_summary;
use clap::Args;
use school_enrollment::error::AppError;
use school_enrollment::i18n::{t, t_with_args};
use school_enrollment::workflows::enrollment::{
    ActorContext, ClassId, ClassYearRequest, ClassificationPolicy, ConfirmRequest,
    EnrollmentFilter, EnrollmentService, EnrollmentView, ExamResultRequest, MemorySchoolStore,
    RepositoryError, SchoolClass, StaffRole, StudentId, SubjectId,
};
use std::sync::Arc;

pub(crate) const SOURCE_CLASS: &str = "turma-9a";
const PROMOTED_CLASS: &str = "turma-10a";
const REPEAT_CLASS: &str = "turma-9b";
const SUBJECTS: [&str; 4] = ["portugues", "matematica", "ingles", "ciencias"];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of students in the source class
    #[arg(long, default_value_t = 30)]
    pub(crate) students: usize,
    /// Destination academic year
    #[arg(long, default_value = "2025/2026")]
    pub(crate) year: String,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { students, year } = args;

    let store = Arc::new(MemorySchoolStore::default());
    seed_school(&store, students, &year)?;
    let policy = ClassificationPolicy {
        conditional_mark: Some(8.0),
        ..ClassificationPolicy::default()
    };
    let service = EnrollmentService::new(store.clone(), store.clone(), policy);
    let actor = ActorContext::new("demo-secretaria", StaffRole::Secretariat);
    let request = ClassYearRequest::new(SOURCE_CLASS, year.clone());

    println!("School enrollment demo");
    println!(
        "Source class {} ({}) -> academic year {}",
        SOURCE_CLASS,
        previous_year(&year),
        year
    );

    let report = service.generate(&actor, &request)?;
    println!(
        "\n{}",
        t_with_args(
            "enrollment.generated",
            &[("count", &report.created.to_string())]
        )
    );
    println!(
        "- inactive students skipped: {} | unclassified: {}",
        report.inactive, report.unclassified
    );
    let rerun = service.generate(&actor, &request)?;
    println!(
        "- second run: {} created, {} already enrolled",
        rerun.created, rerun.skipped
    );

    let filter =
        EnrollmentFilter::for_class_year(ClassId(SOURCE_CLASS.to_string()), year.clone());
    for record in service.list(&actor, &filter)? {
        let requires_exam = record
            .transition_status
            .is_some_and(|status| service.policy().requires_exam(status));

        if requires_exam {
            service.send_to_exam(&actor, &record.id)?;
            let exam_grade = record
                .general_average
                .map_or(10.0, |average| (average + 2.0).min(20.0));
            let destination = if exam_grade >= service.policy().pass_mark {
                PROMOTED_CLASS
            } else {
                REPEAT_CLASS
            };
            service.record_exam_result(
                &actor,
                &record.id,
                &ExamResultRequest {
                    exam_grade,
                    destination_class_id: destination.to_string(),
                },
            )?;
            continue;
        }

        let options = service.destination_options(&actor, &record.id)?;
        let Some(choice) = options
            .iter()
            .find(|option| option.matches_grade)
            .or_else(|| options.iter().find(|option| option.class.id.0 == REPEAT_CLASS))
        else {
            println!("  No destination available for {}", record.student_id);
            continue;
        };
        service.confirm(
            &actor,
            &record.id,
            &ConfirmRequest {
                destination_class_id: choice.class.id.0.clone(),
            },
        )?;
    }

    println!("\nEnrollments");
    for record in service.list(&actor, &filter)? {
        let view = EnrollmentView::from(&record);
        let average = view
            .general_average
            .map_or_else(|| "--".to_string(), |value| format!("{value:.2}"));
        let exam = view
            .exam_grade
            .map(|grade| format!(" | exam {grade:.1}"))
            .unwrap_or_default();
        println!(
            "- {}: avg {} | {} | {} -> {}{}",
            view.student_id,
            average,
            view.transition_label,
            view.state_label,
            view.target_class_id
                .as_ref()
                .map_or_else(|| t("enrollment.state.pendente"), |id| id.0.clone()),
            exam
        );
    }

    print_summary(&service.summary(&actor, &request)?);
    Ok(())
}

/// Seed the demo school: one source class with `students` students and three
/// destination classes in `target_year`. Every tenth student has no finals.
pub(crate) fn seed_school(
    store: &MemorySchoolStore,
    students: usize,
    target_year: &str,
) -> Result<(), RepositoryError> {
    let source = ClassId(SOURCE_CLASS.to_string());
    store.add_class(school_class(SOURCE_CLASS, &previous_year(target_year), "9º"))?;
    store.add_class(school_class(PROMOTED_CLASS, target_year, "10º"))?;
    store.add_class(school_class("turma-10b", target_year, "10º"))?;
    store.add_class(school_class(REPEAT_CLASS, target_year, "9º"))?;

    let subjects: Vec<SubjectId> = SUBJECTS
        .iter()
        .map(|code| SubjectId(code.to_string()))
        .collect();
    store.set_mandatory_subjects(&source, subjects.clone())?;

    for index in 1..=students {
        let student = StudentId(format!("aluno-{index:03}"));
        store.add_student(&source, student.clone(), format!("Aluno {index}"), true)?;
        if index % 10 == 0 {
            continue;
        }
        let base = 6.0 + ((index * 7) % 11) as f64;
        for (offset, subject) in subjects.iter().enumerate() {
            let spread = [0.0, 1.0, -1.0, 0.0][offset % 4];
            store.record_final(&student, &source, subject.clone(), base + spread)?;
        }
    }
    Ok(())
}

fn school_class(id: &str, year: &str, grade: &str) -> SchoolClass {
    SchoolClass {
        id: ClassId(id.to_string()),
        name: id.trim_start_matches("turma-").to_uppercase(),
        academic_year: year.to_string(),
        education_level: "Ensino Básico".to_string(),
        grade_label: grade.to_string(),
    }
}

/// "2025/2026" -> "2024/2025"; single years step back by one.
fn previous_year(year: &str) -> String {
    let parts: Vec<Option<i32>> = year
        .split('/')
        .map(|part| part.trim().parse().ok())
        .collect();
    match parts.as_slice() {
        [Some(start), Some(end)] => format!("{}/{}", start - 1, end - 1),
        [Some(single)] => (single - 1).to_string(),
        _ => format!("{year} (anterior)"),
    }
}
