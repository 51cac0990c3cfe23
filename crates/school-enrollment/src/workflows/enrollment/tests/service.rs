use std::sync::Arc;

use super::common::*;
use crate::i18n::{set_locale, LOCALE_TEST_LOCK};
use crate::workflows::enrollment::domain::{
    ClassId, Classification, EnrollmentFilter, EnrollmentId, EnrollmentState, StateChange,
    TransitionStatus,
};
use crate::workflows::enrollment::repository::{EnrollmentRepository, RepositoryError};
use crate::workflows::enrollment::{
    ClassYearRequest, ClassificationPolicy, ConfirmRequest, EnrollmentService,
    EnrollmentServiceError, ExamResultRequest, MemorySchoolStore, ValidationError,
};

fn confirm_into(destination: &str) -> ConfirmRequest {
    ConfirmRequest {
        destination_class_id: destination.to_string(),
    }
}

fn exam_result(grade: f64, destination: &str) -> ExamResultRequest {
    ExamResultRequest {
        exam_grade: grade,
        destination_class_id: destination.to_string(),
    }
}

#[test]
fn generate_creates_one_pending_enrollment_per_student() {
    let store = school_with_students(30);
    let service = build_service(&store);

    let report = service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");

    assert_eq!(report.created, 30);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.unclassified, 0);

    let records = store
        .list(&EnrollmentFilter::for_class_year(
            ClassId(SOURCE_CLASS.to_string()),
            TARGET_YEAR,
        ))
        .expect("list succeeds");
    assert_eq!(records.len(), 30);
    assert!(records.iter().all(|r| r.state == EnrollmentState::Pendente));
    assert!(records
        .iter()
        .all(|r| r.transition_status == Some(TransitionStatus::Transita)));
    assert!(records
        .iter()
        .all(|r| r.target_grade_label.as_deref() == Some("10º") && r.target_class_id.is_none()));
}

#[test]
fn generate_is_idempotent() {
    let store = school_with_students(30);
    let service = build_service(&store);

    service
        .generate(&secretary(), &source_request())
        .expect("first run succeeds");
    let rerun = service
        .generate(&secretary(), &source_request())
        .expect("second run succeeds");

    assert_eq!(rerun.created, 0);
    assert_eq!(rerun.skipped, 30);
    assert_eq!(store.enrollment_count().expect("count"), 30);
}

#[test]
fn generate_only_adds_missing_students() {
    let store = school_with_students(2);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("first run succeeds");

    enroll_with_finals(&store, 3, &[10.0, 10.0, 10.0]);
    let report = service
        .generate(&secretary(), &source_request())
        .expect("second run succeeds");

    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(store.enrollment_count().expect("count"), 3);
}

#[test]
fn generate_skips_inactive_students() {
    let store = school_with_students(2);
    store
        .add_student(
            &ClassId(SOURCE_CLASS.to_string()),
            student(9),
            "Aluno transferido",
            false,
        )
        .expect("seed inactive student");
    let service = build_service(&store);

    let report = service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");

    assert_eq!(report.created, 2);
    assert_eq!(report.inactive, 1);
}

#[test]
fn class_without_subjects_yields_unclassified_enrollments() {
    let store = school_with_students(3);
    store
        .set_mandatory_subjects(&ClassId(SOURCE_CLASS.to_string()), Vec::new())
        .expect("clear subjects");
    let service = build_service(&store);

    let report = service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");

    assert_eq!(report.created, 3);
    assert_eq!(report.unclassified, 3);
    let records = store.list(&EnrollmentFilter::default()).expect("list");
    assert!(records
        .iter()
        .all(|r| r.general_average.is_none() && r.transition_status.is_none()));
}

#[test]
fn generation_rejects_empty_selection_before_touching_storage() {
    let directory = Arc::new(school());
    let service = EnrollmentService::new(
        Arc::new(UnavailableStore),
        directory,
        ClassificationPolicy::default(),
    );

    match service.generate(&secretary(), &ClassYearRequest::new("  ", TARGET_YEAR)) {
        Err(EnrollmentServiceError::Validation(ValidationError::MissingSourceClass)) => {}
        other => panic!("expected missing source class, got {other:?}"),
    }
    match service.generate(&secretary(), &ClassYearRequest::new(SOURCE_CLASS, "")) {
        Err(EnrollmentServiceError::Validation(ValidationError::MissingTargetYear)) => {}
        other => panic!("expected missing target year, got {other:?}"),
    }
}

#[test]
fn generation_reports_unknown_source_class() {
    let store = school();
    let service = build_service(&store);

    match service.generate(&secretary(), &ClassYearRequest::new("turma-xx", TARGET_YEAR)) {
        Err(EnrollmentServiceError::ClassNotFound(id)) => assert_eq!(id.0, "turma-xx"),
        other => panic!("expected class not found, got {other:?}"),
    }
}

#[test]
fn teachers_cannot_generate_but_can_read() {
    let store = school_with_students(2);
    let service = build_service(&store);

    match service.generate(&teacher(), &source_request()) {
        Err(EnrollmentServiceError::Forbidden { actor_id, .. }) => assert_eq!(actor_id, "prof-07"),
        other => panic!("expected forbidden, got {other:?}"),
    }
    assert_eq!(store.enrollment_count().expect("count"), 0);

    service
        .generate(&secretary(), &source_request())
        .expect("secretariat may generate");
    let listed = service
        .list(&teacher(), &EnrollmentFilter::default())
        .expect("teachers may list");
    assert_eq!(listed.len(), 2);
}

#[test]
fn directory_failure_aborts_the_whole_batch() {
    let store = school_with_students(5);
    let directory = Arc::new(FlakyDirectory::new(store.clone(), 4));
    let service = EnrollmentService::new(
        Arc::new(store.clone()),
        directory.clone(),
        ClassificationPolicy::default(),
    );

    match service.generate(&secretary(), &source_request()) {
        Err(EnrollmentServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected unavailable directory, got {other:?}"),
    }
    assert_eq!(directory.calls(), 4);
    assert_eq!(store.enrollment_count().expect("count"), 0);
}

#[test]
fn store_failure_surfaces_as_repository_error() {
    let service = EnrollmentService::new(
        Arc::new(UnavailableStore),
        Arc::new(school_with_students(1)),
        ClassificationPolicy::default(),
    );

    match service.generate(&secretary(), &source_request()) {
        Err(err @ EnrollmentServiceError::Repository(RepositoryError::Unavailable(_))) => {
            assert_eq!(err.code(), "unavailable");
        }
        other => panic!("expected unavailable store, got {other:?}"),
    }
}

#[test]
fn confirm_assigns_destination_and_is_final() {
    let store = school_with_students(1);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);

    let confirmed = service
        .confirm(&secretary(), &record.id, &confirm_into("turma-10a"))
        .expect("confirmation succeeds");

    assert_eq!(confirmed.state, EnrollmentState::Confirmada);
    assert_eq!(
        confirmed.target_class_id,
        Some(ClassId("turma-10a".to_string()))
    );

    match service.confirm(&secretary(), &record.id, &confirm_into("turma-10b")) {
        Err(EnrollmentServiceError::InvalidTransition { from, to }) => {
            assert_eq!(from, EnrollmentState::Confirmada);
            assert_eq!(to, EnrollmentState::Confirmada);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    match service.send_to_exam(&secretary(), &record.id) {
        Err(EnrollmentServiceError::InvalidTransition { .. }) => {}
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn confirm_validates_destination() {
    let store = school_with_students(1);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);

    match service.confirm(&secretary(), &record.id, &confirm_into(" ")) {
        Err(EnrollmentServiceError::Validation(ValidationError::MissingDestination)) => {}
        other => panic!("expected missing destination, got {other:?}"),
    }
    match service.confirm(&secretary(), &record.id, &confirm_into("turma-zz")) {
        Err(EnrollmentServiceError::DestinationNotFound(_)) => {}
        other => panic!("expected destination not found, got {other:?}"),
    }
    match service.confirm(&secretary(), &record.id, &confirm_into("turma-10c-old")) {
        Err(EnrollmentServiceError::DestinationYearMismatch { expected, found }) => {
            assert_eq!(expected, TARGET_YEAR);
            assert_eq!(found, SOURCE_YEAR);
        }
        other => panic!("expected year mismatch, got {other:?}"),
    }
    assert_eq!(only_enrollment(&store).state, EnrollmentState::Pendente);
}

#[test]
fn conditional_students_go_through_the_exam() {
    let store = school();
    enroll_with_finals(&store, 1, &[9.0, 9.0, 9.0]);
    let service = build_service_with_policy(&store, conditional_policy());
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);
    assert_eq!(record.transition_status, Some(TransitionStatus::Condicional));

    match service.confirm(&secretary(), &record.id, &confirm_into("turma-10a")) {
        Err(EnrollmentServiceError::RequiresExam(TransitionStatus::Condicional)) => {}
        other => panic!("expected exam requirement, got {other:?}"),
    }

    let waiting = service
        .send_to_exam(&secretary(), &record.id)
        .expect("send to exam");
    assert_eq!(waiting.state, EnrollmentState::AguardandoExame);

    match service.confirm(&secretary(), &record.id, &confirm_into("turma-10a")) {
        Err(EnrollmentServiceError::InvalidTransition { from, .. }) => {
            assert_eq!(from, EnrollmentState::AguardandoExame)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    let confirmed = service
        .record_exam_result(&secretary(), &record.id, &exam_result(12.0, "turma-10a"))
        .expect("exam result recorded");
    assert_eq!(confirmed.state, EnrollmentState::Confirmada);
    assert_eq!(confirmed.exam_grade, Some(12.0));
    assert_eq!(confirmed.transition_status, Some(TransitionStatus::Transita));
    assert_eq!(confirmed.general_average, Some(9.0));
    assert_eq!(confirmed.target_grade_label.as_deref(), Some("10º"));
}

#[test]
fn failed_exam_keeps_student_in_grade() {
    let store = school();
    enroll_with_finals(&store, 1, &[9.0, 9.0, 9.0]);
    let service = build_service_with_policy(&store, conditional_policy());
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);
    service
        .send_to_exam(&secretary(), &record.id)
        .expect("send to exam");

    let confirmed = service
        .record_exam_result(&secretary(), &record.id, &exam_result(7.0, "turma-9b"))
        .expect("exam result recorded");

    assert_eq!(confirmed.transition_status, Some(TransitionStatus::NaoTransita));
    assert_eq!(confirmed.target_grade_label.as_deref(), Some("9º"));
    assert_eq!(
        confirmed.target_class_id,
        Some(ClassId("turma-9b".to_string()))
    );
}

#[test]
fn exam_result_requires_waiting_state_and_valid_grade() {
    let store = school_with_students(1);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);

    match service.record_exam_result(&secretary(), &record.id, &exam_result(25.0, "turma-10a")) {
        Err(EnrollmentServiceError::Validation(ValidationError::ExamGradeOutOfScale {
            max, ..
        })) => assert_eq!(max, 20.0),
        other => panic!("expected out of scale grade, got {other:?}"),
    }
    match service.record_exam_result(&secretary(), &record.id, &exam_result(14.0, "turma-10a")) {
        Err(EnrollmentServiceError::InvalidTransition { from, to }) => {
            assert_eq!(from, EnrollmentState::Pendente);
            assert_eq!(to, EnrollmentState::Confirmada);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn any_pending_enrollment_may_be_sent_to_exam() {
    let store = school_with_students(1);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);

    let waiting = service
        .send_to_exam(&secretary(), &record.id)
        .expect("transita records may still sit the exam");
    assert_eq!(waiting.state, EnrollmentState::AguardandoExame);
}

#[test]
fn unknown_enrollment_is_reported() {
    let store = school();
    let service = build_service(&store);
    let id = EnrollmentId("mat-missing".to_string());

    match service.send_to_exam(&secretary(), &id) {
        Err(EnrollmentServiceError::EnrollmentNotFound(found)) => assert_eq!(found, id),
        other => panic!("expected not found, got {other:?}"),
    }
    assert!(matches!(
        service.get(&teacher(), &id),
        Err(EnrollmentServiceError::EnrollmentNotFound(_))
    ));
}

#[test]
fn list_filters_by_state() {
    let store = school_with_students(4);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let records = store.list(&EnrollmentFilter::default()).expect("list");
    service
        .confirm(&secretary(), &records[0].id, &confirm_into("turma-10a"))
        .expect("confirm first");
    service
        .confirm(&secretary(), &records[1].id, &confirm_into("turma-10b"))
        .expect("confirm second");

    let confirmed = service
        .list(
            &teacher(),
            &EnrollmentFilter {
                state: Some(EnrollmentState::Confirmada),
                ..EnrollmentFilter::for_class_year(
                    ClassId(SOURCE_CLASS.to_string()),
                    TARGET_YEAR,
                )
            },
        )
        .expect("list succeeds");

    assert_eq!(confirmed.len(), 2);
    assert!(confirmed
        .iter()
        .all(|r| r.state == EnrollmentState::Confirmada));
}

#[test]
fn summary_counts_states_and_statuses() {
    let store = school();
    enroll_with_finals(&store, 1, &[12.0, 14.0, 16.0]);
    enroll_with_finals(&store, 2, &[8.0, 9.0, 7.0]);
    enroll_with_finals(&store, 3, &[]);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let first = store
        .list(&EnrollmentFilter::default())
        .expect("list")
        .into_iter()
        .find(|r| r.student_id == student(1))
        .expect("student 1 enrolled");
    service
        .confirm(&secretary(), &first.id, &confirm_into("turma-10a"))
        .expect("confirm");

    let summary = service
        .summary(&teacher(), &source_request())
        .expect("summary succeeds");

    assert_eq!(summary.total, 3);
    assert_eq!(summary.state_count(EnrollmentState::Pendente), 2);
    assert_eq!(summary.state_count(EnrollmentState::Confirmada), 1);
    assert_eq!(summary.state_count(EnrollmentState::AguardandoExame), 0);
    assert_eq!(summary.transition_count(Some(TransitionStatus::Transita)), 1);
    assert_eq!(
        summary.transition_count(Some(TransitionStatus::NaoTransita)),
        1
    );
    assert_eq!(summary.transition_count(None), 1);
    assert_eq!(summary.states.len(), 3);
    assert_eq!(summary.transitions.len(), 4);
    assert_eq!(summary.class_average, Some(11.0));
}

#[test]
fn classify_pending_refreshes_only_pending_records() {
    let store = school();
    for index in 1..=3 {
        enroll_with_finals(&store, index, &[]);
    }
    let service = build_service(&store);
    let generated = service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    assert_eq!(generated.unclassified, 3);

    let records = store.list(&EnrollmentFilter::default()).expect("list");
    service
        .confirm(&secretary(), &records[0].id, &confirm_into("turma-10a"))
        .expect("unclassified records may be confirmed");

    let class_id = ClassId(SOURCE_CLASS.to_string());
    for index in 1..=3 {
        for (subject, grade) in subjects().into_iter().zip([14.0, 15.0, 16.0]) {
            store
                .record_final(&student(index), &class_id, subject, grade)
                .expect("late final");
        }
    }

    let report = service
        .classify_pending(&secretary(), &source_request())
        .expect("classification succeeds");
    assert_eq!(report.updated, 2);
    assert_eq!(report.unclassified, 0);

    let refreshed = store.list(&EnrollmentFilter::default()).expect("list");
    let confirmed = refreshed
        .iter()
        .find(|r| r.id == records[0].id)
        .expect("confirmed record");
    assert_eq!(confirmed.general_average, None);
    assert!(refreshed
        .iter()
        .filter(|r| r.state == EnrollmentState::Pendente)
        .all(|r| r.general_average == Some(15.0)
            && r.transition_status == Some(TransitionStatus::Transita)));
}

#[test]
fn interrupted_classification_keeps_progress_and_resumes() {
    let store = school();
    for index in 1..=3 {
        enroll_with_finals(&store, index, &[]);
    }
    let healthy = build_service(&store);
    let generated = healthy
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    assert_eq!(generated.unclassified, 3);

    let class_id = ClassId(SOURCE_CLASS.to_string());
    for index in 1..=3 {
        for (subject, grade) in subjects().into_iter().zip([11.0, 12.0, 13.0]) {
            store
                .record_final(&student(index), &class_id, subject, grade)
                .expect("late final");
        }
    }

    let directory = Arc::new(FlakyDirectory::new(store.clone(), 2));
    let flaky = EnrollmentService::new(
        Arc::new(store.clone()),
        directory.clone(),
        ClassificationPolicy::default(),
    );
    match flaky.classify_pending(&secretary(), &source_request()) {
        Err(EnrollmentServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected unavailable directory, got {other:?}"),
    }
    assert_eq!(directory.calls(), 2);

    let classified = |store: &MemorySchoolStore| {
        store
            .list(&EnrollmentFilter::default())
            .expect("list")
            .iter()
            .filter(|r| r.general_average == Some(12.0))
            .count()
    };
    assert_eq!(classified(&store), 1);
    let untouched = store
        .list(&EnrollmentFilter::default())
        .expect("list")
        .into_iter()
        .filter(|r| r.general_average.is_none() && r.transition_status.is_none())
        .count();
    assert_eq!(untouched, 2);

    let report = healthy
        .classify_pending(&secretary(), &source_request())
        .expect("re-run succeeds");
    assert_eq!(report.updated, 3);
    assert_eq!(report.unclassified, 0);
    assert_eq!(classified(&store), 3);
}

#[test]
fn memory_store_keeps_classification_of_decided_records() {
    let store = school_with_students(1);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);
    service
        .confirm(&secretary(), &record.id, &confirm_into("turma-10a"))
        .expect("confirm");

    let outcome = store.update_classification(&record.id, &Classification::default());

    match outcome {
        Err(RepositoryError::StaleState { expected, found }) => {
            assert_eq!(expected, EnrollmentState::Pendente);
            assert_eq!(found, EnrollmentState::Confirmada);
        }
        other => panic!("expected stale state, got {other:?}"),
    }
    let stored = only_enrollment(&store);
    assert_eq!(stored.general_average, Some(14.0));
    assert_eq!(stored.transition_status, Some(TransitionStatus::Transita));
}

#[test]
fn selection_filter_trims_and_rejects_blank_values() {
    let filter = ClassYearRequest::new(format!(" {SOURCE_CLASS}"), format!("{TARGET_YEAR} "))
        .to_filter()
        .expect("valid selection");
    assert_eq!(filter.source_class_id, Some(ClassId(SOURCE_CLASS.to_string())));
    assert_eq!(filter.target_year.as_deref(), Some(TARGET_YEAR));

    assert_eq!(
        ClassYearRequest::new("  ", TARGET_YEAR).to_filter(),
        Err(ValidationError::MissingSourceClass)
    );
}

#[test]
fn classify_pending_requires_manage_capability() {
    let store = school_with_students(1);
    let service = build_service(&store);

    assert!(matches!(
        service.classify_pending(&teacher(), &source_request()),
        Err(EnrollmentServiceError::Forbidden { .. })
    ));
}

#[test]
fn destination_options_rank_matching_grade_first() {
    let store = school_with_students(1);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);

    let options = service
        .destination_options(&teacher(), &record.id)
        .expect("options listed");

    let ids: Vec<&str> = options.iter().map(|o| o.class.id.0.as_str()).collect();
    assert_eq!(ids, vec!["turma-10a", "turma-10b", "turma-9b"]);
    assert!(options[0].matches_grade && options[1].matches_grade);
    assert!(!options[2].matches_grade);
}

#[test]
fn store_rejects_transition_from_stale_state() {
    let store = school_with_students(1);
    let service = build_service(&store);
    service
        .generate(&secretary(), &source_request())
        .expect("generation succeeds");
    let record = only_enrollment(&store);
    service
        .send_to_exam(&secretary(), &record.id)
        .expect("send to exam");

    let outcome = store.transition(
        &record.id,
        EnrollmentState::Pendente,
        StateChange {
            state: EnrollmentState::Confirmada,
            target_class_id: Some(ClassId("turma-10a".to_string())),
            exam_grade: None,
            classification: None,
        },
    );

    match outcome {
        Err(RepositoryError::StaleState { expected, found }) => {
            assert_eq!(expected, EnrollmentState::Pendente);
            assert_eq!(found, EnrollmentState::AguardandoExame);
        }
        other => panic!("expected stale state, got {other:?}"),
    }
}

#[test]
fn errors_render_localized_messages() {
    let _guard = LOCALE_TEST_LOCK.lock().expect("locale mutex poisoned");
    let error = EnrollmentServiceError::InvalidTransition {
        from: EnrollmentState::Confirmada,
        to: EnrollmentState::AguardandoExame,
    };

    set_locale("en");
    let english = error.user_message();
    set_locale("pt-PT");
    let portuguese = error.user_message();

    assert!(english.contains("Confirmed") && english.contains("Awaiting Exam"));
    assert!(portuguese.contains("Confirmada"));
    assert_eq!(error.code(), "invalid_transition");

    let missing = EnrollmentServiceError::from(ValidationError::MissingSourceClass);
    assert_eq!(missing.code(), "validation");
    assert!(!missing.user_message().is_empty());
}
