use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::i18n::{t, t_with_args};

use super::domain::{
    ActorContext, ClassId, Enrollment, EnrollmentFilter, EnrollmentId, EnrollmentState, StaffRole,
    TransitionStatus,
};
use super::report::EnrollmentView;
use super::repository::{EnrollmentRepository, RepositoryError, SchoolDirectory};
use super::service::{
    ClassYearRequest, ConfirmRequest, EnrollmentService, EnrollmentServiceError,
    ExamResultRequest,
};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type SharedService<S, D> = Arc<EnrollmentService<S, D>>;

/// Router builder exposing the enrollment workflow over HTTP.
pub fn enrollment_router<S, D>(service: SharedService<S, D>) -> Router
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    Router::new()
        .route("/api/v1/enrollments", get(list_handler::<S, D>))
        .route(
            "/api/v1/enrollments/generate",
            post(generate_handler::<S, D>),
        )
        .route(
            "/api/v1/enrollments/classify",
            post(classify_handler::<S, D>),
        )
        .route(
            "/api/v1/enrollments/summary",
            get(summary_handler::<S, D>),
        )
        .route("/api/v1/enrollments/:id", get(get_handler::<S, D>))
        .route(
            "/api/v1/enrollments/:id/destinations",
            get(destinations_handler::<S, D>),
        )
        .route(
            "/api/v1/enrollments/:id/confirm",
            post(confirm_handler::<S, D>),
        )
        .route(
            "/api/v1/enrollments/:id/exam",
            post(send_to_exam_handler::<S, D>),
        )
        .route(
            "/api/v1/enrollments/:id/exam-result",
            post(exam_result_handler::<S, D>),
        )
        .with_state(service)
}

/// Query string accepted by the listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub source_class_id: Option<String>,
    pub target_year: Option<String>,
    pub state: Option<String>,
    pub transition: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<EnrollmentFilter, Response> {
        let state = match non_empty(self.state) {
            Some(raw) => Some(EnrollmentState::parse(&raw).ok_or_else(|| {
                error_body(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation",
                    t_with_args("enrollment.errors.unknown_state", &[("value", &raw)]),
                )
            })?),
            None => None,
        };
        let transition = match non_empty(self.transition) {
            Some(raw) => Some(TransitionStatus::parse(&raw).ok_or_else(|| {
                error_body(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation",
                    t_with_args("enrollment.errors.unknown_transition", &[("value", &raw)]),
                )
            })?),
            None => None,
        };

        Ok(EnrollmentFilter {
            source_class_id: non_empty(self.source_class_id).map(ClassId),
            target_year: non_empty(self.target_year),
            state,
            transition,
        })
    }
}

fn read_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| invalid_request(&rejection.body_text()))
}

fn read_query<T>(payload: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    payload
        .map(|Query(value)| value)
        .map_err(|rejection| invalid_request(&rejection.body_text()))
}

fn invalid_request(detail: &str) -> Response {
    error_body(
        StatusCode::UNPROCESSABLE_ENTITY,
        "validation",
        t_with_args("enrollment.errors.invalid_request", &[("detail", detail)]),
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

pub(crate) async fn generate_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    payload: Result<Json<ClassYearRequest>, JsonRejection>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = match read_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match service.generate(&actor, &request) {
        Ok(report) => {
            let message = t_with_args(
                "enrollment.generated",
                &[("count", &report.created.to_string())],
            );
            let payload = json!({ "message": message, "report": report });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn classify_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    payload: Result<Json<ClassYearRequest>, JsonRejection>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = match read_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match service.classify_pending(&actor, &request) {
        Ok(report) => {
            let message = t_with_args(
                "enrollment.classified",
                &[("count", &report.updated.to_string())],
            );
            let payload = json!({ "message": message, "report": report });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    payload: Result<Query<ListQuery>, QueryRejection>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let query = match read_query(payload) {
        Ok(query) => query,
        Err(response) => return response,
    };
    let filter = match query.into_filter() {
        Ok(filter) => filter,
        Err(response) => return response,
    };
    match service.list(&actor, &filter) {
        Ok(records) => {
            let views: Vec<EnrollmentView> = records.iter().map(EnrollmentView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn summary_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    payload: Result<Query<ClassYearRequest>, QueryRejection>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = match read_query(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match service.summary(&actor, &request) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.get(&actor, &EnrollmentId(id)) {
        Ok(record) => (StatusCode::OK, Json(EnrollmentView::from(&record))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn destinations_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.destination_options(&actor, &EnrollmentId(id)) {
        Ok(options) => (StatusCode::OK, Json(options)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn confirm_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = match read_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match service.confirm(&actor, &EnrollmentId(id), &request) {
        Ok(record) => transitioned(&record, "enrollment.confirmed"),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn send_to_exam_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.send_to_exam(&actor, &EnrollmentId(id)) {
        Ok(record) => transitioned(&record, "enrollment.sent_to_exam"),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn exam_result_handler<S, D>(
    State(service): State<SharedService<S, D>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<ExamResultRequest>, JsonRejection>,
) -> Response
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = match read_json(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match service.record_exam_result(&actor, &EnrollmentId(id), &request) {
        Ok(record) => transitioned(&record, "enrollment.exam_recorded"),
        Err(error) => error_response(error),
    }
}

fn transitioned(record: &Enrollment, message_key: &str) -> Response {
    let payload = json!({
        "message": t(message_key),
        "enrollment": EnrollmentView::from(record),
    });
    (StatusCode::OK, Json(payload)).into_response()
}

/// Read the acting user from the `x-actor-id` / `x-actor-role` headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<ActorContext, Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let (Some(actor_id), Some(raw_role)) = (header(ACTOR_ID_HEADER), header(ACTOR_ROLE_HEADER))
    else {
        return Err(error_body(
            StatusCode::UNAUTHORIZED,
            "missing_actor",
            t("enrollment.errors.missing_actor"),
        ));
    };
    let role = StaffRole::parse(raw_role).ok_or_else(|| {
        error_body(
            StatusCode::UNAUTHORIZED,
            "invalid_role",
            t_with_args("enrollment.errors.invalid_role", &[("role", raw_role)]),
        )
    })?;

    Ok(ActorContext::new(actor_id, role))
}

pub(crate) fn status_for(error: &EnrollmentServiceError) -> StatusCode {
    match error {
        EnrollmentServiceError::Validation(_)
        | EnrollmentServiceError::DestinationYearMismatch { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EnrollmentServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        EnrollmentServiceError::ClassNotFound(_)
        | EnrollmentServiceError::EnrollmentNotFound(_)
        | EnrollmentServiceError::DestinationNotFound(_)
        | EnrollmentServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        EnrollmentServiceError::InvalidTransition { .. }
        | EnrollmentServiceError::RequiresExam(_)
        | EnrollmentServiceError::Repository(RepositoryError::StaleState { .. })
        | EnrollmentServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        EnrollmentServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub(crate) fn error_response(error: EnrollmentServiceError) -> Response {
    error_body(status_for(&error), error.code(), error.user_message())
}

fn error_body(status: StatusCode, code: &str, message: String) -> Response {
    let payload = json!({
        "code": code,
        "error": message,
    });
    (status, Json(payload)).into_response()
}
