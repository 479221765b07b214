//! Rotas HTTP da recepção

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use clinic_queue::analytics::DailySummary;
use clinic_queue::models::ModeratorShift;
use clinic_queue::{
    Appointment, ClinicSettings, DetailsUpdate, PatientDetails, RoomKind, Session, Transition,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthSession;
use crate::build_info;
use crate::error::ApiError;
use crate::AppState;

/// Requisições simultâneas atendidas pelo serviço
const MAX_IN_FLIGHT: usize = 256;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/clinics/:clinic/queue", get(live_queue))
        .route("/clinics/:clinic/queue/stream", get(queue_stream))
        .route("/clinics/:clinic/queue/reorder", post(reorder))
        .route("/clinics/:clinic/appointments", post(book))
        .route("/clinics/:clinic/walk-ins", post(walk_in))
        .route("/appointments/:id/check-in", post(check_in))
        .route("/appointments/:id/exam", post(move_to_exam))
        .route("/appointments/:id/assistant", post(move_to_assistant))
        .route("/appointments/:id/complete", post(complete))
        .route("/appointments/:id/cancel", post(cancel))
        .route("/appointments/:id/details", patch(update_details))
        .route(
            "/clinics/:clinic/rooms/:room/calling",
            get(now_calling).put(set_calling),
        )
        .route("/clinics/:clinic/settings", get(settings).put(update_settings))
        .route("/clinics/:clinic/summary", get(daily_summary))
        .route("/clinics/:clinic/shifts", get(shifts))
        .route("/clinics/:clinic/shifts/start", post(start_shift))
        .route("/clinics/:clinic/shifts/end", post(end_shift))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A clínica do caminho precisa ser a da sessão
fn ensure_clinic(session: &Session, clinic: &str) -> Result<(), ApiError> {
    if session.clinic_id.as_str() == clinic {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Sessão não pertence à clínica {}",
            clinic
        )))
    }
}

/// Distingue campo ausente (`None`) de `null` explícito (`Some(None)`)
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate)]
pub struct PatientRequest {
    #[validate(length(min = 1, max = 200))]
    pub patient_name: String,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(max = 2000))]
    pub diagnosis: Option<String>,
    #[validate(range(min = 0))]
    pub payment_cents: Option<i64>,
}

impl PatientRequest {
    fn into_parts(self) -> (PatientDetails, Option<i64>) {
        (
            PatientDetails {
                patient_name: self.patient_name,
                phone: self.phone,
                notes: self.notes,
                diagnosis: self.diagnosis,
            },
            self.payment_cents,
        )
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct DetailsRequest {
    #[validate(length(min = 1, max = 200))]
    pub patient_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub diagnosis: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub payment_cents: Option<Option<i64>>,
}

impl DetailsRequest {
    fn touches_details(&self) -> bool {
        self.patient_name.is_some()
            || self.phone.is_some()
            || self.notes.is_some()
            || self.diagnosis.is_some()
    }

    /// Mescla os campos enviados sobre os dados atuais
    fn merge(self, current: &PatientDetails) -> DetailsUpdate {
        let details = self.touches_details().then(|| PatientDetails {
            patient_name: self
                .patient_name
                .clone()
                .unwrap_or_else(|| current.patient_name.clone()),
            phone: self.phone.clone().unwrap_or_else(|| current.phone.clone()),
            notes: self.notes.clone().unwrap_or_else(|| current.notes.clone()),
            diagnosis: self
                .diagnosis
                .clone()
                .unwrap_or_else(|| current.diagnosis.clone()),
        });
        DetailsUpdate {
            details,
            payment_cents: self.payment_cents,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub from_index: usize,
    pub to_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct CallingRequest {
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CallingResponse {
    pub room: RoomKind,
    pub appointment: Option<Appointment>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ShiftsQuery {
    pub moderator: Option<String>,
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": build_info::PKG_NAME,
        "version": build_info::PKG_VERSION,
    }))
}

async fn live_queue(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    Ok(Json(state.desk.live_queue(&session).await?))
}

/// Painel da fila em server-sent events: um evento `board` por mudança
async fn queue_stream(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    let feed = state.desk.subscribe_queue(&session)?;

    let events = stream::unfold(feed, |mut feed| async move {
        match feed.next_board().await {
            Ok(Some(board)) => Some((Event::default().event("board").json_data(&board).map_err(axum::Error::new), feed)),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Painel da fila interrompido");
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn reorder(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    let queue = state
        .desk
        .reorder(&session, request.from_index, request.to_index)
        .await?;
    Ok(Json(queue))
}

async fn book(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
    Json(request): Json<PatientRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    ensure_clinic(&session, &clinic)?;
    request.validate()?;
    let (details, payment_cents) = request.into_parts();
    let created = state.desk.book(&session, details, payment_cents).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn walk_in(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
    Json(request): Json<PatientRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    ensure_clinic(&session, &clinic)?;
    request.validate()?;
    let (details, payment_cents) = request.into_parts();
    let created = state.desk.walk_in(&session, details, payment_cents).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn check_in(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Transition>, ApiError> {
    Ok(Json(state.desk.check_in(&session, id).await?))
}

async fn move_to_exam(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Transition>, ApiError> {
    Ok(Json(state.desk.move_to_exam(&session, id).await?))
}

async fn move_to_assistant(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Transition>, ApiError> {
    Ok(Json(state.desk.move_to_assistant(&session, id).await?))
}

async fn complete(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Transition>, ApiError> {
    Ok(Json(state.desk.complete(&session, id).await?))
}

async fn cancel(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Transition>, ApiError> {
    Ok(Json(state.desk.cancel(&session, id).await?))
}

async fn update_details(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<Uuid>,
    Json(request): Json<DetailsRequest>,
) -> Result<Json<Appointment>, ApiError> {
    request.validate()?;
    if let Some(Some(cents)) = request.payment_cents {
        if cents < 0 {
            return Err(ApiError::Validation(
                "payment_cents não pode ser negativo".to_string(),
            ));
        }
    }

    let current = if request.touches_details() {
        state.desk.appointment(&session, id).await?.details
    } else {
        PatientDetails::default()
    };

    let update = request.merge(&current);
    Ok(Json(state.desk.update_details(&session, id, update).await?))
}

async fn now_calling(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path((clinic, room)): Path<(String, RoomKind)>,
) -> Result<Json<CallingResponse>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    let appointment = state.desk.now_calling(&session, room).await?;
    Ok(Json(CallingResponse { room, appointment }))
}

async fn set_calling(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path((clinic, room)): Path<(String, RoomKind)>,
    Json(request): Json<CallingRequest>,
) -> Result<StatusCode, ApiError> {
    ensure_clinic(&session, &clinic)?;
    state
        .desk
        .set_calling(&session, room, request.appointment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn settings(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
) -> Result<Json<ClinicSettings>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    Ok(Json(state.desk.settings(&session).await?))
}

async fn update_settings(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
    Json(request): Json<ClinicSettings>,
) -> Result<Json<ClinicSettings>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    Ok(Json(state.desk.update_settings(&session, request).await?))
}

async fn daily_summary(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<DailySummary>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(state.desk.daily_summary(&session, date).await?))
}

async fn shifts(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
    Query(query): Query<ShiftsQuery>,
) -> Result<Json<Vec<ModeratorShift>>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    let shifts = state
        .desk
        .shifts(&session, query.moderator.as_deref())
        .await?;
    Ok(Json(shifts))
}

async fn start_shift(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
) -> Result<(StatusCode, Json<ModeratorShift>), ApiError> {
    ensure_clinic(&session, &clinic)?;
    let shift = state.desk.start_shift(&session).await?;
    Ok((StatusCode::CREATED, Json(shift)))
}

async fn end_shift(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(clinic): Path<String>,
) -> Result<Json<ModeratorShift>, ApiError> {
    ensure_clinic(&session, &clinic)?;
    Ok(Json(state.desk.end_shift(&session).await?))
}
