use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::dates::{DateInput, DayKey};
use crate::engine::{EngineError, ResourceWrite};
use crate::limits::MAX_OCCUPATIONS_PER_WRITE;
use crate::model::*;
use crate::occupation::{mixed_days, parse_raw};
use crate::tenant::TenantManager;

pub const AGENCY_HEADER: &str = "x-agency-id";

pub type AppState = Arc<TenantManager>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/availability", post(check_availability))
        .route(
            "/resource/{id}",
            put(put_resource).get(get_resource).delete(delete_resource),
        )
        .route("/tours/{id}", put(put_tour).delete(delete_tour))
        .route("/bookings/{id}", put(put_booking).delete(delete_booking))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    MissingCaller,
    BadBody(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadBody(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(e) => match e {
                EngineError::InvalidInput { .. }
                | EngineError::InvalidDate { .. }
                | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                EngineError::Forbidden { .. } => StatusCode::FORBIDDEN,
                EngineError::WalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::MissingCaller => StatusCode::UNAUTHORIZED,
            ApiError::BadBody(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Engine(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, "request failed");
                }
                json!({ "error": e.to_string(), "field": e.field() })
            }
            ApiError::MissingCaller => json!({ "error": format!("missing {AGENCY_HEADER} header") }),
            ApiError::BadBody(msg) => json!({ "error": msg }),
        };
        (status, Json(body)).into_response()
    }
}

// ── Caller scope ─────────────────────────────────────────────────

/// The agency a request acts for, as resolved by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub AgencyId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AGENCY_HEADER)
            .ok_or(ApiError::MissingCaller)?;
        let agency = value
            .to_str()
            .map_err(|_| EngineError::invalid(AGENCY_HEADER, "not valid ASCII"))?;
        crate::tenant::validate_agency_id(agency)?;
        Ok(Caller(agency.to_string()))
    }
}

// ── Bodies ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResourceBody {
    pub kind: Option<ResourceKind>,
    pub name: Option<String>,
    pub occupations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MixedDayWarning {
    pub date: DayKey,
    #[serde(rename = "type")]
    pub block: OccupationType,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceView {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub name: Option<String>,
    pub occupations: Vec<Occupation>,
    pub warnings: Vec<MixedDayWarning>,
}

impl From<ResourceState> for ResourceView {
    fn from(rs: ResourceState) -> Self {
        let warnings = mixed_days(&rs.occupations)
            .into_iter()
            .map(|(date, block)| MixedDayWarning {
                date,
                block,
                message: format!("{date} is both in use and blocked ({block})"),
            })
            .collect();
        Self {
            id: rs.id,
            kind: rs.kind,
            name: rs.name,
            occupations: rs.occupations,
            warnings,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub itinerary: Vec<ItineraryDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingBody {
    pub tour_id: TourId,
    pub start_date: DateInput,
    pub end_date: DateInput,
    #[serde(default)]
    pub assigned_guides: Vec<AssignedGuide>,
}

// ── Handlers ─────────────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn check_availability(
    State(tm): State<AppState>,
    Caller(agency): Caller,
    body: Result<Json<AvailabilityRequest>, JsonRejection>,
) -> Result<Json<AvailabilityReport>, ApiError> {
    let Json(request) = body?;
    let report = tm.check_availability(&agency, &request).await?;
    Ok(Json(report))
}

pub async fn put_resource(
    State(tm): State<AppState>,
    Caller(agency): Caller,
    Path(id): Path<ResourceId>,
    body: Result<Json<ResourceBody>, JsonRejection>,
) -> Result<Json<ResourceView>, ApiError> {
    let Json(body) = body?;
    let engine = tm.get_or_create(&agency)?;

    let occupations = match body.occupations {
        Some(raw) if raw.len() > MAX_OCCUPATIONS_PER_WRITE => {
            return Err(EngineError::LimitExceeded("too many occupation entries").into());
        }
        Some(raw) => Some(parse_raw(&raw, tm.normalizer())?),
        None => None,
    };
    let stored = engine
        .write_resource(ResourceWrite {
            id,
            kind: body.kind,
            name: body.name,
            occupations,
        })
        .await?;
    Ok(Json(stored.into()))
}

pub async fn get_resource(
    State(tm): State<AppState>,
    Caller(agency): Caller,
    Path(id): Path<ResourceId>,
) -> Result<Json<ResourceView>, ApiError> {
    let rs = match tm.engine(&agency) {
        Some(engine) => engine.resource_snapshot(&id).await,
        None => None,
    };
    rs.map(|rs| Json(rs.into()))
        .ok_or_else(|| EngineError::not_found("resource", id).into())
}

pub async fn delete_resource(
    State(tm): State<AppState>,
    Caller(agency): Caller,
    Path(id): Path<ResourceId>,
) -> Result<StatusCode, ApiError> {
    let engine = tm
        .engine(&agency)
        .ok_or_else(|| EngineError::not_found("resource", id.clone()))?;
    engine.delete_resource(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn put_tour(
    State(tm): State<AppState>,
    Caller(agency): Caller,
    Path(id): Path<TourId>,
    body: Result<Json<TourBody>, JsonRejection>,
) -> Result<Json<Tour>, ApiError> {
    let Json(body) = body?;
    let tour = Tour {
        id,
        agency_id: agency.clone(),
        name: body.name,
        itinerary: body.itinerary,
    };
    tm.upsert_tour(&agency, tour.clone()).await?;
    Ok(Json(tour))
}

pub async fn delete_tour(
    State(tm): State<AppState>,
    Caller(agency): Caller,
    Path(id): Path<TourId>,
) -> Result<StatusCode, ApiError> {
    tm.delete_tour(&agency, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn put_booking(
    State(tm): State<AppState>,
    Caller(agency): Caller,
    Path(id): Path<BookingId>,
    body: Result<Json<BookingBody>, JsonRejection>,
) -> Result<Json<Booking>, ApiError> {
    let Json(body) = body?;
    let normalizer = tm.normalizer();
    let start_date = normalizer
        .to_day_key(&body.start_date)
        .map_err(|source| EngineError::InvalidDate {
            field: "startDate".into(),
            source,
        })?;
    let end_date = normalizer
        .to_day_key(&body.end_date)
        .map_err(|source| EngineError::InvalidDate {
            field: "endDate".into(),
            source,
        })?;
    let booking = Booking {
        id,
        tour_id: body.tour_id,
        agency_id: agency.clone(),
        start_date,
        end_date,
        assigned_guides: body.assigned_guides,
    };
    tm.upsert_booking(&agency, booking.clone()).await?;
    Ok(Json(booking))
}

pub async fn delete_booking(
    State(tm): State<AppState>,
    Caller(agency): Caller,
    Path(id): Path<BookingId>,
) -> Result<StatusCode, ApiError> {
    tm.remove_booking(&agency, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
