use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use clubhouse_db::queries::NewEvent;
use clubhouse_types::api::{
    Claims, EventDetailResponse, EventRequest, EventSummary, MyRegistration,
};
use clubhouse_types::models::Event;

use crate::convert;
use crate::error::ApiError;
use crate::middleware::require_admin;
use crate::state::{AppState, AppStateInner, blocking};

// -- Operations --

pub fn load_event(state: &AppStateInner, event_id: Uuid) -> Result<Event, ApiError> {
    state
        .db
        .get_event(&event_id.to_string())?
        .map(convert::event)
        .ok_or(ApiError::NotFound("event"))
}

fn load_summary(state: &AppStateInner, event_id: Uuid) -> Result<EventSummary, ApiError> {
    let event = load_event(state, event_id)?;
    let (confirmed_count, waitlist_count) = state.db.registration_counts(&event_id.to_string())?;
    Ok(EventSummary {
        event,
        confirmed_count,
        waitlist_count,
    })
}

pub fn create_event(state: &AppStateInner, actor: Uuid, req: EventRequest) -> Result<Event, ApiError> {
    require_admin(state, actor)?;
    validate(&req)?;

    let event_id = Uuid::new_v4();
    write_event(state, event_id, Some(actor), &req, false)?;
    info!("Event {} created: {}", event_id, req.title);
    load_event(state, event_id)
}

pub fn update_event(
    state: &AppStateInner,
    actor: Uuid,
    event_id: Uuid,
    req: EventRequest,
) -> Result<Event, ApiError> {
    require_admin(state, actor)?;
    validate(&req)?;

    write_event(state, event_id, None, &req, true)?;
    state.snapshots.invalidate(event_id);
    info!("Event {} updated by {}", event_id, actor);
    load_event(state, event_id)
}

pub fn list_events(state: &AppStateInner) -> Result<Vec<EventSummary>, ApiError> {
    let rows = state.db.list_events()?;
    let summaries = rows
        .into_iter()
        .map(convert::event)
        .map(|event| {
            let (confirmed_count, waitlist_count) =
                state.db.registration_counts(&event.id.to_string()).unwrap_or_else(|e| {
                    warn!("Counts unavailable for event {}: {}", event.id, e);
                    (0, 0)
                });
            EventSummary {
                event,
                confirmed_count,
                waitlist_count,
            }
        })
        .collect();
    Ok(summaries)
}

/// Event with counts plus the caller's own registration.
pub fn event_detail(
    state: &AppStateInner,
    user_id: Uuid,
    event_id: Uuid,
) -> Result<EventDetailResponse, ApiError> {
    let summary = state
        .snapshots
        .get_or_load(event_id, || load_summary(state, event_id))?;

    let my_registration = state
        .db
        .active_registration(&event_id.to_string(), &user_id.to_string())?
        .map(|row| {
            let plus_one = state
                .db
                .guest_for_registration(&row.id)
                .unwrap_or_else(|e| {
                    warn!("Guest lookup failed for registration {}: {}", row.id, e);
                    None
                })
                .map(convert::guest);
            MyRegistration {
                registration_id: convert::parse_id(&row.id, "registration id"),
                state: convert::flags(&row).state(),
                plus_one,
            }
        });

    Ok(EventDetailResponse {
        summary,
        my_registration,
    })
}

fn validate(req: &EventRequest) -> Result<(), ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    if req.price_cents.is_some_and(|p| p < 0) {
        return Err(ApiError::BadRequest("price cannot be negative".into()));
    }
    Ok(())
}

fn write_event(
    state: &AppStateInner,
    event_id: Uuid,
    created_by: Option<Uuid>,
    req: &EventRequest,
    update: bool,
) -> Result<(), ApiError> {
    let id = event_id.to_string();
    let created_by = created_by.map(|u| u.to_string());
    let starts_at = req.starts_at.map(|t| t.to_rfc3339());
    let tags = convert::tags_to_json(&req.tags);

    let row = NewEvent {
        id: &id,
        title: req.title.trim(),
        description: &req.description,
        starts_at: starts_at.as_deref(),
        capacity: req.capacity.map(i64::from),
        tags: &tags,
        pay_in_app: req.pay_in_app,
        price_cents: req.price_cents,
        payment_instructions: req.payment_instructions.as_deref(),
        created_by: created_by.as_deref(),
    };

    if update {
        if !state.db.update_event(&row)? {
            return Err(ApiError::NotFound("event"));
        }
    } else {
        state.db.insert_event(&row)?;
    }
    Ok(())
}

// -- Handlers --

/// GET /events
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let events = blocking(&state, list_events).await?;
    Ok(Json(events))
}

/// POST /events
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event = blocking(&state, move |s| create_event(s, claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// PUT /events/{event_id}
pub async fn update(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event = blocking(&state, move |s| update_event(s, claims.sub, event_id, req)).await?;
    Ok(Json(event))
}

/// GET /events/{event_id}
pub async fn detail(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = blocking(&state, move |s| event_detail(s, claims.sub, event_id)).await?;
    Ok(Json(detail))
}
