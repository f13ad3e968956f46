use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use clubhouse_db::models::RegistrationRow;
use clubhouse_types::api::{Claims, GuestRequest};
use clubhouse_types::models::{EventTag, PlusOneGuest, RegistrationState};

use crate::convert;
use crate::error::ApiError;
use crate::events::load_event;
use crate::state::{AppState, AppStateInner, blocking};

// -- Operations --

/// Attach (or replace) the plus-one guest of the caller's registration.
pub fn set_guest(
    state: &AppStateInner,
    event_id: Uuid,
    user_id: Uuid,
    req: GuestRequest,
) -> Result<PlusOneGuest, ApiError> {
    let event = load_event(state, event_id)?;
    if !event.has_tag(EventTag::PlusOne) {
        return Err(ApiError::InvalidState("this event does not allow a plus-one".into()));
    }

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("guest name is required".into()));
    }
    let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

    let registration = owned_registration(state, event_id, user_id)?;
    if convert::flags(&registration).state() == RegistrationState::Waitlisted {
        return Err(ApiError::InvalidState(
            "a plus-one can only be added to a confirmed registration".into(),
        ));
    }

    let guest = state.db.upsert_guest(
        &Uuid::new_v4().to_string(),
        &registration.id,
        &registration.event_id,
        name,
        email,
    )?;
    info!("{} set plus-one for registration {}", user_id, registration.id);
    Ok(convert::guest(guest))
}

/// Remove the caller's plus-one guest. Cancelling a registration does not do
/// this implicitly.
pub fn remove_guest(state: &AppStateInner, event_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
    load_event(state, event_id)?;
    let registration = owned_registration(state, event_id, user_id)?;

    if !state.db.delete_guest(&registration.id)? {
        return Err(ApiError::NotFound("guest"));
    }
    info!("{} removed plus-one from registration {}", user_id, registration.id);
    Ok(())
}

fn owned_registration(
    state: &AppStateInner,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<RegistrationRow, ApiError> {
    state
        .db
        .active_registration(&event_id.to_string(), &user_id.to_string())?
        .ok_or(ApiError::NotRegistered)
}

// -- Handlers --

/// PUT /events/{event_id}/guest
pub async fn set_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GuestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let guest = blocking(&state, move |s| set_guest(s, event_id, claims.sub, req)).await?;
    Ok(Json(guest))
}

/// DELETE /events/{event_id}/guest
pub async fn remove_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| remove_guest(s, event_id, claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}
