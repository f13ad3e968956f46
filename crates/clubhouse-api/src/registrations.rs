use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use clubhouse_db::models::RegistrationRow;
use clubhouse_lifecycle::{CancelAction, Placement, cancellation, writer};
use clubhouse_types::api::{
    CancelResponse, CancellationState, Claims, CodeResponse, RegisterResponse, RegistrationStatus,
};
use clubhouse_types::events::{GatewayEvent, RowChange};

use crate::convert;
use crate::error::ApiError;
use crate::events::load_event;
use crate::notify::ConfirmationMessage;
use crate::state::{AppState, AppStateInner, blocking};

/// Outcome of a member registering themselves.
#[derive(Debug)]
pub struct Registered {
    pub response: RegisterResponse,
    /// True when a new row was inserted rather than an old one reused.
    pub inserted: bool,
    /// Confirmation to send once the write is done, if any.
    pub confirmation: Option<ConfirmationMessage>,
}

// -- Operations --

/// Register `user_id` for `event_id`, confirmed or waitlisted.
pub fn register(state: &AppStateInner, event_id: Uuid, user_id: Uuid) -> Result<Registered, ApiError> {
    let event = load_event(state, event_id)?;
    writer::admit(&event)?;

    let enrollment = state.db.register(
        &event_id.to_string(),
        &user_id.to_string(),
        &Uuid::new_v4().to_string(),
        |confirmed_count, existing| {
            let current = existing.map(convert::flags);
            writer::placement_for(&event, confirmed_count, current.as_ref()).is_waiting_list()
        },
    )?;

    let row = enrollment.registration;
    let change = if enrollment.inserted {
        RowChange::Inserted
    } else {
        RowChange::Updated
    };
    publish(state, &row, change);

    let placement = if row.is_waiting_list {
        Placement::Waitlisted
    } else {
        Placement::Confirmed
    };
    info!("{} registered for event {}: {:?}", user_id, event_id, placement);

    let confirmation = writer::sends_confirmation(&event, placement)
        .then(|| ConfirmationMessage::registration_confirmed(user_id, event_id, &event.title));

    Ok(Registered {
        response: RegisterResponse {
            registration_id: convert::parse_id(&row.id, "registration id"),
            status: status_of(placement),
            manual_payment: writer::manual_payment_instructions(&event),
        },
        inserted: enrollment.inserted,
        confirmation,
    })
}

/// A member cancels their own active registration.
pub fn cancel(state: &AppStateInner, event_id: Uuid, user_id: Uuid) -> Result<CancelResponse, ApiError> {
    let event = load_event(state, event_id)?;
    let row = state
        .db
        .active_registration(&event_id.to_string(), &user_id.to_string())?
        .ok_or(ApiError::NotRegistered)?;
    let registration_id = convert::parse_id(&row.id, "registration id");

    let cancellation_state = match cancellation::resolve(&convert::flags(&row), &event) {
        CancelAction::Finalize => {
            let row = state.db.finalize_cancellation(&row.id, &user_id.to_string())?;
            publish(state, &row, RowChange::Updated);
            info!("{} cancelled registration {} for event {}", user_id, row.id, event_id);
            CancellationState::Finalized
        }
        CancelAction::RequestRefund => {
            let row = state.db.request_refund(&row.id)?;
            publish(state, &row, RowChange::Updated);
            info!("{} requested a refund for registration {}", user_id, row.id);
            CancellationState::PendingApproval
        }
        CancelAction::AlreadyPending => CancellationState::PendingApproval,
        CancelAction::AlreadyCancelled => return Err(ApiError::NotRegistered),
    };

    Ok(CancelResponse {
        registration_id,
        state: cancellation_state,
    })
}

/// Personal check-in code for an active registrant.
pub fn attendance_code(state: &AppStateInner, event_id: Uuid, user_id: Uuid) -> Result<CodeResponse, ApiError> {
    load_event(state, event_id)?;
    state
        .db
        .active_registration(&event_id.to_string(), &user_id.to_string())?
        .ok_or(ApiError::NotRegistered)?;

    Ok(CodeResponse {
        code: state.codes.attendance_code(event_id, user_id),
    })
}

/// Tell change-feed subscribers that a registration row was written.
pub(crate) fn publish(state: &AppStateInner, row: &RegistrationRow, change: RowChange) {
    state.dispatcher.broadcast(GatewayEvent::RegistrationChanged {
        event_id: convert::parse_id(&row.event_id, "event id"),
        registration_id: convert::parse_id(&row.id, "registration id"),
        user_id: convert::parse_id(&row.user_id, "user id"),
        change,
    });
}

pub(crate) fn status_of(placement: Placement) -> RegistrationStatus {
    match placement {
        Placement::Confirmed => RegistrationStatus::Confirmed,
        Placement::Waitlisted => RegistrationStatus::Waitlisted,
    }
}

// -- Handlers --

/// POST /events/{event_id}/registration
pub async fn register_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let registered = blocking(&state, move |s| register(s, event_id, claims.sub)).await?;

    if let Some(message) = registered.confirmation {
        state.notifier.dispatch_confirmation(message);
    }

    let status = if registered.inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(registered.response)))
}

/// DELETE /events/{event_id}/registration
pub async fn cancel_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |s| cancel(s, event_id, claims.sub)).await?;
    Ok(Json(response))
}

/// GET /events/{event_id}/attendance-code
pub async fn attendance_code_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |s| attendance_code(s, event_id, claims.sub)).await?;
    Ok(Json(response))
}

/// GET /me/match-code
pub async fn match_code_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    Json(CodeResponse {
        code: state.codes.match_code(claims.sub),
    })
}
