use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use clubhouse_db::models::{AttendanceRow, RegistrationRow};
use clubhouse_lifecycle::roster::{self, Attribution};
use clubhouse_lifecycle::{Placement, RegistrationRecord, writer};
use clubhouse_types::api::{
    AttendanceRequest, AttendanceResponse, CancelResponse, CancellationState, CancelledByView,
    CancelledEntry, CheckInRequest, Claims, RegisterResponse, RosterEntry, RosterResponse,
};
use clubhouse_types::events::{GatewayEvent, RowChange};
use clubhouse_types::models::{PlusOneGuest, RegistrationState};

use crate::convert;
use crate::error::ApiError;
use crate::events::load_event;
use crate::middleware::require_admin;
use crate::notify::ConfirmationMessage;
use crate::registrations::{publish, status_of};
use crate::state::{AppState, AppStateInner, blocking};

const UNKNOWN_MEMBER: &str = "Unknown member";

// -- Operations --

/// Confirmed, waitlisted and cancelled registrants of an event.
pub fn get_roster(state: &AppStateInner, admin: Uuid, event_id: Uuid) -> Result<RosterResponse, ApiError> {
    require_admin(state, admin)?;
    load_event(state, event_id)?;
    let event_key = event_id.to_string();

    let rows = state.db.registrations_for_event(&event_key)?;
    let records: Vec<RegistrationRecord> = rows.iter().map(convert::record).collect();
    let split = roster::partition(&records);

    let mut user_ids: HashSet<String> = HashSet::new();
    for record in split.confirmed.iter().chain(&split.waitlisted).chain(&split.cancelled) {
        user_ids.insert(record.user_id.to_string());
        if let Attribution::Admin(by) = roster::attribute(record) {
            user_ids.insert(by.to_string());
        }
    }
    let user_ids: Vec<String> = user_ids.into_iter().collect();

    let names = state.db.display_names(&user_ids).unwrap_or_else(|e| {
        warn!("Display names unavailable for roster of {}: {}", event_id, e);
        HashMap::new()
    });
    let verified: HashSet<String> = state
        .db
        .attendance_for_event(&event_key)
        .unwrap_or_else(|e| {
            warn!("Attendance unavailable for roster of {}: {}", event_id, e);
            Vec::new()
        })
        .into_iter()
        .filter(|a| a.verified_attendance)
        .map(|a| a.user_id)
        .collect();
    let mut guests: HashMap<String, PlusOneGuest> = state
        .db
        .guests_for_event(&event_key)
        .unwrap_or_else(|e| {
            warn!("Guests unavailable for roster of {}: {}", event_id, e);
            Vec::new()
        })
        .into_iter()
        .map(|g| (g.registration_id.clone(), convert::guest(g)))
        .collect();

    let name_of = |user_id: Uuid| {
        names
            .get(&user_id.to_string())
            .cloned()
            .unwrap_or_else(|| UNKNOWN_MEMBER.to_string())
    };

    let mut entries = |records: &[&RegistrationRecord]| -> Vec<RosterEntry> {
        records
            .iter()
            .enumerate()
            .map(|(idx, record)| RosterEntry {
                position: idx + 1,
                registration_id: record.id,
                user_id: record.user_id,
                display_name: name_of(record.user_id),
                verified_attendance: verified.contains(&record.user_id.to_string()),
                payment_completed: record.payment_completed,
                refund_requested: record.flags.refund_requested,
                refund_approved: record.flags.refund_approved,
                plus_one: guests.remove(&record.id.to_string()),
            })
            .collect()
    };
    let confirmed = entries(&split.confirmed);
    let waitlisted = entries(&split.waitlisted);

    let cancelled = split
        .cancelled
        .iter()
        .map(|record| CancelledEntry {
            registration_id: record.id,
            user_id: record.user_id,
            display_name: name_of(record.user_id),
            cancelled_at: record.cancelled_at,
            cancelled_by: match roster::attribute(record) {
                Attribution::SelfCancelled => CancelledByView::SelfCancelled,
                Attribution::Admin(by) => CancelledByView::Admin {
                    user_id: by,
                    display_name: name_of(by),
                },
                Attribution::Unknown => CancelledByView::Unknown,
            },
        })
        .collect();

    Ok(RosterResponse {
        event_id,
        confirmed,
        waitlisted,
        cancelled,
    })
}

/// Admin add: confirmed and marked paid, regardless of capacity or tags.
pub fn admin_add(
    state: &AppStateInner,
    admin: Uuid,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<RegisterResponse, ApiError> {
    require_admin(state, admin)?;
    load_event(state, event_id)?;
    require_user(state, user_id)?;

    let enrollment = state
        .db
        .enroll(&event_id.to_string(), &user_id.to_string(), &Uuid::new_v4().to_string())?;
    let row = enrollment.registration;
    let change = if enrollment.inserted {
        RowChange::Inserted
    } else {
        RowChange::Updated
    };
    publish(state, &row, change);
    info!("{} added {} to event {}", admin, user_id, event_id);

    Ok(RegisterResponse {
        registration_id: convert::parse_id(&row.id, "registration id"),
        status: status_of(Placement::Confirmed),
        manual_payment: None,
    })
}

/// Admin remove: finalized at once, attributed to the admin, no refund step.
pub fn admin_remove(
    state: &AppStateInner,
    admin: Uuid,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<CancelResponse, ApiError> {
    require_admin(state, admin)?;
    load_event(state, event_id)?;
    let row = active(state, event_id, user_id)?;

    let row = state.db.finalize_cancellation(&row.id, &admin.to_string())?;
    publish(state, &row, RowChange::Updated);
    info!("{} removed {} from event {}", admin, user_id, event_id);

    Ok(CancelResponse {
        registration_id: convert::parse_id(&row.id, "registration id"),
        state: CancellationState::Finalized,
    })
}

/// Mark (or unmark) a member's attendance. Repeating the call only restamps
/// the verifier and time.
pub fn set_attendance(
    state: &AppStateInner,
    admin: Uuid,
    event_id: Uuid,
    user_id: Uuid,
    verified: bool,
) -> Result<AttendanceResponse, ApiError> {
    require_admin(state, admin)?;
    load_event(state, event_id)?;
    require_user(state, user_id)?;
    write_attendance(state, admin, event_id, user_id, verified)
}

/// Move a waitlisted member to confirmed. Never happens automatically.
pub fn promote(
    state: &AppStateInner,
    admin: Uuid,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<(RegisterResponse, Option<ConfirmationMessage>), ApiError> {
    require_admin(state, admin)?;
    let event = load_event(state, event_id)?;
    let row = active(state, event_id, user_id)?;
    if convert::flags(&row).state() != RegistrationState::Waitlisted {
        return Err(ApiError::InvalidState("registration is not on the waitlist".into()));
    }

    let row = state.db.promote_from_waitlist(&row.id)?;
    publish(state, &row, RowChange::Updated);
    info!("{} promoted {} from the waitlist of event {}", admin, user_id, event_id);

    let confirmation = writer::sends_confirmation(&event, Placement::Confirmed)
        .then(|| ConfirmationMessage::registration_confirmed(user_id, event_id, &event.title));
    let response = RegisterResponse {
        registration_id: convert::parse_id(&row.id, "registration id"),
        status: status_of(Placement::Confirmed),
        manual_payment: writer::manual_payment_instructions(&event),
    };
    Ok((response, confirmation))
}

/// Admin scans a member's attendance code.
pub fn check_in(
    state: &AppStateInner,
    admin: Uuid,
    event_id: Uuid,
    code: &str,
) -> Result<AttendanceResponse, ApiError> {
    require_admin(state, admin)?;
    load_event(state, event_id)?;
    let user_id = state
        .codes
        .verify_attendance_code(event_id, code.trim())
        .ok_or_else(|| ApiError::BadRequest("invalid attendance code".into()))?;
    active(state, event_id, user_id)?;

    let response = write_attendance(state, admin, event_id, user_id, true)?;
    info!("{} checked in {} at event {}", admin, user_id, event_id);
    Ok(response)
}

fn write_attendance(
    state: &AppStateInner,
    admin: Uuid,
    event_id: Uuid,
    user_id: Uuid,
    verified: bool,
) -> Result<AttendanceResponse, ApiError> {
    let row = state.db.set_attendance(
        &Uuid::new_v4().to_string(),
        &event_id.to_string(),
        &user_id.to_string(),
        verified,
        &admin.to_string(),
    )?;

    state.dispatcher.broadcast(GatewayEvent::AttendanceChanged {
        event_id,
        user_id,
        verified: row.verified_attendance,
    });

    Ok(attendance_response(row, admin))
}

fn attendance_response(row: AttendanceRow, admin: Uuid) -> AttendanceResponse {
    AttendanceResponse {
        event_id: convert::parse_id(&row.event_id, "event id"),
        user_id: convert::parse_id(&row.user_id, "user id"),
        verified_attendance: row.verified_attendance,
        verified_by: row
            .verified_by
            .as_deref()
            .map(|id| convert::parse_id(id, "verified_by"))
            .unwrap_or(admin),
        verified_at: row
            .verified_at
            .as_deref()
            .and_then(convert::parse_timestamp)
            .unwrap_or_else(Utc::now),
    }
}

fn active(state: &AppStateInner, event_id: Uuid, user_id: Uuid) -> Result<RegistrationRow, ApiError> {
    state
        .db
        .active_registration(&event_id.to_string(), &user_id.to_string())?
        .ok_or(ApiError::NotRegistered)
}

fn require_user(state: &AppStateInner, user_id: Uuid) -> Result<(), ApiError> {
    state
        .db
        .get_user_by_id(&user_id.to_string())?
        .map(|_| ())
        .ok_or(ApiError::NotFound("user"))
}

// -- Handlers --

/// GET /events/{event_id}/roster
pub async fn roster_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let roster = blocking(&state, move |s| get_roster(s, claims.sub, event_id)).await?;
    Ok(Json(roster))
}

/// POST /events/{event_id}/roster/{user_id}
pub async fn add_handler(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |s| admin_add(s, claims.sub, event_id, user_id)).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// DELETE /events/{event_id}/roster/{user_id}
pub async fn remove_handler(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |s| admin_remove(s, claims.sub, event_id, user_id)).await?;
    Ok(Json(response))
}

/// PUT /events/{event_id}/roster/{user_id}/attendance
pub async fn attendance_handler(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AttendanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |s| {
        set_attendance(s, claims.sub, event_id, user_id, req.verified)
    })
    .await?;
    Ok(Json(response))
}

/// POST /events/{event_id}/roster/{user_id}/promote
pub async fn promote_handler(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (response, confirmation) =
        blocking(&state, move |s| promote(s, claims.sub, event_id, user_id)).await?;
    if let Some(message) = confirmation {
        state.notifier.dispatch_confirmation(message);
    }
    Ok(Json(response))
}

/// POST /events/{event_id}/check-in
pub async fn check_in_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CheckInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |s| check_in(s, claims.sub, event_id, &req.code)).await?;
    Ok(Json(response))
}
