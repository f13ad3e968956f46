use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use clubhouse_db::models::{PaymentRow, RegistrationRow};
use clubhouse_db::payments::NewPayment;
use clubhouse_lifecycle::{Placement, cancellation, charged_in_app};
use clubhouse_types::api::{
    Claims, RecordPaymentRequest, RefundDecisionRequest, RefundDecisionResponse, RegisterResponse,
};
use clubhouse_types::events::RowChange;
use clubhouse_types::models::PaymentProvider;

use crate::convert;
use crate::error::ApiError;
use crate::events::load_event;
use crate::middleware::require_admin;
use crate::notify::ConfirmationMessage;
use crate::registrations::{publish, status_of};
use crate::state::{AppState, AppStateInner, blocking};

const REFUND_TIMEOUT: Duration = Duration::from_secs(20);

/// Body sent to a provider's refund function.
#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub payment_id: String,
    pub provider_reference: String,
    pub amount_cents: i64,
}

/// What the refund function answered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl RefundOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Abstraction over the per-provider refund functions.
pub trait RefundGateway: Send + Sync {
    fn refund(
        &self,
        provider: PaymentProvider,
        request: RefundRequest,
    ) -> Pin<Box<dyn Future<Output = RefundOutcome> + Send + '_>>;
}

/// Posts refund requests to one configured URL per provider.
pub struct HttpRefundGateway {
    client: reqwest::Client,
    urls: HashMap<PaymentProvider, String>,
}

impl HttpRefundGateway {
    pub fn new(urls: HashMap<PaymentProvider, String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REFUND_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client, urls }
    }

    async fn post(&self, provider: PaymentProvider, request: RefundRequest) -> RefundOutcome {
        let Some(url) = self.urls.get(&provider) else {
            return RefundOutcome::failed(format!(
                "no refund endpoint configured for {}",
                provider.as_str()
            ));
        };

        let response = match self.client.post(url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Refund call to {} failed: {}", provider.as_str(), e);
                return RefundOutcome::failed(format!("{} refund unavailable: {}", provider.as_str(), e));
            }
        };

        // Providers answer {success, error} even on non-2xx statuses.
        match response.json::<RefundOutcome>().await {
            Ok(outcome) => outcome,
            Err(e) => RefundOutcome::failed(format!("unreadable {} refund response: {}", provider.as_str(), e)),
        }
    }
}

impl RefundGateway for HttpRefundGateway {
    fn refund(
        &self,
        provider: PaymentProvider,
        request: RefundRequest,
    ) -> Pin<Box<dyn Future<Output = RefundOutcome> + Send + '_>> {
        Box::pin(self.post(provider, request))
    }
}

// -- Operations --

/// Store a completed in-app payment and enroll the payer as confirmed.
pub fn record_payment(
    state: &AppStateInner,
    admin: Uuid,
    event_id: Uuid,
    req: RecordPaymentRequest,
) -> Result<RegisterResponse, ApiError> {
    require_admin(state, admin)?;
    if req.amount_cents < 0 {
        return Err(ApiError::BadRequest("amount cannot be negative".into()));
    }
    if req.provider_reference.trim().is_empty() {
        return Err(ApiError::BadRequest("provider reference is required".into()));
    }
    let event = load_event(state, event_id)?;
    if !charged_in_app(&event) {
        return Err(ApiError::InvalidState(
            "payments are only recorded for events charged in the app".into(),
        ));
    }
    let user_id = req.user_id.to_string();
    state
        .db
        .get_user_by_id(&user_id)?
        .ok_or(ApiError::NotFound("user"))?;

    let enrollment = state.db.enroll_paid(
        &event_id.to_string(),
        &user_id,
        &Uuid::new_v4().to_string(),
        &NewPayment {
            id: &Uuid::new_v4().to_string(),
            amount_cents: req.amount_cents,
            payment_provider: req.provider.as_str(),
            provider_reference: req.provider_reference.trim(),
        },
    )?;
    let row = enrollment.registration;

    let change = if enrollment.inserted {
        RowChange::Inserted
    } else {
        RowChange::Updated
    };
    publish(state, &row, change);
    info!(
        "Payment of {} via {} recorded for {} on event {}",
        req.amount_cents,
        req.provider.as_str(),
        req.user_id,
        event_id
    );

    Ok(RegisterResponse {
        registration_id: convert::parse_id(&row.id, "registration id"),
        status: status_of(Placement::Confirmed),
        manual_payment: None,
    })
}

/// Approve or deny a pending refund request.
///
/// Approval claims the request before the completed payment, if any, is
/// refunded, so only one admin reaches the provider. A provider failure
/// releases the claim and is returned as-is.
pub async fn decide_refund(
    state: &AppState,
    admin: Uuid,
    registration_id: Uuid,
    approve: bool,
) -> Result<RefundDecisionResponse, ApiError> {
    if !approve {
        let row = blocking(state, move |s| {
            let row = pending_refund(s, admin, registration_id)?;
            let row = s.db.deny_refund(&row.id)?.ok_or_else(already_decided)?;
            publish(s, &row, RowChange::Updated);
            Ok(row)
        })
        .await?;
        info!("{} denied refund for registration {}", admin, row.id);
        return Ok(decision(&row, false));
    }

    let (row, payment) = blocking(state, move |s| {
        let row = pending_refund(s, admin, registration_id)?;
        let payment = s.db.completed_payment(&row.id)?;
        if !s.db.claim_refund(&row.id)? {
            return Err(already_decided());
        }
        Ok((row, payment))
    })
    .await?;

    let refunded = match &payment {
        Some(payment) => {
            if let Err(message) = refund_payment(state, payment).await {
                warn!("Refund for registration {} failed: {}", row.id, message);
                let id = row.id.clone();
                if let Err(e) = blocking(state, move |s| Ok(s.db.release_refund_claim(&id)?)).await {
                    warn!("Failed to release refund claim on {}: {}", row.id, e);
                }
                return Err(ApiError::Refund(message));
            }
            true
        }
        None => false,
    };

    let payment_id = payment.map(|p| p.id);
    let row = blocking(state, move |s| {
        let row = s
            .db
            .approve_refund(&row.id, &admin.to_string(), payment_id.as_deref())?;
        publish(s, &row, RowChange::Updated);
        Ok(row)
    })
    .await?;

    info!(
        "{} approved refund for registration {} (provider refund: {})",
        admin, row.id, refunded
    );
    Ok(decision(&row, refunded))
}

async fn refund_payment(state: &AppState, payment: &PaymentRow) -> Result<(), String> {
    let provider = PaymentProvider::parse(&payment.payment_provider)
        .ok_or_else(|| format!("unknown payment provider '{}'", payment.payment_provider))?;
    let outcome = state
        .refunds
        .refund(
            provider,
            RefundRequest {
                payment_id: payment.id.clone(),
                provider_reference: payment.provider_reference.clone(),
                amount_cents: payment.amount_cents,
            },
        )
        .await;
    if outcome.success {
        Ok(())
    } else {
        Err(outcome
            .error
            .unwrap_or_else(|| format!("{} refund failed", provider.as_str())))
    }
}

/// Load the registration and make sure a refund decision still applies.
fn pending_refund(
    state: &AppStateInner,
    admin: Uuid,
    registration_id: Uuid,
) -> Result<RegistrationRow, ApiError> {
    require_admin(state, admin)?;
    let row = state
        .db
        .get_registration(&registration_id.to_string())?
        .ok_or(ApiError::NotFound("registration"))?;
    if !cancellation::refund_decidable(&convert::flags(&row)) {
        return Err(ApiError::InvalidState("no pending refund request for this registration".into()));
    }
    Ok(row)
}

fn already_decided() -> ApiError {
    ApiError::InvalidState("refund decision already in progress or made".into())
}

fn decision(row: &RegistrationRow, refunded: bool) -> RefundDecisionResponse {
    RefundDecisionResponse {
        registration_id: convert::parse_id(&row.id, "registration id"),
        state: convert::flags(row).state(),
        refunded,
    }
}

// -- Handlers --

/// POST /events/{event_id}/payments
pub async fn record_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (response, title, user_id) = blocking(&state, move |s| {
        let user_id = req.user_id;
        let response = record_payment(s, claims.sub, event_id, req)?;
        let title = load_event(s, event_id)?.title;
        Ok((response, title, user_id))
    })
    .await?;

    state
        .notifier
        .dispatch_confirmation(ConfirmationMessage::registration_confirmed(user_id, event_id, &title));
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /registrations/{registration_id}/refund
pub async fn decide_handler(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RefundDecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = decide_refund(&state, claims.sub, registration_id, req.approve).await?;
    Ok(Json(response))
}
