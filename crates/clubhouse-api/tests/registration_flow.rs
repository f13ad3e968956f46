use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clubhouse_api::codes::CodeSigner;
use clubhouse_api::notify::Notifier;
use clubhouse_api::payments::{self, RefundGateway, RefundOutcome, RefundRequest};
use clubhouse_api::{ApiError, AppState, AppStateInner, events, guests, registrations, roster};
use clubhouse_db::Database;
use clubhouse_gateway::Dispatcher;
use clubhouse_lifecycle::Rejection;
use clubhouse_types::api::{
    CancellationState, CancelledByView, EventRequest, GuestRequest, RecordPaymentRequest,
    RegistrationStatus,
};
use clubhouse_types::events::{GatewayEvent, RowChange};
use clubhouse_types::models::{EventTag, PaymentProvider, RegistrationState};
use uuid::Uuid;

/// Refund gateway that records calls and answers with a fixed outcome.
struct FakeRefunds {
    outcome: RefundOutcome,
    delay: Duration,
    calls: Mutex<Vec<(PaymentProvider, RefundRequest)>>,
}

impl FakeRefunds {
    fn answering(outcome: RefundOutcome) -> Arc<Self> {
        Self::answering_after(outcome, Duration::ZERO)
    }

    fn answering_after(outcome: RefundOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl RefundGateway for FakeRefunds {
    fn refund(
        &self,
        provider: PaymentProvider,
        request: RefundRequest,
    ) -> Pin<Box<dyn Future<Output = RefundOutcome> + Send + '_>> {
        self.calls.lock().unwrap().push((provider, request));
        let outcome = self.outcome.clone();
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            outcome
        })
    }
}

struct Club {
    state: AppState,
    admin: Uuid,
}

impl Club {
    fn new() -> Self {
        Self::with_refunds(FakeRefunds::answering(RefundOutcome::succeeded()))
    }

    fn with_refunds(refunds: Arc<FakeRefunds>) -> Self {
        let db = Database::open_in_memory().unwrap();
        let state = Arc::new(AppStateInner::new(
            db,
            "test-jwt-secret".into(),
            Dispatcher::new(),
            Notifier::disabled(),
            refunds,
            CodeSigner::new("test-code-secret").unwrap(),
        ));
        let club = Self {
            state,
            admin: Uuid::nil(),
        };
        let admin = club.member("admin");
        club.state.db.set_admin_by_username("admin", true).unwrap();
        Self { admin, ..club }
    }

    fn member(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .db
            .create_user(&id.to_string(), name, "not-a-real-hash", &format!("{} Member", name))
            .unwrap();
        id
    }

    fn event(&self, tags: &[EventTag], capacity: Option<u32>, pay_in_app: bool) -> Uuid {
        events::create_event(&self.state, self.admin, request(tags, capacity, pay_in_app))
            .unwrap()
            .id
    }

    fn state_of(&self, event_id: Uuid, user_id: Uuid) -> Option<RegistrationState> {
        events::event_detail(&self.state, user_id, event_id)
            .unwrap()
            .my_registration
            .map(|r| r.state)
    }

    fn pay(&self, event_id: Uuid, user_id: Uuid) -> Uuid {
        payments::record_payment(
            &self.state,
            self.admin,
            event_id,
            RecordPaymentRequest {
                user_id,
                amount_cents: 2500,
                provider: PaymentProvider::Stripe,
                provider_reference: "pi_123".into(),
            },
        )
        .unwrap()
        .registration_id
    }
}

fn request(tags: &[EventTag], capacity: Option<u32>, pay_in_app: bool) -> EventRequest {
    EventRequest {
        title: "Summer BBQ".into(),
        description: String::new(),
        starts_at: None,
        capacity,
        tags: tags.to_vec(),
        pay_in_app,
        price_cents: None,
        payment_instructions: None,
    }
}

#[test]
fn capacity_two_scenario() {
    let club = Club::new();
    let event = club.event(&[], Some(2), false);
    let (a, b, c) = (club.member("a"), club.member("b"), club.member("c"));

    for user in [a, b] {
        let r = registrations::register(&club.state, event, user).unwrap();
        assert_eq!(r.response.status, RegistrationStatus::Confirmed);
        assert!(r.confirmation.is_some());
    }
    let third = registrations::register(&club.state, event, c).unwrap();
    assert_eq!(third.response.status, RegistrationStatus::Waitlisted);
    assert!(third.confirmation.is_none());

    let cancelled = registrations::cancel(&club.state, event, a).unwrap();
    assert_eq!(cancelled.state, CancellationState::Finalized);

    assert_eq!(club.state.db.registration_counts(&event.to_string()).unwrap(), (1, 1));
    // No automatic promotion.
    assert_eq!(club.state_of(event, c), Some(RegistrationState::Waitlisted));
    assert_eq!(club.state_of(event, a), None);
}

#[test]
fn registering_twice_keeps_one_row() {
    let club = Club::new();
    let event = club.event(&[], None, false);
    let user = club.member("ann");

    let first = registrations::register(&club.state, event, user).unwrap();
    let second = registrations::register(&club.state, event, user).unwrap();

    assert!(first.inserted);
    assert!(!second.inserted);
    assert_eq!(first.response.registration_id, second.response.registration_id);
    assert_eq!(club.state.db.registrations_for_event(&event.to_string()).unwrap().len(), 1);
}

#[test]
fn confirmed_member_is_never_demoted_by_reregistering() {
    let club = Club::new();
    let event = club.event(&[], Some(1), false);
    let user = club.member("ann");

    registrations::register(&club.state, event, user).unwrap();
    let again = registrations::register(&club.state, event, user).unwrap();
    assert_eq!(again.response.status, RegistrationStatus::Confirmed);
}

#[test]
fn rejected_registrations_write_nothing() {
    let club = Club::new();
    let paid = club.event(&[EventTag::Paid], None, true);
    let closed = club.event(&[EventTag::RegistrationClosed], None, false);
    let user = club.member("ann");

    let err = registrations::register(&club.state, paid, user).unwrap_err();
    assert!(matches!(err, ApiError::Rejected(Rejection::PaymentRequired)));
    let err = registrations::register(&club.state, closed, user).unwrap_err();
    assert!(matches!(err, ApiError::Rejected(Rejection::Closed)));

    for event in [paid, closed] {
        assert!(club.state.db.registrations_for_event(&event.to_string()).unwrap().is_empty());
    }
}

#[test]
fn paid_outside_app_returns_instructions() {
    let club = Club::new();
    let event = club.event(&[EventTag::Paid], None, false);
    let user = club.member("ann");

    let r = registrations::register(&club.state, event, user).unwrap();
    assert_eq!(r.response.status, RegistrationStatus::Confirmed);
    assert!(r.response.manual_payment.is_some());
}

#[test]
fn paid_cancellation_only_requests_a_refund() {
    let club = Club::new();
    let event = club.event(&[EventTag::Paid], None, true);
    let user = club.member("ann");
    club.pay(event, user);

    let first = registrations::cancel(&club.state, event, user).unwrap();
    assert_eq!(first.state, CancellationState::PendingApproval);
    let again = registrations::cancel(&club.state, event, user).unwrap();
    assert_eq!(again.state, CancellationState::PendingApproval);

    assert_eq!(club.state_of(event, user), Some(RegistrationState::PendingRefund));
    // Still holds the seat until an admin decides.
    assert_eq!(club.state.db.registration_counts(&event.to_string()).unwrap(), (1, 0));
}

#[test]
fn waitlisted_cancellation_finalizes_even_on_app_charged_events() {
    let club = Club::new();
    let event = club.event(&[EventTag::Waitlist], None, false);
    let user = club.member("ann");
    registrations::register(&club.state, event, user).unwrap();

    events::update_event(&club.state, club.admin, event, request(&[EventTag::Paid], None, true)).unwrap();

    let r = registrations::cancel(&club.state, event, user).unwrap();
    assert_eq!(r.state, CancellationState::Finalized);
    assert_eq!(club.state_of(event, user), None);
}

#[test]
fn cancelling_without_registration_is_reported() {
    let club = Club::new();
    let event = club.event(&[], None, false);
    let user = club.member("ann");

    let err = registrations::cancel(&club.state, event, user).unwrap_err();
    assert!(matches!(err, ApiError::NotRegistered));
}

#[test]
fn roster_lists_each_member_once() {
    let club = Club::new();
    let event = club.event(&[], Some(1), false);
    let (a, b, c) = (club.member("a"), club.member("b"), club.member("c"));
    let event_key = event.to_string();

    // Legacy duplicates: a cancelled row followed by an active one for `a`,
    // and two cancelled rows for `c`.
    club.state
        .db
        .with_conn_mut(|conn| {
            let a_key = a.to_string();
            let c_key = c.to_string();
            for (user, processed) in [(&a_key, 1), (&a_key, 0), (&c_key, 1), (&c_key, 1)] {
                conn.execute(
                    &format!(
                        "INSERT INTO event_registrations (id, event_id, user_id, refund_processed, cancelled_by)
                         VALUES (?1, ?2, ?3, {}, ?3)",
                        processed
                    ),
                    [Uuid::new_v4().to_string().as_str(), event_key.as_str(), user.as_str()],
                )?;
            }
            Ok(())
        })
        .unwrap();

    registrations::register(&club.state, event, b).unwrap();

    let roster = roster::get_roster(&club.state, club.admin, event).unwrap();
    let confirmed: Vec<Uuid> = roster.confirmed.iter().map(|e| e.user_id).collect();
    let waitlisted: Vec<Uuid> = roster.waitlisted.iter().map(|e| e.user_id).collect();
    let cancelled: Vec<Uuid> = roster.cancelled.iter().map(|e| e.user_id).collect();

    assert_eq!(confirmed, vec![a]);
    assert_eq!(waitlisted, vec![b]);
    assert_eq!(cancelled, vec![c]);
    assert_eq!(roster.confirmed[0].position, 1);
    assert_eq!(roster.confirmed[0].display_name, "a Member");
    assert_eq!(roster.cancelled[0].cancelled_by, CancelledByView::SelfCancelled);
}

#[test]
fn admin_overrides_bypass_rules_and_are_attributed() {
    let club = Club::new();
    let event = club.event(&[EventTag::RegistrationClosed, EventTag::Paid], Some(0), true);
    let user = club.member("ann");

    let added = roster::admin_add(&club.state, club.admin, event, user).unwrap();
    assert_eq!(added.status, RegistrationStatus::Confirmed);
    let row = club.state.db.active_registration(&event.to_string(), &user.to_string()).unwrap().unwrap();
    assert!(row.payment_completed);

    let removed = roster::admin_remove(&club.state, club.admin, event, user).unwrap();
    assert_eq!(removed.state, CancellationState::Finalized);

    let roster = roster::get_roster(&club.state, club.admin, event).unwrap();
    assert_eq!(roster.cancelled.len(), 1);
    assert_eq!(
        roster.cancelled[0].cancelled_by,
        CancelledByView::Admin {
            user_id: club.admin,
            display_name: "admin Member".into(),
        }
    );
}

#[test]
fn members_cannot_use_admin_operations() {
    let club = Club::new();
    let event = club.event(&[], None, false);
    let user = club.member("ann");

    assert!(matches!(roster::get_roster(&club.state, user, event), Err(ApiError::Forbidden)));
    assert!(matches!(
        roster::admin_add(&club.state, user, event, user),
        Err(ApiError::Forbidden)
    ));
    assert!(matches!(
        events::create_event(&club.state, user, request(&[], None, false)),
        Err(ApiError::Forbidden)
    ));
}

#[test]
fn promote_moves_waitlisted_member_only() {
    let club = Club::new();
    let event = club.event(&[], Some(1), false);
    let (a, b) = (club.member("a"), club.member("b"));
    registrations::register(&club.state, event, a).unwrap();
    registrations::register(&club.state, event, b).unwrap();

    let err = roster::promote(&club.state, club.admin, event, a).unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));

    let (response, confirmation) = roster::promote(&club.state, club.admin, event, b).unwrap();
    assert_eq!(response.status, RegistrationStatus::Confirmed);
    assert!(confirmation.is_some());
    assert_eq!(club.state.db.registration_counts(&event.to_string()).unwrap(), (2, 0));
}

#[test]
fn verifying_attendance_twice_keeps_one_row() {
    let club = Club::new();
    let event = club.event(&[], None, false);
    let user = club.member("ann");

    let first = roster::set_attendance(&club.state, club.admin, event, user, true).unwrap();
    let second = roster::set_attendance(&club.state, club.admin, event, user, true).unwrap();

    assert!(second.verified_attendance);
    assert_eq!(second.verified_by, club.admin);
    assert!(second.verified_at >= first.verified_at);
    let rows = club.state.db.attendance_for_event(&event.to_string()).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].verified_attendance);
}

#[test]
fn check_in_accepts_only_the_events_code() {
    let club = Club::new();
    let event = club.event(&[], None, false);
    let other = club.event(&[], None, false);
    let user = club.member("ann");
    registrations::register(&club.state, event, user).unwrap();
    registrations::register(&club.state, other, user).unwrap();

    let code = registrations::attendance_code(&club.state, event, user).unwrap().code;
    let err = roster::check_in(&club.state, club.admin, other, &code).unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let checked = roster::check_in(&club.state, club.admin, event, &code).unwrap();
    assert_eq!(checked.user_id, user);
    assert!(checked.verified_attendance);

    let roster = roster::get_roster(&club.state, club.admin, event).unwrap();
    assert!(roster.confirmed[0].verified_attendance);
}

#[test]
fn plus_one_needs_tag_and_confirmed_seat() {
    let club = Club::new();
    let plain = club.event(&[], None, false);
    let plus = club.event(&[EventTag::PlusOne], Some(1), false);
    let (a, b) = (club.member("a"), club.member("b"));
    for event in [plain, plus] {
        registrations::register(&club.state, event, a).unwrap();
    }
    registrations::register(&club.state, plus, b).unwrap();

    let guest = || GuestRequest {
        name: " Sam ".into(),
        email: None,
    };
    assert!(matches!(
        guests::set_guest(&club.state, plain, a, guest()),
        Err(ApiError::InvalidState(_))
    ));
    assert!(matches!(
        guests::set_guest(&club.state, plus, b, guest()),
        Err(ApiError::InvalidState(_))
    ));

    let saved = guests::set_guest(&club.state, plus, a, guest()).unwrap();
    assert_eq!(saved.name, "Sam");
    let detail = events::event_detail(&club.state, a, plus).unwrap();
    assert_eq!(detail.my_registration.unwrap().plus_one.unwrap().name, "Sam");

    guests::remove_guest(&club.state, plus, a).unwrap();
    assert!(matches!(
        guests::remove_guest(&club.state, plus, a),
        Err(ApiError::NotFound("guest"))
    ));
}

#[tokio::test]
async fn approved_refund_calls_provider_and_finalizes() {
    let refunds = FakeRefunds::answering(RefundOutcome::succeeded());
    let club = Club::with_refunds(refunds.clone());
    let event = club.event(&[EventTag::Paid], None, true);
    let user = club.member("ann");
    let registration = club.pay(event, user);
    registrations::cancel(&club.state, event, user).unwrap();

    let decision = payments::decide_refund(&club.state, club.admin, registration, true)
        .await
        .unwrap();

    assert!(decision.refunded);
    assert_eq!(decision.state, RegistrationState::Cancelled);
    assert_eq!(refunds.calls(), 1);
    assert!(club.state.db.completed_payment(&registration.to_string()).unwrap().is_none());
    let row = club.state.db.get_registration(&registration.to_string()).unwrap().unwrap();
    assert_eq!(row.refund_approved, Some(true));
    assert_eq!(row.cancelled_by, Some(club.admin.to_string()));
}

#[tokio::test]
async fn failed_provider_refund_leaves_request_pending() {
    let refunds = FakeRefunds::answering(RefundOutcome::failed("charge already refunded"));
    let club = Club::with_refunds(refunds.clone());
    let event = club.event(&[EventTag::Paid], None, true);
    let user = club.member("ann");
    let registration = club.pay(event, user);
    registrations::cancel(&club.state, event, user).unwrap();

    let err = payments::decide_refund(&club.state, club.admin, registration, true)
        .await
        .unwrap_err();

    assert!(matches!(&err, ApiError::Refund(msg) if msg == "charge already refunded"));
    assert_eq!(club.state_of(event, user), Some(RegistrationState::PendingRefund));
    assert!(club.state.db.completed_payment(&registration.to_string()).unwrap().is_some());
    let row = club.state.db.get_registration(&registration.to_string()).unwrap().unwrap();
    assert_eq!(row.refund_approved, None);

    // The request can still be decided after the failure.
    let decision = payments::decide_refund(&club.state, club.admin, registration, false)
        .await
        .unwrap();
    assert_eq!(decision.state, RegistrationState::Confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_approvals_refund_once() {
    let refunds = FakeRefunds::answering_after(RefundOutcome::succeeded(), Duration::from_millis(50));
    let club = Club::with_refunds(refunds.clone());
    let event = club.event(&[EventTag::Paid], None, true);
    let user = club.member("ann");
    let registration = club.pay(event, user);
    registrations::cancel(&club.state, event, user).unwrap();

    let (first, second) = tokio::join!(
        payments::decide_refund(&club.state, club.admin, registration, true),
        payments::decide_refund(&club.state, club.admin, registration, true),
    );

    assert_eq!(refunds.calls(), 1);
    let (won, lost) = match (first, second) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        other => panic!("expected exactly one approval to succeed, got {:?}", other),
    };
    assert!(won.refunded);
    assert_eq!(won.state, RegistrationState::Cancelled);
    assert!(matches!(lost, ApiError::InvalidState(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn denial_during_an_approval_is_rejected() {
    let refunds = FakeRefunds::answering_after(RefundOutcome::succeeded(), Duration::from_millis(50));
    let club = Club::with_refunds(refunds.clone());
    let event = club.event(&[EventTag::Paid], None, true);
    let user = club.member("ann");
    let registration = club.pay(event, user);
    registrations::cancel(&club.state, event, user).unwrap();

    let approve = payments::decide_refund(&club.state, club.admin, registration, true);
    let deny = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        payments::decide_refund(&club.state, club.admin, registration, false).await
    };
    let (approved, denied) = tokio::join!(approve, deny);

    assert!(approved.unwrap().refunded);
    assert!(matches!(denied, Err(ApiError::InvalidState(_))));
    assert_eq!(refunds.calls(), 1);
    assert_eq!(club.state_of(event, user), None);
}

#[tokio::test]
async fn approving_without_a_payment_skips_the_provider() {
    let refunds = FakeRefunds::answering(RefundOutcome::succeeded());
    let club = Club::with_refunds(refunds.clone());
    let event = club.event(&[EventTag::Paid], None, true);
    let user = club.member("ann");
    let registration = roster::admin_add(&club.state, club.admin, event, user)
        .unwrap()
        .registration_id;
    let cancelled = registrations::cancel(&club.state, event, user).unwrap();
    assert_eq!(cancelled.state, CancellationState::PendingApproval);

    let decision = payments::decide_refund(&club.state, club.admin, registration, true)
        .await
        .unwrap();

    assert!(!decision.refunded);
    assert_eq!(decision.state, RegistrationState::Cancelled);
    assert_eq!(refunds.calls(), 0);
    assert_eq!(club.state_of(event, user), None);
}

#[test]
fn payments_are_only_recorded_for_app_charged_events() {
    let club = Club::new();
    let free = club.event(&[], None, false);
    let paid_elsewhere = club.event(&[EventTag::Paid], None, false);
    let user = club.member("ann");

    for event in [free, paid_elsewhere] {
        let err = payments::record_payment(
            &club.state,
            club.admin,
            event,
            RecordPaymentRequest {
                user_id: user,
                amount_cents: 2500,
                provider: PaymentProvider::Stripe,
                provider_reference: "pi_123".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
        assert!(club.state.db.registrations_for_event(&event.to_string()).unwrap().is_empty());
    }
}

#[tokio::test]
async fn denied_refund_restores_the_seat() {
    let refunds = FakeRefunds::answering(RefundOutcome::succeeded());
    let club = Club::with_refunds(refunds.clone());
    let event = club.event(&[EventTag::Paid], None, true);
    let user = club.member("ann");
    let registration = club.pay(event, user);
    registrations::cancel(&club.state, event, user).unwrap();

    let decision = payments::decide_refund(&club.state, club.admin, registration, false)
        .await
        .unwrap();

    assert!(!decision.refunded);
    assert_eq!(decision.state, RegistrationState::Confirmed);
    assert_eq!(refunds.calls(), 0);

    // Nothing left to decide.
    let err = payments::decide_refund(&club.state, club.admin, registration, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)));
}

#[test]
fn writes_are_published_on_the_change_feed() {
    let club = Club::new();
    let event = club.event(&[], None, false);
    let user = club.member("ann");
    let mut feed = club.state.dispatcher.subscribe();

    registrations::register(&club.state, event, user).unwrap();
    registrations::cancel(&club.state, event, user).unwrap();
    roster::set_attendance(&club.state, club.admin, event, user, true).unwrap();

    let changes: Vec<GatewayEvent> = std::iter::from_fn(|| feed.try_recv().ok()).collect();
    assert_eq!(changes.len(), 3);
    assert!(matches!(
        changes[0],
        GatewayEvent::RegistrationChanged { change: RowChange::Inserted, .. }
    ));
    assert!(matches!(
        changes[1],
        GatewayEvent::RegistrationChanged { change: RowChange::Updated, .. }
    ));
    assert!(matches!(
        changes[2],
        GatewayEvent::AttendanceChanged { verified: true, .. }
    ));
}

#[test]
fn event_detail_reflects_writes_after_a_cached_read() {
    let club = Club::new();
    let event = club.event(&[], None, false);
    let (a, b) = (club.member("a"), club.member("b"));

    let before = events::event_detail(&club.state, a, event).unwrap();
    assert_eq!(before.summary.confirmed_count, 0);

    registrations::register(&club.state, event, b).unwrap();
    let after = events::event_detail(&club.state, a, event).unwrap();
    assert_eq!(after.summary.confirmed_count, 1);
}

#[test]
fn event_detail_shows_edits_after_a_cached_read() {
    let club = Club::new();
    let event = club.event(&[], None, false);
    let user = club.member("ann");

    let before = events::event_detail(&club.state, user, event).unwrap();
    assert_eq!(before.summary.event.title, "Summer BBQ");

    let mut edit = request(&[], Some(10), false);
    edit.title = "Autumn BBQ".into();
    events::update_event(&club.state, club.admin, event, edit).unwrap();

    let after = events::event_detail(&club.state, user, event).unwrap();
    assert_eq!(after.summary.event.title, "Autumn BBQ");
    assert_eq!(after.summary.event.capacity, Some(10));
}
