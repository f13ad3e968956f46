use clubhouse_types::models::{Event, RegistrationState};

use crate::charged_in_app;
use crate::state::RegistrationFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAction {
    /// Mark `refund_processed`, stamp canceller and time.
    Finalize,
    /// Paid registration: flag a refund request and wait for an admin.
    RequestRefund,
    /// A refund request is already waiting; nothing to write.
    AlreadyPending,
    /// The row is already finalized.
    AlreadyCancelled,
}

/// Decide how a member's own cancellation is handled.
///
/// Waitlisted registrants never paid, so they always finalize.
pub fn resolve(flags: &RegistrationFlags, event: &Event) -> CancelAction {
    match flags.state() {
        RegistrationState::Cancelled => CancelAction::AlreadyCancelled,
        RegistrationState::PendingRefund => CancelAction::AlreadyPending,
        RegistrationState::Waitlisted => CancelAction::Finalize,
        RegistrationState::Confirmed if charged_in_app(event) => CancelAction::RequestRefund,
        RegistrationState::Confirmed => CancelAction::Finalize,
    }
}

/// An admin may only approve or deny a refund that is still pending.
pub fn refund_decidable(flags: &RegistrationFlags) -> bool {
    flags.state() == RegistrationState::PendingRefund
}
