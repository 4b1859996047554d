//! Payment session state machine.
//!
//! One `PaymentSession` exists per QR payment attempt and is the single
//! source of truth for the waiting surface and for order-finalization
//! gating. All mutation goes through the transition methods below; the poll
//! task and any UI observer never write fields directly.
//!
//! Lifecycle:
//!
//! ```text
//! idle --begin--> loading --attach--> pending --approve--> approved
//!                    |                   |
//!                    +------fail---------+---> error
//! any --reset--> idle
//! ```
//!
//! `poll_epoch` increments on every `begin`/`reset`. A task spawned for an
//! earlier attempt compares its captured epoch after each await and discards
//! its result on mismatch, even when a new attempt reuses the same
//! order/line identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Loading,
    Pending,
    Approved,
    Error,
}

/// State of one QR payment attempt for one order/payment-line pair.
#[derive(Debug)]
pub struct PaymentSession {
    pub(crate) status: SessionStatus,
    /// Provider-issued id; `None` before creation succeeds.
    pub(crate) payment_id: Option<String>,
    /// Correlation token sent at creation and echoed on status checks.
    pub(crate) external_reference: Option<String>,
    /// Opaque renderable QR data; `None` until creation succeeds.
    pub(crate) qr_payload: Option<String>,
    /// Non-null exactly when `status == Error`.
    pub(crate) error_message: Option<String>,
    pub(crate) bound_order_id: Option<String>,
    pub(crate) bound_line_id: Option<String>,
    /// Cooperative cancellation signal for the poll chain.
    pub(crate) poll_active: bool,
    /// Bumped on every begin/reset so stale tasks can detect supersession.
    pub(crate) poll_epoch: u64,
    pub(crate) started_at: Option<DateTime<Utc>>,
}

impl PaymentSession {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            payment_id: None,
            external_reference: None,
            qr_payload: None,
            error_message: None,
            bound_order_id: None,
            bound_line_id: None,
            poll_active: false,
            poll_epoch: 0,
            started_at: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Start a new attempt: bind identity, clear previous attempt state,
    /// enter `Loading`. Returns the new epoch for the caller to carry across
    /// its awaits.
    pub(crate) fn begin(
        &mut self,
        order_id: &str,
        line_id: &str,
        external_reference: &str,
    ) -> u64 {
        self.poll_epoch += 1;
        self.status = SessionStatus::Loading;
        self.payment_id = None;
        self.qr_payload = None;
        self.error_message = None;
        self.external_reference = Some(external_reference.to_string());
        self.bound_order_id = Some(order_id.to_string());
        self.bound_line_id = Some(line_id.to_string());
        self.poll_active = false;
        self.started_at = Some(Utc::now());
        info!(
            order_id = %order_id,
            line_id = %line_id,
            external_reference = %external_reference,
            "payment session started"
        );
        self.poll_epoch
    }

    /// Creation succeeded: record the provider id and QR payload, enter
    /// `Pending`, and arm the poll chain.
    pub(crate) fn attach(&mut self, payment_id: String, qr_payload: String) {
        info!(payment_id = %payment_id, "payment pending, QR ready");
        self.payment_id = Some(payment_id);
        self.qr_payload = Some(qr_payload);
        self.status = SessionStatus::Pending;
        self.poll_active = true;
    }

    /// Enter `Error` with a message and stop polling. The message is the
    /// invariant: no transition into `Error` without one.
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(message = %message, "payment session failed");
        self.status = SessionStatus::Error;
        self.error_message = Some(message);
        self.poll_active = false;
    }

    /// Payment confirmed by the provider.
    pub(crate) fn approve(&mut self) {
        let elapsed_secs = self
            .started_at
            .map(|t| (Utc::now() - t).num_seconds())
            .unwrap_or(0);
        info!(
            payment_id = self.payment_id.as_deref().unwrap_or("-"),
            elapsed_secs, "payment approved"
        );
        self.status = SessionStatus::Approved;
        self.error_message = None;
        self.poll_active = false;
    }

    /// Return to `Idle`, dropping all attempt state. Bumps the epoch so any
    /// in-flight task for the old attempt discards its result.
    pub(crate) fn reset(&mut self) {
        self.poll_epoch += 1;
        self.status = SessionStatus::Idle;
        self.payment_id = None;
        self.external_reference = None;
        self.qr_payload = None;
        self.error_message = None;
        self.bound_order_id = None;
        self.bound_line_id = None;
        self.poll_active = false;
        self.started_at = None;
    }

    /// Clear a failure back to `Idle` without losing the epoch discipline.
    pub(crate) fn clear_error(&mut self) {
        debug_assert_eq!(self.status, SessionStatus::Error);
        self.reset();
    }

    /// True while a creation or confirmation is underway; the order must not
    /// be finalized in this window.
    pub(crate) fn is_in_flight(&self) -> bool {
        matches!(self.status, SessionStatus::Loading | SessionStatus::Pending)
    }

    pub(crate) fn bound_identity(&self) -> Option<(String, String)> {
        match (&self.bound_order_id, &self.bound_line_id) {
            (Some(o), Some(l)) => Some((o.clone(), l.clone())),
            _ => None,
        }
    }
}

impl Default for PaymentSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock the session mutex. Transition methods do not panic, so a poisoned
/// lock still holds coherent data; recover it rather than propagating.
pub(crate) fn lock_session(session: &Mutex<PaymentSession>) -> MutexGuard<'_, PaymentSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

// ===========================================================================
// Tests
// ===========================================================================
