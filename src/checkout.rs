//! Host checkout ports and the QR payment reconciliation adapter.
//!
//! The adapter bridges the session state machine to host-owned objects. The
//! host checkout is reached only through the [`CheckoutHost`] capability
//! trait; marking the bound payment line settled on approval is the single
//! point where this crate mutates host state.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PollConfig;
use crate::error::PaymentError;
use crate::gateway::{CreatePaymentRequest, PaymentGateway};
use crate::poller::{self, PollContext};
use crate::session::{lock_session, PaymentSession, SessionStatus};

// ---------------------------------------------------------------------------
// Host ports
// ---------------------------------------------------------------------------

/// The host's currently selected payment line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLine {
    pub order_id: String,
    pub line_id: String,
    /// The payment method this line was created with.
    pub payment_method_id: String,
    /// Amount due on this line. Read fresh at `start()` time, never cached.
    pub amount: f64,
    /// True once the host considers the line paid.
    pub settled: bool,
    pub customer_email: Option<String>,
}

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Minimal capability surface the adapter needs from the host checkout.
///
/// Implementations wrap the host's own order/payment-line bookkeeping; the
/// adapter never touches host structures directly. These methods may be
/// invoked while the adapter holds its session lock, so they must not call
/// back into the adapter.
pub trait CheckoutHost: Send + Sync {
    /// The presently active order/payment-line selection, if any.
    fn selected_line(&self) -> Option<PaymentLine>;

    /// Mark a payment line settled. Called exactly once, on approval.
    fn set_line_done(&self, order_id: &str, line_id: &str) -> Result<(), String>;

    /// Remove a payment line (cancelled attempt).
    fn remove_line(&self, order_id: &str, line_id: &str) -> Result<(), String>;

    /// Finalize/validate an order. Only invoked once the gate allows it.
    fn finalize_order(&self, order_id: &str) -> Result<(), String>;

    /// Display a toast/notification to the cashier.
    fn notify(&self, level: NoticeLevel, message: &str);
}

// ---------------------------------------------------------------------------
// Session snapshot (what the waiting surface renders)
// ---------------------------------------------------------------------------

/// Read-only view of the session for the QR display surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub payment_id: Option<String>,
    pub qr_payload: Option<String>,
    /// Live amount of the bound line, if it is still the host's selection.
    pub amount: Option<f64>,
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Reconciliation adapter owning one QR payment session.
///
/// One instance lives alongside the host's payment screen. All session
/// mutation funnels through the operations below; the spawned poll chain
/// applies results through the same transition methods.
pub struct QrPaymentAdapter {
    session: Arc<Mutex<PaymentSession>>,
    gateway: Arc<dyn PaymentGateway>,
    host: Arc<dyn CheckoutHost>,
    poll: PollConfig,
}

impl QrPaymentAdapter {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        host: Arc<dyn CheckoutHost>,
        poll: PollConfig,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(PaymentSession::new())),
            gateway,
            host,
            poll,
        }
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        lock_session(&self.session).status()
    }

    /// Snapshot for the waiting surface. The amount comes from the live
    /// selected line so edits before `start()` are always reflected.
    pub fn snapshot(&self) -> SessionSnapshot {
        let line = self.host.selected_line();
        let s = lock_session(&self.session);
        let amount = match (&line, s.bound_identity()) {
            // Bound: only report the amount while the selection still matches.
            (Some(l), Some((order_id, line_id)))
                if l.order_id == order_id && l.line_id == line_id =>
            {
                Some(l.amount)
            }
            (Some(l), None) => Some(l.amount),
            _ => None,
        };
        SessionSnapshot {
            status: s.status(),
            payment_id: s.payment_id.clone(),
            qr_payload: s.qr_payload.clone(),
            amount,
            error_message: s.error_message.clone(),
        }
    }

    /// Start a payment attempt for the host's selected line.
    ///
    /// Idempotent while a creation or confirmation is already underway; the
    /// amount is read from the line at this moment and validated before any
    /// wire call.
    pub async fn start(&self) -> Result<(), PaymentError> {
        // Guard, line read, validation, and begin() all happen under one
        // lock: two concurrent start() calls must not both observe an idle
        // session and issue duplicate creations. Everything in this block
        // is synchronous; the lock is released before the wire call.
        let (line, epoch, external_reference) = {
            let mut s = lock_session(&self.session);
            if s.is_in_flight() {
                debug!("start ignored: payment already in flight");
                return Ok(());
            }
            if s.status() == SessionStatus::Approved {
                debug!("start ignored: payment already approved");
                return Ok(());
            }

            let line = match self.host.selected_line() {
                Some(line) => line,
                None => {
                    return Err(self.fail_validation(s, "No payment line selected"));
                }
            };
            if line.settled {
                debug!(line_id = %line.line_id, "start ignored: line already settled");
                return Ok(());
            }
            if line.amount <= 0.0 {
                return Err(self.fail_validation(s, "Amount must be positive"));
            }

            let external_reference = format!("{}-{}", line.order_id, Uuid::new_v4().simple());
            let epoch = s.begin(&line.order_id, &line.line_id, &external_reference);
            (line, epoch, external_reference)
        };

        let request = CreatePaymentRequest {
            amount: line.amount,
            description: format!("POS order {}", line.order_id),
            pos_client_ref: external_reference.clone(),
            payment_method_id: line.payment_method_id.clone(),
            customer_email: line.customer_email.clone(),
        };

        match self.gateway.create_payment(&request).await {
            Ok(created) => {
                let payment_id = created.payment_id.clone();
                {
                    let mut s = lock_session(&self.session);
                    if s.poll_epoch != epoch {
                        // The cashier moved on while the request was in
                        // flight; the created payment is abandoned.
                        warn!(payment_id = %payment_id, "payment created for a superseded session, discarding");
                        return Ok(());
                    }
                    s.attach(payment_id.clone(), created.qr_data);
                }
                poller::spawn(PollContext {
                    session: Arc::clone(&self.session),
                    gateway: Arc::clone(&self.gateway),
                    host: Arc::clone(&self.host),
                    config: self.poll.clone(),
                    epoch,
                    payment_id,
                    external_reference: Some(external_reference),
                    order_id: line.order_id,
                    line_id: line.line_id,
                });
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                let mut s = lock_session(&self.session);
                if s.poll_epoch == epoch {
                    s.fail(message.clone());
                    drop(s);
                    self.host.notify(NoticeLevel::Error, &message);
                } else {
                    // The cashier moved on; the failure belongs to the
                    // abandoned attempt and must not toast into the new one.
                    debug!("creation failed for a superseded session, discarding");
                }
                Err(e.into())
            }
        }
    }

    /// Retry after a failed attempt. Only valid from `Error`.
    pub async fn retry(&self) -> Result<(), PaymentError> {
        {
            let mut s = lock_session(&self.session);
            if s.status() != SessionStatus::Error {
                return Err(PaymentError::Validation(
                    "no failed payment attempt to retry".into(),
                ));
            }
            s.clear_error();
        }
        self.start().await
    }

    /// Cancel the current attempt: best-effort remote cancellation, then
    /// local reset, then line removal through the host. A remote failure
    /// never blocks the local cleanup.
    pub async fn cancel(&self) {
        let (payment_id, bound) = {
            let s = lock_session(&self.session);
            (s.payment_id.clone(), s.bound_identity())
        };

        if let Some(ref pid) = payment_id {
            if let Err(e) = self.gateway.cancel_payment(pid).await {
                warn!(payment_id = %pid, "remote cancel failed, proceeding with local cleanup: {e}");
            }
        }

        lock_session(&self.session).reset();

        if let Some((order_id, line_id)) = bound {
            info!(order_id = %order_id, line_id = %line_id, "payment cancelled, removing line");
            if let Err(e) = self.host.remove_line(&order_id, &line_id) {
                warn!("failed to remove payment line: {e}");
            }
        }
    }

    /// Dismiss the waiting surface without cancelling the remote payment.
    /// Stops polling and resets to idle; the payment line stays.
    pub fn close(&self) {
        lock_session(&self.session).reset();
    }

    /// The cashier moved on after an approved payment.
    pub fn on_new_order(&self) {
        lock_session(&self.session).reset();
    }

    /// The host's active order or payment line changed. If it no longer
    /// matches the bound identity the session is force-reset with no remote
    /// call; in-flight requests discard their results via the epoch check.
    pub fn on_selection_changed(&self) {
        let current = self.host.selected_line();
        let mut s = lock_session(&self.session);
        let Some((order_id, line_id)) = s.bound_identity() else {
            return;
        };
        let still_bound = current
            .map(|l| l.order_id == order_id && l.line_id == line_id)
            .unwrap_or(false);
        if !still_bound {
            debug!(order_id = %order_id, line_id = %line_id, "active selection changed, resetting payment session");
            s.reset();
        }
    }

    /// Order-finalization gate. While a payment is being created or
    /// confirmed the order must not be finalized; otherwise delegate to the
    /// host's own finalize path.
    pub fn finalize(&self) -> Result<(), PaymentError> {
        let (in_flight, bound_order) = {
            let s = lock_session(&self.session);
            (s.is_in_flight(), s.bound_order_id.clone())
        };
        if in_flight {
            let message = "QR payment still in progress — wait for confirmation or cancel it first";
            self.host.notify(NoticeLevel::Warning, message);
            return Err(PaymentError::Validation(message.into()));
        }

        let order_id = bound_order
            .or_else(|| self.host.selected_line().map(|l| l.order_id))
            .ok_or_else(|| PaymentError::Validation("no active order to finalize".into()))?;
        self.host
            .finalize_order(&order_id)
            .map_err(PaymentError::Host)
    }

    /// Record a local validation failure: error state with message, a
    /// user-visible notice, and no wire call. Takes the already-held guard
    /// so the failure lands atomically with the check that produced it.
    fn fail_validation(
        &self,
        mut session: MutexGuard<'_, PaymentSession>,
        message: &str,
    ) -> PaymentError {
        session.fail(message);
        drop(session);
        self.host.notify(NoticeLevel::Error, message);
        PaymentError::Validation(message.into())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::{CreatePaymentResponse, PaymentStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Gateway stub: creation always succeeds, status is always pending.
    #[derive(Default)]
    struct StubGateway {
        create_calls: AtomicU32,
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_payment(
            &self,
            _request: &CreatePaymentRequest,
        ) -> Result<CreatePaymentResponse, GatewayError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(CreatePaymentResponse {
                payment_id: "P1".into(),
                qr_data: "qr://P1".into(),
            })
        }

        async fn check_status(
            &self,
            _payment_id: &str,
            _external_reference: Option<&str>,
        ) -> Result<PaymentStatus, GatewayError> {
            Ok(PaymentStatus::Pending)
        }

        async fn cancel_payment(&self, _payment_id: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubHost {
        line: Mutex<Option<PaymentLine>>,
        finalized: Mutex<Vec<String>>,
        notices: Mutex<Vec<(NoticeLevel, String)>>,
    }

    impl StubHost {
        fn with_line(amount: f64) -> Self {
            let host = Self::default();
            *host.line.lock().unwrap() = Some(PaymentLine {
                order_id: "ord-1".into(),
                line_id: "line-1".into(),
                payment_method_id: "pm-qr".into(),
                amount,
                settled: false,
                customer_email: None,
            });
            host
        }
    }

    impl CheckoutHost for StubHost {
        fn selected_line(&self) -> Option<PaymentLine> {
            self.line.lock().unwrap().clone()
        }

        fn set_line_done(&self, _order_id: &str, _line_id: &str) -> Result<(), String> {
            Ok(())
        }

        fn remove_line(&self, _order_id: &str, _line_id: &str) -> Result<(), String> {
            Ok(())
        }

        fn finalize_order(&self, order_id: &str) -> Result<(), String> {
            self.finalized.lock().unwrap().push(order_id.to_string());
            Ok(())
        }

        fn notify(&self, level: NoticeLevel, message: &str) {
            self.notices
                .lock()
                .unwrap()
                .push((level, message.to_string()));
        }
    }

    fn adapter(gateway: Arc<StubGateway>, host: Arc<StubHost>) -> QrPaymentAdapter {
        QrPaymentAdapter::new(gateway, host, PollConfig::default())
    }

    #[tokio::test]
    async fn test_start_without_selected_line_fails_locally() {
        let gateway = Arc::new(StubGateway::default());
        let host = Arc::new(StubHost::default());
        let adapter = adapter(Arc::clone(&gateway), Arc::clone(&host));

        let err = adapter.start().await.unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
        assert_eq!(adapter.status(), SessionStatus::Error);
        assert_eq!(gateway.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(host.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_with_zero_amount_fails_locally() {
        let gateway = Arc::new(StubGateway::default());
        let host = Arc::new(StubHost::with_line(0.0));
        let adapter = adapter(Arc::clone(&gateway), Arc::clone(&host));

        let err = adapter.start().await.unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
        assert_eq!(adapter.status(), SessionStatus::Error);
        assert_eq!(gateway.create_calls.load(Ordering::SeqCst), 0);
        let snap = adapter.snapshot();
        assert_eq!(snap.error_message.as_deref(), Some("Amount must be positive"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_pending() {
        let gateway = Arc::new(StubGateway::default());
        let host = Arc::new(StubHost::with_line(100.0));
        let adapter = adapter(Arc::clone(&gateway), Arc::clone(&host));

        adapter.start().await.unwrap();
        assert_eq!(adapter.status(), SessionStatus::Pending);
        adapter.start().await.unwrap();
        adapter.start().await.unwrap();
        assert_eq!(gateway.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_skips_settled_line() {
        let gateway = Arc::new(StubGateway::default());
        let host = Arc::new(StubHost::with_line(100.0));
        host.line.lock().unwrap().as_mut().unwrap().settled = true;
        let adapter = adapter(Arc::clone(&gateway), Arc::clone(&host));

        adapter.start().await.unwrap();
        assert_eq!(adapter.status(), SessionStatus::Idle);
        assert_eq!(gateway.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finalize_blocked_while_pending() {
        let gateway = Arc::new(StubGateway::default());
        let host = Arc::new(StubHost::with_line(100.0));
        let adapter = adapter(Arc::clone(&gateway), Arc::clone(&host));

        adapter.start().await.unwrap();
        let err = adapter.finalize().unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
        assert!(host.finalized.lock().unwrap().is_empty());
        // A warning reached the cashier
        assert!(host
            .notices
            .lock()
            .unwrap()
            .iter()
            .any(|(level, _)| *level == NoticeLevel::Warning));
    }

    #[tokio::test]
    async fn test_finalize_delegates_when_idle() {
        let gateway = Arc::new(StubGateway::default());
        let host = Arc::new(StubHost::with_line(100.0));
        let adapter = adapter(Arc::clone(&gateway), Arc::clone(&host));

        adapter.finalize().unwrap();
        assert_eq!(host.finalized.lock().unwrap().as_slice(), ["ord-1"]);
    }

    #[tokio::test]
    async fn test_retry_requires_error_state() {
        let gateway = Arc::new(StubGateway::default());
        let host = Arc::new(StubHost::with_line(100.0));
        let adapter = adapter(Arc::clone(&gateway), Arc::clone(&host));

        let err = adapter.retry().await.unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_close_resets_without_removing_line() {
        let gateway = Arc::new(StubGateway::default());
        let host = Arc::new(StubHost::with_line(100.0));
        let adapter = adapter(Arc::clone(&gateway), Arc::clone(&host));

        adapter.start().await.unwrap();
        adapter.close();
        assert_eq!(adapter.status(), SessionStatus::Idle);
        assert!(host.line.lock().unwrap().is_some());
    }
}
