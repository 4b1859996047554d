//! Timer-chained status poll scheduler.
//!
//! One task per payment attempt, spawned after a successful creation. Each
//! iteration sleeps, re-validates that it still speaks for the live session
//! (poll flag, epoch, payment id, host selection), then performs one status
//! check — so at most one check is in flight per session. Cancellation is
//! cooperative: the task observes `poll_active`/`poll_epoch` after every
//! suspension point and discards results that arrive after teardown.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::checkout::{CheckoutHost, NoticeLevel};
use crate::config::PollConfig;
use crate::gateway::{PaymentGateway, PaymentStatus};
use crate::session::{lock_session, PaymentSession, SessionStatus};

/// Everything a poll chain needs, captured at spawn time.
pub(crate) struct PollContext {
    pub session: Arc<Mutex<PaymentSession>>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub host: Arc<dyn CheckoutHost>,
    pub config: PollConfig,
    /// Epoch of the attempt this chain belongs to.
    pub epoch: u64,
    pub payment_id: String,
    pub external_reference: Option<String>,
    pub order_id: String,
    pub line_id: String,
}

pub(crate) fn spawn(ctx: PollContext) -> JoinHandle<()> {
    tokio::spawn(run(ctx))
}

async fn run(ctx: PollContext) {
    let mut attempts: u32 = 0;
    let mut delay = ctx.config.poll_interval();

    loop {
        tokio::time::sleep(delay).await;

        // (1) session still wants polling, (2) for this payment,
        // (3) and the host's live selection still matches the bound identity.
        {
            let s = lock_session(&ctx.session);
            if !s.poll_active || s.poll_epoch != ctx.epoch {
                debug!(payment_id = %ctx.payment_id, "poll chain stopped: session torn down");
                return;
            }
            if s.payment_id.as_deref() != Some(ctx.payment_id.as_str()) {
                debug!(payment_id = %ctx.payment_id, "poll chain stopped: payment id no longer bound");
                return;
            }
        }
        let still_selected = ctx
            .host
            .selected_line()
            .map(|l| l.order_id == ctx.order_id && l.line_id == ctx.line_id)
            .unwrap_or(false);
        if !still_selected {
            // Stale identity: halt silently and release the session so the
            // next order/line starts clean. Not a user-visible error.
            let mut s = lock_session(&ctx.session);
            if s.poll_epoch == ctx.epoch {
                debug!(
                    order_id = %ctx.order_id,
                    line_id = %ctx.line_id,
                    "active selection changed mid-poll, resetting session"
                );
                s.reset();
            }
            return;
        }

        attempts += 1;
        if attempts > ctx.config.max_poll_attempts {
            let message = "Payment confirmation timed out";
            let mut s = lock_session(&ctx.session);
            if s.poll_epoch == ctx.epoch && s.poll_active {
                s.fail(message);
                drop(s);
                ctx.host.notify(NoticeLevel::Error, message);
            }
            return;
        }

        let result = ctx
            .gateway
            .check_status(&ctx.payment_id, ctx.external_reference.as_deref())
            .await;

        match result {
            Ok(status) => {
                delay = ctx.config.poll_interval();
                if apply_status(&ctx, status).await {
                    return;
                }
            }
            Err(e) => {
                // Transient: keep the session pending, retry on the longer
                // backoff interval. Only session teardown ends the chain.
                warn!(payment_id = %ctx.payment_id, "status check failed, backing off: {e}");
                delay = ctx.config.error_backoff();
            }
        }
    }
}

/// Apply a status-check result. Returns true when the chain must stop.
async fn apply_status(ctx: &PollContext, status: PaymentStatus) -> bool {
    match status {
        PaymentStatus::Approved => {
            {
                let mut s = lock_session(&ctx.session);
                // The selection may have changed while the check was in
                // flight; a result for a torn-down session is discarded.
                if s.poll_epoch != ctx.epoch || !s.poll_active {
                    warn!(payment_id = %ctx.payment_id, "approval arrived after teardown, discarding");
                    return true;
                }
                s.approve();
            }
            if let Err(e) = ctx.host.set_line_done(&ctx.order_id, &ctx.line_id) {
                warn!("failed to mark payment line done: {e}");
            }
            ctx.host.notify(NoticeLevel::Info, "Payment approved");
            auto_advance(ctx).await;
            true
        }
        PaymentStatus::Rejected | PaymentStatus::Cancelled => {
            let message = format!("Payment {status}");
            let mut s = lock_session(&ctx.session);
            if s.poll_epoch != ctx.epoch || !s.poll_active {
                return true;
            }
            s.fail(message.clone());
            drop(s);
            ctx.host.notify(NoticeLevel::Error, &message);
            true
        }
        // `not_found` and unknown provider statuses are treated like
        // pending; the attempt ceiling bounds them.
        PaymentStatus::Pending | PaymentStatus::NotFound | PaymentStatus::Unknown(_) => false,
    }
}

/// Optional auto-advance: after the configured delay, finalize the order
/// and release the session, unless the cashier already moved on.
async fn auto_advance(ctx: &PollContext) {
    let Some(delay) = ctx.config.auto_advance_after_approval() else {
        return;
    };
    tokio::time::sleep(delay).await;
    {
        let mut s = lock_session(&ctx.session);
        if s.poll_epoch != ctx.epoch || s.status() != SessionStatus::Approved {
            return;
        }
        s.reset();
    }
    info!(order_id = %ctx.order_id, "auto-advancing to next order after approval");
    if let Err(e) = ctx.host.finalize_order(&ctx.order_id) {
        warn!("auto-advance: failed to finalize order: {e}");
    }
}
