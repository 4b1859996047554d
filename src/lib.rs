//! QR-code payment gateway integration for point-of-sale checkouts.
//!
//! Owns the asynchronous payment-confirmation flow: create a remote payment,
//! expose the QR payload for a waiting surface, poll the provider's status
//! endpoint until a terminal outcome, and reconcile that outcome with the
//! host checkout's payment-line bookkeeping. The host checkout and the
//! provider backend stay behind the [`checkout::CheckoutHost`] and
//! [`gateway::PaymentGateway`] traits.

use tracing_subscriber::EnvFilter;

pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
mod poller;
pub mod session;

pub use checkout::{CheckoutHost, NoticeLevel, PaymentLine, QrPaymentAdapter, SessionSnapshot};
pub use config::{GatewayConfig, PollConfig};
pub use error::{GatewayError, PaymentError};
pub use gateway::{
    CreatePaymentRequest, CreatePaymentResponse, HttpGateway, PaymentGateway, PaymentStatus,
};
pub use session::SessionStatus;

/// Install a console `tracing` subscriber honouring `RUST_LOG`.
///
/// Convenience for hosts that have no subscriber of their own; calling it
/// when one is already installed is a no-op.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pos_qr_payments=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
