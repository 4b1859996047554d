//! Payment gateway trait and shared wire types.
//!
//! Defines the `PaymentGateway` trait that provider clients implement, along
//! with the request/response types whose field names are the wire
//! compatibility surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub mod http;

pub use http::HttpGateway;

// ---------------------------------------------------------------------------
// Payment status vocabulary
// ---------------------------------------------------------------------------

/// Remote payment status as reported by the provider.
///
/// The vocabulary is open-ended on the provider side; anything this crate
/// does not recognise lands in `Unknown` and is treated like `Pending` so a
/// provider-side addition never kills an in-flight payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
    Cancelled,
    NotFound,
    #[serde(untagged)]
    Unknown(String),
}

impl PaymentStatus {
    /// Parse the wire `payment_status` value.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "approved" => Self::Approved,
            "pending" => Self::Pending,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "not_found" => Self::NotFound,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Terminal statuses end the poll chain; everything else keeps it alive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::NotFound => "not_found",
            Self::Unknown(other) => other.as_str(),
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Create payment request / response
// ---------------------------------------------------------------------------

/// Payment creation request. Field names match the provider wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: f64,
    pub description: String,
    /// Client-chosen correlation token, echoed back at status-check time to
    /// disambiguate retried/duplicate orders server-side.
    pub pos_client_ref: String,
    pub payment_method_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

/// Successful payment creation: the provider issued an id and QR payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentResponse {
    pub payment_id: String,
    /// Opaque renderable QR data (URL or encoded image).
    pub qr_data: String,
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Remote payment provider client.
///
/// Implementations wrap the provider's three operations. The production
/// implementation is [`HttpGateway`]; tests script their own.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment and obtain its QR payload.
    ///
    /// Fails for non-positive amounts and for any transport/provider error;
    /// all failures surface as a single `GatewayError`, never a panic.
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, GatewayError>;

    /// Check the status of a previously created payment.
    ///
    /// Idempotent and safe to call repeatedly; has no side effects on the
    /// remote payment itself.
    async fn check_status(
        &self,
        payment_id: &str,
        external_reference: Option<&str>,
    ) -> Result<PaymentStatus, GatewayError>;

    /// Cancel a pending payment. Best-effort: callers must not block local
    /// cleanup on a failure here.
    async fn cancel_payment(&self, payment_id: &str) -> Result<(), GatewayError>;
}

// ===========================================================================
// Tests
// ===========================================================================
