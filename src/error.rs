//! Error taxonomy for the QR payment integration.
//!
//! Gateway-level failures (`GatewayError`) are kept separate from the
//! adapter-level taxonomy (`PaymentError`) so that the poll scheduler can
//! treat transport failures as transient without surfacing them, while
//! creation failures terminate the attempt and reach the caller.

use thiserror::Error;

/// Failure talking to the remote payment provider.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level failure (connect, timeout, TLS, body read).
    #[error("cannot reach payment provider: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the provider.
    #[error("{detail} (HTTP {status})")]
    Http { status: u16, detail: String },

    /// The provider answered but refused the request (`status: "error"`).
    #[error("payment provider rejected the request: {0}")]
    Rejected(String),

    /// The provider answered with a body this crate cannot interpret.
    #[error("invalid response from payment provider: {0}")]
    InvalidResponse(String),
}

/// Adapter-level errors surfaced to the host checkout.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Rejected locally before any wire call: non-positive amount, no
    /// selected line, or an operation invalid for the current state.
    #[error("{0}")]
    Validation(String),

    /// A gateway call failed; the session is left in `Error` with a message.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A host checkout operation failed (line removal, order finalization).
    #[error("checkout error: {0}")]
    Host(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_message_includes_status() {
        let err = GatewayError::Http {
            status: 503,
            detail: "payment provider server error".into(),
        };
        assert_eq!(
            err.to_string(),
            "payment provider server error (HTTP 503)"
        );
    }

    #[test]
    fn test_gateway_error_wraps_into_payment_error() {
        let err: PaymentError = GatewayError::Rejected("Missing token".into()).into();
        assert!(matches!(err, PaymentError::Gateway(_)));
        assert!(err.to_string().contains("Missing token"));
    }
}
