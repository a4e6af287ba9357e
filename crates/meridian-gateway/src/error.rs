//! Gateway errors and their mapping onto the bit-exact wire error codes
//! (spec §4.T, §6).

use meridian_core::{MeridianError, WireErrorCode};

/// Errors raised by the Gateway's connection and method-dispatch machinery.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The connection attempted a `request` before completing handshake.
    #[error("connection not linked")]
    NotLinked,
    /// `hello`'s protocol range does not intersect the server's.
    #[error("no protocol version in common: client [{client_min}, {client_max}], server [{server_min}, {server_max}]")]
    NoCommonProtocol {
        /// Client's advertised minimum.
        client_min: u32,
        /// Client's advertised maximum.
        client_max: u32,
        /// Server's configured minimum.
        server_min: u32,
        /// Server's configured maximum.
        server_max: u32,
    },
    /// The frame did not parse as valid JSON or did not match any frame kind.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// No handler is registered for the requested method name.
    #[error("method not found: {0}")]
    MethodNotFound(String),
    /// The outbound queue for this connection overflowed.
    #[error("connection unavailable: outbound queue overflow")]
    Unavailable,
    /// The wrapped domain error from a method handler.
    #[error(transparent)]
    Domain(#[from] MeridianError),
}

impl GatewayError {
    /// Map this error to its fixed wire code.
    #[must_use]
    pub fn wire_code(&self) -> WireErrorCode {
        match self {
            GatewayError::NotLinked => WireErrorCode::NotLinked,
            GatewayError::NoCommonProtocol { .. } => WireErrorCode::NotPaired,
            GatewayError::InvalidRequest(_) => WireErrorCode::InvalidRequest,
            GatewayError::MethodNotFound(_) => WireErrorCode::MethodNotFound,
            GatewayError::Unavailable => WireErrorCode::Unavailable,
            GatewayError::Domain(e) => e.wire_code(),
        }
    }
}

/// Convenience alias.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_common_protocol_maps_to_not_paired() {
        let err = GatewayError::NoCommonProtocol {
            client_min: 1,
            client_max: 1,
            server_min: 2,
            server_max: 3,
        };
        assert_eq!(err.wire_code(), WireErrorCode::NotPaired);
    }

    #[test]
    fn domain_error_delegates_its_own_code() {
        let err = GatewayError::from(MeridianError::QuotaExceeded {
            kind: "tools".to_string(),
            tenant: "t1".to_string(),
        });
        assert_eq!(err.wire_code(), WireErrorCode::QuotaExceeded);
    }
}
