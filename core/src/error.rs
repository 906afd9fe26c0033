//! Error types for the ELB client and the fake server.
//!
//! # Design
//! A failed call produces exactly one of three kinds of error. `Transport`
//! means the request never produced an HTTP response. `Decode` means a
//! response arrived but its XML did not have the expected shape. `Service`
//! carries the status, code and message reported by the service (or by the
//! fake server) verbatim. The client never branches on a service code; callers
//! match on `ServiceError::code` themselves.

use std::fmt;

use thiserror::Error;

/// Errors returned by `ElbClient` calls.
#[derive(Debug, Error)]
pub enum ElbError {
    /// The transport failed before a response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body was not the XML shape the action expects.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The service answered with a non-200 status.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The secret key could not be used as an HMAC key.
    #[error("signing failed: {0}")]
    Signing(#[from] hmac::digest::InvalidLength),
}

impl ElbError {
    /// The service error, if this is one.
    pub fn as_service(&self) -> Option<&ServiceError> {
        match self {
            ElbError::Service(err) => Some(err),
            _ => None,
        }
    }
}

/// An error reported by the load-balancing service.
///
/// Built by the client from an error envelope, and by the fake server when a
/// request fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// HTTP status code.
    pub status_code: u16,
    /// Machine-readable error code, e.g. `LoadBalancerNotFound`. May be empty.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ServiceError {
    pub fn new(status_code: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// A 400 `ValidationError`.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(400, "ValidationError", message)
    }

    /// A 400 `LoadBalancerNotFound` for `name`.
    pub fn load_balancer_not_found(name: &str) -> Self {
        Self::new(
            400,
            "LoadBalancerNotFound",
            format!("There is no ACTIVE Load Balancer named '{name}'"),
        )
    }

    /// A 400 `InvalidInstance` for `id`.
    pub fn invalid_instance(id: &str) -> Self {
        Self::new(
            400,
            "InvalidInstance",
            format!("InvalidInstance found in [{id}]. Invalid id: \"{id}\""),
        )
    }

    /// A 400 `InvalidParameterValue` for an action name the server does not know.
    pub fn unrecognized_action() -> Self {
        Self::new(400, "InvalidParameterValue", "Unrecognized Action")
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

impl std::error::Error for ServiceError {}

/// The response body could not be decoded into the expected result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode failed: {0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub(crate) fn unexpected(expected: &str, found: &str) -> Self {
        Self(format!("expected element <{expected}>, found <{found}>"))
    }

    pub(crate) fn missing(parent: &str, child: &str) -> Self {
        Self(format!("<{parent}> has no <{child}> element"))
    }
}

/// The transport could not complete the round-trip.
///
/// Wraps the transport's own error unchanged.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TransportError(Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }

    /// The wrapped transport error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

/// Errors from resolving credentials and the endpoint.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid endpoint {url}: {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("endpoint {0} has no host")]
    MissingHost(String),
}
