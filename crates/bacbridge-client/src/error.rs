use bacbridge_core::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("remote device rejected the request: {0}")]
    Remote(String),
    #[error("{0} is not supported by the BACnet layer")]
    Unsupported(&'static str),
    #[error("a subscription context with this process identifier already exists")]
    ExistingContext,
    #[error("object list of device {0} is empty")]
    EmptyObjectList(u32),
    #[error("point addressing incomplete")]
    AddressingIncomplete,
    #[error("point {0} unavailable")]
    PointUnavailable(String),
    #[error("value `{value}` cannot be written to {point}")]
    InvalidValue { point: String, value: String },
    #[error("invalid identifier: {0}")]
    Parse(#[from] ParseError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl BridgeError {
    /// The BACnet layer lacks a capability; retrying will not help.
    pub fn is_capability_absence(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network(_) | Self::Remote(_) | Self::ExistingContext
        )
    }
}

impl From<tokio::time::error::Elapsed> for BridgeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
