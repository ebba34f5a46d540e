use std::fmt;

/// Failure to interpret a textual identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnknownObjectType(String),
    InvalidObjectId(String),
    InstanceOutOfRange(u32),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownObjectType(token) => write!(f, "unknown object type `{token}`"),
            Self::InvalidObjectId(text) => write!(f, "invalid object identifier `{text}`"),
            Self::InstanceOutOfRange(instance) => {
                write!(f, "instance {instance} exceeds the 22-bit range")
            }
        }
    }
}

impl std::error::Error for ParseError {}
