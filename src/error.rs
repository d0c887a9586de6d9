use thiserror::Error;

use crate::service::ServiceId;

/// Failures reported by a handle transport.
///
/// These are the "remote unreachable" class: the resolver absorbs them at the
/// resolution boundary and reports "no capability" instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("remote object is dead")]
    DeadObject,
    #[error("operation not supported by this platform")]
    Unsupported,
    #[error("remote side failed: {0}")]
    Remote(String),
    #[error("transaction failed: {0}")]
    Failed(String),
    #[error("handle cannot cross a process boundary")]
    Unmarshalable,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("service id {id} outside valid range [{min}, {max}]")]
    OutOfRange { id: i32, min: i32, max: i32 },
    #[error("service {0} is not installed in this process")]
    NotInstalled(ServiceId),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("service {id} is implemented in {expected}, not in {actual}")]
    WrongProcess {
        id: ServiceId,
        expected: String,
        actual: String,
    },
    #[error("service {id} exposes {installed}, caller asked for {requested}")]
    InterfaceMismatch {
        id: ServiceId,
        installed: &'static str,
        requested: &'static str,
    },
    #[error("root registry unavailable")]
    DiscoveryUnavailable,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed parcel: {0}")]
    Marshal(&'static str),
    #[error("unknown transaction code {0}")]
    UnknownTransaction(u32),
    #[error("config error: {0}")]
    Config(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("service runtime already initialized")]
    AlreadyInitialized,
    #[error("service runtime not initialized")]
    NotInitialized,
}

impl Error {
    /// True for wiring bugs (bad id, missing installation, wrong process or
    /// interface). These are never retried.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Error::OutOfRange { .. }
                | Error::NotInstalled(_)
                | Error::InvalidArgument(_)
                | Error::WrongProcess { .. }
                | Error::InterfaceMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_invalid_argument() {
        assert!(Error::OutOfRange { id: -1, min: 0, max: 10 }.is_invalid_argument());
        assert!(Error::NotInstalled(ServiceId::Num(3)).is_invalid_argument());
        assert!(!Error::DiscoveryUnavailable.is_invalid_argument());
        assert!(!Error::from(TransportError::DeadObject).is_invalid_argument());
    }

    #[test]
    fn display_names_the_service() {
        let err = Error::NotInstalled(ServiceId::from("x"));
        assert_eq!(err.to_string(), "service \"x\" is not installed in this process");
    }
}
