//! Layered error taxonomy: domain rule breaks, application failures, and the user-safe interface
//! errors the web layer renders.

use thiserror::Error;

use crate::login::LoginTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    LoginTransition(#[from] LoginTransitionError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// The account or session store failed.
    #[error("persistence failure: {0}")]
    Persistence(String),
    /// An external identity provider failed in a way the user cannot fix.
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The sign-in request could not be processed. Start again from the login page."
            }
            Self::ServiceUnavailable { .. } => {
                "The store is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(DomainError::LoginTransition(error)) => {
                InterfaceError::BadRequest { message: error.to_string(), correlation_id }
            }
            Self::Persistence(message) | Self::Integration(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::login::{LoginEvent, LoginState, LoginTransitionError};

    #[test]
    fn out_of_order_login_step_is_a_bad_request() {
        let error = DomainError::from(LoginTransitionError::InvalidTransition {
            state: LoginState::AnonymousBrowsing,
            event: LoginEvent::LoginLinked,
        });
        let interface = ApplicationError::from(error).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref message, .. } if message.contains("AnonymousBrowsing")
        ));
        assert_eq!(interface.correlation_id(), "req-1");
        assert_eq!(
            interface.user_message(),
            "The sign-in request could not be processed. Start again from the login page."
        );
    }

    #[test]
    fn persistence_and_integration_errors_map_to_service_unavailable() {
        for error in [
            ApplicationError::Persistence("database lock timeout".to_owned()),
            ApplicationError::Integration("token endpoint returned 500".to_owned()),
        ] {
            let interface = error.into_interface("req-2");

            assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
            assert_eq!(
                interface.user_message(),
                "The store is temporarily unavailable. Please retry shortly."
            );
        }
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("template `login.html` failed to render".to_owned())
                .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
