pub mod engine;
pub mod states;
pub mod tickets;

pub use engine::{ExternalLoginFlow, LoginFlow, LoginFlowDefinition, LoginTransitionError};
pub use states::{LoginContext, LoginEvent, LoginState, TransitionOutcome};
pub use tickets::{CorrelationState, ExternalLoginTicket};
