pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod login;
pub mod redirect;
pub mod signing;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use catalog::{Catalog, CatalogQuery, CatalogSearchView};
pub use domain::account::{
    Account, AccountId, ExternalIdentity, ExternalLogin, ExternalLoginKey, NewAccount,
};
pub use domain::product::{Product, ProductId};
pub use domain::session::{Session, SessionId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use identity::{AuthError, IdentityProvider};
pub use login::{
    ExternalLoginFlow, LoginContext, LoginEvent, LoginFlow, LoginState,
    LoginTransitionError, TransitionOutcome,
};
pub use redirect::{is_local_url, safe_redirect_target, DEFAULT_LANDING_ROUTE};
pub use signing::{random_token, TokenError, TokenSigner};
